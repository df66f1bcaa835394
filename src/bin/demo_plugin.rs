//! Example collector plugin.
//!
//! Speaks the stdio command protocol, so it can be dropped into the plugin
//! binaries directory and referenced from a descriptor:
//!
//! ```json
//! { "name": "demo", "type": "cmd", "cmd": "metrichost-demo-plugin",
//!   "data": { "greeting": "hi" } }
//! ```

use std::process::ExitCode;

use metrichost::plugin::protocol::run_plugin;
use metrichost::plugin::{ConfigOption, MetricRecord, NativeCollector};

fn demo_collector() -> NativeCollector {
    NativeCollector::builder("demo")
        .usages("demo collector echoing its configuration")
        .tags(["demo", "example"])
        .option(ConfigOption::text("greeting", "hello", "text reported in every record"))
        .attribute("greeting", "configured greeting")
        .attribute("pid", "process id of the plugin")
        .collect_with(|config| {
            let greeting = config
                .get("greeting")
                .cloned()
                .unwrap_or_else(|| serde_json::Value::from("hello"));

            let mut record = MetricRecord::new();
            record.insert("greeting".to_string(), greeting);
            record.insert("pid".to_string(), std::process::id().into());
            Ok(vec![record])
        })
        .build()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    run_plugin(&demo_collector()).await
}
