//! In-process collectors.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::{
    Collector, ConfigMap, ConfigOption, KeyValue, MetricRecord, PluginResult, ATTRIBUTES_KEY,
    OPTIONS_KEY,
};

type CollectFn = dyn Fn(&ConfigMap) -> PluginResult<Vec<MetricRecord>> + Send + Sync;

/// A collector implemented directly in the host process.
///
/// The collect function receives the configuration last stored with
/// `sync_config` (empty until then).
pub struct NativeCollector {
    name: String,
    usages: String,
    tags: Vec<String>,
    version: String,
    options: Vec<ConfigOption>,
    attributes: Vec<KeyValue>,
    collect: Arc<CollectFn>,
    config: Mutex<ConfigMap>,
}

impl std::fmt::Debug for NativeCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCollector").field("name", &self.name).field("tags", &self.tags).finish()
    }
}

impl NativeCollector {
    /// Start building a native collector.
    pub fn builder(name: impl Into<String>) -> NativeCollectorBuilder {
        NativeCollectorBuilder {
            name: name.into(),
            usages: String::new(),
            tags: Vec::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            options: Vec::new(),
            attributes: Vec::new(),
            collect: Arc::new(|_| Ok(Vec::new())),
        }
    }

    /// Snapshot of the stored configuration.
    pub fn current_config(&self) -> ConfigMap {
        self.config.lock().clone()
    }
}

/// Builder for [`NativeCollector`].
pub struct NativeCollectorBuilder {
    name: String,
    usages: String,
    tags: Vec<String>,
    version: String,
    options: Vec<ConfigOption>,
    attributes: Vec<KeyValue>,
    collect: Arc<CollectFn>,
}

impl NativeCollectorBuilder {
    pub fn usages(mut self, usages: impl Into<String>) -> Self {
        self.usages = usages.into();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn option(mut self, option: ConfigOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, description: impl Into<String>) -> Self {
        self.attributes.push(KeyValue::new(key, description));
        self
    }

    /// Set the function producing metric records.
    pub fn collect_with<F>(mut self, collect: F) -> Self
    where
        F: Fn(&ConfigMap) -> PluginResult<Vec<MetricRecord>> + Send + Sync + 'static,
    {
        self.collect = Arc::new(collect);
        self
    }

    pub fn build(self) -> NativeCollector {
        NativeCollector {
            name: self.name,
            usages: self.usages,
            tags: self.tags,
            version: self.version,
            options: self.options,
            attributes: self.attributes,
            collect: self.collect,
            config: Mutex::new(ConfigMap::new()),
        }
    }
}

#[async_trait]
impl Collector for NativeCollector {
    async fn name(&self) -> PluginResult<String> {
        Ok(self.name.clone())
    }

    async fn usages(&self) -> PluginResult<String> {
        Ok(self.usages.clone())
    }

    async fn tags(&self) -> PluginResult<Vec<String>> {
        Ok(self.tags.clone())
    }

    async fn config(&self) -> PluginResult<ConfigMap> {
        let mut config = ConfigMap::new();
        config.insert(OPTIONS_KEY.to_string(), serde_json::to_value(&self.options).unwrap_or_default());
        config.insert(
            ATTRIBUTES_KEY.to_string(),
            serde_json::to_value(&self.attributes).unwrap_or_default(),
        );
        Ok(config)
    }

    async fn collect(&self) -> PluginResult<Vec<MetricRecord>> {
        let config = self.current_config();
        (self.collect)(&config)
    }

    async fn version(&self) -> PluginResult<String> {
        Ok(self.version.clone())
    }

    async fn sync_config(&self, config: ConfigMap) -> PluginResult<()> {
        tracing::debug!(collector = %self.name, keys = config.len(), "Syncing native collector config");
        *self.config.lock() = config;
        Ok(())
    }
}

static STARTED: Lazy<Instant> = Lazy::new(Instant::now);

/// Name of the builtin host runtime collector.
pub const RUNTIME_COLLECTOR: &str = "runtime";

/// Builtin collector reporting metrics about the host process itself.
pub fn runtime_collector() -> NativeCollector {
    Lazy::force(&STARTED);

    NativeCollector::builder(RUNTIME_COLLECTOR)
        .usages("host process runtime statistics")
        .tags(["host", "runtime"])
        .attribute("pid", "process id of the host")
        .attribute("uptime_secs", "seconds since the collector was first used")
        .attribute("timestamp", "collection time (RFC 3339)")
        .collect_with(|_| {
            let mut record = MetricRecord::new();
            record.insert("pid".to_string(), std::process::id().into());
            record.insert("uptime_secs".to_string(), STARTED.elapsed().as_secs().into());
            record.insert("timestamp".to_string(), chrono::Utc::now().to_rfc3339().into());
            Ok(vec![record])
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginError;

    #[tokio::test]
    async fn test_builder_fields() {
        let collector = NativeCollector::builder("mysql")
            .usages("mysql server metrics")
            .tags(["db", "mysql"])
            .version("2.0")
            .build();

        assert_eq!(collector.name().await.unwrap(), "mysql");
        assert_eq!(collector.usages().await.unwrap(), "mysql server metrics");
        assert_eq!(collector.tags().await.unwrap(), vec!["db", "mysql"]);
        assert_eq!(collector.version().await.unwrap(), "2.0");
        assert!(collector.collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_config_lists_options_and_attributes() {
        let collector = NativeCollector::builder("oracle")
            .option(ConfigOption::text("dsn", "sys/password@127.0.0.1:1521", "connection string"))
            .option(ConfigOption::switch("session", "collect session stats"))
            .attribute("uptime", "instance uptime")
            .build();

        let config = collector.config().await.unwrap();
        let options = config[OPTIONS_KEY].as_array().unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0]["key_name"], "dsn");
        assert_eq!(options[1]["type"], "bool");
        assert_eq!(config[ATTRIBUTES_KEY][0]["key"], "uptime");
    }

    #[tokio::test]
    async fn test_collect_sees_synced_config() {
        let collector = NativeCollector::builder("echo")
            .collect_with(|config| {
                let mut record = MetricRecord::new();
                record.insert("keys".to_string(), config.len().into());
                Ok(vec![record])
            })
            .build();

        assert_eq!(collector.collect().await.unwrap()[0]["keys"], 0);

        let mut config = ConfigMap::new();
        config.insert("a".to_string(), 1.into());
        config.insert("b".to_string(), 2.into());
        collector.sync_config(config).await.unwrap();

        assert_eq!(collector.collect().await.unwrap()[0]["keys"], 2);
        assert_eq!(collector.current_config().len(), 2);
    }

    #[tokio::test]
    async fn test_collect_error_propagates() {
        let collector = NativeCollector::builder("broken")
            .collect_with(|_| Err(PluginError::Config("missing dsn".to_string())))
            .build();

        assert!(matches!(collector.collect().await, Err(PluginError::Config(_))));
    }

    #[tokio::test]
    async fn test_runtime_collector() {
        let collector = runtime_collector();
        let records = collector.collect().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["pid"], std::process::id());
        assert!(records[0]["uptime_secs"].is_u64());
        assert!(records[0]["timestamp"].is_string());
        assert_eq!(collector.name().await.unwrap(), RUNTIME_COLLECTOR);
    }
}
