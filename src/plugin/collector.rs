//! The collector capability.
//!
//! Every data source the host can run, whether built into the process or
//! provided by an external plugin binary, implements [`Collector`]. Callers
//! hold a `Box<dyn Collector>` and never need to know which variant it is.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::{ConfigMap, MetricRecord, PluginResult};

/// Operations every collector supports.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Collector name.
    async fn name(&self) -> PluginResult<String>;

    /// Human-readable usage description.
    async fn usages(&self) -> PluginResult<String>;

    /// Tags used to categorize the collector.
    async fn tags(&self) -> PluginResult<Vec<String>>;

    /// Configurable options and exposed attributes.
    async fn config(&self) -> PluginResult<ConfigMap>;

    /// Collect one batch of metric records.
    async fn collect(&self) -> PluginResult<Vec<MetricRecord>>;

    /// Collector version.
    async fn version(&self) -> PluginResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }

    /// Store configuration for subsequent `collect`/`config` calls.
    async fn sync_config(&self, _config: ConfigMap) -> PluginResult<()> {
        Ok(())
    }
}

/// Produces a fresh collector instance on every call.
pub type CollectorFactory = Arc<dyn Fn() -> Box<dyn Collector> + Send + Sync>;

/// Summary of a collector's self-description.
///
/// Each field is fetched independently; a failing field is recorded in
/// `errors` instead of aborting the whole description.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectorInfo {
    pub name: Option<String>,
    pub usages: Option<String>,
    pub tags: Option<Vec<String>>,
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl CollectorInfo {
    /// Whether every field was fetched successfully.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Fetch name, usages, tags and version from a collector.
pub async fn describe(collector: &dyn Collector) -> CollectorInfo {
    let (name, usages, tags, version) = futures::join!(
        collector.name(),
        collector.usages(),
        collector.tags(),
        collector.version()
    );

    let mut info = CollectorInfo::default();
    info.name = keep(name, &mut info.errors);
    info.usages = keep(usages, &mut info.errors);
    info.tags = keep(tags, &mut info.errors);
    info.version = keep(version, &mut info.errors);
    info
}

fn keep<T>(result: PluginResult<T>, errors: &mut Vec<String>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "Collector description incomplete");
            errors.push(e.to_string());
            None
        }
    }
}
