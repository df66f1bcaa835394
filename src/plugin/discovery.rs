//! Periodic plugin discovery.
//!
//! Each cycle reloads every descriptor and registers it, so edits on disk are
//! picked up on the next tick. A failed cycle is logged and the loop carries
//! on.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{DescriptorLoader, PluginError, PluginResult, Registry, SubprocessOptions};
use crate::core::PluginsConfig;

/// Outcome of one discovery cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Plugins registered (or re-registered) this cycle.
    pub registered: Vec<String>,
    /// Plugins loaded but not registrable: unsupported kinds and names held
    /// by builtin collectors.
    pub skipped: Vec<String>,
    /// Plugins removed because their descriptor disappeared.
    pub removed: Vec<String>,
}

/// Keeps a [`Registry`] in sync with a descriptor directory.
#[derive(Debug, Clone)]
pub struct Discovery {
    registry: Arc<Registry>,
    loader: DescriptorLoader,
    options: SubprocessOptions,
    interval: Duration,
    prune_missing: bool,
}

impl Discovery {
    pub fn new(registry: Arc<Registry>, loader: DescriptorLoader) -> Self {
        Self {
            registry,
            loader,
            options: SubprocessOptions::default(),
            interval: super::DEFAULT_PROBE_INTERVAL,
            prune_missing: true,
        }
    }

    /// Build from configuration; relative directories resolve against `base`.
    pub fn from_config(registry: Arc<Registry>, config: &PluginsConfig, base: &Path) -> Self {
        let loader =
            DescriptorLoader::new(config.resolved_conf_dir(base), config.resolved_bin_dir(base));

        Self::new(registry, loader)
            .options(SubprocessOptions {
                timeout: config.call_timeout(),
                tags_mode: config.tags_mode,
            })
            .interval(config.probe_interval())
            .prune_missing(config.prune_missing)
    }

    #[must_use]
    pub fn options(mut self, options: SubprocessOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the time between cycles (clamped to at least one millisecond).
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn prune_missing(mut self, prune: bool) -> Self {
        self.prune_missing = prune;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn loader(&self) -> &DescriptorLoader {
        &self.loader
    }

    /// Run a single discovery cycle.
    ///
    /// An unreadable descriptor directory fails the cycle and leaves the
    /// registry untouched.
    pub fn probe_once(&self) -> PluginResult<ProbeReport> {
        let descriptors = self.loader.load()?;
        let mut report = ProbeReport::default();
        let mut seen = HashSet::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let name = descriptor.name.clone();
            match self.registry.register_descriptor(descriptor, self.options) {
                Ok(()) => {
                    seen.insert(name.clone());
                    report.registered.push(name);
                }
                Err(e @ (PluginError::UnsupportedKind { .. } | PluginError::NameReserved(_))) => {
                    tracing::warn!(plugin = %name, error = %e, "Plugin not registered");
                    report.skipped.push(name);
                }
                Err(e) => return Err(e),
            }
        }

        if self.prune_missing {
            report.removed = self.registry.retain_plugins(&seen);
            for name in &report.removed {
                tracing::info!(plugin = %name, "Deregistered vanished plugin");
            }
        }

        tracing::debug!(
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            removed = report.removed.len(),
            "Discovery cycle finished"
        );
        Ok(report)
    }

    /// Run cycles until `shutdown` becomes `true` or its sender is dropped.
    ///
    /// The first cycle runs immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            conf_dir = %self.loader.conf_dir().display(),
            interval = ?self.interval,
            "Starting plugin discovery"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    // Descriptor scanning is blocking filesystem work.
                    let discovery = self.clone();
                    match tokio::task::spawn_blocking(move || discovery.probe_once()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => {
                            tracing::error!(error = %e, "Plugin discovery cycle failed");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Plugin discovery cycle panicked");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Plugin discovery stopped");
    }

    /// Run the loop on a background task.
    pub fn spawn(self) -> DiscoveryHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        DiscoveryHandle { shutdown_tx, task }
    }
}

/// Handle to a spawned discovery loop.
#[derive(Debug)]
pub struct DiscoveryHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DiscoveryHandle {
    /// Signal the loop to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Discovery task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Origin, PluginKind};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        conf: PathBuf,
        bin: PathBuf,
        registry: Arc<Registry>,
    }

    impl Fixture {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            let conf = root.path().join("conf");
            let bin = root.path().join("bin");
            std::fs::create_dir_all(&conf).unwrap();
            std::fs::create_dir_all(&bin).unwrap();
            Self { _root: root, conf, bin, registry: Arc::new(Registry::new()) }
        }

        fn discovery(&self) -> Discovery {
            Discovery::new(Arc::clone(&self.registry), DescriptorLoader::new(&self.conf, &self.bin))
        }

        fn plugin(&self, name: &str) {
            std::fs::write(self.bin.join(name), "#!/bin/sh\n").unwrap();
            std::fs::write(
                self.conf.join(format!("{name}.json")),
                format!(r#"{{"name":"{name}","type":"cmd","cmd":"{name}"}}"#),
            )
            .unwrap();
        }
    }

    #[test]
    fn test_probe_registers_loaded_plugins() {
        let fixture = Fixture::new();
        fixture.plugin("alpha");
        fixture.plugin("beta");

        let report = fixture.discovery().probe_once().unwrap();
        assert_eq!(report.registered, vec!["alpha", "beta"]);
        assert_eq!(fixture.registry.list(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_missing_binary_never_registered() {
        let fixture = Fixture::new();
        std::fs::write(fixture.conf.join("ghost.json"), r#"{"name":"ghost","cmd":"ghost"}"#)
            .unwrap();

        let report = fixture.discovery().probe_once().unwrap();
        assert!(report.registered.is_empty());
        assert!(!fixture.registry.contains("ghost"));
    }

    #[test]
    fn test_remote_plugins_are_skipped() {
        let fixture = Fixture::new();
        std::fs::write(fixture.conf.join("far.json"), r#"{"name":"far","type":"remote"}"#)
            .unwrap();

        let report = fixture.discovery().probe_once().unwrap();
        assert_eq!(report.skipped, vec!["far"]);
        assert!(!fixture.registry.contains("far"));
        assert_eq!(PluginKind::Remote.display_name(), "remote");
    }

    #[test]
    fn test_vanished_plugins_are_pruned() {
        let fixture = Fixture::new();
        fixture.registry.register_native("runtime", Arc::new(|| {
            Box::new(crate::plugin::runtime_collector()) as Box<dyn crate::plugin::Collector>
        }));
        fixture.plugin("alpha");
        fixture.plugin("beta");

        let discovery = fixture.discovery();
        discovery.probe_once().unwrap();

        std::fs::remove_file(fixture.conf.join("alpha.json")).unwrap();
        let report = discovery.probe_once().unwrap();

        assert_eq!(report.removed, vec!["alpha"]);
        assert_eq!(fixture.registry.list(), vec!["beta", "runtime"]);
        assert_eq!(fixture.registry.origin("runtime"), Some(Origin::Native));
    }

    #[test]
    fn test_plugin_cannot_shadow_native_collector() {
        let fixture = Fixture::new();
        fixture.registry.register_native("runtime", Arc::new(|| {
            Box::new(crate::plugin::runtime_collector()) as Box<dyn crate::plugin::Collector>
        }));
        fixture.plugin("runtime");
        fixture.plugin("alpha");

        let discovery = fixture.discovery();
        let report = discovery.probe_once().unwrap();
        assert_eq!(report.registered, vec!["alpha"]);
        assert_eq!(report.skipped, vec!["runtime"]);
        assert_eq!(fixture.registry.origin("runtime"), Some(Origin::Native));

        std::fs::remove_file(fixture.conf.join("runtime.json")).unwrap();
        let report = discovery.probe_once().unwrap();
        assert!(report.removed.is_empty());
        assert!(fixture.registry.contains("runtime"));
        assert_eq!(fixture.registry.origin("runtime"), Some(Origin::Native));
    }

    #[test]
    fn test_pruning_can_be_disabled() {
        let fixture = Fixture::new();
        fixture.plugin("alpha");

        let discovery = fixture.discovery().prune_missing(false);
        discovery.probe_once().unwrap();
        std::fs::remove_file(fixture.conf.join("alpha.json")).unwrap();

        let report = discovery.probe_once().unwrap();
        assert!(report.removed.is_empty());
        assert!(fixture.registry.contains("alpha"));
    }

    #[test]
    fn test_unreadable_directory_keeps_registry() {
        let fixture = Fixture::new();
        fixture.plugin("alpha");
        let discovery = fixture.discovery();
        discovery.probe_once().unwrap();

        std::fs::remove_dir_all(&fixture.conf).unwrap();
        assert!(matches!(discovery.probe_once(), Err(PluginError::DirectoryRead { .. })));
        assert!(fixture.registry.contains("alpha"));
    }

    #[tokio::test]
    async fn test_spawned_loop_picks_up_new_plugins() {
        let fixture = Fixture::new();
        fixture.plugin("alpha");

        let handle = fixture.discovery().interval(Duration::from_millis(20)).spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fixture.registry.contains("alpha"));

        fixture.plugin("beta");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(fixture.registry.contains("beta"));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_loop_survives_missing_directory() {
        let fixture = Fixture::new();
        std::fs::remove_dir_all(&fixture.conf).unwrap();

        let handle = fixture.discovery().interval(Duration::from_millis(10)).spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        std::fs::create_dir_all(&fixture.conf).unwrap();
        fixture.plugin("late");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(fixture.registry.contains("late"));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropping_sender_stops_loop() {
        let fixture = Fixture::new();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(fixture.discovery().run(rx));

        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[test]
    fn test_from_config() {
        let config = PluginsConfig {
            conf_dir: PathBuf::from("conf"),
            probe_interval_secs: 9,
            call_timeout_secs: 4,
            ..PluginsConfig::default()
        };
        let discovery =
            Discovery::from_config(Arc::new(Registry::new()), &config, Path::new("/opt/host"));

        assert_eq!(discovery.loader().conf_dir(), Path::new("/opt/host/conf"));
        assert_eq!(discovery.loader().bin_dir(), Path::new("/opt/host/bin"));
        assert_eq!(discovery.interval, Duration::from_secs(9));
        assert_eq!(discovery.options.timeout, Duration::from_secs(4));
    }
}
