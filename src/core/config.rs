//! Configuration management for Metrichost.
//!
//! Handles loading and saving configuration from TOML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::plugin::{TagsMode, DEFAULT_CONF_DIR};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External plugin settings
    pub plugins: PluginsConfig,
}

/// External plugin settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory holding plugin descriptors
    pub conf_dir: PathBuf,

    /// Directory holding plugin executables (default: `<conf_dir>/../bin`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_dir: Option<PathBuf>,

    /// Seconds between discovery cycles
    pub probe_interval_secs: u64,

    /// Deadline for one plugin invocation, in seconds
    pub call_timeout_secs: u64,

    /// Whether plugins missing from a discovery cycle are deregistered
    pub prune_missing: bool,

    /// How plugin `tags` output is parsed
    pub tags_mode: TagsMode,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            conf_dir: PathBuf::from(DEFAULT_CONF_DIR),
            bin_dir: None,
            probe_interval_secs: 5,
            call_timeout_secs: 30,
            prune_missing: true,
            tags_mode: TagsMode::Legacy,
        }
    }
}

impl PluginsConfig {
    /// Interval between discovery cycles (never zero).
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    /// Deadline for a single plugin call (never zero).
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }

    /// Descriptor directory, with relative paths anchored at `base`.
    pub fn resolved_conf_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.conf_dir)
    }

    /// Binaries directory, with relative paths anchored at `base`.
    ///
    /// Defaults to the `bin` directory next to the descriptor directory.
    pub fn resolved_bin_dir(&self, base: &Path) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => base.join(dir),
            None => {
                let conf_dir = self.resolved_conf_dir(base);
                conf_dir.parent().map_or_else(|| conf_dir.join("..").join("bin"), |p| p.join("bin"))
            }
        }
    }
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches in order:
    /// 1. `.metrichost.toml` in current directory
    /// 2. `~/.config/metrichost/config.toml`
    ///
    /// Falls back to defaults when neither exists.
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(".metrichost.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save configuration to a specific file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the user configuration directory.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("metrichost"))
    }

    /// Directory relative plugin paths are anchored at: the one holding
    /// the running executable, or the working directory if that is unknown.
    pub fn base_dir() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
