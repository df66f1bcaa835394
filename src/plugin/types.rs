//! Core plugin types.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::PluginError;

/// Configuration blob exchanged with collectors.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// One record of collected metrics, keyed by metric name.
pub type MetricRecord = serde_json::Map<String, serde_json::Value>;

/// Command argument understood by every metric plugin binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginCommand {
    /// Print the collector name.
    Name,
    /// Print a human-readable usage description.
    Usages,
    /// Print the collector tags.
    Tags,
    /// Print the configurable options as a JSON object.
    Config,
    /// Collect metrics and print them as a JSON array of records.
    Collect,
    /// Print the plugin version.
    Version,
}

impl PluginCommand {
    /// Every command of the protocol.
    pub const ALL: [Self; 6] =
        [Self::Name, Self::Usages, Self::Tags, Self::Config, Self::Collect, Self::Version];

    /// The literal argument passed to the plugin binary.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Usages => "usages",
            Self::Tags => "tags",
            Self::Config => "config",
            Self::Collect => "collect",
            Self::Version => "version",
        }
    }

    /// Whether the command receives the current configuration on stdin.
    pub fn accepts_config(&self) -> bool {
        matches!(self, Self::Tags | Self::Config | Self::Collect)
    }
}

impl std::fmt::Display for PluginCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginCommand {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| PluginError::UnknownCommand(s.to_string()))
    }
}

/// Transport a plugin descriptor declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// Subprocess driven over stdio.
    #[default]
    #[serde(alias = "cmd")]
    Command,
    /// Network endpoint. Recognized, not implemented.
    #[serde(alias = "rpc")]
    Remote,
}

impl PluginKind {
    /// Get the display name for this plugin kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Command => "cmd",
            Self::Remote => "remote",
        }
    }
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// How `tags` output from a plugin is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagsMode {
    /// `[a,b,c]` bracket list, split verbatim. `[]` yields one empty tag.
    #[default]
    Legacy,
    /// JSON array of strings when it parses, bracket list otherwise.
    Auto,
    /// JSON array of strings only.
    Structured,
}

impl FromStr for TagsMode {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "structured" | "json" => Ok(Self::Structured),
            "legacy" | "bracket" => Ok(Self::Legacy),
            other => Err(PluginError::Config(format!("unknown tags mode '{other}'"))),
        }
    }
}

/// Value type of a configurable option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigValueType {
    Bool,
    String,
    Long,
    Float,
}

/// Description of one configurable option, as reported by `config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOption {
    /// Configuration key.
    pub key_name: String,
    /// Whether the value must be one of `choose_options`.
    #[serde(default)]
    pub choose_only: bool,
    /// Allowed values when `choose_only` is set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choose_options: Vec<serde_json::Value>,
    /// Default value.
    #[serde(default)]
    pub default: serde_json::Value,
    /// Whether the default is only a hint and not applied.
    #[serde(default)]
    pub default_no_use: bool,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Value type.
    #[serde(rename = "type")]
    pub value_type: ConfigValueType,
}

impl ConfigOption {
    /// A boolean switch defaulting to `true`.
    pub fn switch(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key_name: key.into(),
            choose_only: true,
            choose_options: vec!["true".into(), "false".into()],
            default: serde_json::Value::Bool(true),
            default_no_use: true,
            description: description.into(),
            value_type: ConfigValueType::Bool,
        }
    }

    /// A free-form string option.
    pub fn text(
        key: impl Into<String>,
        default: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key_name: key.into(),
            choose_only: false,
            choose_options: Vec::new(),
            default: serde_json::Value::String(default.into()),
            default_no_use: true,
            description: description.into(),
            value_type: ConfigValueType::String,
        }
    }
}

/// A named attribute exposed by a collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Key of the option list in a `config` response.
pub const OPTIONS_KEY: &str = "options";

/// Key of the attribute list in a `config` response.
pub const ATTRIBUTES_KEY: &str = "attributes";

/// Default descriptor directory, relative to the host executable.
pub const DEFAULT_CONF_DIR: &str = "plugins/metric/conf";

/// Default plugin binaries directory, relative to the host executable.
pub const DEFAULT_BIN_DIR: &str = "plugins/metric/bin";

/// File suffixes recognized as plugin descriptors (compared lowercase).
pub const DESCRIPTOR_SUFFIXES: [&str; 2] = [".json", ".conf"];

/// Default period between discovery cycles.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Default deadline for a single plugin invocation.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
