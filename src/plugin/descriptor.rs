//! Plugin descriptor parsing.
//!
//! A descriptor is a JSON file declaring a plugin's identity, the executable
//! that implements it, the environment that executable runs with, and an
//! optional configuration blob handed to it on stdin.
//!
//! ```json
//! { "name": "oracle", "type": "cmd", "version": "1.0",
//!   "data": { "dsn": "sys/pass@db:1521" },
//!   "cmd": "orakit",
//!   "env": "LD_LIBRARY_PATH=oci;NLS_LANG=" }
//! ```
//!
//! Older descriptors nest `cmd`, `env` and `addr` under a `spec` object;
//! both layouts are accepted.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{ConfigMap, PluginError, PluginKind, PluginResult};

/// A parsed plugin descriptor. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    /// Unique plugin name, used as the registry key.
    pub name: String,
    /// Transport kind.
    pub kind: PluginKind,
    /// Informational version string.
    pub version: String,
    /// Configuration passed to the plugin on stdin.
    pub config_data: Option<ConfigMap>,
    /// Path of the plugin executable.
    pub executable: PathBuf,
    /// Endpoint address for remote plugins.
    pub address: Option<String>,
    /// `KEY=VALUE` entries forming the plugin's entire environment.
    pub environment: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    kind: PluginKind,
    #[serde(default)]
    version: String,
    #[serde(default)]
    data: Option<ConfigMap>,
    #[serde(default)]
    cmd: Option<String>,
    #[serde(default)]
    env: Option<RawEnv>,
    #[serde(default)]
    addr: Option<String>,
    #[serde(default)]
    spec: Option<RawSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSpec {
    #[serde(default)]
    addr: Option<String>,
    #[serde(default)]
    cmd: Option<String>,
    #[serde(default)]
    env: Option<RawEnv>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEnv {
    Joined(String),
    List(Vec<String>),
}

impl RawEnv {
    fn into_entries(self) -> Vec<String> {
        let entries = match self {
            Self::Joined(joined) => joined.split(';').map(str::to_string).collect(),
            Self::List(list) => list,
        };
        entries.into_iter().map(|e| e.trim().to_string()).filter(|e| !e.is_empty()).collect()
    }
}

impl PluginDescriptor {
    /// Parse a descriptor from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let raw: RawDescriptor = serde_json::from_str(content)?;
        let spec = raw.spec.unwrap_or_default();

        Ok(Self {
            name: raw.name.trim().to_string(),
            kind: raw.kind,
            version: raw.version,
            config_data: raw.data,
            executable: PathBuf::from(raw.cmd.or(spec.cmd).unwrap_or_default()),
            address: raw.addr.or(spec.addr),
            environment: raw.env.or(spec.env).map(RawEnv::into_entries).unwrap_or_default(),
        })
    }

    /// Read, parse and validate a descriptor file.
    pub fn from_file(path: &Path) -> PluginResult<Self> {
        let invalid =
            |reason: String| PluginError::InvalidDescriptor { path: path.to_path_buf(), reason };

        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let descriptor = Self::from_json(&content).map_err(|e| invalid(e.to_string()))?;
        descriptor.validate().map_err(invalid)?;

        Ok(descriptor)
    }

    /// Check the fields the host relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("plugin name is required".to_string());
        }

        if self.kind == PluginKind::Command && self.executable.as_os_str().is_empty() {
            return Err(format!("plugin '{}' does not declare a cmd", self.name));
        }

        Ok(())
    }

    /// Rewrite the executable path relative to a binaries directory.
    ///
    /// Absolute executable paths are kept unchanged.
    #[must_use]
    pub fn with_executable_in(mut self, bin_dir: &Path) -> Self {
        self.executable = bin_dir.join(&self.executable);
        self
    }

    /// Split the environment entries into key/value pairs, in order.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.environment
            .iter()
            .filter_map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    Some((key.to_string(), value.to_string()))
                }
                _ => {
                    tracing::warn!(plugin = %self.name, entry = %entry, "Ignoring malformed env entry");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DESCRIPTOR: &str = r#"{
        "name": "oracle",
        "type": "cmd",
        "version": "1.0",
        "data": { "dsn": "sys/password@127.0.0.1:1521", "session": true },
        "cmd": "orakit",
        "env": "LD_LIBRARY_PATH=oci;NLS_LANG=;TNS=a=b"
    }"#;

    #[test]
    fn test_parse_descriptor() {
        let descriptor = PluginDescriptor::from_json(SAMPLE_DESCRIPTOR).unwrap();

        assert_eq!(descriptor.name, "oracle");
        assert_eq!(descriptor.kind, PluginKind::Command);
        assert_eq!(descriptor.version, "1.0");
        assert_eq!(descriptor.executable, PathBuf::from("orakit"));
        assert_eq!(descriptor.environment, vec!["LD_LIBRARY_PATH=oci", "NLS_LANG=", "TNS=a=b"]);

        let data = descriptor.config_data.unwrap();
        assert_eq!(data["dsn"], "sys/password@127.0.0.1:1521");
        assert_eq!(data["session"], true);
    }

    #[test]
    fn test_env_pairs_split_at_first_equals() {
        let descriptor = PluginDescriptor::from_json(SAMPLE_DESCRIPTOR).unwrap();
        let pairs = descriptor.env_pairs();

        assert_eq!(
            pairs,
            vec![
                ("LD_LIBRARY_PATH".to_string(), "oci".to_string()),
                ("NLS_LANG".to_string(), String::new()),
                ("TNS".to_string(), "a=b".to_string()),
            ]
        );
    }

    #[test]
    fn test_env_pairs_skip_malformed() {
        let descriptor =
            PluginDescriptor::from_json(r#"{"name":"x","cmd":"x","env":"NOVALUE;=1;A=1;;"}"#)
                .unwrap();
        assert_eq!(descriptor.env_pairs(), vec![("A".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_env_as_list() {
        let descriptor =
            PluginDescriptor::from_json(r#"{"name":"x","cmd":"x","env":["A=1","B=2"]}"#).unwrap();
        assert_eq!(descriptor.environment, vec!["A=1", "B=2"]);
    }

    #[test]
    fn test_nested_spec_layout() {
        let descriptor = PluginDescriptor::from_json(
            r#"{"name":"legacy","type":"cmd","spec":{"cmd":"legacy_bin","env":"X=1","addr":""}}"#,
        )
        .unwrap();

        assert_eq!(descriptor.executable, PathBuf::from("legacy_bin"));
        assert_eq!(descriptor.environment, vec!["X=1"]);
    }

    #[test]
    fn test_flat_fields_win_over_spec() {
        let descriptor = PluginDescriptor::from_json(
            r#"{"name":"both","cmd":"flat","spec":{"cmd":"nested"}}"#,
        )
        .unwrap();
        assert_eq!(descriptor.executable, PathBuf::from("flat"));
    }

    #[test]
    fn test_defaults() {
        let descriptor = PluginDescriptor::from_json(r#"{"name":"demo","cmd":"demo_bin"}"#).unwrap();

        assert_eq!(descriptor.kind, PluginKind::Command);
        assert!(descriptor.version.is_empty());
        assert!(descriptor.config_data.is_none());
        assert!(descriptor.environment.is_empty());
    }

    #[test]
    fn test_remote_kind() {
        let descriptor =
            PluginDescriptor::from_json(r#"{"name":"far","type":"rpc","addr":"10.0.0.1:9000"}"#)
                .unwrap();

        assert_eq!(descriptor.kind, PluginKind::Remote);
        assert_eq!(descriptor.address.as_deref(), Some("10.0.0.1:9000"));
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let nameless = PluginDescriptor::from_json(r#"{"cmd":"x"}"#).unwrap();
        assert!(nameless.validate().is_err());

        let no_cmd = PluginDescriptor::from_json(r#"{"name":"x","type":"cmd"}"#).unwrap();
        assert!(no_cmd.validate().is_err());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(PluginDescriptor::from_json(r#"{"name":"x","type":"grpc","cmd":"x"}"#).is_err());
    }

    #[test]
    fn test_with_executable_in() {
        let descriptor = PluginDescriptor::from_json(r#"{"name":"demo","cmd":"demo_bin"}"#)
            .unwrap()
            .with_executable_in(Path::new("/opt/metric/bin"));
        assert_eq!(descriptor.executable, PathBuf::from("/opt/metric/bin/demo_bin"));
    }

    #[cfg(unix)]
    #[test]
    fn test_with_executable_in_keeps_absolute() {
        let descriptor = PluginDescriptor::from_json(r#"{"name":"demo","cmd":"/usr/bin/demo"}"#)
            .unwrap()
            .with_executable_in(Path::new("/opt/metric/bin"));
        assert_eq!(descriptor.executable, PathBuf::from("/usr/bin/demo"));
    }

    #[test]
    fn test_from_file_reports_path() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = PluginDescriptor::from_file(&path).unwrap_err();
        match err {
            PluginError::InvalidDescriptor { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
