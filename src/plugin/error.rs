//! Plugin system error types.

use std::path::PathBuf;
use thiserror::Error;

use super::{PluginCommand, PluginKind};

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors that can occur during plugin discovery and invocation.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The descriptor directory could not be listed.
    #[error("Failed to read plugin directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A descriptor file could not be read or parsed.
    #[error("Invalid plugin descriptor {path}: {reason}")]
    InvalidDescriptor { path: PathBuf, reason: String },

    /// The descriptor names an executable that does not exist.
    #[error("Plugin '{plugin}' executable {path} is not available: {source}")]
    BinaryNotFound {
        plugin: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The plugin process could not be started.
    #[error("Plugin '{plugin}' failed to start for '{command}': {source}")]
    Spawn {
        plugin: String,
        command: PluginCommand,
        #[source]
        source: std::io::Error,
    },

    /// Talking to a running plugin process failed.
    #[error("Plugin '{plugin}' I/O failed during '{command}': {source}")]
    Communication {
        plugin: String,
        command: PluginCommand,
        #[source]
        source: std::io::Error,
    },

    /// The plugin process exited unsuccessfully.
    #[error("Plugin '{plugin}' exited with {} for '{command}'{}", describe_code(.code), describe_stderr(.stderr))]
    Exit { plugin: String, command: PluginCommand, code: Option<i32>, stderr: String },

    /// The plugin process did not finish before its deadline.
    #[error("Plugin '{plugin}' timed out after {timeout_ms}ms for '{command}'")]
    Timeout { plugin: String, command: PluginCommand, timeout_ms: u64 },

    /// The plugin ran but its output did not match the protocol.
    #[error("Plugin '{plugin}' returned malformed output for '{command}': {source}")]
    Decode {
        plugin: String,
        command: PluginCommand,
        #[source]
        source: serde_json::Error,
    },

    /// The descriptor kind has no collector implementation.
    #[error("Plugin '{plugin}' has unsupported type '{kind}'")]
    UnsupportedKind { plugin: String, kind: PluginKind },

    /// The descriptor name is taken by a builtin collector.
    #[error("Plugin '{0}' conflicts with a builtin collector of the same name")]
    NameReserved(String),

    /// No collector is registered under this name.
    #[error("Collector not found: {0}")]
    NotFound(String),

    /// The command argument is not part of the protocol.
    #[error("Unknown plugin command: {0}")]
    UnknownCommand(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PluginError {
    /// Whether the plugin could not run to a successful exit.
    pub fn is_process_failure(&self) -> bool {
        matches!(
            self,
            Self::Spawn { .. }
                | Self::Communication { .. }
                | Self::Exit { .. }
                | Self::Timeout { .. }
        )
    }

    /// Whether the plugin ran but spoke the protocol incorrectly.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| format!("status {c}"))
}

fn describe_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_display_includes_stderr() {
        let err = PluginError::Exit {
            plugin: "oracle".to_string(),
            command: PluginCommand::Collect,
            code: Some(1),
            stderr: "connection refused\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Plugin 'oracle' exited with status 1 for 'collect': connection refused"
        );
    }

    #[test]
    fn test_exit_display_signal() {
        let err = PluginError::Exit {
            plugin: "oracle".to_string(),
            command: PluginCommand::Name,
            code: None,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "Plugin 'oracle' exited with signal for 'name'");
    }

    #[test]
    fn test_error_classification() {
        let timeout = PluginError::Timeout {
            plugin: "slow".to_string(),
            command: PluginCommand::Collect,
            timeout_ms: 100,
        };
        assert!(timeout.is_process_failure());
        assert!(!timeout.is_protocol_error());

        let decode = PluginError::Decode {
            plugin: "chatty".to_string(),
            command: PluginCommand::Collect,
            source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        };
        assert!(decode.is_protocol_error());
        assert!(!decode.is_process_failure());

        assert!(!PluginError::NotFound("x".to_string()).is_process_failure());
        assert!(!PluginError::NameReserved("runtime".to_string()).is_process_failure());
    }
}
