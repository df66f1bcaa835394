//! Collector backed by an external plugin binary.
//!
//! Every operation spawns the descriptor's executable once with a single
//! command argument, feeds it configuration on stdin where the command takes
//! one, and decodes its stdout. No process outlives the call that started it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use super::protocol::parse_tags;
use super::{
    Collector, ConfigMap, MetricRecord, PluginCommand, PluginDescriptor, PluginError, PluginResult,
    TagsMode, DEFAULT_CALL_TIMEOUT,
};
use crate::core::{ExecError, Executor};

/// Settings shared by every subprocess collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubprocessOptions {
    /// Deadline for one plugin invocation.
    pub timeout: Duration,
    /// How `tags` output is parsed.
    pub tags_mode: TagsMode,
}

impl Default for SubprocessOptions {
    fn default() -> Self {
        Self { timeout: DEFAULT_CALL_TIMEOUT, tags_mode: TagsMode::default() }
    }
}

/// Drives a plugin binary through the stdio command protocol.
pub struct SubprocessCollector {
    descriptor: Arc<PluginDescriptor>,
    options: SubprocessOptions,
    executor: Executor,
    /// Configuration set by `sync_config`, overriding the descriptor data.
    pending: Mutex<Option<ConfigMap>>,
}

impl std::fmt::Debug for SubprocessCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubprocessCollector")
            .field("plugin", &self.descriptor.name)
            .field("executable", &self.descriptor.executable)
            .field("options", &self.options)
            .finish()
    }
}

impl SubprocessCollector {
    /// Create a collector for a descriptor.
    pub fn new(descriptor: Arc<PluginDescriptor>, options: SubprocessOptions) -> Self {
        let executor = Executor::new().capture_stderr(true).timeout(options.timeout);
        Self { descriptor, options, executor, pending: Mutex::new(None) }
    }

    /// The descriptor this collector drives.
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Configuration the next config-accepting command will receive.
    pub fn effective_config(&self) -> Option<ConfigMap> {
        self.pending.lock().clone().or_else(|| self.descriptor.config_data.clone())
    }

    fn stdin_payload(&self, command: PluginCommand) -> PluginResult<Option<Vec<u8>>> {
        if !command.accepts_config() {
            return Ok(None);
        }

        self.effective_config()
            .map(|config| serde_json::to_vec(&config))
            .transpose()
            .map_err(|e| PluginError::Config(format!("failed to encode plugin config: {e}")))
    }

    /// Run one command and return its complete stdout.
    async fn execute(&self, command: PluginCommand) -> PluginResult<Vec<u8>> {
        let plugin = &self.descriptor.name;
        let stdin = self.stdin_payload(command)?;

        tracing::debug!(
            plugin = %plugin,
            command = %command,
            stdin_bytes = stdin.as_ref().map_or(0, Vec::len),
            "Invoking plugin"
        );

        let result = self
            .executor
            .run(
                &self.descriptor.executable,
                &[command.as_str()],
                &self.descriptor.env_pairs(),
                stdin.as_deref(),
            )
            .await
            .map_err(|e| exec_error(plugin, command, e))?;

        if !result.success() {
            return Err(PluginError::Exit {
                plugin: plugin.clone(),
                command,
                code: result.code(),
                stderr: result.stderr_lossy(),
            });
        }

        tracing::debug!(
            plugin = %plugin,
            command = %command,
            stdout_bytes = result.stdout.len(),
            elapsed = ?result.duration,
            "Plugin finished"
        );

        Ok(result.stdout)
    }

    async fn execute_text(&self, command: PluginCommand) -> PluginResult<String> {
        let stdout = self.execute(command).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Run a command whose stdout is JSON; `null` decodes to the default.
    async fn execute_json<T>(&self, command: PluginCommand) -> PluginResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let stdout = self.execute(command).await?;
        serde_json::from_slice::<Option<T>>(&stdout)
            .map(Option::unwrap_or_default)
            .map_err(|source| self.decode_error(command, source))
    }

    fn decode_error(&self, command: PluginCommand, source: serde_json::Error) -> PluginError {
        PluginError::Decode { plugin: self.descriptor.name.clone(), command, source }
    }
}

fn exec_error(plugin: &str, command: PluginCommand, error: ExecError) -> PluginError {
    let plugin = plugin.to_string();
    match error {
        ExecError::Spawn(source) => PluginError::Spawn { plugin, command, source },
        ExecError::Io(source) => PluginError::Communication { plugin, command, source },
        ExecError::Timeout(limit) => PluginError::Timeout {
            plugin,
            command,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        },
    }
}

#[async_trait]
impl Collector for SubprocessCollector {
    async fn name(&self) -> PluginResult<String> {
        self.execute_text(PluginCommand::Name).await
    }

    async fn usages(&self) -> PluginResult<String> {
        self.execute_text(PluginCommand::Usages).await
    }

    async fn tags(&self) -> PluginResult<Vec<String>> {
        let output = self.execute_text(PluginCommand::Tags).await?;
        parse_tags(&output, self.options.tags_mode)
            .map_err(|source| self.decode_error(PluginCommand::Tags, source))
    }

    async fn config(&self) -> PluginResult<ConfigMap> {
        self.execute_json(PluginCommand::Config).await
    }

    async fn collect(&self) -> PluginResult<Vec<MetricRecord>> {
        self.execute_json(PluginCommand::Collect).await
    }

    async fn version(&self) -> PluginResult<String> {
        self.execute_text(PluginCommand::Version).await
    }

    async fn sync_config(&self, config: ConfigMap) -> PluginResult<()> {
        tracing::debug!(plugin = %self.descriptor.name, keys = config.len(), "Syncing plugin config");
        *self.pending.lock() = Some(config);
        Ok(())
    }
}
