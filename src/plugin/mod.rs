//! Metric collector plugin subsystem.
//!
//! Collectors are either native (compiled into the host) or external plugin
//! binaries declared by JSON descriptors and driven over a one-shot stdio
//! command protocol.
//!
//! # Architecture
//!
//! - [`DescriptorLoader`] scans the descriptor directory and resolves each
//!   plugin's executable in the binaries directory.
//! - [`Registry`] maps collector names to factories and is shared between
//!   the discovery loop and readers.
//! - [`Discovery`] re-runs the loader on a fixed interval and keeps the
//!   registry current.
//! - [`SubprocessCollector`] implements [`Collector`] by spawning the plugin
//!   binary once per operation.
//!
//! # Example Descriptor
//!
//! ```json
//! {
//!   "name": "oracle",
//!   "type": "cmd",
//!   "version": "1.0",
//!   "data": { "dsn": "sys/password@127.0.0.1:1521" },
//!   "cmd": "orakit",
//!   "env": "LD_LIBRARY_PATH=instantclient;NLS_LANG=AMERICAN"
//! }
//! ```

mod collector;
mod descriptor;
mod discovery;
mod error;
mod loader;
mod native;
pub mod protocol;
mod registry;
mod subprocess;
mod types;

pub use collector::{describe, Collector, CollectorFactory, CollectorInfo};
pub use descriptor::PluginDescriptor;
pub use discovery::{Discovery, DiscoveryHandle, ProbeReport};
pub use error::{PluginError, PluginResult};
pub use loader::{is_descriptor_file, DescriptorLoader};
pub use native::{runtime_collector, NativeCollector, NativeCollectorBuilder, RUNTIME_COLLECTOR};
pub use protocol::parse_tags;
pub use registry::{Origin, Registry};
pub use subprocess::{SubprocessCollector, SubprocessOptions};
pub use types::{
    ConfigMap, ConfigOption, ConfigValueType, KeyValue, MetricRecord, PluginCommand, PluginKind,
    TagsMode, ATTRIBUTES_KEY, DEFAULT_BIN_DIR, DEFAULT_CALL_TIMEOUT, DEFAULT_CONF_DIR,
    DEFAULT_PROBE_INTERVAL, DESCRIPTOR_SUFFIXES, OPTIONS_KEY,
};
