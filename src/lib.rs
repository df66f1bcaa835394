//! # Metrichost
//!
//! Pluggable metrics collection host.
//!
//! Metrichost discovers metric collector plugins from JSON descriptors on
//! disk, registers them by name, and runs them on demand. A plugin is any
//! executable that answers a small set of commands (`name`, `usages`, `tags`,
//! `config`, `collect`, `version`) over stdin/stdout.
//!
//! ## Features
//!
//! - **Hot discovery**: descriptors are rescanned periodically; new plugins
//!   appear without a restart
//! - **Isolation**: one short-lived process per call, with a deadline
//! - **Native collectors**: in-process collectors share the same interface
//! - **Plugin SDK**: [`plugin::protocol::run_plugin`] turns any
//!   [`Collector`] into a plugin binary
//!
//! ## Quick Start
//!
//! ```bash
//! # List registered collectors
//! metrichost list
//!
//! # Collect from a plugin
//! metrichost collect oracle
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::return_self_not_must_use)]

pub mod core;
pub mod plugin;

// Re-export commonly used types
pub use core::{Config, PluginsConfig};
pub use plugin::{
    Collector, CollectorFactory, DescriptorLoader, Discovery, NativeCollector, PluginDescriptor,
    PluginError, PluginResult, Registry, SubprocessCollector,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "metrichost";
