//! Core infrastructure for Metrichost.
//!
//! Configuration loading and bounded child-process execution, shared by the
//! plugin subsystem and the CLI.

mod config;
mod executor;

pub use config::{Config, PluginsConfig};
pub use executor::{ExecError, ExecutionResult, Executor};
