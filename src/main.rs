//! Metrichost - pluggable metrics collection host.
//!
//! Discovers collector plugins from descriptor files and runs them on
//! demand.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use metrichost::core::{Config, PluginsConfig};
use metrichost::plugin::{
    describe, runtime_collector, Collector, CollectorFactory, ConfigMap, Discovery, MetricRecord,
    Origin, PluginError, Registry, RUNTIME_COLLECTOR,
};

/// Pluggable metrics collection host
#[derive(Parser)]
#[command(name = "metrichost")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: .metrichost.toml, then the user config dir)
    #[arg(short, long, global = true, env = "METRICHOST_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding plugin descriptors
    #[arg(long, global = true)]
    conf_dir: Option<PathBuf>,

    /// Directory holding plugin executables
    #[arg(long, global = true)]
    bin_dir: Option<PathBuf>,

    /// Deadline for one plugin call, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered collectors
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show a collector's name, usages, tags and version
    Describe {
        /// Collector name
        name: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Collect metrics from one or more collectors
    Collect {
        /// Collector names
        #[arg(required = true)]
        names: Vec<String>,

        /// Configuration object passed to every collector (JSON)
        #[arg(long, value_name = "JSON")]
        set: Option<String>,
    },

    /// Keep discovering plugins until interrupted
    Watch {
        /// Seconds between discovery cycles
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show configuration
    Config {
        /// Show config directory path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::List { format } => cmd_list(&config.plugins, format),
        Commands::Describe { name, format } => cmd_describe(&config.plugins, &name, format),
        Commands::Collect { names, set } => cmd_collect(&config.plugins, &names, set.as_deref()),
        Commands::Watch { interval } => cmd_watch(&config.plugins, interval),
        Commands::Config { path } => cmd_config(&config, path),
    }
}

/// Load the configuration file and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load()?,
    };

    if let Some(dir) = &cli.conf_dir {
        config.plugins.conf_dir.clone_from(dir);
    }
    if let Some(dir) = &cli.bin_dir {
        config.plugins.bin_dir = Some(dir.clone());
    }
    if let Some(secs) = cli.timeout {
        config.plugins.call_timeout_secs = secs;
    }

    Ok(config)
}

/// Registry holding only the builtin collectors.
fn native_registry() -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    let runtime: CollectorFactory =
        Arc::new(|| Box::new(runtime_collector()) as Box<dyn Collector>);
    registry.register_native(RUNTIME_COLLECTOR, runtime);
    registry
}

/// Build a registry holding the native collectors and one discovery pass.
fn build_registry(plugins: &PluginsConfig) -> Arc<Registry> {
    let registry = native_registry();

    let discovery = Discovery::from_config(Arc::clone(&registry), plugins, &Config::base_dir());
    if let Err(e) = discovery.probe_once() {
        tracing::warn!(error = %e, "Plugin discovery failed");
    }

    registry
}

fn open(registry: &Registry, name: &str) -> Result<Box<dyn Collector>> {
    registry.create(name).ok_or_else(|| PluginError::NotFound(name.to_string()).into())
}

/// List registered collectors.
fn cmd_list(plugins: &PluginsConfig, format: Format) -> Result<()> {
    let registry = build_registry(plugins);
    let names = registry.list();

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&names)?);
        }
        Format::Text => {
            for name in &names {
                let origin = match registry.origin(name) {
                    Some(Origin::Native) => "native",
                    _ => "plugin",
                };
                println!("{name} ({origin})");
            }
            println!("\nTotal: {} collectors", names.len());
        }
    }

    Ok(())
}

/// Describe one collector.
fn cmd_describe(plugins: &PluginsConfig, name: &str, format: Format) -> Result<()> {
    let registry = build_registry(plugins);
    let collector = open(&registry, name)?;

    let rt = tokio::runtime::Runtime::new()?;
    let info = rt.block_on(describe(collector.as_ref()));

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        Format::Text => {
            println!("Name:    {}", info.name.as_deref().unwrap_or("-").trim());
            println!("Usages:  {}", info.usages.as_deref().unwrap_or("-").trim());
            println!("Version: {}", info.version.as_deref().unwrap_or("-").trim());
            match &info.tags {
                Some(tags) => println!("Tags:    {}", tags.join(", ")),
                None => println!("Tags:    -"),
            }
            for error in &info.errors {
                eprintln!("warning: {error}");
            }
        }
    }

    Ok(())
}

/// Collect from every named collector concurrently.
fn cmd_collect(plugins: &PluginsConfig, names: &[String], set: Option<&str>) -> Result<()> {
    let overrides = set
        .map(|raw| serde_json::from_str::<ConfigMap>(raw))
        .transpose()
        .context("--set must be a JSON object")?;

    let registry = build_registry(plugins);
    let collectors = names
        .iter()
        .map(|name| open(&registry, name).map(|c| (name.clone(), c)))
        .collect::<Result<Vec<_>>>()?;

    let rt = tokio::runtime::Runtime::new()?;
    let results = rt.block_on(async {
        let calls = collectors.iter().map(|(name, collector)| {
            let overrides = overrides.clone();
            async move {
                if let Some(config) = overrides {
                    collector.sync_config(config).await?;
                }
                tracing::debug!(collector = %name, "Collecting");
                collector.collect().await
            }
        });
        futures::future::join_all(calls).await
    });

    let mut output: BTreeMap<&str, Vec<MetricRecord>> = BTreeMap::new();
    let mut failures = 0;
    for ((name, _), result) in collectors.iter().zip(results) {
        match result {
            Ok(records) => {
                output.insert(name, records);
            }
            Err(e) => {
                failures += 1;
                eprintln!("{name}: {e}");
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&output)?);

    if failures > 0 {
        anyhow::bail!("{failures} of {} collectors failed", names.len());
    }
    Ok(())
}

/// Run discovery in the foreground until Ctrl-C.
fn cmd_watch(plugins: &PluginsConfig, interval: Option<u64>) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let registry = native_registry();

        let period = watch_period(plugins, interval);
        let handle = Discovery::from_config(Arc::clone(&registry), plugins, &Config::base_dir())
            .interval(period)
            .spawn();

        let mut report = tokio::time::interval(period);
        let mut last = Vec::new();
        loop {
            tokio::select! {
                _ = report.tick() => {
                    let names = registry.list();
                    if names != last {
                        println!("{} collectors: {}", names.len(), names.join(", "));
                        last = names;
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    signal.context("failed to listen for Ctrl-C")?;
                    break;
                }
            }
        }

        handle.shutdown().await;
        Ok(())
    })
}

/// Discovery period for `watch`: the `--interval` override, else the config.
fn watch_period(plugins: &PluginsConfig, interval: Option<u64>) -> Duration {
    interval.map_or_else(|| plugins.probe_interval(), |secs| Duration::from_secs(secs.max(1)))
}

/// Show configuration.
fn cmd_config(config: &Config, show_path: bool) -> Result<()> {
    if show_path {
        if let Some(path) = Config::config_dir() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let toml = toml::to_string_pretty(config)?;
    println!("{toml}");

    Ok(())
}
