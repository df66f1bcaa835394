//! Name-indexed registry of collector factories.
//!
//! Shared between the discovery loop, which writes, and any number of
//! readers. Each lookup hands out a factory; callers build their own
//! collector instance from it.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{
    Collector, CollectorFactory, PluginDescriptor, PluginError, PluginKind, PluginResult,
    SubprocessCollector, SubprocessOptions,
};

/// Where a registry entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Built into the host process.
    Native,
    /// Registered from a plugin descriptor.
    Plugin,
}

#[derive(Clone)]
struct Entry {
    factory: CollectorFactory,
    origin: Origin,
}

/// Concurrency-safe mapping from collector name to factory.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("collectors", &self.list()).finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, factory: CollectorFactory) {
        self.insert(name.into(), factory, Origin::Plugin);
    }

    /// Register an in-process collector. Native entries survive pruning.
    pub fn register_native(&self, name: impl Into<String>, factory: CollectorFactory) {
        self.insert(name.into(), factory, Origin::Native);
    }

    /// Register a subprocess-backed factory for a loaded descriptor.
    ///
    /// Fails with [`PluginError::NameReserved`] when a native collector
    /// already holds the name; the native entry is left in place.
    pub fn register_descriptor(
        &self,
        descriptor: PluginDescriptor,
        options: SubprocessOptions,
    ) -> PluginResult<()> {
        let name = descriptor.name.clone();
        let factory = factory_for(descriptor, options)?;

        let mut entries = self.entries.write();
        if entries.get(&name).is_some_and(|entry| entry.origin == Origin::Native) {
            return Err(PluginError::NameReserved(name));
        }
        let replaced = entries.insert(name.clone(), Entry { factory, origin: Origin::Plugin });
        drop(entries);

        log_insert(&name, Origin::Plugin, replaced.is_some());
        Ok(())
    }

    fn insert(&self, name: String, factory: CollectorFactory, origin: Origin) {
        let replaced = self.entries.write().insert(name.clone(), Entry { factory, origin });
        log_insert(&name, origin, replaced.is_some());
    }

    /// Factory registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<CollectorFactory> {
        self.entries.read().get(name).map(|entry| Arc::clone(&entry.factory))
    }

    /// Build a fresh collector instance for `name`.
    pub fn create(&self, name: &str) -> Option<Box<dyn Collector>> {
        // Release the lock before running the factory.
        let factory = self.lookup(name)?;
        Some(factory())
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn origin(&self, name: &str) -> Option<Origin> {
        self.entries.read().get(name).map(|entry| entry.origin)
    }

    /// Remove an entry, returning whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    /// Drop plugin entries whose names are not in `keep`.
    ///
    /// Native entries are never removed. Returns the removed names.
    pub fn retain_plugins(&self, keep: &HashSet<String>) -> Vec<String> {
        let mut entries = self.entries.write();
        let removed: Vec<String> = entries
            .iter()
            .filter(|(name, entry)| entry.origin == Origin::Plugin && !keep.contains(*name))
            .map(|(name, _)| name.clone())
            .collect();

        for name in &removed {
            entries.remove(name);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn log_insert(name: &str, origin: Origin, replaced: bool) {
    if replaced {
        tracing::trace!(collector = %name, "Replaced collector factory");
    } else {
        tracing::debug!(collector = %name, ?origin, "Registered collector");
    }
}

/// Select a factory for a descriptor by its kind.
fn factory_for(
    descriptor: PluginDescriptor,
    options: SubprocessOptions,
) -> PluginResult<CollectorFactory> {
    match descriptor.kind {
        PluginKind::Command => {
            let descriptor = Arc::new(descriptor);
            Ok(Arc::new(move || {
                Box::new(SubprocessCollector::new(Arc::clone(&descriptor), options))
                    as Box<dyn Collector>
            }))
        }
        kind => Err(PluginError::UnsupportedKind { plugin: descriptor.name, kind }),
    }
}
