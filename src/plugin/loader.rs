//! Descriptor discovery on disk.

use std::path::{Path, PathBuf};

use super::{PluginDescriptor, PluginError, PluginKind, PluginResult, DESCRIPTOR_SUFFIXES};

/// Whether a file name looks like a plugin descriptor.
pub fn is_descriptor_file(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    DESCRIPTOR_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Reads plugin descriptors from a directory and resolves their executables.
#[derive(Debug, Clone)]
pub struct DescriptorLoader {
    conf_dir: PathBuf,
    bin_dir: PathBuf,
}

impl DescriptorLoader {
    pub fn new(conf_dir: impl Into<PathBuf>, bin_dir: impl Into<PathBuf>) -> Self {
        Self { conf_dir: conf_dir.into(), bin_dir: bin_dir.into() }
    }

    /// Directory scanned for descriptors.
    pub fn conf_dir(&self) -> &Path {
        &self.conf_dir
    }

    /// Directory plugin executables are resolved against.
    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Descriptor files in the configuration directory, sorted by file name.
    ///
    /// Subdirectories are not descended into.
    pub fn descriptor_files(&self) -> PluginResult<Vec<PathBuf>> {
        let read_error =
            |source| PluginError::DirectoryRead { path: self.conf_dir.clone(), source };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.conf_dir).map_err(read_error)? {
            let entry = entry.map_err(read_error)?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && is_descriptor_file(&entry.file_name().to_string_lossy()) {
                files.push(entry.path());
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Load every valid descriptor.
    ///
    /// A descriptor that fails to parse or whose executable is missing is
    /// logged and left out; only an unreadable directory fails the call.
    pub fn load(&self) -> PluginResult<Vec<PluginDescriptor>> {
        let files = self.descriptor_files()?;
        let mut descriptors = Vec::with_capacity(files.len());

        for path in files {
            let descriptor = match PluginDescriptor::from_file(&path) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping plugin descriptor");
                    continue;
                }
            };

            match self.resolve(descriptor) {
                Ok(descriptor) => {
                    tracing::debug!(
                        plugin = %descriptor.name,
                        kind = %descriptor.kind.display_name(),
                        path = %path.display(),
                        "Loaded plugin descriptor"
                    );
                    descriptors.push(descriptor);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping plugin descriptor");
                }
            }
        }

        Ok(descriptors)
    }

    /// Point a command descriptor at its executable and check it exists.
    fn resolve(&self, descriptor: PluginDescriptor) -> PluginResult<PluginDescriptor> {
        if descriptor.kind != PluginKind::Command {
            return Ok(descriptor);
        }

        let descriptor = descriptor.with_executable_in(&self.bin_dir);
        match std::fs::metadata(&descriptor.executable) {
            Ok(meta) if meta.is_file() => Ok(descriptor),
            Ok(_) => Err(PluginError::BinaryNotFound {
                plugin: descriptor.name.clone(),
                path: descriptor.executable.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            }),
            Err(source) => Err(PluginError::BinaryNotFound {
                plugin: descriptor.name.clone(),
                path: descriptor.executable.clone(),
                source,
            }),
        }
    }
}
