//! Discovery of packaged plugins in a local directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{AvailablePlugin, Discoverer, DiscovererProvider, PluginSource};
use crate::package::{PACKAGE_EXTENSION, PluginPackage};
use crate::{Error, Result};

/// Handles sources whose locator is an existing local directory.
pub struct LocalDirectoryDiscovererProvider;

impl LocalDirectoryDiscovererProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalDirectoryDiscovererProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscovererProvider for LocalDirectoryDiscovererProvider {
    fn name(&self) -> &str {
        "local-directory"
    }

    fn supports(&self, source: &PluginSource) -> bool {
        Path::new(source.locator()).is_dir()
    }

    fn create_discoverer(&self, source: &PluginSource) -> Arc<dyn Discoverer> {
        Arc::new(LocalDirectoryDiscoverer {
            dir: PathBuf::from(source.locator()),
        })
    }
}

/// Lists `.ppkg` package files in one directory.
///
/// Each package is opened to read its metadata; a file that fails to open
/// is skipped with a warning and never aborts the scan.
pub struct LocalDirectoryDiscoverer {
    dir: PathBuf,
}

impl LocalDirectoryDiscoverer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn package_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION))
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl Discoverer for LocalDirectoryDiscoverer {
    async fn discover_all(&self, token: &CancellationToken) -> Result<Vec<AvailablePlugin>> {
        let mut available = Vec::new();
        for path in self.package_files()? {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match PluginPackage::open(&path) {
                Ok(package) => {
                    let metadata = package.metadata();
                    available.push(AvailablePlugin {
                        identity: metadata.identity.clone(),
                        display_name: metadata.display_name.clone(),
                        description: metadata.description.clone(),
                        source: PluginSource::new(path.to_string_lossy()),
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable package");
                }
            }
        }
        Ok(available)
    }
}
