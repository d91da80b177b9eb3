//! Plugin discovery across heterogeneous sources.
//!
//! A [`PluginSource`] is an opaque locator; the core never parses its
//! scheme. Each [`DiscovererProvider`] decides via [`supports`]
//! whether it can handle a source and, if so, produces a [`Discoverer`]
//! that lists the plugins available there.
//!
//! [`supports`]: DiscovererProvider::supports

mod local;

pub use local::{LocalDirectoryDiscoverer, LocalDirectoryDiscovererProvider};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::identity::PluginIdentity;

/// Opaque locator of a plugin source: a feed URL, a local path, a registry
/// endpoint. Interpreting the locator is delegated to providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginSource {
    locator: String,
}

impl PluginSource {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.locator)
    }
}

/// A plugin discovered at a source but not yet fetched. Ephemeral, never
/// persisted.
#[derive(Debug, Clone)]
pub struct AvailablePlugin {
    pub identity: PluginIdentity,
    pub display_name: String,
    pub description: String,
    /// Locator a fetcher can retrieve the package bytes from.
    pub source: PluginSource,
}

impl fmt::Display for AvailablePlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.identity, self.source)
    }
}

/// Lists the plugins available at one source.
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Every plugin version advertised at the source.
    async fn discover_all(&self, token: &CancellationToken) -> Result<Vec<AvailablePlugin>>;

    /// Only the highest version of each distinct plugin.
    async fn discover_latest(&self, token: &CancellationToken) -> Result<Vec<AvailablePlugin>> {
        let all = self.discover_all(token).await?;
        let mut latest: Vec<AvailablePlugin> = Vec::new();
        for plugin in all {
            match latest
                .iter_mut()
                .find(|p| p.identity.same_plugin(&plugin.identity))
            {
                Some(existing) => {
                    if plugin.identity.version() > existing.identity.version() {
                        *existing = plugin;
                    }
                }
                None => latest.push(plugin),
            }
        }
        Ok(latest)
    }
}

/// Capability that turns a supported source into a [`Discoverer`].
pub trait DiscovererProvider: Send + Sync {
    /// Provider name for ordering and debugging.
    fn name(&self) -> &str;

    /// Whether this provider understands the source's locator.
    fn supports(&self, source: &PluginSource) -> bool;

    /// Create a discoverer for a supported source.
    fn create_discoverer(&self, source: &PluginSource) -> Arc<dyn Discoverer>;
}
