//! The plugin lifecycle facade.
//!
//! [`PluginsManager`] ties the subsystems together: it owns the resource
//! repositories for discoverer providers, fetchers, and credential
//! providers, the registry recording installs, and the install root the
//! resolver scans. One manager instance is meant to live for the process
//! and be shared behind an `Arc`.
//!
//! Installation is staged: the package is fetched and extracted under
//! `<install root>/.staging/<uuid>`, checksummed, and only then promoted
//! into the versioned layout and recorded in the registry. Any failure or
//! cancellation removes the staging directory and leaves the registry
//! untouched.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use semver::Version;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::checksum::DirectoryChecksumCalculator;
use crate::credentials::{CredentialProvider, CredentialService};
use crate::discovery::{AvailablePlugin, DiscovererProvider, PluginSource};
use crate::fetching::{FetchError, PluginFetcher, ProgressReporter};
use crate::identity::PluginIdentity;
use crate::package::{PackageError, PluginPackage};
use crate::registry::{InstalledPluginInfo, PluginRegistry, RegistryError};
use crate::repository::ResourceRepository;
use crate::resolver::{PluginDirectoryResolver, ScanOutcome, VERSIONED_ROOT};
use crate::validation::InstalledPluginValidator;
use crate::{Error, Result};

const STAGING_DIR: &str = ".staging";
const REGISTRY_DIR: &str = ".registry";
const PACKAGE_FILE: &str = "package.ppkg";

/// Result of discovering across a set of sources.
///
/// Discovery is partial-failure isolated: one broken source never hides
/// the plugins of the others.
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub available: Vec<AvailablePlugin>,
    pub failures: Vec<DiscoveryFailure>,
}

/// A source whose discoverer failed.
#[derive(Debug)]
pub struct DiscoveryFailure {
    pub source: PluginSource,
    pub error: Error,
}

/// One installed plugin together with its current validation verdict.
#[derive(Debug)]
pub struct InstalledPluginHealth {
    pub info: InstalledPluginInfo,
    pub is_valid: bool,
}

/// Builder for [`PluginsManager`]. Install root and SDK version are
/// required; everything else can be loaded later at runtime.
#[derive(Default)]
pub struct PluginsManagerBuilder {
    install_root: Option<PathBuf>,
    registry_root: Option<PathBuf>,
    sdk_version: Option<Version>,
    discoverer_providers: Vec<Arc<dyn DiscovererProvider>>,
    fetchers: Vec<Arc<dyn PluginFetcher>>,
    credential_providers: Vec<Arc<dyn CredentialProvider>>,
}

impl PluginsManagerBuilder {
    /// Directory plugins are installed under; also the resolver's scan root.
    pub fn install_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.install_root = Some(root.into());
        self
    }

    /// Where the registry document lives. Defaults to
    /// `<install root>/.registry`.
    pub fn registry_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.registry_root = Some(root.into());
        self
    }

    /// Host SDK version recorded with every install and used for the
    /// versioned directory layout.
    pub fn sdk_version(mut self, version: Version) -> Self {
        self.sdk_version = Some(version);
        self
    }

    pub fn with_discoverer_provider(mut self, provider: Arc<dyn DiscovererProvider>) -> Self {
        self.discoverer_providers.push(provider);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn PluginFetcher>) -> Self {
        self.fetchers.push(fetcher);
        self
    }

    pub fn with_credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credential_providers.push(provider);
        self
    }

    pub fn build(self) -> Result<PluginsManager> {
        let install_root = self
            .install_root
            .ok_or_else(|| Error::Configuration("install root is required".into()))?;
        let sdk_version = self
            .sdk_version
            .ok_or_else(|| Error::Configuration("SDK version is required".into()))?;
        let registry_root = self
            .registry_root
            .unwrap_or_else(|| install_root.join(REGISTRY_DIR));

        let discoverer_providers = ResourceRepository::new();
        discoverer_providers.load(self.discoverer_providers);
        let fetchers = ResourceRepository::new();
        fetchers.load(self.fetchers);
        let credential_providers = Arc::new(ResourceRepository::new());
        credential_providers.load(self.credential_providers);

        Ok(PluginsManager {
            install_root,
            sdk_version,
            registry: PluginRegistry::new(registry_root),
            discoverer_providers,
            fetchers,
            credentials: Arc::new(CredentialService::from_repository(
                credential_providers.clone(),
            )),
            credential_providers,
            validator: InstalledPluginValidator::new(),
        })
    }
}

pub struct PluginsManager {
    install_root: PathBuf,
    sdk_version: Version,
    registry: PluginRegistry,
    discoverer_providers: ResourceRepository<dyn DiscovererProvider>,
    fetchers: ResourceRepository<dyn PluginFetcher>,
    credential_providers: Arc<ResourceRepository<dyn CredentialProvider>>,
    credentials: Arc<CredentialService>,
    validator: InstalledPluginValidator,
}

impl PluginsManager {
    pub fn builder() -> PluginsManagerBuilder {
        PluginsManagerBuilder::default()
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// The credential chain, shared so fetchers can attach it.
    pub fn credentials(&self) -> Arc<CredentialService> {
        self.credentials.clone()
    }

    /// Hot-load additional discoverer providers; already-loaded names are
    /// skipped. Returns how many were added.
    pub fn load_discoverer_providers(
        &self,
        providers: Vec<Arc<dyn DiscovererProvider>>,
    ) -> usize {
        self.discoverer_providers.load(providers)
    }

    /// Hot-load additional fetchers.
    pub fn load_fetchers(&self, fetchers: Vec<Arc<dyn PluginFetcher>>) -> usize {
        self.fetchers.load(fetchers)
    }

    /// Hot-load additional credential providers; the shared
    /// [`CredentialService`] sees them on its next resolution.
    pub fn load_credential_providers(
        &self,
        providers: Vec<Arc<dyn CredentialProvider>>,
    ) -> usize {
        self.credential_providers.load(providers)
    }

    /// Discover the latest available plugins across `sources`.
    ///
    /// Each source is handled by the first provider that supports it;
    /// unsupported sources are skipped. A failing source is recorded in
    /// the outcome and does not affect the others. Cancellation stops the
    /// remaining sources.
    pub async fn discover(
        &self,
        sources: &[PluginSource],
        token: &CancellationToken,
    ) -> DiscoveryOutcome {
        let mut outcome = DiscoveryOutcome::default();
        let providers = self.discoverer_providers.snapshot();

        for source in sources {
            if token.is_cancelled() {
                break;
            }
            let Some(provider) = providers.iter().find(|p| p.supports(source)) else {
                tracing::debug!(%source, "no discoverer provider supports source");
                continue;
            };

            let discoverer = provider.create_discoverer(source);
            match discoverer.discover_latest(token).await {
                Ok(plugins) => {
                    tracing::debug!(%source, count = plugins.len(), "source discovered");
                    outcome.available.extend(plugins);
                }
                Err(Error::Cancelled) => break,
                Err(error) => {
                    tracing::warn!(%source, %error, "source discovery failed");
                    outcome.failures.push(DiscoveryFailure {
                        source: source.clone(),
                        error,
                    });
                }
            }
        }
        outcome
    }

    /// Fetch, verify, and install one discovered plugin.
    ///
    /// On success the plugin's files live under the versioned layout and
    /// the registry holds its record. On failure or cancellation nothing
    /// is left behind: the staging directory is removed and the registry
    /// is unchanged.
    pub async fn install(
        &self,
        plugin: &AvailablePlugin,
        token: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<InstalledPluginInfo> {
        if self.registry.get(&plugin.identity)?.is_some() {
            return Err(RegistryError::AlreadyInstalled {
                identity: plugin.identity.clone(),
            }
            .into());
        }

        let fetcher = self
            .fetchers
            .snapshot()
            .into_iter()
            .find(|f| f.supports(plugin))
            .ok_or_else(|| FetchError::NoSupportingFetcher {
                plugin: Box::new(plugin.clone()),
            })?;
        tracing::info!(plugin = %plugin.identity, fetcher = fetcher.name(), "installing plugin");

        let staging = self
            .install_root
            .join(STAGING_DIR)
            .join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&staging).await?;

        let result = self
            .install_staged(plugin, fetcher.as_ref(), &staging, token, progress)
            .await;
        let _ = tokio::fs::remove_dir_all(&staging).await;
        result
    }

    async fn install_staged(
        &self,
        plugin: &AvailablePlugin,
        fetcher: &dyn PluginFetcher,
        staging: &Path,
        token: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<InstalledPluginInfo> {
        let package_path = staging.join(PACKAGE_FILE);
        fetcher
            .fetch(plugin, &package_path, token, progress)
            .await?;
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let package = PluginPackage::open(&package_path)?;
        if package.metadata().identity != plugin.identity {
            return Err(PackageError::malformed(format!(
                "package identity '{}' does not match discovered identity '{}'",
                package.metadata().identity,
                plugin.identity
            ))
            .into());
        }

        let extracted = staging.join("extracted");
        package.extract_to(&extracted)?;
        let checksum = DirectoryChecksumCalculator::checksum(&extracted)?;

        let identity = package.metadata().identity.clone();
        let final_dir = self.versioned_dir(&identity);
        if let Some(parent) = final_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let info = InstalledPluginInfo {
            identity: identity.clone(),
            checksum,
            install_path: final_dir.clone(),
            sdk_version: self.sdk_version.clone(),
            installed_at: Utc::now(),
        };
        // Promotion runs under the registry lock: a racing install of the
        // same identity fails AlreadyInstalled before it can touch the
        // winner's files.
        let registered = self.registry.install_with(info.clone(), || {
            if final_dir.exists() {
                // Leftover from an earlier unwind; under the lock the
                // registry is known to hold no record for it.
                std::fs::remove_dir_all(&final_dir)?;
            }
            std::fs::rename(&extracted, &final_dir)
        });
        if let Err(e) = registered {
            // Unwind the final directory only if our rename went through;
            // on AlreadyInstalled it belongs to the winning install.
            let promoted = !extracted.exists();
            let lost_race =
                matches!(e, Error::Registry(RegistryError::AlreadyInstalled { .. }));
            if promoted && !lost_race {
                let _ = tokio::fs::remove_dir_all(&final_dir).await;
            }
            return Err(e);
        }

        tracing::info!(plugin = %identity, path = %final_dir.display(), "plugin installed");
        Ok(info)
    }

    /// Remove a plugin's registry record and delete its files.
    pub async fn uninstall(&self, identity: &PluginIdentity) -> Result<InstalledPluginInfo> {
        let removed = self.registry.remove(identity)?;
        match tokio::fs::remove_dir_all(&removed.install_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(plugin = %identity, "plugin uninstalled");
        Ok(removed)
    }

    /// Look up one installed plugin, requiring its files to be intact.
    ///
    /// Unlike [`verify_installed`], which reports health, this is the
    /// strict form for callers about to load the plugin: a record whose
    /// directory fails validation is a hard
    /// [`Error::InstalledPluginCorruptedOrMissing`].
    ///
    /// [`verify_installed`]: Self::verify_installed
    pub fn get_verified(&self, identity: &PluginIdentity) -> Result<InstalledPluginInfo> {
        let info = self
            .registry
            .get(identity)?
            .ok_or_else(|| RegistryError::NotInstalled {
                identity: identity.clone(),
            })?;
        if !self.validator.validate(&info) {
            return Err(Error::InstalledPluginCorruptedOrMissing {
                identity: info.identity,
                path: info.install_path,
            });
        }
        Ok(info)
    }

    /// Re-validate every registered plugin against its recorded checksum.
    pub fn verify_installed(&self) -> Result<Vec<InstalledPluginHealth>> {
        let mut report = Vec::new();
        for info in self.registry.list()? {
            let is_valid = self.validator.validate(&info);
            report.push(InstalledPluginHealth { info, is_valid });
        }
        Ok(report)
    }

    /// Scan the install root the way the host loader would.
    pub fn scan_installed(&self) -> Result<ScanOutcome> {
        PluginDirectoryResolver::new(&self.install_root).scan()
    }

    /// Plugin directories present on disk but absent from the registry.
    pub fn orphaned(&self) -> Result<Vec<PathBuf>> {
        let registered: Vec<PathBuf> = self
            .registry
            .list()?
            .into_iter()
            .map(|info| info.install_path)
            .collect();

        let outcome = self.scan_installed()?;
        Ok(outcome
            .loadable
            .iter()
            .chain(outcome.suppressed.iter())
            .map(|candidate| candidate.path.clone())
            .filter(|path| !registered.contains(path))
            .collect())
    }

    fn versioned_dir(&self, identity: &PluginIdentity) -> PathBuf {
        self.install_root
            .join(VERSIONED_ROOT)
            .join(self.sdk_version.to_string())
            .join(identity.id())
            .join(identity.version().to_string())
    }
}

impl fmt::Debug for PluginsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginsManager")
            .field("install_root", &self.install_root)
            .field("sdk_version", &self.sdk_version)
            .field("discoverer_providers", &self.discoverer_providers.len())
            .field("fetchers", &self.fetchers.len())
            .field("credential_providers", &self.credential_providers.len())
            .finish_non_exhaustive()
    }
}
