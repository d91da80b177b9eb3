//! # plugin-system
//!
//! Plugin lifecycle manager: discover plugin packages across heterogeneous
//! sources, fetch them with credentials/progress/cancellation, verify their
//! integrity, install them into a local store, and keep a durable registry
//! of what is installed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use plugin_system::discovery::{LocalDirectoryDiscovererProvider, PluginSource};
//! use plugin_system::fetching::{LocalPluginFetcher, ProgressReporter};
//! use plugin_system::manager::PluginsManager;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), plugin_system::Error> {
//!     let manager = PluginsManager::builder()
//!         .install_root("./plugins")
//!         .sdk_version("1.0.0".parse().unwrap())
//!         .with_discoverer_provider(Arc::new(LocalDirectoryDiscovererProvider::new()))
//!         .with_fetcher(Arc::new(LocalPluginFetcher::new()))
//!         .build()?;
//!
//!     let token = CancellationToken::new();
//!     let outcome = manager
//!         .discover(&[PluginSource::new("./feed")], &token)
//!         .await;
//!
//!     for plugin in &outcome.available {
//!         let installed = manager
//!             .install(plugin, &token, &ProgressReporter::disabled())
//!             .await?;
//!         println!("installed {}", installed.identity);
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod checksum;
pub mod credentials;
pub mod discovery;
pub mod fetching;
pub mod identity;
pub mod manager;
pub mod metadata;
pub mod package;
pub mod registry;
pub mod repository;
pub mod resolver;
pub mod validation;

// Re-exports for convenience
pub use checksum::DirectoryChecksumCalculator;
pub use credentials::{Credential, CredentialProvider, CredentialService};
pub use discovery::{AvailablePlugin, Discoverer, DiscovererProvider, PluginSource};
pub use fetching::{FetchError, PluginFetcher, ProgressReporter};
pub use identity::{IdentityError, PluginIdentity};
pub use manager::{DiscoveryOutcome, PluginsManager, PluginsManagerBuilder};
pub use metadata::{PluginContentsMetadata, PluginMetadata};
pub use package::{PackageError, PluginPackage, PluginPackageBuilder};
pub use registry::{InstalledPluginInfo, PluginRegistry, RegistryError};
pub use repository::{ManagedResource, RepositoryError, ResourceRepository};
pub use resolver::{FolderSchema, PluginDirectoryResolver, ScanOutcome};
pub use validation::InstalledPluginValidator;

use std::path::PathBuf;

/// Error type for plugin-system operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Plugin identity was malformed.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Package archive could not be built, read, or extracted.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// Registry access or consistency failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Fetching a discovered plugin failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Resource repository access failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A local package file could not be opened or loaded.
    #[error("failed to load local plugin package {path}: {reason}")]
    LocalLoad { path: PathBuf, reason: String },

    /// An installed plugin's files no longer match its recorded checksum.
    #[error("installed plugin '{identity}' at {path} is corrupted or missing")]
    InstalledPluginCorruptedOrMissing {
        identity: PluginIdentity,
        path: PathBuf,
    },

    /// The manager was built with an incomplete or inconsistent
    /// configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The operation was cancelled via its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Network request failed.
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl Error {
    /// Whether a caller can reasonably retry the failed operation.
    ///
    /// Corrupted durable state and malformed packages are never retryable;
    /// transient I/O and network failures are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Registry(RegistryError::ReadWrite { .. }) => true,
            Error::Registry(_) => false,
            Error::Fetch(FetchError::Fetch { .. }) => true,
            Error::Fetch(_) => false,
            Error::Network(_) | Error::Io(_) => true,
            Error::Repository(RepositoryError::DataAccess { .. }) => true,
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
