//! Durable registry of installed plugins.
//!
//! The registry is one JSON document keyed by plugin identity. Every
//! mutation is: acquire an exclusive OS file lock, read the whole
//! document, modify it, write it to a temp file, atomically rename,
//! release the lock. The lock is never held across network I/O, so the
//! in-memory view a caller observes can never diverge from disk.
//!
//! A SHA-256 digest of the entry payload is embedded in the document;
//! a torn or hand-edited file fails the digest check and surfaces as
//! [`RegistryError::Corrupted`] rather than being silently repaired.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::identity::PluginIdentity;

const STORE_FILE: &str = "installedPlugins.json";
const LOCK_FILE: &str = "installedPlugins.lock";
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry file itself is unreadable or fails its digest check.
    /// Requires operator intervention; never repaired automatically.
    #[error("plugin registry at {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    /// I/O failure while accessing the registry. Retryable.
    #[error("failed to access plugin registry at {path}")]
    ReadWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The identity is already registered.
    #[error("plugin '{identity}' is already installed")]
    AlreadyInstalled { identity: PluginIdentity },

    /// The identity is not registered.
    #[error("plugin '{identity}' is not installed")]
    NotInstalled { identity: PluginIdentity },
}

/// The durable record of one successfully installed plugin.
///
/// Records are replaced whole, never partially updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledPluginInfo {
    pub identity: PluginIdentity,
    /// Directory checksum recorded at install time.
    pub checksum: String,
    pub install_path: PathBuf,
    /// Host SDK version active when the plugin was installed.
    pub sdk_version: Version,
    pub installed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct RegistryDocument {
    schema_version: u32,
    entries: Vec<InstalledPluginInfo>,
    /// SHA-256 over the serialized entries; detects torn writes.
    digest: String,
}

impl RegistryDocument {
    fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            entries: Vec::new(),
            digest: entries_digest(&[]),
        }
    }
}

fn entries_digest(entries: &[InstalledPluginInfo]) -> String {
    // Serialization of a Vec of plain structs is deterministic, so the
    // digest is reproducible on load.
    let payload = serde_json::to_vec(entries).unwrap_or_default();
    format!("{:x}", Sha256::digest(&payload))
}

/// Exclusive-access registry of installed plugins.
pub struct PluginRegistry {
    root: PathBuf,
}

impl PluginRegistry {
    /// A registry persisted under `root` (created on first mutation).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn store_path(&self) -> PathBuf {
        self.root.join(STORE_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Register a freshly installed plugin.
    ///
    /// Fails with [`RegistryError::AlreadyInstalled`] when any record for
    /// the identity exists; exactly one of two concurrent installs for the
    /// same identity can succeed.
    pub fn install(&self, info: InstalledPluginInfo) -> Result<(), RegistryError> {
        let _lock = self.acquire_lock()?;
        let mut document = self.read_locked()?;

        if document.entries.iter().any(|e| e.identity == info.identity) {
            return Err(RegistryError::AlreadyInstalled {
                identity: info.identity,
            });
        }

        tracing::info!(plugin = %info.identity, path = %info.install_path.display(), "registering plugin");
        document.entries.push(info);
        self.write_locked(&mut document)
    }

    /// Register a plugin, running `promote` between the duplicate check
    /// and the registry write, all under the registry lock.
    ///
    /// `promote` moves the plugin's files into their final directory.
    /// Holding the lock across check, promotion, and write means two
    /// racing installs of one identity cannot interleave: the loser fails
    /// with [`RegistryError::AlreadyInstalled`] before it can touch the
    /// winner's files. A promotion failure leaves the registry unchanged.
    pub fn install_with(
        &self,
        info: InstalledPluginInfo,
        promote: impl FnOnce() -> std::io::Result<()>,
    ) -> crate::Result<()> {
        let _lock = self.acquire_lock()?;
        let mut document = self.read_locked()?;

        if document.entries.iter().any(|e| e.identity == info.identity) {
            return Err(RegistryError::AlreadyInstalled {
                identity: info.identity,
            }
            .into());
        }

        promote()?;
        tracing::info!(plugin = %info.identity, path = %info.install_path.display(), "registering plugin");
        document.entries.push(info);
        self.write_locked(&mut document)?;
        Ok(())
    }

    /// Remove a plugin's record, returning it so the caller can delete the
    /// install directory.
    pub fn remove(&self, identity: &PluginIdentity) -> Result<InstalledPluginInfo, RegistryError> {
        let _lock = self.acquire_lock()?;
        let mut document = self.read_locked()?;

        let position = document
            .entries
            .iter()
            .position(|e| &e.identity == identity)
            .ok_or_else(|| RegistryError::NotInstalled {
                identity: identity.clone(),
            })?;

        let removed = document.entries.remove(position);
        tracing::info!(plugin = %identity, "unregistering plugin");
        self.write_locked(&mut document)?;
        Ok(removed)
    }

    /// Look up one record.
    pub fn get(
        &self,
        identity: &PluginIdentity,
    ) -> Result<Option<InstalledPluginInfo>, RegistryError> {
        let _lock = self.acquire_lock()?;
        let document = self.read_locked()?;
        Ok(document
            .entries
            .into_iter()
            .find(|e| &e.identity == identity))
    }

    /// Snapshot of every record, sorted by identity.
    ///
    /// Reads take the same lock as writes, so a snapshot never observes a
    /// partially written file.
    pub fn list(&self) -> Result<Vec<InstalledPluginInfo>, RegistryError> {
        let _lock = self.acquire_lock()?;
        let mut entries = self.read_locked()?.entries;
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(entries)
    }

    fn acquire_lock(&self) -> Result<RegistryLock, RegistryError> {
        fs::create_dir_all(&self.root).map_err(|e| self.rw_error(e))?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| self.rw_error(e))?;
        file.lock_exclusive().map_err(|e| self.rw_error(e))?;
        Ok(RegistryLock { _file: file })
    }

    fn read_locked(&self) -> Result<RegistryDocument, RegistryError> {
        let path = self.store_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RegistryDocument::empty()),
            Err(e) => return Err(self.rw_error(e)),
        };

        let document: RegistryDocument =
            serde_json::from_slice(&bytes).map_err(|e| RegistryError::Corrupted {
                path: path.clone(),
                reason: format!("unparsable registry file: {e}"),
            })?;

        let expected = entries_digest(&document.entries);
        if document.digest != expected {
            return Err(RegistryError::Corrupted {
                path,
                reason: "digest mismatch, file was torn or edited".into(),
            });
        }
        Ok(document)
    }

    fn write_locked(&self, document: &mut RegistryDocument) -> Result<(), RegistryError> {
        document.schema_version = SCHEMA_VERSION;
        document.digest = entries_digest(&document.entries);

        let path = self.store_path();
        let temp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(document).map_err(|e| RegistryError::Corrupted {
            path: path.clone(),
            reason: format!("unserializable registry state: {e}"),
        })?;
        fs::write(&temp, bytes).map_err(|e| self.rw_error(e))?;
        fs::rename(&temp, &path).map_err(|e| self.rw_error(e))
    }

    fn rw_error(&self, source: std::io::Error) -> RegistryError {
        RegistryError::ReadWrite {
            path: self.store_path(),
            source,
        }
    }
}

/// Held for the whole read-modify-write; the OS lock releases on drop.
struct RegistryLock {
    _file: File,
}
