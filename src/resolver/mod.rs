//! Resolving installed plugins from an on-disk plugins root.
//!
//! Two folder schemas coexist under one root:
//!
//! - **Legacy**: `<root>/<name>/`, one directory per plugin.
//! - **Versioned**: `<root>/InstalledPlugins/<sdk-version>/<name>/<plugin-version>/`.
//!
//! Each leaf directory holds the extracted package, including its
//! `metadata.json` and `contentsMetadata.json`. A scan classifies every
//! leaf, then deduplicates candidates by advertised extension GUID so the
//! host never loads the same extension twice. Classification is recomputed
//! on every scan; nothing is cached between scans.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;
use uuid::Uuid;

use crate::Result;
use crate::identity::PluginIdentity;
use crate::metadata::{PluginContentsMetadata, PluginMetadata};
use crate::package::{CONTENTS_METADATA_ENTRY, METADATA_ENTRY};

/// Directory layout that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderSchema {
    /// `<root>/<name>/`
    Legacy,
    /// `<root>/InstalledPlugins/<sdk-version>/<name>/<plugin-version>/`
    Versioned,
}

impl FolderSchema {
    // Versioned outranks Legacy when versions tie.
    fn rank(self) -> u8 {
        match self {
            FolderSchema::Legacy => 0,
            FolderSchema::Versioned => 1,
        }
    }
}

impl fmt::Display for FolderSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolderSchema::Legacy => write!(f, "legacy"),
            FolderSchema::Versioned => write!(f, "versioned"),
        }
    }
}

/// One well-formed installed plugin directory.
#[derive(Debug, Clone)]
pub struct PluginCandidate {
    pub identity: PluginIdentity,
    pub schema: FolderSchema,
    pub path: PathBuf,
    /// Extension GUIDs the plugin advertises; dedup key.
    pub guids: Vec<Uuid>,
}

/// A leaf directory that could not be interpreted as an installed plugin.
#[derive(Debug, Clone)]
pub struct InvalidCandidate {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of one scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Candidates that won every GUID they advertise.
    pub loadable: Vec<PluginCandidate>,
    /// Well-formed candidates beaten on at least one GUID.
    pub suppressed: Vec<PluginCandidate>,
    /// Malformed leaves; never abort the scan.
    pub invalid: Vec<InvalidCandidate>,
}

pub(crate) const VERSIONED_ROOT: &str = "InstalledPlugins";

/// Scans a plugins root and resolves which installed plugins are loadable.
pub struct PluginDirectoryResolver {
    root: PathBuf,
}

impl PluginDirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Classify every leaf under the root and deduplicate by GUID.
    ///
    /// A candidate is loadable only when it wins every GUID group it
    /// belongs to. Winners are picked per GUID: highest plugin version,
    /// ties broken versioned-over-legacy, then first in sorted traversal
    /// order. Directories whose name starts with `.` are skipped.
    pub fn scan(&self) -> Result<ScanOutcome> {
        let mut outcome = ScanOutcome::default();
        if !self.root.is_dir() {
            return Ok(outcome);
        }

        let mut candidates = Vec::new();
        for entry in sorted_subdirs(&self.root)? {
            let name = dir_name(&entry);
            if name.starts_with('.') {
                continue;
            }
            if name == VERSIONED_ROOT {
                self.collect_versioned(&entry, &mut candidates, &mut outcome.invalid)?;
            } else {
                self.collect_leaf(&entry, FolderSchema::Legacy, None, &mut candidates, &mut outcome.invalid);
            }
        }

        let suppressed_indices = deduplicate(&candidates);
        for (index, candidate) in candidates.into_iter().enumerate() {
            if suppressed_indices.contains(&index) {
                tracing::debug!(
                    plugin = %candidate.identity,
                    schema = %candidate.schema,
                    "suppressing plugin beaten on an advertised GUID"
                );
                outcome.suppressed.push(candidate);
            } else {
                outcome.loadable.push(candidate);
            }
        }
        Ok(outcome)
    }

    /// `InstalledPlugins/<sdk-version>/<name>/<plugin-version>/` leaves.
    fn collect_versioned(
        &self,
        versioned_root: &Path,
        candidates: &mut Vec<PluginCandidate>,
        invalid: &mut Vec<InvalidCandidate>,
    ) -> Result<()> {
        for sdk_dir in sorted_subdirs(versioned_root)? {
            if Version::parse(&dir_name(&sdk_dir)).is_err() {
                invalid.push(InvalidCandidate {
                    path: sdk_dir.clone(),
                    reason: "SDK directory name is not a semantic version".into(),
                });
                continue;
            }
            for name_dir in sorted_subdirs(&sdk_dir)? {
                for version_dir in sorted_subdirs(&name_dir)? {
                    match Version::parse(&dir_name(&version_dir)) {
                        Ok(version) => self.collect_leaf(
                            &version_dir,
                            FolderSchema::Versioned,
                            Some((dir_name(&name_dir), version)),
                            candidates,
                            invalid,
                        ),
                        Err(_) => invalid.push(InvalidCandidate {
                            path: version_dir.clone(),
                            reason: "version directory name is not a semantic version".into(),
                        }),
                    }
                }
            }
        }
        Ok(())
    }

    /// Read one leaf's metadata documents and append a candidate, or record
    /// why the leaf is invalid. For versioned leaves the directory names
    /// must agree with the metadata.
    fn collect_leaf(
        &self,
        leaf: &Path,
        schema: FolderSchema,
        expected: Option<(String, Version)>,
        candidates: &mut Vec<PluginCandidate>,
        invalid: &mut Vec<InvalidCandidate>,
    ) {
        let metadata = match read_json::<PluginMetadata>(&leaf.join(METADATA_ENTRY)) {
            Ok(metadata) => metadata,
            Err(reason) => {
                tracing::warn!(path = %leaf.display(), %reason, "skipping invalid plugin directory");
                invalid.push(InvalidCandidate {
                    path: leaf.to_path_buf(),
                    reason,
                });
                return;
            }
        };

        if let Some((expected_name, expected_version)) = expected {
            if !expected_name.eq_ignore_ascii_case(metadata.identity.id()) {
                invalid.push(InvalidCandidate {
                    path: leaf.to_path_buf(),
                    reason: format!(
                        "directory name '{}' does not match plugin id '{}'",
                        expected_name,
                        metadata.identity.id()
                    ),
                });
                return;
            }
            if &expected_version != metadata.identity.version() {
                invalid.push(InvalidCandidate {
                    path: leaf.to_path_buf(),
                    reason: format!(
                        "directory version '{}' does not match metadata version '{}'",
                        expected_version,
                        metadata.identity.version()
                    ),
                });
                return;
            }
        }

        // Contents metadata is absent from hand-dropped legacy folders;
        // such plugins advertise no GUIDs and never contend in dedup.
        let contents_path = leaf.join(CONTENTS_METADATA_ENTRY);
        let guids = if contents_path.is_file() {
            match read_json::<PluginContentsMetadata>(&contents_path) {
                Ok(contents) => contents.advertised_guids(),
                Err(reason) => {
                    invalid.push(InvalidCandidate {
                        path: leaf.to_path_buf(),
                        reason,
                    });
                    return;
                }
            }
        } else {
            Vec::new()
        };

        candidates.push(PluginCandidate {
            identity: metadata.identity,
            schema,
            path: leaf.to_path_buf(),
            guids,
        });
    }
}

/// Indices of candidates that lose at least one of their GUID groups.
fn deduplicate(candidates: &[PluginCandidate]) -> Vec<usize> {
    let mut groups: HashMap<Uuid, Vec<usize>> = HashMap::new();
    for (index, candidate) in candidates.iter().enumerate() {
        for guid in &candidate.guids {
            groups.entry(*guid).or_default().push(index);
        }
    }

    let mut suppressed = Vec::new();
    for indices in groups.values() {
        if indices.len() < 2 {
            continue;
        }
        // Group indices come in traversal order, so a strict comparison
        // keeps the earliest candidate on full ties.
        let winner = *indices
            .iter()
            .reduce(|best, challenger| {
                let b = &candidates[*best];
                let c = &candidates[*challenger];
                let challenger_wins = (c.identity.version(), c.schema.rank())
                    > (b.identity.version(), b.schema.rank());
                if challenger_wins { challenger } else { best }
            })
            .unwrap_or(&0);
        for index in indices {
            if *index != winner && !suppressed.contains(index) {
                suppressed.push(*index);
            }
        }
    }
    suppressed
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> std::result::Result<T, String> {
    let bytes =
        fs::read(path).map_err(|e| format!("cannot read {}: {e}", dir_name(path)))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("cannot parse {}: {e}", dir_name(path)))
}
