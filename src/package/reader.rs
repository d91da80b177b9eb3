//! Reads plugin package archives.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;

use super::{CONTENT_PREFIX, CONTENTS_METADATA_ENTRY, METADATA_ENTRY, PackageError};
use crate::metadata::{PluginContentsMetadata, PluginMetadata};

/// An opened plugin package: a read-only projection of the archive bytes.
///
/// Opening validates structure eagerly — an archive missing either
/// metadata document is rejected with [`PackageError::Malformed`].
#[derive(Debug)]
pub struct PluginPackage {
    metadata: PluginMetadata,
    contents_metadata: PluginContentsMetadata,
    content: BTreeMap<String, Vec<u8>>,
}

impl PluginPackage {
    /// Open a package file from disk.
    pub fn open(path: &Path) -> crate::Result<Self> {
        let file = File::open(path).map_err(|e| crate::Error::LocalLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_reader(file)?)
    }

    /// Parse a package from any reader of the archive bytes.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PackageError> {
        let decoder = GzDecoder::new(reader);
        let mut archive = tar::Archive::new(decoder);

        let mut metadata: Option<PluginMetadata> = None;
        let mut contents_metadata: Option<PluginContentsMetadata> = None;
        let mut content = BTreeMap::new();

        let entries = archive
            .entries()
            .map_err(|e| PackageError::malformed(format!("unreadable archive: {e}")))?;
        for entry in entries {
            let mut entry =
                entry.map_err(|e| PackageError::malformed(format!("unreadable entry: {e}")))?;
            let raw_path = entry
                .path()
                .map_err(|e| PackageError::malformed(format!("bad entry path: {e}")))?
                .to_string_lossy()
                .into_owned();
            let name = raw_path.strip_prefix("./").unwrap_or(&raw_path).to_owned();

            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| PackageError::malformed(format!("truncated entry '{name}': {e}")))?;

            if name == METADATA_ENTRY {
                metadata = Some(serde_json::from_slice(&bytes).map_err(|e| {
                    PackageError::malformed(format!("invalid {METADATA_ENTRY}: {e}"))
                })?);
            } else if name == CONTENTS_METADATA_ENTRY {
                contents_metadata = Some(serde_json::from_slice(&bytes).map_err(|e| {
                    PackageError::malformed(format!("invalid {CONTENTS_METADATA_ENTRY}: {e}"))
                })?);
            } else if let Some(rel) = name.strip_prefix(CONTENT_PREFIX) {
                if !rel.is_empty() && !rel.ends_with('/') {
                    content.insert(rel.to_owned(), bytes);
                }
            }
        }

        let metadata = metadata
            .ok_or_else(|| PackageError::malformed(format!("missing {METADATA_ENTRY} entry")))?;
        let contents_metadata = contents_metadata.ok_or_else(|| {
            PackageError::malformed(format!("missing {CONTENTS_METADATA_ENTRY} entry"))
        })?;

        Ok(Self {
            metadata,
            contents_metadata,
            content,
        })
    }

    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    pub fn contents_metadata(&self) -> &PluginContentsMetadata {
        &self.contents_metadata
    }

    /// Relative paths of every content file, sorted.
    pub fn content_paths(&self) -> impl Iterator<Item = &str> {
        self.content.keys().map(String::as_str)
    }

    /// Raw bytes of one content file.
    pub fn content_bytes(&self, relative_path: &str) -> Option<&[u8]> {
        self.content.get(relative_path).map(Vec::as_slice)
    }

    /// Stream one content file.
    pub fn content_reader(&self, relative_path: &str) -> Option<impl Read + '_> {
        self.content.get(relative_path).map(|b| Cursor::new(b.as_slice()))
    }

    /// Write the package out to `dir` in the install layout: the two
    /// metadata documents at the root plus `content/<relative path>` files.
    pub fn extract_to(&self, dir: &Path) -> Result<(), PackageError> {
        std::fs::create_dir_all(dir).map_err(PackageError::extraction)?;

        let metadata_json =
            serde_json::to_vec_pretty(&self.metadata).map_err(PackageError::extraction)?;
        std::fs::write(dir.join(METADATA_ENTRY), metadata_json)
            .map_err(PackageError::extraction)?;

        let contents_json =
            serde_json::to_vec_pretty(&self.contents_metadata).map_err(PackageError::extraction)?;
        std::fs::write(dir.join(CONTENTS_METADATA_ENTRY), contents_json)
            .map_err(PackageError::extraction)?;

        for (rel, bytes) in &self.content {
            let dest = dir.join(CONTENT_PREFIX).join(rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(PackageError::extraction)?;
            }
            std::fs::write(dest, bytes).map_err(PackageError::extraction)?;
        }
        Ok(())
    }
}
