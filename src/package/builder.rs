//! Writes plugin package archives.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

use super::{CONTENT_PREFIX, CONTENTS_METADATA_ENTRY, METADATA_ENTRY, PackageError};
use crate::metadata::{PluginContentsMetadata, PluginMetadata};

enum ContentEntry {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// Builds a plugin package archive from content files plus the two
/// metadata documents.
///
/// Content files keep their relative path under the `content/` prefix;
/// the order they are added in is insignificant.
pub struct PluginPackageBuilder {
    metadata: PluginMetadata,
    contents_metadata: PluginContentsMetadata,
    entries: Vec<(String, ContentEntry)>,
}

impl PluginPackageBuilder {
    pub fn new(metadata: PluginMetadata, contents_metadata: PluginContentsMetadata) -> Self {
        Self {
            metadata,
            contents_metadata,
            entries: Vec::new(),
        }
    }

    /// Add one content file from disk under the given relative path.
    pub fn add_content_file(
        mut self,
        relative_path: impl Into<String>,
        source: impl Into<PathBuf>,
    ) -> Self {
        self.entries
            .push((relative_path.into(), ContentEntry::File(source.into())));
        self
    }

    /// Add one content file from an in-memory buffer.
    pub fn add_content_bytes(mut self, relative_path: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.entries
            .push((relative_path.into(), ContentEntry::Bytes(bytes)));
        self
    }

    /// Add every file under `dir`, preserving relative paths.
    pub fn add_content_dir(mut self, dir: &Path) -> Result<Self, PackageError> {
        let mut files = Vec::new();
        collect_files(dir, "", &mut files).map_err(PackageError::creation)?;
        files.sort();
        for rel in files {
            let source = dir.join(&rel);
            self.entries.push((rel, ContentEntry::File(source)));
        }
        Ok(self)
    }

    /// Write the archive to `path`.
    pub fn write_to(self, path: &Path) -> Result<(), PackageError> {
        let file = File::create(path).map_err(PackageError::creation)?;
        self.write(file)?;
        Ok(())
    }

    /// Write the archive to an arbitrary writer.
    pub fn write<W: Write>(self, writer: W) -> Result<W, PackageError> {
        let encoder = GzEncoder::new(writer, Compression::default());
        let mut archive = tar::Builder::new(encoder);

        let metadata_json =
            serde_json::to_vec_pretty(&self.metadata).map_err(PackageError::creation)?;
        append_bytes(&mut archive, METADATA_ENTRY, &metadata_json)?;

        let contents_json =
            serde_json::to_vec_pretty(&self.contents_metadata).map_err(PackageError::creation)?;
        append_bytes(&mut archive, CONTENTS_METADATA_ENTRY, &contents_json)?;

        for (rel, entry) in &self.entries {
            let archive_path = format!("{CONTENT_PREFIX}{rel}");
            match entry {
                ContentEntry::Bytes(bytes) => append_bytes(&mut archive, &archive_path, bytes)?,
                ContentEntry::File(source) => {
                    let mut file = File::open(source).map_err(PackageError::creation)?;
                    archive
                        .append_file(&archive_path, &mut file)
                        .map_err(PackageError::creation)?;
                }
            }
        }

        let encoder = archive.into_inner().map_err(PackageError::creation)?;
        encoder.finish().map_err(PackageError::creation)
    }
}

fn append_bytes<W: Write>(
    archive: &mut tar::Builder<W>,
    path: &str,
    bytes: &[u8],
) -> Result<(), PackageError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    archive
        .append_data(&mut header, path, bytes)
        .map_err(PackageError::creation)
}

fn collect_files(dir: &Path, prefix: &str, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        if entry.file_type()?.is_dir() {
            collect_files(&entry.path(), &rel, out)?;
        } else {
            out.push(rel);
        }
    }
    Ok(())
}
