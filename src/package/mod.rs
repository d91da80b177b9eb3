//! The on-disk plugin package format.
//!
//! A package is a gzipped tar archive with three kinds of entries:
//!
//! - `metadata.json` — the [`PluginMetadata`] document,
//! - `contentsMetadata.json` — the [`PluginContentsMetadata`] document,
//! - `content/<relative path>` — the plugin's deployable files, verbatim.
//!
//! Entry order inside the archive is insignificant; relative paths under
//! the content prefix are preserved exactly.
//!
//! [`PluginMetadata`]: crate::metadata::PluginMetadata
//! [`PluginContentsMetadata`]: crate::metadata::PluginContentsMetadata

mod builder;
mod reader;

pub use builder::PluginPackageBuilder;
pub use reader::PluginPackage;

/// File extension of plugin package files.
pub const PACKAGE_EXTENSION: &str = "ppkg";

pub(crate) const METADATA_ENTRY: &str = "metadata.json";
pub(crate) const CONTENTS_METADATA_ENTRY: &str = "contentsMetadata.json";
pub(crate) const CONTENT_PREFIX: &str = "content/";

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// The archive is structurally invalid: not a gzipped tar, or missing
    /// a required metadata entry. Not retryable.
    #[error("malformed plugin package: {reason}")]
    Malformed { reason: String },

    /// The builder failed mid-write; the caller must discard the partial
    /// output.
    #[error("failed to create plugin package")]
    Creation {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Extraction failed; the caller must discard the staging directory.
    #[error("failed to extract plugin package")]
    Extraction {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PackageError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub(crate) fn creation(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Creation {
            source: Box::new(source),
        }
    }

    pub(crate) fn extraction(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Extraction {
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    use uuid::Uuid;

    use super::{PACKAGE_EXTENSION, PluginPackageBuilder};
    use crate::identity::PluginIdentity;
    use crate::metadata::{PluginContentsMetadata, PluginMetadata, ProcessingSourceMetadata};

    pub fn test_metadata(id: &str, version: &str) -> PluginMetadata {
        PluginMetadata {
            identity: PluginIdentity::new(id, version.parse().unwrap()).unwrap(),
            installed_size: 0,
            display_name: format!("{id} display"),
            description: format!("{id} description"),
            sdk_version: Some("1.0.0".parse().unwrap()),
            project_url: None,
            owners: Vec::new(),
        }
    }

    pub fn test_contents(guids: &[Uuid]) -> PluginContentsMetadata {
        PluginContentsMetadata {
            processing_sources: guids
                .iter()
                .map(|&guid| ProcessingSourceMetadata {
                    guid,
                    name: "source".into(),
                    description: "test source".into(),
                    supported_data_sources: Vec::new(),
                })
                .collect(),
            data_cookers: Vec::new(),
            tables: Vec::new(),
        }
    }

    /// Write a minimal valid package file into `dir`, returning its path.
    pub fn write_test_package(dir: &Path, id: &str, version: &str) -> PathBuf {
        write_test_package_with(dir, id, version, &[Uuid::new_v4()])
    }

    /// Like [`write_test_package`] but with explicit advertised GUIDs.
    pub fn write_test_package_with(
        dir: &Path,
        id: &str,
        version: &str,
        guids: &[Uuid],
    ) -> PathBuf {
        let path = dir.join(format!("{id}-{version}.{PACKAGE_EXTENSION}"));
        PluginPackageBuilder::new(test_metadata(id, version), test_contents(guids))
            .add_content_bytes("bin/plugin.dll", format!("binary for {id} {version}").into_bytes())
            .add_content_bytes("resources/strings.json", b"{}".to_vec())
            .write_to(&path)
            .unwrap();
        path
    }
}
