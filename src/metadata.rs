//! Package metadata documents.
//!
//! Every plugin package carries two JSON documents: `metadata.json`
//! ([`PluginMetadata`]) describing the plugin itself, and
//! `contentsMetadata.json` ([`PluginContentsMetadata`]) listing the typed
//! descriptors the content files expose. The host loader consumes the
//! contents document to decide what to import without opening every
//! content file.

use semver::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::PluginIdentity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginOwner {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The `metadata.json` document of a plugin package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub identity: PluginIdentity,

    /// Size in bytes of the extracted content files.
    pub installed_size: u64,

    pub display_name: String,
    pub description: String,

    /// Minimum host SDK version the plugin requires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_version: Option<Version>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<PluginOwner>,
}

/// A file or folder shape a processing source accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataSourceSpec {
    /// Files matching an extension, e.g. `etl`.
    File { extension: String },
    /// A whole directory handed to the source.
    Folder,
    /// Files without an extension.
    Extensionless,
}

/// Descriptor for one processing source exposed by the content files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSourceMetadata {
    pub guid: Uuid,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_data_sources: Vec<DataSourceSpec>,
}

/// Path naming one data cooker inside a source parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCookerPath {
    pub parser_id: String,
    pub cooker_id: String,
}

/// Descriptor for one table exposed by the content files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub guid: Uuid,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub is_metadata_table: bool,
}

/// The `contentsMetadata.json` document of a plugin package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginContentsMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processing_sources: Vec<ProcessingSourceMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_cookers: Vec<DataCookerPath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableMetadata>,
}

impl PluginContentsMetadata {
    /// All extension GUIDs this plugin advertises.
    ///
    /// Two installed plugins must never both advertise the same GUID; the
    /// directory resolver deduplicates candidates on this set.
    pub fn advertised_guids(&self) -> Vec<Uuid> {
        let mut guids: Vec<Uuid> = self
            .processing_sources
            .iter()
            .map(|s| s.guid)
            .chain(self.tables.iter().map(|t| t.guid))
            .collect();
        guids.sort();
        guids.dedup();
        guids
    }
}
