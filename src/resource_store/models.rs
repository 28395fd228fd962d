/// Resource storage data models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse classification derived from MIME type and file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    Image,
    Document,
    Code,
    Archive,
    Other,
}

impl ResourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Image => "image",
            ResourceCategory::Document => "document",
            ResourceCategory::Code => "code",
            ResourceCategory::Archive => "archive",
            ResourceCategory::Other => "other",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(ResourceCategory::Image),
            "document" => Ok(ResourceCategory::Document),
            "code" => Ok(ResourceCategory::Code),
            "archive" => Ok(ResourceCategory::Archive),
            "other" => Ok(ResourceCategory::Other),
            _ => Err(format!("Unknown resource category: {}", s)),
        }
    }
}

/// Descriptive fields of a resource, as stored in the metadata collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub category: ResourceCategory,
    pub folder: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub version: i64,
    /// Inline `data:` URL preview, images only
    pub thumbnail_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub uploaded_by: String,
}

impl ResourceMetadata {
    /// Case-insensitive substring match over name, description and tags.
    /// `needle` must already be lowercased.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(needle))
                .unwrap_or(false)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

/// Blob collection record: the payload plus a copy of the identifying fields
#[derive(Debug, Clone)]
pub struct ResourceBlob {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub mime_type: String,
    pub category: ResourceCategory,
    pub size_bytes: u64,
    /// Hex SHA-256 of `payload`
    pub checksum: String,
    pub payload: Vec<u8>,
    pub uploaded_at: DateTime<Utc>,
}

/// A fully materialized resource: metadata plus payload
#[derive(Debug, Clone)]
pub struct Resource {
    pub metadata: ResourceMetadata,
    pub checksum: String,
    pub payload: Vec<u8>,
}

/// Input to `ResourceStore::save`
///
/// The id is always chosen by the caller; the engine never generates one.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub mime_type: String,
    pub payload: Vec<u8>,
    pub folder: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub version: i64,
    pub uploaded_by: String,
    /// Defaults to the time of the save
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl NewResource {
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            payload,
            folder: None,
            tags: Vec::new(),
            description: None,
            version: 1,
            uploaded_by: String::new(),
            uploaded_at: None,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn uploaded_by(mut self, uploaded_by: impl Into<String>) -> Self {
        self.uploaded_by = uploaded_by.into();
        self
    }
}

/// Partial metadata update
///
/// Only descriptive fields can change; id, payload, size, MIME type, category
/// and owning project are fixed once saved. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub name: Option<String>,
    pub folder: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub description: Option<Option<String>>,
    pub version: Option<i64>,
}

impl MetadataUpdate {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn folder(mut self, folder: Option<String>) -> Self {
        self.folder = Some(folder);
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.folder.is_none()
            && self.tags.is_none()
            && self.description.is_none()
            && self.version.is_none()
    }

    /// Merge into existing metadata and stamp `updated_at`
    pub(crate) fn apply(self, metadata: &mut ResourceMetadata, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            metadata.name = name;
        }
        if let Some(folder) = self.folder {
            metadata.folder = folder;
        }
        if let Some(tags) = self.tags {
            metadata.tags = tags;
        }
        if let Some(description) = self.description {
            metadata.description = description;
        }
        if let Some(version) = self.version {
            metadata.version = version;
        }
        metadata.updated_at = now;
    }
}

/// Host storage usage estimate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageQuota {
    pub used: u64,
    pub quota: u64,
}

/// Image dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Result of cross-checking the two collections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub blobs_without_metadata: Vec<String>,
    pub metadata_without_blobs: Vec<String>,
    /// Ids present in both collections whose size or MIME type disagree
    pub mismatched: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.blobs_without_metadata.is_empty()
            && self.metadata_without_blobs.is_empty()
            && self.mismatched.is_empty()
    }
}
