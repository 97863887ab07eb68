//! Read-only file catalog.
//!
//! The gateway looks up logical file ids in a [`MetadataStore`] to find the
//! channel and message that carry the bytes, plus the display fields used for
//! download filenames. [`JsonCatalog`] is the bundled implementation, loaded
//! from a JSON array of [`FileRecord`]s.

use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Logical file id.
    pub id: Uuid,
    /// Channel that carries the document.
    pub channel: String,
    /// Message sequence number within the channel.
    pub sequence: i64,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Contributors (artists, authors).
    #[serde(default)]
    pub contributors: Vec<String>,
    /// MIME type recorded at indexing time.
    #[serde(default)]
    pub mime: Option<String>,
    /// Size recorded at indexing time; zero when unknown.
    #[serde(default)]
    pub declared_size: u64,
}

/// Errors raised by a metadata store.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The backing file could not be read.
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    /// The catalog content is not valid.
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    /// Any other backend failure.
    #[error("metadata backend error: {0}")]
    Backend(String),
}

/// Lookup of file records by logical id.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Return the record for `id`, or `None` when it is unknown.
    async fn get_file(&self, id: &Uuid) -> Result<Option<FileRecord>, MetadataError>;
}

/// In-memory catalog backed by a JSON document.
#[derive(Debug, Default)]
pub struct JsonCatalog {
    records: DashMap<Uuid, FileRecord>,
}

impl JsonCatalog {
    /// Build a catalog from records. Later duplicates replace earlier ones.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = FileRecord>) -> Self {
        let catalog = Self::default();
        for record in records {
            catalog.insert(record);
        }
        catalog
    }

    /// Parse a JSON array of records.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, MetadataError> {
        let records: Vec<FileRecord> = serde_json::from_slice(bytes)?;
        Ok(Self::from_records(records))
    }

    /// Read and parse the JSON catalog at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let catalog = Self::from_json_slice(&bytes)?;
        tracing::info!(
            path = %path.as_ref().display(),
            records = catalog.len(),
            "file catalog loaded"
        );
        Ok(catalog)
    }

    /// Add or replace a record.
    pub fn insert(&self, record: FileRecord) {
        self.records.insert(record.id, record);
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the catalog has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MetadataStore for JsonCatalog {
    async fn get_file(&self, id: &Uuid) -> Result<Option<FileRecord>, MetadataError> {
        Ok(self.records.get(id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CATALOG: &str = r#"[
        {
            "id": "5b1f0a5e-8c1d-4a57-9a0e-3c2f4b6d7e81",
            "channel": "music",
            "sequence": 42,
            "title": "Night Drive",
            "contributors": ["Alpha", "Beta"],
            "mime": "audio/mpeg",
            "declaredSize": 2000000
        },
        {
            "id": "0d9c1e7a-2b3f-4c5d-8e9f-a0b1c2d3e4f5",
            "channel": "archive",
            "sequence": 7
        }
    ]"#;

    #[tokio::test]
    async fn test_should_parse_records_with_defaults() {
        let catalog = JsonCatalog::from_json_slice(CATALOG.as_bytes()).expect("parse");
        assert_eq!(catalog.len(), 2);

        let id = Uuid::parse_str("0d9c1e7a-2b3f-4c5d-8e9f-a0b1c2d3e4f5").expect("uuid");
        let record = catalog.get_file(&id).await.expect("lookup").expect("record");
        assert_eq!(record.channel, "archive");
        assert!(record.contributors.is_empty());
        assert_eq!(record.declared_size, 0);
    }

    #[tokio::test]
    async fn test_should_return_none_for_unknown_id() {
        let catalog = JsonCatalog::from_json_slice(CATALOG.as_bytes()).expect("parse");
        assert!(catalog.get_file(&Uuid::new_v4()).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn test_should_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(CATALOG.as_bytes()).expect("write");

        let catalog = JsonCatalog::load(file.path()).await.expect("load");
        assert!(!catalog.is_empty());
    }

    #[test]
    fn test_should_reject_malformed_catalog() {
        let err = JsonCatalog::from_json_slice(b"{not json").expect_err("malformed");
        assert!(matches!(err, MetadataError::Parse(_)));
    }
}
