use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ContentHash;

/// Headers supplied by the caller when a blob is created.
pub type BlobHeaders = BTreeMap<String, String>;

/// Well-known header names.
pub mod headers {
    /// Logical name of the blob (e.g. repository path).
    pub const BLOB_NAME: &str = "BlobStore.blob-name";
    /// MIME type of the content.
    pub const CONTENT_TYPE: &str = "BlobStore.content-type";
    /// Principal that created the blob.
    pub const CREATED_BY: &str = "BlobStore.created-by";
    /// Address the blob was uploaded from.
    pub const CREATED_BY_IP: &str = "BlobStore.created-by-ip";
    /// Marks a blob as temporary.
    pub const TEMPORARY_BLOB: &str = "BlobStore.temporary-blob";
    /// When `"true"`, the blob id is derived from [`BLOB_NAME`].
    pub const DIRECT_PATH: &str = "BlobStore.direct-path";
    /// Repository that owns the blob.
    pub const REPO_NAME: &str = "Bucket.repo-name";
}

/// Content metrics recorded when a blob is written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetrics {
    pub creation_time: DateTime<Utc>,
    pub content_hash: ContentHash,
    pub content_size: u64,
}

impl BlobMetrics {
    /// Metrics for content written now.
    pub fn new(content_hash: ContentHash, content_size: u64) -> Self {
        Self {
            creation_time: Utc::now(),
            content_hash,
            content_size,
        }
    }
}

/// Persistent attributes of a blob: headers, metrics, and soft-delete state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobAttributes {
    pub headers: BlobHeaders,
    pub metrics: BlobMetrics,
    pub deleted: bool,
    pub deleted_reason: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Last time the blob or its attributes changed.
    pub last_updated: DateTime<Utc>,
}

impl BlobAttributes {
    /// Attributes for a freshly written, live blob.
    pub fn new(headers: BlobHeaders, metrics: BlobMetrics) -> Self {
        let last_updated = metrics.creation_time;
        Self {
            headers,
            metrics,
            deleted: false,
            deleted_reason: None,
            deleted_at: None,
            last_updated,
        }
    }

    /// The `BlobStore.blob-name` header, if present.
    pub fn blob_name(&self) -> Option<&str> {
        self.headers.get(headers::BLOB_NAME).map(String::as_str)
    }

    /// Mark as soft-deleted with the given reason.
    pub fn mark_deleted(&mut self, reason: impl Into<String>) {
        let now = Utc::now();
        self.deleted = true;
        self.deleted_reason = Some(reason.into());
        self.deleted_at = Some(now);
        self.last_updated = now;
    }

    /// Clear the soft-delete marker.
    pub fn mark_undeleted(&mut self) {
        self.deleted = false;
        self.deleted_reason = None;
        self.deleted_at = None;
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> BlobAttributes {
        let mut headers = BlobHeaders::new();
        headers.insert(headers::BLOB_NAME.into(), "foo/bar.jar".into());
        BlobAttributes::new(headers, BlobMetrics::new(ContentHash::of(b"x"), 1))
    }

    #[test]
    fn new_attributes_are_live() {
        let a = attrs();
        assert!(!a.deleted);
        assert!(a.deleted_reason.is_none());
        assert_eq!(a.blob_name(), Some("foo/bar.jar"));
        assert_eq!(a.last_updated, a.metrics.creation_time);
    }

    #[test]
    fn delete_then_undelete() {
        let mut a = attrs();
        a.mark_deleted("cleanup");
        assert!(a.deleted);
        assert_eq!(a.deleted_reason.as_deref(), Some("cleanup"));
        assert!(a.deleted_at.is_some());

        a.mark_undeleted();
        assert!(!a.deleted);
        assert!(a.deleted_reason.is_none());
        assert!(a.deleted_at.is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let a = attrs();
        let json = serde_json::to_string(&a).unwrap();
        let parsed: BlobAttributes = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, a);
    }
}
