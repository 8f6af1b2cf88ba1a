use bytes::{Buf, Bytes};
use strata_types::{BlobHeaders, BlobId, BlobMetrics};

/// A readable blob: identity, headers, metrics, and content.
///
/// Content is reference-counted, so cloning a `Blob` does not copy bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    id: BlobId,
    headers: BlobHeaders,
    metrics: BlobMetrics,
    content: Bytes,
}

impl Blob {
    pub fn new(id: BlobId, headers: BlobHeaders, metrics: BlobMetrics, content: Bytes) -> Self {
        Self {
            id,
            headers,
            metrics,
            content,
        }
    }

    pub fn id(&self) -> &BlobId {
        &self.id
    }

    pub fn headers(&self) -> &BlobHeaders {
        &self.headers
    }

    pub fn metrics(&self) -> &BlobMetrics {
        &self.metrics
    }

    /// The full content.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// A fresh reader over the content.
    pub fn reader(&self) -> impl std::io::Read {
        self.content.clone().reader()
    }
}
