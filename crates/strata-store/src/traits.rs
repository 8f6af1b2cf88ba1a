use std::fmt;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use strata_types::{
    BlobAttributes, BlobHeaders, BlobId, BlobStoreConfiguration, BlobStoreMetrics, ContentHash,
    LifecycleState, OperationMetricsByType,
};

use crate::blob::Blob;
use crate::error::StoreResult;

/// Single-pass, lazily evaluated sequence of blob ids.
pub type BlobIdStream = Box<dyn Iterator<Item = BlobId> + Send>;

/// Decides whether a soft-deleted blob is still referenced by its owner.
///
/// Consulted by compaction and undelete. Any
/// `Fn(&str, &BlobId, Option<&str>) -> bool` closure implements it; the
/// arguments are the store name, the blob id, and the blob name header.
pub trait BlobStoreUsageChecker: Send + Sync {
    fn in_use(&self, store: &str, blob_id: &BlobId, blob_name: Option<&str>) -> bool;
}

impl<F> BlobStoreUsageChecker for F
where
    F: Fn(&str, &BlobId, Option<&str>) -> bool + Send + Sync,
{
    fn in_use(&self, store: &str, blob_id: &BlobId, blob_name: Option<&str>) -> bool {
        self(store, blob_id, blob_name)
    }
}

/// The blob storage contract.
///
/// Every store, primitive or composite, implements this trait. All methods
/// take `&self`; implementations must be safe under concurrent invocation.
///
/// Lifecycle: a store is configured with [`init`](Self::init), then
/// [`start`](Self::start)ed. Blob operations return
/// [`StoreError::InvalidState`](crate::StoreError::InvalidState) unless the
/// store is started.
pub trait BlobStore: Send + Sync + fmt::Debug {
    // ---- Lifecycle ----

    /// Apply a configuration. Legal only while the store is not running.
    fn init(&self, configuration: BlobStoreConfiguration) -> StoreResult<()>;

    /// Begin serving blob operations.
    fn start(&self) -> StoreResult<()>;

    /// Stop serving blob operations; the store may be started again.
    fn stop(&self) -> StoreResult<()>;

    /// Permanently stop the store regardless of its current state.
    fn shutdown(&self) -> StoreResult<()>;

    /// Release the store's storage. Legal only while not running.
    fn remove(&self) -> StoreResult<()>;

    /// Current lifecycle state.
    fn state(&self) -> LifecycleState;

    fn is_started(&self) -> bool {
        self.state().is_started()
    }

    /// A snapshot of the active configuration.
    fn configuration(&self) -> BlobStoreConfiguration;

    /// The configured store name.
    fn name(&self) -> String {
        self.configuration().name
    }

    // ---- Blob operations ----

    /// Create a blob from streamed content.
    ///
    /// When `blob_id` is `None` the store allocates one.
    fn create(
        &self,
        content: &mut dyn Read,
        headers: &BlobHeaders,
        blob_id: Option<BlobId>,
    ) -> StoreResult<Blob>;

    /// Create a blob from a file whose size and hash were computed by the
    /// caller.
    fn create_from_path(
        &self,
        path: &Path,
        headers: &BlobHeaders,
        size: u64,
        hash: ContentHash,
    ) -> StoreResult<Blob>;

    /// Duplicate a live blob under a new id with the given headers.
    fn copy(&self, blob_id: &BlobId, headers: &BlobHeaders) -> StoreResult<Blob>;

    /// Read a live blob. Soft-deleted blobs are reported as absent.
    fn get(&self, blob_id: &BlobId) -> StoreResult<Option<Blob>> {
        self.get_with_deleted(blob_id, false)
    }

    /// Read a blob, optionally including soft-deleted ones.
    fn get_with_deleted(&self, blob_id: &BlobId, include_deleted: bool) -> StoreResult<Option<Blob>>;

    /// Returns `true` if the store holds a live copy of the blob.
    /// Soft-deleted blobs are reported absent.
    fn exists(&self, blob_id: &BlobId) -> StoreResult<bool>;

    /// Soft-delete a blob. Returns `false` if it was missing or already
    /// soft-deleted.
    fn delete(&self, blob_id: &BlobId, reason: &str) -> StoreResult<bool>;

    /// Physically remove a blob. Returns `true` if it existed.
    fn delete_hard(&self, blob_id: &BlobId) -> StoreResult<bool>;

    /// Restore a soft-deleted blob that the checker reports as still in use.
    ///
    /// Returns `true` if the blob was (or, for a dry run, would be)
    /// restored.
    fn undelete(
        &self,
        checker: Option<&dyn BlobStoreUsageChecker>,
        blob_id: &BlobId,
        attributes: &BlobAttributes,
        dry_run: bool,
    ) -> StoreResult<bool>;

    /// Physically remove soft-deleted blobs that are no longer in use.
    fn compact(&self, checker: Option<&dyn BlobStoreUsageChecker>) -> StoreResult<()>;

    // ---- Enumeration ----

    /// Every blob id held by the store, live or soft-deleted.
    fn blob_id_stream(&self) -> StoreResult<BlobIdStream>;

    /// Ids of direct-path blobs whose path starts with `prefix`.
    fn direct_path_blob_id_stream(&self, prefix: &str) -> StoreResult<BlobIdStream>;

    /// Ids of blobs changed within the last `window`.
    fn blob_id_updated_since_stream(&self, window: Duration) -> StoreResult<BlobIdStream>;

    // ---- Attributes ----

    fn get_blob_attributes(&self, blob_id: &BlobId) -> StoreResult<Option<BlobAttributes>>;

    fn set_blob_attributes(&self, blob_id: &BlobId, attributes: BlobAttributes) -> StoreResult<()>;

    // ---- Metrics and capabilities ----

    fn metrics(&self) -> StoreResult<BlobStoreMetrics>;

    fn operation_metrics(&self) -> StoreResult<OperationMetricsByType>;

    /// Whether new blobs may be written.
    fn is_writable(&self) -> bool {
        true
    }

    /// Whether this store may become a member of a group.
    fn is_groupable(&self) -> bool {
        true
    }

    /// Whether the backing storage is currently reachable.
    fn is_storage_available(&self) -> bool {
        true
    }

    /// Returns `true` if the store holds no blobs at all.
    fn is_empty(&self) -> StoreResult<bool>;

    /// Names of the stores this store is composed of. Empty for leaf stores.
    fn member_names(&self) -> Vec<String> {
        Vec::new()
    }
}
