use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use strata_types::{
    headers, BlobAttributes, BlobHeaders, BlobId, BlobMetrics, BlobStoreConfiguration,
    BlobStoreMetrics, ContentHash, LifecycleState, OperationMetrics, OperationMetricsByType,
    OperationType,
};
use tracing::{debug, info, warn};

use crate::blob::Blob;
use crate::error::{StoreError, StoreResult};
use crate::guard::StateGuard;
use crate::traits::{BlobIdStream, BlobStore, BlobStoreUsageChecker};

/// Store type name for [`InMemoryBlobStore`].
pub const MEMORY_TYPE: &str = "Memory";

/// Attribute section of in-memory store configurations.
pub const MEMORY_SECTION: &str = "memory";

/// Attribute naming the [`MemoryVolume`] a store is bound to.
pub const VOLUME_KEY: &str = "volume";

#[derive(Clone, Debug)]
struct StoredBlob {
    content: Bytes,
    attributes: BlobAttributes,
}

impl StoredBlob {
    fn to_blob(&self, id: &BlobId) -> Blob {
        Blob::new(
            id.clone(),
            self.attributes.headers.clone(),
            self.attributes.metrics.clone(),
            self.content.clone(),
        )
    }
}

/// Named in-memory storage area shared by every store bound to it.
///
/// The volume plays the role a directory plays for a file-backed store: the
/// store is just a view over it, so dropping or renaming the store leaves
/// the data in place.
pub struct MemoryVolume {
    name: String,
    blobs: RwLock<BTreeMap<BlobId, StoredBlob>>,
}

impl MemoryVolume {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blobs: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of blobs held, live or soft-deleted.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total content bytes across all blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.attributes.metrics.content_size)
            .sum()
    }

    /// Drop every blob.
    pub fn clear(&self) {
        self.blobs.write().expect("lock poisoned").clear();
    }
}

impl std::fmt::Debug for MemoryVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryVolume")
            .field("name", &self.name)
            .field("blob_count", &self.len())
            .finish()
    }
}

/// In-memory blob store over a [`MemoryVolume`].
///
/// Intended for tests and embedding. Blob content is held as [`Bytes`], so
/// reads never copy.
pub struct InMemoryBlobStore {
    volume: Arc<MemoryVolume>,
    configuration: RwLock<BlobStoreConfiguration>,
    guard: StateGuard,
    writable: AtomicBool,
    available: AtomicBool,
    operations: Mutex<OperationMetricsByType>,
}

impl InMemoryBlobStore {
    /// A store bound to `volume`. It must be `init`ed before it is started.
    pub fn new(volume: Arc<MemoryVolume>) -> Self {
        let configuration = BlobStoreConfiguration::new(volume.name(), MEMORY_TYPE)
            .with_attribute(MEMORY_SECTION, VOLUME_KEY, volume.name());
        Self {
            volume,
            configuration: RwLock::new(configuration),
            guard: StateGuard::new(),
            writable: AtomicBool::new(true),
            available: AtomicBool::new(true),
            operations: Mutex::new(OperationMetricsByType::new()),
        }
    }

    /// A store named `name` over a private volume of the same name.
    pub fn with_name(name: &str) -> Self {
        Self::new(Arc::new(MemoryVolume::new(name)))
    }

    /// The backing volume.
    pub fn volume(&self) -> &Arc<MemoryVolume> {
        &self.volume
    }

    /// Toggle whether new blobs are accepted.
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// Toggle whether the store reports its storage as reachable.
    pub fn set_storage_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_started(&self, operation: &str) -> StoreResult<String> {
        let name = self.name();
        self.guard.ensure_started(&name, operation)?;
        Ok(name)
    }

    fn ensure_writable(&self, operation: &str) -> StoreResult<String> {
        let name = self.ensure_started(operation)?;
        if !self.is_writable() {
            return Err(StoreError::ReadOnly(name));
        }
        Ok(name)
    }

    fn allocate_id(headers: &BlobHeaders, requested: Option<BlobId>) -> StoreResult<BlobId> {
        if let Some(id) = requested {
            return Ok(id);
        }
        if headers.get(headers::DIRECT_PATH).map(String::as_str) == Some("true") {
            let name = headers
                .get(headers::BLOB_NAME)
                .ok_or(StoreError::MissingHeader(headers::BLOB_NAME))?;
            return Ok(BlobId::direct_path(name));
        }
        Ok(BlobId::random())
    }

    fn write_blob(&self, id: BlobId, headers: &BlobHeaders, content: Bytes, hash: ContentHash) -> Blob {
        let metrics = BlobMetrics::new(hash, content.len() as u64);
        let stored = StoredBlob {
            content,
            attributes: BlobAttributes::new(headers.clone(), metrics),
        };
        let blob = stored.to_blob(&id);
        self.volume
            .blobs
            .write()
            .expect("lock poisoned")
            .insert(id, stored);
        blob
    }

    fn record(&self, op: OperationType, size: u64, success: bool, started: Instant) {
        let sample = OperationMetrics {
            blob_size: size,
            successful_requests: u64::from(success),
            error_requests: u64::from(!success),
            time_on_requests_ms: started.elapsed().as_millis() as u64,
        };
        let mut operations = self.operations.lock().expect("lock poisoned");
        let entry = operations.entry(op).or_default();
        *entry = entry.add(sample);
    }

    fn collect_ids(&self, filter: impl Fn(&BlobId, &StoredBlob) -> bool) -> BlobIdStream {
        let ids: Vec<BlobId> = self
            .volume
            .blobs
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|(id, blob)| filter(id, blob))
            .map(|(id, _)| id.clone())
            .collect();
        Box::new(ids.into_iter())
    }
}

impl BlobStore for InMemoryBlobStore {
    fn init(&self, configuration: BlobStoreConfiguration) -> StoreResult<()> {
        self.guard
            .ensure(&configuration.name, "init", &[LifecycleState::New, LifecycleState::Stopped, LifecycleState::Failed])?;
        if let Some(volume) = configuration.string_attribute(MEMORY_SECTION, VOLUME_KEY)? {
            if volume != self.volume.name() {
                return Err(StoreError::InvalidConfiguration {
                    store: configuration.name,
                    reason: format!(
                        "bound to volume '{}' but configured for '{volume}'",
                        self.volume.name()
                    ),
                });
            }
        }
        *self.configuration.write().expect("lock poisoned") = configuration;
        Ok(())
    }

    fn start(&self) -> StoreResult<()> {
        self.guard.transition(
            &self.name(),
            "start",
            LifecycleState::STARTABLE,
            LifecycleState::Started,
        )
    }

    fn stop(&self) -> StoreResult<()> {
        self.guard.transition(
            &self.name(),
            "stop",
            &[LifecycleState::Started],
            LifecycleState::Stopped,
        )
    }

    fn shutdown(&self) -> StoreResult<()> {
        self.guard.force(LifecycleState::Shutdown);
        Ok(())
    }

    fn remove(&self) -> StoreResult<()> {
        let name = self.name();
        self.guard.ensure(&name, "remove", LifecycleState::NOT_RUNNING)?;
        debug!(store = %name, volume = %self.volume.name(), "removing blob store content");
        self.volume.clear();
        Ok(())
    }

    fn state(&self) -> LifecycleState {
        self.guard.current()
    }

    fn configuration(&self) -> BlobStoreConfiguration {
        self.configuration.read().expect("lock poisoned").clone()
    }

    fn create(
        &self,
        content: &mut dyn Read,
        headers: &BlobHeaders,
        blob_id: Option<BlobId>,
    ) -> StoreResult<Blob> {
        self.ensure_writable("create")?;
        let started = Instant::now();
        let mut data = Vec::new();
        if let Err(e) = content.read_to_end(&mut data) {
            self.record(OperationType::Upload, 0, false, started);
            return Err(e.into());
        }
        let id = Self::allocate_id(headers, blob_id)?;
        let data = Bytes::from(data);
        let hash = ContentHash::of(&data);
        let size = data.len() as u64;
        let blob = self.write_blob(id, headers, data, hash);
        self.record(OperationType::Upload, size, true, started);
        Ok(blob)
    }

    fn create_from_path(
        &self,
        path: &Path,
        headers: &BlobHeaders,
        size: u64,
        hash: ContentHash,
    ) -> StoreResult<Blob> {
        self.ensure_writable("create")?;
        let started = Instant::now();
        let data = Bytes::from(std::fs::read(path)?);
        let actual = data.len() as u64;
        if actual != size {
            self.record(OperationType::Upload, 0, false, started);
            return Err(StoreError::SizeMismatch {
                declared: size,
                actual,
            });
        }
        let id = Self::allocate_id(headers, None)?;
        let blob = self.write_blob(id, headers, data, hash);
        self.record(OperationType::Upload, size, true, started);
        Ok(blob)
    }

    fn copy(&self, blob_id: &BlobId, headers: &BlobHeaders) -> StoreResult<Blob> {
        self.ensure_writable("copy")?;
        let (content, hash) = {
            let blobs = self.volume.blobs.read().expect("lock poisoned");
            match blobs.get(blob_id) {
                Some(source) if !source.attributes.deleted => (
                    source.content.clone(),
                    source.attributes.metrics.content_hash,
                ),
                _ => return Err(StoreError::NotFound(blob_id.clone())),
            }
        };
        Ok(self.write_blob(BlobId::random(), headers, content, hash))
    }

    fn get_with_deleted(&self, blob_id: &BlobId, include_deleted: bool) -> StoreResult<Option<Blob>> {
        self.ensure_started("get")?;
        let started = Instant::now();
        let blob = {
            let blobs = self.volume.blobs.read().expect("lock poisoned");
            blobs
                .get(blob_id)
                .filter(|stored| include_deleted || !stored.attributes.deleted)
                .map(|stored| stored.to_blob(blob_id))
        };
        if let Some(found) = &blob {
            self.record(OperationType::Download, found.metrics().content_size, true, started);
        }
        Ok(blob)
    }

    fn exists(&self, blob_id: &BlobId) -> StoreResult<bool> {
        self.ensure_started("exists")?;
        Ok(self
            .volume
            .blobs
            .read()
            .expect("lock poisoned")
            .get(blob_id)
            .is_some_and(|stored| !stored.attributes.deleted))
    }

    fn delete(&self, blob_id: &BlobId, reason: &str) -> StoreResult<bool> {
        let name = self.ensure_started("delete")?;
        let mut blobs = self.volume.blobs.write().expect("lock poisoned");
        match blobs.get_mut(blob_id) {
            None => {
                warn!(store = %name, %blob_id, "attempt to mark-for-delete non-existent blob");
                Ok(false)
            }
            Some(stored) if stored.attributes.deleted => {
                debug!(store = %name, %blob_id, "attempt to delete already-deleted blob");
                Ok(false)
            }
            Some(stored) => {
                stored.attributes.mark_deleted(reason);
                Ok(true)
            }
        }
    }

    fn delete_hard(&self, blob_id: &BlobId) -> StoreResult<bool> {
        let name = self.ensure_started("delete_hard")?;
        debug!(store = %name, %blob_id, "deleting-hard blob");
        Ok(self
            .volume
            .blobs
            .write()
            .expect("lock poisoned")
            .remove(blob_id)
            .is_some())
    }

    fn undelete(
        &self,
        checker: Option<&dyn BlobStoreUsageChecker>,
        blob_id: &BlobId,
        attributes: &BlobAttributes,
        dry_run: bool,
    ) -> StoreResult<bool> {
        let name = self.ensure_started("undelete")?;
        if !attributes.deleted {
            return Ok(false);
        }
        let Some(checker) = checker else {
            return Ok(false);
        };
        if !checker.in_use(&name, blob_id, attributes.blob_name()) {
            return Ok(false);
        }
        let mut blobs = self.volume.blobs.write().expect("lock poisoned");
        let Some(stored) = blobs.get_mut(blob_id) else {
            return Ok(false);
        };
        info!(store = %name, %blob_id, dry_run, "soft-deleted blob still in use, un-deleting");
        if !dry_run {
            stored.attributes.mark_undeleted();
        }
        Ok(true)
    }

    fn compact(&self, checker: Option<&dyn BlobStoreUsageChecker>) -> StoreResult<()> {
        let name = self.ensure_started("compact")?;
        let mut blobs = self.volume.blobs.write().expect("lock poisoned");
        let deleted: Vec<BlobId> = blobs
            .iter()
            .filter(|(_, stored)| stored.attributes.deleted)
            .map(|(id, _)| id.clone())
            .collect();

        let mut removed = 0usize;
        for id in deleted {
            let Some(stored) = blobs.get_mut(&id) else {
                continue;
            };
            let in_use = checker
                .map(|c| c.in_use(&name, &id, stored.attributes.blob_name()))
                .unwrap_or(false);
            if in_use {
                debug!(store = %name, blob_id = %id, "blob still in use, un-deleting during compact");
                stored.attributes.mark_undeleted();
            } else {
                blobs.remove(&id);
                removed += 1;
            }
        }
        debug!(store = %name, removed, "compaction finished");
        Ok(())
    }

    fn blob_id_stream(&self) -> StoreResult<BlobIdStream> {
        self.ensure_started("blob_id_stream")?;
        Ok(self.collect_ids(|_, _| true))
    }

    fn direct_path_blob_id_stream(&self, prefix: &str) -> StoreResult<BlobIdStream> {
        self.ensure_started("direct_path_blob_id_stream")?;
        Ok(self.collect_ids(|id, _| {
            id.direct_path_name()
                .map(|path| path.starts_with(prefix))
                .unwrap_or(false)
        }))
    }

    fn blob_id_updated_since_stream(&self, window: Duration) -> StoreResult<BlobIdStream> {
        self.ensure_started("blob_id_updated_since_stream")?;
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window));
        Ok(self.collect_ids(|_, stored| match cutoff {
            Some(cutoff) => stored.attributes.last_updated >= cutoff,
            None => true,
        }))
    }

    fn get_blob_attributes(&self, blob_id: &BlobId) -> StoreResult<Option<BlobAttributes>> {
        self.ensure_started("get_blob_attributes")?;
        Ok(self
            .volume
            .blobs
            .read()
            .expect("lock poisoned")
            .get(blob_id)
            .map(|stored| stored.attributes.clone()))
    }

    fn set_blob_attributes(&self, blob_id: &BlobId, attributes: BlobAttributes) -> StoreResult<()> {
        let name = self.ensure_started("set_blob_attributes")?;
        match self.volume.blobs.write().expect("lock poisoned").get_mut(blob_id) {
            Some(stored) => stored.attributes = attributes,
            None => debug!(store = %name, %blob_id, "ignoring attributes for non-existent blob"),
        }
        Ok(())
    }

    fn metrics(&self) -> StoreResult<BlobStoreMetrics> {
        self.ensure_started("metrics")?;
        Ok(BlobStoreMetrics {
            blob_count: self.volume.len() as u64,
            total_size: self.volume.total_bytes(),
            available_space: u64::MAX,
            unlimited: true,
        })
    }

    fn operation_metrics(&self) -> StoreResult<OperationMetricsByType> {
        Ok(self.operations.lock().expect("lock poisoned").clone())
    }

    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    fn is_storage_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.volume.is_empty())
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("name", &self.name())
            .field("volume", &self.volume.name())
            .field("state", &self.state())
            .field("blob_count", &self.volume.len())
            .finish()
    }
}
