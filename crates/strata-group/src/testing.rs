//! Test doubles shared by the group crate's unit tests.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use strata_registry::{BlobStoreFactory, BlobStoreRegistry, InMemoryBlobStoreRegistry, MemoryBlobStoreFactory};
use strata_store::{
    Blob, BlobIdStream, BlobStore, BlobStoreUsageChecker, InMemoryBlobStore, StoreError, StoreResult,
    MEMORY_SECTION, MEMORY_TYPE, VOLUME_KEY,
};
use strata_types::{
    headers, BlobAttributes, BlobHeaders, BlobId, BlobStoreConfiguration, BlobStoreMetrics, ContentHash,
    LifecycleState, OperationMetricsByType,
};

use crate::config::{GroupConfiguration, GroupSettings};
use crate::fill_policy::FillPolicyRegistry;
use crate::group::BlobStoreGroup;

pub(crate) const PROBE_TYPE: &str = "Probe";

pub(crate) fn named(name: &str) -> BlobHeaders {
    let mut headers = BlobHeaders::new();
    headers.insert(headers::BLOB_NAME.into(), name.into());
    headers
}

pub(crate) fn weak_registry<R: BlobStoreRegistry + 'static>(registry: &Arc<R>) -> Weak<dyn BlobStoreRegistry> {
    let registry: Arc<dyn BlobStoreRegistry> = registry.clone();
    Arc::downgrade(&registry)
}

/// A registry holding started in-memory stores with the given names.
pub(crate) fn memory_registry(names: &[&str]) -> Arc<InMemoryBlobStoreRegistry> {
    let registry = InMemoryBlobStoreRegistry::with_memory_stores();
    for name in names {
        registry
            .create(BlobStoreConfiguration::new(*name, MEMORY_TYPE))
            .expect("create member");
    }
    registry
}

/// A registry holding started probe stores with the given names.
pub(crate) fn probe_registry(names: &[&str]) -> (Arc<InMemoryBlobStoreRegistry>, Arc<ProbeFactory>) {
    let registry = InMemoryBlobStoreRegistry::with_memory_stores();
    let probes = Arc::new(ProbeFactory::default());
    registry.register_factory(probes.clone());
    for name in names {
        registry
            .create(BlobStoreConfiguration::new(*name, PROBE_TYPE))
            .expect("create probe");
    }
    (registry, probes)
}

/// A started group over `registry` that is not itself registered.
pub(crate) fn start_group(
    registry: &Arc<InMemoryBlobStoreRegistry>,
    name: &str,
    members: &[&str],
    fill_policy: Option<&str>,
) -> BlobStoreGroup {
    let group = BlobStoreGroup::new(
        weak_registry(registry),
        FillPolicyRegistry::with_defaults(),
        GroupSettings::default(),
    );
    let section = GroupConfiguration::new(
        members.iter().map(|m| m.to_string()).collect(),
        fill_policy.map(str::to_string),
    );
    group.init(section.to_configuration(name)).expect("init group");
    group.start().expect("start group");
    group
}

// ---------------------------------------------------------------------------
// Probe store
// ---------------------------------------------------------------------------

/// An in-memory store that counts calls and can be told to misbehave.
#[derive(Debug)]
pub(crate) struct ProbeStore {
    inner: InMemoryBlobStore,
    exists_calls: AtomicUsize,
    fail_deletes: AtomicBool,
    compacting: AtomicUsize,
    max_compacting: AtomicUsize,
}

impl ProbeStore {
    fn new(inner: InMemoryBlobStore) -> Self {
        Self {
            inner,
            exists_calls: AtomicUsize::new(0),
            fail_deletes: AtomicBool::new(false),
            compacting: AtomicUsize::new(0),
            max_compacting: AtomicUsize::new(0),
        }
    }

    pub(crate) fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_counts(&self) {
        self.exists_calls.store(0, Ordering::SeqCst);
    }

    pub(crate) fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn max_concurrent_compactions(&self) -> usize {
        self.max_compacting.load(Ordering::SeqCst)
    }

    pub(crate) fn set_writable(&self, writable: bool) {
        self.inner.set_writable(writable);
    }

    pub(crate) fn set_storage_available(&self, available: bool) {
        self.inner.set_storage_available(available);
    }

    fn injected_failure(&self) -> StoreError {
        StoreError::Io(std::io::Error::other(format!("injected failure on {}", self.inner.name())))
    }
}

impl BlobStore for ProbeStore {
    fn init(&self, configuration: BlobStoreConfiguration) -> StoreResult<()> {
        self.inner.init(configuration)
    }

    fn start(&self) -> StoreResult<()> {
        self.inner.start()
    }

    fn stop(&self) -> StoreResult<()> {
        self.inner.stop()
    }

    fn shutdown(&self) -> StoreResult<()> {
        self.inner.shutdown()
    }

    fn remove(&self) -> StoreResult<()> {
        self.inner.remove()
    }

    fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    fn configuration(&self) -> BlobStoreConfiguration {
        self.inner.configuration()
    }

    fn create(&self, content: &mut dyn Read, headers: &BlobHeaders, blob_id: Option<BlobId>) -> StoreResult<Blob> {
        self.inner.create(content, headers, blob_id)
    }

    fn create_from_path(&self, path: &Path, headers: &BlobHeaders, size: u64, hash: ContentHash) -> StoreResult<Blob> {
        self.inner.create_from_path(path, headers, size, hash)
    }

    fn copy(&self, blob_id: &BlobId, headers: &BlobHeaders) -> StoreResult<Blob> {
        self.inner.copy(blob_id, headers)
    }

    fn get_with_deleted(&self, blob_id: &BlobId, include_deleted: bool) -> StoreResult<Option<Blob>> {
        self.inner.get_with_deleted(blob_id, include_deleted)
    }

    fn exists(&self, blob_id: &BlobId) -> StoreResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.exists(blob_id)
    }

    fn delete(&self, blob_id: &BlobId, reason: &str) -> StoreResult<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(self.injected_failure());
        }
        self.inner.delete(blob_id, reason)
    }

    fn delete_hard(&self, blob_id: &BlobId) -> StoreResult<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(self.injected_failure());
        }
        self.inner.delete_hard(blob_id)
    }

    fn undelete(
        &self,
        checker: Option<&dyn BlobStoreUsageChecker>,
        blob_id: &BlobId,
        attributes: &BlobAttributes,
        dry_run: bool,
    ) -> StoreResult<bool> {
        self.inner.undelete(checker, blob_id, attributes, dry_run)
    }

    fn compact(&self, checker: Option<&dyn BlobStoreUsageChecker>) -> StoreResult<()> {
        let running = self.compacting.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_compacting.fetch_max(running, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        let result = self.inner.compact(checker);
        self.compacting.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn blob_id_stream(&self) -> StoreResult<BlobIdStream> {
        self.inner.blob_id_stream()
    }

    fn direct_path_blob_id_stream(&self, prefix: &str) -> StoreResult<BlobIdStream> {
        self.inner.direct_path_blob_id_stream(prefix)
    }

    fn blob_id_updated_since_stream(&self, window: Duration) -> StoreResult<BlobIdStream> {
        self.inner.blob_id_updated_since_stream(window)
    }

    fn get_blob_attributes(&self, blob_id: &BlobId) -> StoreResult<Option<BlobAttributes>> {
        self.inner.get_blob_attributes(blob_id)
    }

    fn set_blob_attributes(&self, blob_id: &BlobId, attributes: BlobAttributes) -> StoreResult<()> {
        self.inner.set_blob_attributes(blob_id, attributes)
    }

    fn metrics(&self) -> StoreResult<BlobStoreMetrics> {
        self.inner.metrics()
    }

    fn operation_metrics(&self) -> StoreResult<OperationMetricsByType> {
        self.inner.operation_metrics()
    }

    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }

    fn is_storage_available(&self) -> bool {
        self.inner.is_storage_available()
    }

    fn is_empty(&self) -> StoreResult<bool> {
        self.inner.is_empty()
    }
}

/// Builds [`ProbeStore`]s and keeps typed handles to them.
#[derive(Debug, Default)]
pub(crate) struct ProbeFactory {
    memory: MemoryBlobStoreFactory,
    probes: Mutex<HashMap<String, Arc<ProbeStore>>>,
}

impl ProbeFactory {
    /// The most recently built probe named `name`.
    pub(crate) fn probe(&self, name: &str) -> Arc<ProbeStore> {
        self.probes
            .lock()
            .expect("lock poisoned")
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("no probe named {name}"))
    }
}

impl BlobStoreFactory for ProbeFactory {
    fn store_type(&self) -> &str {
        PROBE_TYPE
    }

    fn sanitize(&self, configuration: BlobStoreConfiguration) -> StoreResult<BlobStoreConfiguration> {
        self.memory.sanitize(configuration)
    }

    fn release(&self, configuration: &BlobStoreConfiguration) {
        self.memory.release(configuration);
    }

    fn build(&self, configuration: &BlobStoreConfiguration) -> StoreResult<Arc<dyn BlobStore>> {
        let volume = configuration
            .string_attribute(MEMORY_SECTION, VOLUME_KEY)?
            .unwrap_or_else(|| configuration.name.clone());
        let probe = Arc::new(ProbeStore::new(InMemoryBlobStore::new(self.memory.volume(&volume))));
        self.probes
            .lock()
            .expect("lock poisoned")
            .insert(configuration.name.clone(), Arc::clone(&probe));
        Ok(probe)
    }
}

// ---------------------------------------------------------------------------
// Instrumented registry
// ---------------------------------------------------------------------------

/// Wraps a registry, counting lookups and failing chosen creations.
pub(crate) struct InstrumentedRegistry {
    inner: Arc<InMemoryBlobStoreRegistry>,
    lookups: Mutex<HashMap<String, usize>>,
    failing_names: Mutex<HashSet<String>>,
    failing_types: Mutex<HashSet<String>>,
    failing_deregistrations: Mutex<HashSet<String>>,
}

impl InstrumentedRegistry {
    pub(crate) fn new(inner: Arc<InMemoryBlobStoreRegistry>) -> Self {
        Self {
            inner,
            lookups: Mutex::new(HashMap::new()),
            failing_names: Mutex::new(HashSet::new()),
            failing_types: Mutex::new(HashSet::new()),
            failing_deregistrations: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn lookups(&self, name: &str) -> usize {
        self.lookups
            .lock()
            .expect("lock poisoned")
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Make every `create` of a store named `name` fail.
    pub(crate) fn fail_create_of(&self, name: &str) {
        self.failing_names
            .lock()
            .expect("lock poisoned")
            .insert(name.to_string());
    }

    /// Make every `create` of a store of type `store_type` fail.
    pub(crate) fn fail_create_of_type(&self, store_type: &str) {
        self.failing_types
            .lock()
            .expect("lock poisoned")
            .insert(store_type.to_string());
    }

    /// Make every `force_delete` of the store named `name` fail.
    pub(crate) fn fail_force_delete_of(&self, name: &str) {
        self.failing_deregistrations
            .lock()
            .expect("lock poisoned")
            .insert(name.to_string());
    }

    fn should_fail(&self, configuration: &BlobStoreConfiguration) -> bool {
        self.failing_names
            .lock()
            .expect("lock poisoned")
            .contains(&configuration.name)
            || self
                .failing_types
                .lock()
                .expect("lock poisoned")
                .contains(&configuration.store_type)
    }
}

impl BlobStoreRegistry for InstrumentedRegistry {
    fn get(&self, name: &str) -> StoreResult<Option<Arc<dyn BlobStore>>> {
        *self
            .lookups
            .lock()
            .expect("lock poisoned")
            .entry(name.to_string())
            .or_default() += 1;
        // widen the race window for concurrent resolution
        thread::sleep(Duration::from_millis(1));
        self.inner.get(name)
    }

    fn create(&self, configuration: BlobStoreConfiguration) -> StoreResult<Arc<dyn BlobStore>> {
        if self.should_fail(&configuration) {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "injected create failure for {} ({})",
                configuration.name, configuration.store_type
            ))));
        }
        self.inner.create(configuration)
    }

    fn force_delete(&self, name: &str) -> StoreResult<()> {
        if self
            .failing_deregistrations
            .lock()
            .expect("lock poisoned")
            .contains(name)
        {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "injected force_delete failure for {name}"
            ))));
        }
        self.inner.force_delete(name)
    }

    fn delete(&self, name: &str) -> StoreResult<()> {
        self.inner.delete(name)
    }

    fn exists(&self, name: &str) -> bool {
        self.inner.exists(name)
    }

    fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    fn find_parent(&self, name: &str) -> Option<String> {
        self.inner.find_parent(name)
    }
}
