use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use strata_store::{
    BlobStore, InMemoryBlobStore, MemoryVolume, StoreResult, MEMORY_SECTION, MEMORY_TYPE,
    VOLUME_KEY,
};
use strata_types::BlobStoreConfiguration;
use tracing::debug;

/// Factory for [`InMemoryBlobStore`]s.
///
/// Owns the table of [`MemoryVolume`]s. A configuration is pinned to a
/// volume when it is sanitized (defaulting to the store's own name), so a
/// store re-created under a new name with the same attributes sees the
/// same data. A volume is dropped from the table once a registry deletes
/// the store owning it.
#[derive(Debug, Default)]
pub struct MemoryBlobStoreFactory {
    volumes: Mutex<HashMap<String, Arc<MemoryVolume>>>,
}

impl MemoryBlobStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The named volume, created empty on first use.
    pub fn volume(&self, name: &str) -> Arc<MemoryVolume> {
        let mut volumes = self.volumes.lock().expect("lock poisoned");
        Arc::clone(
            volumes
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryVolume::new(name))),
        )
    }

    /// Names of the volumes currently held, sorted.
    pub fn volume_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.volumes.lock().expect("lock poisoned").keys().cloned().collect();
        names.sort();
        names
    }
}

impl crate::BlobStoreFactory for MemoryBlobStoreFactory {
    fn store_type(&self) -> &str {
        MEMORY_TYPE
    }

    fn sanitize(&self, mut configuration: BlobStoreConfiguration) -> StoreResult<BlobStoreConfiguration> {
        if configuration
            .string_attribute(MEMORY_SECTION, VOLUME_KEY)?
            .is_none()
        {
            let volume = configuration.name.clone();
            configuration.set_attribute(MEMORY_SECTION, VOLUME_KEY, volume);
        }
        Ok(configuration)
    }

    fn build(&self, configuration: &BlobStoreConfiguration) -> StoreResult<Arc<dyn BlobStore>> {
        let volume = configuration
            .string_attribute(MEMORY_SECTION, VOLUME_KEY)?
            .unwrap_or_else(|| configuration.name.clone());
        Ok(Arc::new(InMemoryBlobStore::new(self.volume(&volume))))
    }

    fn release(&self, configuration: &BlobStoreConfiguration) {
        let volume = match configuration.string_attribute(MEMORY_SECTION, VOLUME_KEY) {
            Ok(Some(volume)) => volume,
            _ => configuration.name.clone(),
        };
        if self.volumes.lock().expect("lock poisoned").remove(&volume).is_some() {
            debug!(%volume, "released memory volume");
        }
    }
}
