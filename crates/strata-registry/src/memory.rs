//! In-memory store registry.
//!
//! [`InMemoryBlobStoreRegistry`] keeps tracked stores in a `BTreeMap`
//! behind a `RwLock` and dispatches creation to registered factories.
//! Configurations are not persisted; they live as long as the registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use strata_store::{BlobStore, StoreError, StoreResult};
use strata_types::BlobStoreConfiguration;
use tracing::{debug, error, warn};

use crate::factory::MemoryBlobStoreFactory;
use crate::traits::{BlobStoreFactory, BlobStoreRegistry};

/// An in-memory implementation of [`BlobStoreRegistry`].
///
/// Factories for a type must be registered before stores of that type can
/// be created. Store `start` is called while the registry's write lock is
/// held, so a store must not call back into the registry from `start`.
pub struct InMemoryBlobStoreRegistry {
    factories: RwLock<HashMap<String, Arc<dyn BlobStoreFactory>>>,
    stores: RwLock<BTreeMap<String, Arc<dyn BlobStore>>>,
}

impl InMemoryBlobStoreRegistry {
    /// Create an empty registry with no factories.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            stores: RwLock::new(BTreeMap::new()),
        }
    }

    /// A shared registry that can build in-memory stores.
    pub fn with_memory_stores() -> Arc<Self> {
        let registry = Arc::new(Self::new());
        registry.register_factory(Arc::new(MemoryBlobStoreFactory::new()));
        registry
    }

    /// Register (or replace) the factory for its store type.
    pub fn register_factory(&self, factory: Arc<dyn BlobStoreFactory>) {
        let store_type = factory.store_type().to_string();
        debug!(%store_type, "registering blob store factory");
        self.factories
            .write()
            .expect("lock poisoned")
            .insert(store_type, factory);
    }

    fn factory(&self, store_type: &str) -> StoreResult<Arc<dyn BlobStoreFactory>> {
        self.factories
            .read()
            .expect("lock poisoned")
            .get(store_type)
            .cloned()
            .ok_or_else(|| StoreError::UnknownStoreType(store_type.to_string()))
    }

    fn untrack(&self, name: &str) -> StoreResult<Arc<dyn BlobStore>> {
        let store = self
            .stores
            .write()
            .expect("lock poisoned")
            .remove(name)
            .ok_or_else(|| StoreError::StoreNotFound(name.to_string()))?;
        debug!(store = %name, "untracking blob store");
        Ok(store)
    }
}

impl Default for InMemoryBlobStoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStoreRegistry for InMemoryBlobStoreRegistry {
    fn get(&self, name: &str) -> StoreResult<Option<Arc<dyn BlobStore>>> {
        Ok(self.stores.read().expect("lock poisoned").get(name).cloned())
    }

    fn create(&self, configuration: BlobStoreConfiguration) -> StoreResult<Arc<dyn BlobStore>> {
        let factory = self.factory(&configuration.store_type)?;
        let configuration = factory.sanitize(configuration)?;
        // Validation may look other stores up, so it runs before the write
        // lock is taken.
        factory.validate(&configuration)?;

        let name = configuration.name.clone();
        let mut stores = self.stores.write().expect("lock poisoned");
        if stores.keys().any(|existing| existing.eq_ignore_ascii_case(&name)) {
            return Err(StoreError::AlreadyExists(name));
        }

        let store = factory.build(&configuration)?;
        store.init(configuration)?;
        if let Err(e) = store.start() {
            error!(store = %name, error = %e, "failed to start blob store");
            if let Err(remove_err) = store.remove() {
                warn!(store = %name, error = %remove_err, "failed to remove blob store after start failure");
            }
            return Err(e);
        }

        debug!(store = %name, store_type = %factory.store_type(), "tracking blob store");
        stores.insert(name, Arc::clone(&store));
        Ok(store)
    }

    fn force_delete(&self, name: &str) -> StoreResult<()> {
        let store = self.untrack(name)?;
        if let Err(e) = store.shutdown() {
            warn!(store = %name, error = %e, "failed to shut down blob store");
        }
        Ok(())
    }

    fn delete(&self, name: &str) -> StoreResult<()> {
        if let Some(parent) = self.find_parent(name) {
            return Err(StoreError::InvalidConfiguration {
                store: name.to_string(),
                reason: format!("blob store is a member of group '{parent}'"),
            });
        }
        let store = self.untrack(name)?;
        store.shutdown()?;
        store.remove()?;
        let configuration = store.configuration();
        if let Ok(factory) = self.factory(&configuration.store_type) {
            factory.release(&configuration);
        }
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.stores.read().expect("lock poisoned").contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        self.stores.read().expect("lock poisoned").keys().cloned().collect()
    }

    fn find_parent(&self, name: &str) -> Option<String> {
        self.stores
            .read()
            .expect("lock poisoned")
            .iter()
            .find(|(_, store)| store.member_names().iter().any(|member| member == name))
            .map(|(parent, _)| parent.clone())
    }
}

impl std::fmt::Debug for InMemoryBlobStoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<String> = self
            .factories
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        types.sort();
        f.debug_struct("InMemoryBlobStoreRegistry")
            .field("store_types", &types)
            .field("stores", &self.names())
            .finish()
    }
}
