//! Registry and factory interfaces.
//!
//! Composite stores look their members up through [`BlobStoreRegistry`], so
//! any registry backend (in-memory, database-backed) can host groups.

use std::sync::Arc;

use strata_store::{BlobStore, StoreResult};
use strata_types::BlobStoreConfiguration;

/// Lookup and lifecycle management of named blob stores.
pub trait BlobStoreRegistry: Send + Sync {
    /// A started store by exact name.
    fn get(&self, name: &str) -> StoreResult<Option<Arc<dyn BlobStore>>>;

    /// Build, initialise, start and track a store.
    ///
    /// Fails with `AlreadyExists` if a store with the same name (compared
    /// case-insensitively) is tracked, and with `UnknownStoreType` if no
    /// factory handles the configuration's type. Nothing is tracked on
    /// failure.
    fn create(&self, configuration: BlobStoreConfiguration) -> StoreResult<Arc<dyn BlobStore>>;

    /// Shut a store down and stop tracking it. Its stored data is left in
    /// place.
    fn force_delete(&self, name: &str) -> StoreResult<()>;

    /// Shut a store down, stop tracking it and release its data.
    fn delete(&self, name: &str) -> StoreResult<()>;

    fn exists(&self, name: &str) -> bool;

    /// Names of all tracked stores, sorted.
    fn names(&self) -> Vec<String>;

    /// Name of the composite store that lists `name` as a member, if any.
    fn find_parent(&self, name: &str) -> Option<String>;
}

/// Builds stores of one type.
pub trait BlobStoreFactory: Send + Sync {
    /// The `type` value this factory handles.
    fn store_type(&self) -> &str;

    /// Normalise a configuration before it is validated and stored.
    fn sanitize(&self, configuration: BlobStoreConfiguration) -> StoreResult<BlobStoreConfiguration> {
        Ok(configuration)
    }

    /// Reject configurations the store could not run with.
    fn validate(&self, _configuration: &BlobStoreConfiguration) -> StoreResult<()> {
        Ok(())
    }

    /// Construct an uninitialised store for `configuration`.
    fn build(&self, configuration: &BlobStoreConfiguration) -> StoreResult<Arc<dyn BlobStore>>;

    /// Drop whatever the factory keeps for a store whose data was removed.
    fn release(&self, _configuration: &BlobStoreConfiguration) {}
}
