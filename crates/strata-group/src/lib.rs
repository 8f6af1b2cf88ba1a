//! Composite blob stores for Strata.
//!
//! A [`BlobStoreGroup`] presents several registered member stores as one
//! [`BlobStore`](strata_store::BlobStore). New blobs go to the member picked
//! by the group's [`FillPolicy`]; reads, deletes and attribute updates find
//! the owning member through a bounded [`LocationCache`] and fall back to
//! scanning members in configured order.
//!
//! # Modules
//!
//! - [`group`] -- [`BlobStoreGroup`]
//! - [`config`] -- the `group` configuration section and tuning settings
//! - [`fill_policy`] -- placement strategies and their registry
//! - [`cache`] -- [`LocationCache`], blob id to owning member
//! - [`resolver`] -- [`MemberResolver`], lazy single-flight member lookup
//! - [`factory`] -- [`GroupBlobStoreFactory`] for the registry
//! - [`promote`] -- [`Promoter`], turning a store into a one-member group
//!
//! # Usage
//!
//! ```no_run
//! use strata_group::{GroupBlobStoreFactory, GroupConfiguration, GroupSettings};
//! use strata_registry::{BlobStoreRegistry, InMemoryBlobStoreRegistry};
//! use strata_store::{BlobStore, MEMORY_TYPE};
//! use strata_types::BlobStoreConfiguration;
//!
//! let registry = InMemoryBlobStoreRegistry::with_memory_stores();
//! GroupBlobStoreFactory::install(&registry, GroupSettings::default());
//! registry.create(BlobStoreConfiguration::new("a", MEMORY_TYPE))?;
//! registry.create(BlobStoreConfiguration::new("b", MEMORY_TYPE))?;
//!
//! let group = registry.create(
//!     GroupConfiguration::new(vec!["a".into(), "b".into()], None).to_configuration("grp"),
//! )?;
//! let blob = group.create(&mut &b"hello"[..], &Default::default(), None)?;
//! assert!(group.exists(blob.id())?);
//! # Ok::<(), strata_store::StoreError>(())
//! ```

pub mod cache;
pub mod config;
pub mod factory;
pub mod fill_policy;
pub mod group;
pub mod promote;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use cache::LocationCache;
pub use config::{
    GroupConfiguration, GroupSettings, CONFIG_KEY, DEFAULT_LOCATION_CACHE_CAPACITY, DEFAULT_LOCATION_CACHE_TTL,
    FILL_POLICY_KEY, GROUP_TYPE, MEMBERS_KEY,
};
pub use factory::GroupBlobStoreFactory;
pub use fill_policy::{
    FillPolicy, FillPolicyRegistry, RoundRobinFillPolicy, WriteToFirstMemberFillPolicy, ROUND_ROBIN, WRITE_TO_FIRST,
};
pub use group::BlobStoreGroup;
pub use promote::{PromotionState, Promoter, PROMOTED_SUFFIX};
pub use resolver::MemberResolver;
