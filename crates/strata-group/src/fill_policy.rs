//! Placement strategies for new blobs.
//!
//! A [`FillPolicy`] picks the member that receives a blob created through a
//! group. Policies are looked up by name in a [`FillPolicyRegistry`] when
//! the group starts; an unknown or missing name falls back to
//! [`WriteToFirstMemberFillPolicy`] with a warning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strata_store::{BlobStore, StoreResult};
use strata_types::BlobHeaders;
use tracing::warn;

use crate::group::BlobStoreGroup;

/// Name of [`WriteToFirstMemberFillPolicy`].
pub const WRITE_TO_FIRST: &str = "writeToFirst";

/// Name of [`RoundRobinFillPolicy`].
pub const ROUND_ROBIN: &str = "roundRobin";

/// Chooses the member of a group that receives a new blob.
///
/// Implementations must only return handles taken from
/// [`BlobStoreGroup::members`]. `Ok(None)` means no member can take the
/// blob.
pub trait FillPolicy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn choose(&self, group: &BlobStoreGroup, headers: &BlobHeaders) -> StoreResult<Option<Arc<dyn BlobStore>>>;
}

/// Always the first configured member.
#[derive(Debug, Default)]
pub struct WriteToFirstMemberFillPolicy;

impl FillPolicy for WriteToFirstMemberFillPolicy {
    fn name(&self) -> &str {
        WRITE_TO_FIRST
    }

    fn choose(&self, group: &BlobStoreGroup, _headers: &BlobHeaders) -> StoreResult<Option<Arc<dyn BlobStore>>> {
        Ok(group.members()?.into_iter().next())
    }
}

/// Cycles through the members that are writable and available.
#[derive(Debug, Default)]
pub struct RoundRobinFillPolicy {
    next: AtomicUsize,
}

impl FillPolicy for RoundRobinFillPolicy {
    fn name(&self) -> &str {
        ROUND_ROBIN
    }

    fn choose(&self, group: &BlobStoreGroup, _headers: &BlobHeaders) -> StoreResult<Option<Arc<dyn BlobStore>>> {
        let eligible: Vec<Arc<dyn BlobStore>> = group
            .members()?
            .into_iter()
            .filter(|member| member.is_writable() && member.is_storage_available())
            .collect();
        if eligible.is_empty() {
            return Ok(None);
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % eligible.len();
        Ok(eligible.into_iter().nth(index))
    }
}

type FillPolicyFactory = Arc<dyn Fn() -> Box<dyn FillPolicy> + Send + Sync>;

/// Fill policy factories by name.
#[derive(Clone, Default)]
pub struct FillPolicyRegistry {
    factories: HashMap<String, FillPolicyFactory>,
}

impl FillPolicyRegistry {
    /// A registry with no policies. [`resolve`](Self::resolve) still
    /// returns the write-to-first fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in policies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(WRITE_TO_FIRST, || Box::new(WriteToFirstMemberFillPolicy));
        registry.register(ROUND_ROBIN, || Box::new(RoundRobinFillPolicy::default()));
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn FillPolicy> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered policy names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// A fresh policy instance for the group `group`. Never fails: an unset
    /// or unknown name yields the write-to-first policy.
    pub fn resolve(&self, group: &str, name: Option<&str>) -> Box<dyn FillPolicy> {
        match name.and_then(|n| self.factories.get(n)) {
            Some(factory) => factory(),
            None => {
                warn!(
                    %group,
                    requested = name.unwrap_or("<unset>"),
                    fallback = WRITE_TO_FIRST,
                    "unknown fill policy, using fallback"
                );
                Box::new(WriteToFirstMemberFillPolicy)
            }
        }
    }
}

impl std::fmt::Debug for FillPolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillPolicyRegistry")
            .field("policies", &self.names())
            .finish()
    }
}
