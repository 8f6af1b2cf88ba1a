use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use strata_registry::BlobStoreRegistry;
use strata_store::{BlobStore, StoreError, StoreResult};
use tracing::{debug, warn};

/// Turns a group's configured member names into live store handles.
///
/// Resolution runs at most once: the first caller looks every name up in
/// the registry, concurrent first callers block on that same lookup, and
/// everyone after reads the memoized list. A failed resolution publishes
/// nothing.
pub struct MemberResolver {
    group: String,
    names: Vec<String>,
    registry: Weak<dyn BlobStoreRegistry>,
    members: OnceCell<Vec<Arc<dyn BlobStore>>>,
}

impl MemberResolver {
    pub fn new(group: impl Into<String>, names: Vec<String>, registry: Weak<dyn BlobStoreRegistry>) -> Self {
        Self {
            group: group.into(),
            names,
            registry,
            members: OnceCell::new(),
        }
    }

    /// Members in configured order, resolving them on first use.
    pub fn members(&self) -> StoreResult<&[Arc<dyn BlobStore>]> {
        self.members
            .get_or_try_init(|| self.resolve())
            .map(Vec::as_slice)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_resolved(&self) -> bool {
        self.members.get().is_some()
    }

    fn resolve(&self) -> StoreResult<Vec<Arc<dyn BlobStore>>> {
        let registry = self.registry.upgrade().ok_or(StoreError::RegistryUnavailable)?;
        let mut members = Vec::with_capacity(self.names.len());
        for name in &self.names {
            let Some(store) = registry.get(name)? else {
                warn!(group = %self.group, member = %name, "unable to find member blob store");
                return Err(self.unresolved(name, "no blob store with that name"));
            };
            if !store.is_groupable() {
                return Err(self.unresolved(name, "blob store cannot be a group member"));
            }
            members.push(store);
        }
        debug!(group = %self.group, members = ?self.names, "resolved group members");
        Ok(members)
    }

    fn unresolved(&self, member: &str, reason: &str) -> StoreError {
        StoreError::MemberResolution {
            group: self.group.clone(),
            member: member.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Debug for MemberResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberResolver")
            .field("group", &self.group)
            .field("names", &self.names)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
