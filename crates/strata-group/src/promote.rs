//! Converting a standalone store into a single-member group.
//!
//! Promotion re-registers the store under a derived name and registers a
//! group under the original name that lists it as its only member, so
//! everything addressing the original name keeps working. The steps run as
//! a small state machine; a failure walks back through the states reached,
//! undoing each one.

use std::sync::Arc;

use strata_registry::BlobStoreRegistry;
use strata_store::{BlobStore, StoreError, StoreResult};
use strata_types::BlobStoreConfiguration;
use tracing::{debug, error, info};

use crate::config::{GroupConfiguration, GROUP_TYPE};
use crate::fill_policy::WRITE_TO_FIRST;

/// Appended to a promoted store's name.
pub const PROMOTED_SUFFIX: &str = "-promoted";

/// Progress of a promotion, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PromotionState {
    Pending,
    /// The store's configuration carries the derived name (in memory only).
    Renamed,
    /// The original name is no longer registered.
    Deregistered,
    /// The store is registered under the derived name.
    Reregistered,
    /// A group is registered under the original name.
    GroupCreated,
}

impl PromotionState {
    /// The state a rollback returns to from `self`.
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::Pending => None,
            Self::Renamed => Some(Self::Pending),
            Self::Deregistered => Some(Self::Renamed),
            Self::Reregistered => Some(Self::Deregistered),
            Self::GroupCreated => Some(Self::Reregistered),
        }
    }
}

/// Promotes stores registered in one registry.
pub struct Promoter {
    registry: Arc<dyn BlobStoreRegistry>,
    suffix: String,
}

impl Promoter {
    pub fn new(registry: Arc<dyn BlobStoreRegistry>) -> Self {
        Self {
            registry,
            suffix: PROMOTED_SUFFIX.to_string(),
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn derived_name(&self, name: &str) -> String {
        format!("{name}{}", self.suffix)
    }

    /// Fail unless `store` can be promoted right now.
    pub fn check_convertible(&self, store: &dyn BlobStore) -> StoreResult<()> {
        let name = store.name();
        let not_convertible = |reason: String| StoreError::NotConvertible {
            store: name.clone(),
            reason,
        };

        if !self.registry.exists(&name) {
            return Err(StoreError::StoreNotFound(name));
        }
        if !store.is_groupable() {
            return Err(not_convertible("blob store cannot be a group member".into()));
        }
        if !store.is_writable() {
            return Err(not_convertible("blob store is read-only".into()));
        }
        if let Some(parent) = self.registry.find_parent(&name) {
            return Err(not_convertible(format!("blob store already belongs to group '{parent}'")));
        }
        let derived = self.derived_name(&name);
        if self.registry.exists(&derived) {
            return Err(StoreError::AlreadyExists(derived));
        }
        Ok(())
    }

    /// Replace `store` with a group of the same name holding only `store`.
    ///
    /// On failure every step already taken is undone and the error of the
    /// failing step is returned.
    pub fn promote(&self, store: &dyn BlobStore) -> StoreResult<Arc<dyn BlobStore>> {
        self.check_convertible(store)?;
        let original = store.configuration();
        let derived_name = self.derived_name(&original.name);
        info!(store = %original.name, derived = %derived_name, "promoting blob store to group");
        Promotion::new(self.registry.as_ref(), original, derived_name).run()
    }
}

impl std::fmt::Debug for Promoter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promoter")
            .field("suffix", &self.suffix)
            .finish()
    }
}

struct Promotion<'a> {
    registry: &'a dyn BlobStoreRegistry,
    original: BlobStoreConfiguration,
    derived: BlobStoreConfiguration,
    derived_name: String,
    group: BlobStoreConfiguration,
    state: PromotionState,
}

impl<'a> Promotion<'a> {
    fn new(registry: &'a dyn BlobStoreRegistry, original: BlobStoreConfiguration, derived_name: String) -> Self {
        let mut group = original.clone();
        group.store_type = GROUP_TYPE.to_string();
        GroupConfiguration::new(vec![derived_name.clone()], Some(WRITE_TO_FIRST.to_string()))
            .apply_to(&mut group);
        Self {
            registry,
            derived: original.clone(),
            original,
            derived_name,
            group,
            state: PromotionState::Pending,
        }
    }

    fn run(mut self) -> StoreResult<Arc<dyn BlobStore>> {
        loop {
            match self.advance() {
                Ok(Some(group)) => {
                    info!(store = %self.original.name, derived = %self.derived_name, "promotion complete");
                    return Ok(group);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(
                        store = %self.original.name,
                        state = ?self.state,
                        error = %e,
                        "promotion failed, rolling back"
                    );
                    self.rollback();
                    return Err(e);
                }
            }
        }
    }

    /// Take the step out of the current state. Yields the group once it is
    /// registered.
    fn advance(&mut self) -> StoreResult<Option<Arc<dyn BlobStore>>> {
        let next = match self.state {
            PromotionState::Pending => {
                self.derived.name = self.derived_name.clone();
                PromotionState::Renamed
            }
            PromotionState::Renamed => {
                self.registry.force_delete(&self.original.name)?;
                PromotionState::Deregistered
            }
            PromotionState::Deregistered => {
                self.registry.create(self.derived.clone())?;
                PromotionState::Reregistered
            }
            PromotionState::Reregistered => {
                let group = self.registry.create(self.group.clone())?;
                self.state = PromotionState::GroupCreated;
                return Ok(Some(group));
            }
            PromotionState::GroupCreated => {
                return self
                    .registry
                    .get(&self.group.name)?
                    .map(Some)
                    .ok_or_else(|| StoreError::StoreNotFound(self.group.name.clone()));
            }
        };
        debug!(store = %self.original.name, from = ?self.state, to = ?next, "promotion step");
        self.state = next;
        Ok(None)
    }

    fn rollback(&mut self) {
        while let Some(previous) = self.state.previous() {
            match self.state {
                PromotionState::Reregistered => {
                    if let Err(e) = self.registry.force_delete(&self.derived.name) {
                        error!(store = %self.derived.name, error = %e, "failed to deregister promoted store");
                    }
                }
                PromotionState::Deregistered => {
                    if let Err(e) = self.registry.create(self.original.clone()) {
                        error!(store = %self.original.name, error = %e, "failed to restore original store");
                    }
                }
                _ => {}
            }
            debug!(store = %self.original.name, from = ?self.state, to = ?previous, "promotion step undone");
            self.state = previous;
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_store::MEMORY_TYPE;
    use strata_types::{BlobHeaders, BlobId, LifecycleState};

    use super::*;
    use crate::config::GroupSettings;
    use crate::factory::GroupBlobStoreFactory;
    use crate::testing::{memory_registry, named, probe_registry, InstrumentedRegistry};

    fn with_groups(names: &[&str]) -> Arc<strata_registry::InMemoryBlobStoreRegistry> {
        let registry = memory_registry(names);
        GroupBlobStoreFactory::install(&registry, GroupSettings::default());
        registry
    }

    fn fill(store: &dyn BlobStore, count: usize) -> Vec<BlobId> {
        (0..count)
            .map(|i| {
                let content = format!("blob {i}");
                store
                    .create(&mut content.as_bytes(), &named(&format!("b{i}")), None)
                    .unwrap()
                    .id()
                    .clone()
            })
            .collect()
    }

    fn assert_readable(store: &dyn BlobStore, ids: &[BlobId]) {
        for (i, id) in ids.iter().enumerate() {
            let blob = store.get(id).unwrap().expect("blob should be readable");
            assert_eq!(&blob.content()[..], format!("blob {i}").as_bytes());
        }
    }

    // -------------------------------------------------------------------
    // State machine
    // -------------------------------------------------------------------

    #[test]
    fn states_roll_back_in_order() {
        let mut state = PromotionState::GroupCreated;
        let mut visited = vec![state];
        while let Some(previous) = state.previous() {
            state = previous;
            visited.push(state);
        }
        assert_eq!(
            visited,
            vec![
                PromotionState::GroupCreated,
                PromotionState::Reregistered,
                PromotionState::Deregistered,
                PromotionState::Renamed,
                PromotionState::Pending,
            ]
        );
        assert!(PromotionState::Pending < PromotionState::GroupCreated);
    }

    #[test]
    fn derived_name_uses_suffix() {
        let registry = with_groups(&[]);
        let promoter = Promoter::new(registry.clone());
        assert_eq!(promoter.derived_name("x"), "x-promoted");
        let promoter = Promoter::new(registry).with_suffix("-member");
        assert_eq!(promoter.derived_name("x"), "x-member");
    }

    // -------------------------------------------------------------------
    // Promotion
    // -------------------------------------------------------------------

    #[test]
    fn promoted_store_stays_readable_through_group() {
        let registry = with_groups(&["X"]);
        let store = registry.get("X").unwrap().unwrap();
        let ids = fill(store.as_ref(), 3);

        let group = Promoter::new(registry.clone()).promote(store.as_ref()).unwrap();
        assert_eq!(group.name(), "X");
        assert_eq!(group.configuration().store_type, GROUP_TYPE);
        assert_eq!(group.member_names(), vec!["X-promoted"]);
        assert_eq!(group.state(), LifecycleState::Started);
        assert_readable(group.as_ref(), &ids);

        assert_eq!(registry.names(), vec!["X", "X-promoted"]);
        assert_eq!(registry.find_parent("X-promoted").as_deref(), Some("X"));
        let member = registry.get("X-promoted").unwrap().unwrap();
        assert_eq!(member.configuration().store_type, MEMORY_TYPE);
        assert_readable(member.as_ref(), &ids);
    }

    #[test]
    fn promoted_group_uses_write_to_first() {
        let registry = with_groups(&["X"]);
        let store = registry.get("X").unwrap().unwrap();
        let group = Promoter::new(registry.clone()).promote(store.as_ref()).unwrap();

        let section = GroupConfiguration::from_configuration(&group.configuration()).unwrap();
        assert_eq!(section.members, vec!["X-promoted"]);
        assert_eq!(section.fill_policy.as_deref(), Some(WRITE_TO_FIRST));

        let blob = group.create(&mut &b"after"[..], &BlobHeaders::new(), None).unwrap();
        let member = registry.get("X-promoted").unwrap().unwrap();
        assert!(member.exists(blob.id()).unwrap());
    }

    #[test]
    fn custom_suffix_names_the_member() {
        let registry = with_groups(&["X"]);
        let store = registry.get("X").unwrap().unwrap();
        let ids = fill(store.as_ref(), 1);
        let group = Promoter::new(registry.clone())
            .with_suffix("-legacy")
            .promote(store.as_ref())
            .unwrap();
        assert_eq!(group.member_names(), vec!["X-legacy"]);
        assert_readable(group.as_ref(), &ids);
    }

    // -------------------------------------------------------------------
    // Rollback
    // -------------------------------------------------------------------

    #[test]
    fn failed_group_creation_restores_original() {
        let inner = with_groups(&["X"]);
        let instrumented = Arc::new(InstrumentedRegistry::new(inner.clone()));
        instrumented.fail_create_of_type(GROUP_TYPE);
        let store = inner.get("X").unwrap().unwrap();
        let ids = fill(store.as_ref(), 3);

        let err = Promoter::new(instrumented).promote(store.as_ref()).unwrap_err();
        assert!(err.to_string().contains(GROUP_TYPE), "unexpected error: {err}");

        assert_eq!(inner.names(), vec!["X"]);
        let restored = inner.get("X").unwrap().unwrap();
        assert_eq!(restored.name(), "X");
        assert_eq!(restored.configuration().store_type, MEMORY_TYPE);
        assert_eq!(restored.state(), LifecycleState::Started);
        assert_readable(restored.as_ref(), &ids);
    }

    #[test]
    fn failed_reregistration_restores_original() {
        let inner = with_groups(&["X"]);
        let instrumented = Arc::new(InstrumentedRegistry::new(inner.clone()));
        instrumented.fail_create_of("X-promoted");
        let store = inner.get("X").unwrap().unwrap();
        let ids = fill(store.as_ref(), 2);

        let err = Promoter::new(instrumented).promote(store.as_ref()).unwrap_err();
        assert!(err.to_string().contains("X-promoted"), "unexpected error: {err}");

        assert_eq!(inner.names(), vec!["X"]);
        assert_readable(inner.get("X").unwrap().unwrap().as_ref(), &ids);
    }

    #[test]
    fn failed_deregistration_changes_nothing() {
        let inner = with_groups(&["X"]);
        let instrumented = Arc::new(InstrumentedRegistry::new(inner.clone()));
        instrumented.fail_force_delete_of("X");
        let store = inner.get("X").unwrap().unwrap();
        let ids = fill(store.as_ref(), 2);

        let err = Promoter::new(instrumented).promote(store.as_ref()).unwrap_err();
        assert!(err.to_string().contains("force_delete"), "unexpected error: {err}");

        assert_eq!(inner.names(), vec!["X"]);
        let current = inner.get("X").unwrap().unwrap();
        assert!(Arc::ptr_eq(&current, &store));
        assert_eq!(current.state(), LifecycleState::Started);
        assert_eq!(current.configuration().store_type, MEMORY_TYPE);
        assert_readable(current.as_ref(), &ids);
    }

    #[test]
    fn failed_reregistration_and_resurrection_keeps_root_error() {
        let inner = with_groups(&["X"]);
        let instrumented = Arc::new(InstrumentedRegistry::new(inner.clone()));
        instrumented.fail_create_of("X-promoted");
        instrumented.fail_create_of("X");
        let store = inner.get("X").unwrap().unwrap();

        let err = Promoter::new(instrumented).promote(store.as_ref()).unwrap_err();
        assert!(err.to_string().contains("X-promoted"), "unexpected error: {err}");
        // neither name is registered once resurrection has failed too
        assert!(inner.names().is_empty());
    }

    #[test]
    fn failed_compensation_keeps_root_error() {
        let inner = with_groups(&["X"]);
        let instrumented = Arc::new(InstrumentedRegistry::new(inner.clone()));
        instrumented.fail_create_of_type(GROUP_TYPE);
        instrumented.fail_create_of("X");
        let store = inner.get("X").unwrap().unwrap();

        let err = Promoter::new(instrumented).promote(store.as_ref()).unwrap_err();
        assert!(err.to_string().contains(GROUP_TYPE), "unexpected error: {err}");
        // the derived registration is still undone
        assert!(inner.names().is_empty());
    }

    // -------------------------------------------------------------------
    // Convertibility
    // -------------------------------------------------------------------

    #[test]
    fn unregistered_store_is_rejected() {
        let registry = with_groups(&["X"]);
        let store = registry.get("X").unwrap().unwrap();
        registry.force_delete("X").unwrap();
        let err = Promoter::new(registry).promote(store.as_ref()).unwrap_err();
        assert!(matches!(err, StoreError::StoreNotFound(ref name) if name == "X"));
    }

    #[test]
    fn groups_are_rejected() {
        let registry = with_groups(&["a"]);
        let group = registry
            .create(GroupConfiguration::new(vec!["a".into()], None).to_configuration("grp"))
            .unwrap();
        let err = Promoter::new(registry.clone()).promote(group.as_ref()).unwrap_err();
        assert!(matches!(err, StoreError::NotConvertible { ref store, .. } if store == "grp"));
        assert_eq!(registry.names(), vec!["a", "grp"]);
    }

    #[test]
    fn group_members_are_rejected() {
        let registry = with_groups(&["a"]);
        registry
            .create(GroupConfiguration::new(vec!["a".into()], None).to_configuration("grp"))
            .unwrap();
        let member = registry.get("a").unwrap().unwrap();
        let err = Promoter::new(registry).promote(member.as_ref()).unwrap_err();
        assert!(matches!(err, StoreError::NotConvertible { ref reason, .. } if reason.contains("grp")));
    }

    #[test]
    fn read_only_stores_are_rejected() {
        let (registry, probes) = probe_registry(&["X"]);
        probes.probe("X").set_writable(false);
        let store = registry.get("X").unwrap().unwrap();
        let err = Promoter::new(registry.clone()).promote(store.as_ref()).unwrap_err();
        assert!(matches!(err, StoreError::NotConvertible { ref reason, .. } if reason.contains("read-only")));
        assert_eq!(registry.names(), vec!["X"]);
    }

    #[test]
    fn taken_derived_name_is_rejected() {
        let registry = with_groups(&["X", "X-promoted"]);
        let store = registry.get("X").unwrap().unwrap();
        let err = Promoter::new(registry.clone()).promote(store.as_ref()).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(ref name) if name == "X-promoted"));
        assert_eq!(registry.names(), vec!["X", "X-promoted"]);
    }
}
