use std::sync::{Arc, Weak};

use strata_registry::{BlobStoreFactory, BlobStoreRegistry, InMemoryBlobStoreRegistry};
use strata_store::{BlobStore, StoreError, StoreResult};
use strata_types::BlobStoreConfiguration;

use crate::config::{GroupConfiguration, GroupSettings, GROUP_TYPE};
use crate::fill_policy::FillPolicyRegistry;
use crate::group::BlobStoreGroup;

/// Builds [`BlobStoreGroup`]s for a registry.
///
/// Holds the registry weakly: groups live inside the registry they resolve
/// their members from.
pub struct GroupBlobStoreFactory {
    registry: Weak<dyn BlobStoreRegistry>,
    policies: FillPolicyRegistry,
    settings: GroupSettings,
}

impl GroupBlobStoreFactory {
    pub fn new(registry: Weak<dyn BlobStoreRegistry>, settings: GroupSettings) -> Self {
        Self {
            registry,
            policies: FillPolicyRegistry::with_defaults(),
            settings,
        }
    }

    /// Replace the fill policies offered to new groups.
    pub fn with_policies(mut self, policies: FillPolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    /// Register a group factory with default policies on `registry`.
    pub fn install(registry: &Arc<InMemoryBlobStoreRegistry>, settings: GroupSettings) {
        let weak: Weak<InMemoryBlobStoreRegistry> = Arc::downgrade(registry);
        registry.register_factory(Arc::new(Self::new(weak, settings)));
    }

    fn registry(&self) -> StoreResult<Arc<dyn BlobStoreRegistry>> {
        self.registry.upgrade().ok_or(StoreError::RegistryUnavailable)
    }
}

impl BlobStoreFactory for GroupBlobStoreFactory {
    fn store_type(&self) -> &str {
        GROUP_TYPE
    }

    /// Members must exist, must be groupable and must not already belong to
    /// another group.
    fn validate(&self, configuration: &BlobStoreConfiguration) -> StoreResult<()> {
        let group = GroupConfiguration::from_configuration(configuration)?;
        let registry = self.registry()?;
        let invalid = |reason: String| StoreError::InvalidConfiguration {
            store: configuration.name.clone(),
            reason,
        };

        for name in &group.members {
            let member = registry
                .get(name)?
                .ok_or_else(|| invalid(format!("member '{name}' does not exist")))?;
            if !member.is_groupable() {
                return Err(invalid(format!("member '{name}' cannot be part of a group")));
            }
            if let Some(parent) = registry.find_parent(name) {
                if parent != configuration.name {
                    return Err(invalid(format!(
                        "member '{name}' already belongs to group '{parent}'"
                    )));
                }
            }
        }
        Ok(())
    }

    fn build(&self, _configuration: &BlobStoreConfiguration) -> StoreResult<Arc<dyn BlobStore>> {
        Ok(Arc::new(BlobStoreGroup::new(
            self.registry.clone(),
            self.policies.clone(),
            self.settings.clone(),
        )))
    }
}

impl std::fmt::Debug for GroupBlobStoreFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupBlobStoreFactory")
            .field("policies", &self.policies)
            .field("settings", &self.settings)
            .finish()
    }
}
