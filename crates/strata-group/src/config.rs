//! Group configuration: the `group` attribute section and runtime settings.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_store::{StoreError, StoreResult};
use strata_types::BlobStoreConfiguration;

/// Store type name for [`BlobStoreGroup`](crate::BlobStoreGroup).
pub const GROUP_TYPE: &str = "Group";

/// Attribute section holding group settings.
pub const CONFIG_KEY: &str = "group";

/// Ordered list of member store names.
pub const MEMBERS_KEY: &str = "members";

/// Name of the fill policy.
pub const FILL_POLICY_KEY: &str = "fillPolicy";

/// Default capacity of a group's location cache.
pub const DEFAULT_LOCATION_CACHE_CAPACITY: usize = 100_000;

/// Default time a location cache entry stays valid.
pub const DEFAULT_LOCATION_CACHE_TTL: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// The parsed `group` section of a store configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupConfiguration {
    /// Member names in configured order. Order decides scan order and the
    /// write-to-first target.
    pub members: Vec<String>,
    pub fill_policy: Option<String>,
}

impl GroupConfiguration {
    pub fn new(members: Vec<String>, fill_policy: Option<String>) -> Self {
        Self {
            members,
            fill_policy,
        }
    }

    /// Parse and validate the `group` section of `configuration`.
    ///
    /// Members must be strings, unique, and must not name the group itself.
    /// A missing member list is an empty group.
    pub fn from_configuration(configuration: &BlobStoreConfiguration) -> StoreResult<Self> {
        let members = configuration
            .string_list_attribute(CONFIG_KEY, MEMBERS_KEY)?
            .unwrap_or_default();
        let fill_policy = configuration.string_attribute(CONFIG_KEY, FILL_POLICY_KEY)?;
        let parsed = Self::new(members, fill_policy);
        parsed.validate(&configuration.name)?;
        Ok(parsed)
    }

    /// Check the member list of the group called `group`.
    pub fn validate(&self, group: &str) -> StoreResult<()> {
        let invalid = |reason: String| StoreError::InvalidConfiguration {
            store: group.to_string(),
            reason,
        };
        let mut seen = HashSet::new();
        for member in &self.members {
            if member.trim().is_empty() {
                return Err(invalid("member names must not be blank".into()));
            }
            if member == group {
                return Err(invalid("a group cannot be a member of itself".into()));
            }
            if !seen.insert(member.as_str()) {
                return Err(invalid(format!("member '{member}' is listed more than once")));
            }
        }
        Ok(())
    }

    /// Write this section into `configuration`, replacing any previous one.
    pub fn apply_to(&self, configuration: &mut BlobStoreConfiguration) {
        let members: Vec<Value> = self.members.iter().cloned().map(Value::String).collect();
        configuration.set_attribute(CONFIG_KEY, MEMBERS_KEY, members);
        match &self.fill_policy {
            Some(policy) => configuration.set_attribute(CONFIG_KEY, FILL_POLICY_KEY, policy.as_str()),
            None => {
                configuration.remove_attribute(CONFIG_KEY, FILL_POLICY_KEY);
            }
        }
    }

    /// A complete group configuration named `name`.
    pub fn to_configuration(&self, name: &str) -> BlobStoreConfiguration {
        let mut configuration = BlobStoreConfiguration::new(name, GROUP_TYPE);
        self.apply_to(&mut configuration);
        configuration
    }
}

/// Runtime settings shared by every group a factory builds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    /// Maximum number of remembered blob locations per group.
    pub location_cache_capacity: usize,
    /// How long a remembered location is trusted.
    pub location_cache_ttl: Duration,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            location_cache_capacity: DEFAULT_LOCATION_CACHE_CAPACITY,
            location_cache_ttl: DEFAULT_LOCATION_CACHE_TTL,
        }
    }
}
