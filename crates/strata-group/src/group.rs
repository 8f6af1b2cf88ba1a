use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use strata_registry::BlobStoreRegistry;
use strata_store::{
    Blob, BlobIdStream, BlobStore, BlobStoreUsageChecker, StateGuard, StoreError, StoreResult,
};
use strata_types::{
    BlobAttributes, BlobHeaders, BlobId, BlobStoreConfiguration, BlobStoreMetrics, ContentHash,
    LifecycleState, OperationMetricsByType,
};
use tracing::{debug, error, trace, warn};

use crate::cache::LocationCache;
use crate::config::{GroupConfiguration, GroupSettings, GROUP_TYPE};
use crate::fill_policy::{FillPolicy, FillPolicyRegistry};
use crate::resolver::MemberResolver;

type Members = [Arc<dyn BlobStore>];

/// State that lives from `start` to `stop`.
struct Activation {
    resolver: MemberResolver,
    cache: LocationCache,
    fill_policy: Box<dyn FillPolicy>,
}

/// A blob store backed by an ordered list of member stores.
///
/// New blobs go to the member picked by the configured [`FillPolicy`].
/// Reads, deletes and attribute calls find the owning member through the
/// [`LocationCache`], falling back to a scan of the members. Enumeration,
/// metrics and compaction fan out to every member.
///
/// Members are resolved from the registry on first use after each `start`.
/// If resolution fails the group moves to `Failed` and must be `init`ed and
/// started again.
pub struct BlobStoreGroup {
    registry: Weak<dyn BlobStoreRegistry>,
    policies: FillPolicyRegistry,
    settings: GroupSettings,
    configuration: RwLock<BlobStoreConfiguration>,
    guard: StateGuard,
    activation: RwLock<Option<Arc<Activation>>>,
    compaction: Mutex<()>,
}

impl BlobStoreGroup {
    pub fn new(
        registry: Weak<dyn BlobStoreRegistry>,
        policies: FillPolicyRegistry,
        settings: GroupSettings,
    ) -> Self {
        Self {
            registry,
            policies,
            settings,
            configuration: RwLock::new(BlobStoreConfiguration::new("", GROUP_TYPE)),
            guard: StateGuard::new(),
            activation: RwLock::new(None),
            compaction: Mutex::new(()),
        }
    }

    /// Live member handles in configured order.
    pub fn members(&self) -> StoreResult<Vec<Arc<dyn BlobStore>>> {
        let activation = self.activation("members")?;
        Ok(self.resolve(&activation)?.to_vec())
    }

    /// Name of the fill policy in effect, while started.
    pub fn fill_policy_name(&self) -> Option<String> {
        self.activation
            .read()
            .expect("lock poisoned")
            .as_ref()
            .map(|activation| activation.fill_policy.name().to_string())
    }

    /// Number of remembered blob locations, while started.
    pub fn cached_locations(&self) -> usize {
        self.activation
            .read()
            .expect("lock poisoned")
            .as_ref()
            .map_or(0, |activation| activation.cache.len())
    }

    fn activation(&self, operation: &str) -> StoreResult<Arc<Activation>> {
        let name = self.name();
        self.guard.ensure_started(&name, operation)?;
        self.activation
            .read()
            .expect("lock poisoned")
            .clone()
            .ok_or_else(|| StoreError::InvalidState {
                store: name,
                operation: operation.to_string(),
                state: self.guard.current(),
            })
    }

    fn resolve<'a>(&self, activation: &'a Activation) -> StoreResult<&'a Members> {
        activation.resolver.members().map_err(|e| {
            error!(group = %self.name(), error = %e, "unable to resolve members, group failed");
            self.guard.force(LifecycleState::Failed);
            e
        })
    }

    /// Find the member holding a live copy of `blob_id`.
    ///
    /// A cached location is verified with the cached member only. On a miss
    /// the scan tries writable members first, and only writable owners are
    /// remembered.
    fn locate(
        &self,
        activation: &Activation,
        members: &Members,
        blob_id: &BlobId,
    ) -> StoreResult<Option<Arc<dyn BlobStore>>> {
        if let Some(owner) = activation.cache.get(blob_id) {
            if owner.exists(blob_id)? {
                return Ok(Some(owner));
            }
            trace!(%blob_id, member = %owner.name(), "cached location is stale");
            activation.cache.invalidate(blob_id);
        }

        trace!(group = %self.name(), %blob_id, "scanning members");
        let writable_first = members
            .iter()
            .filter(|m| m.is_writable())
            .chain(members.iter().filter(|m| !m.is_writable()));
        for member in writable_first {
            if member.exists(blob_id)? {
                if member.is_writable() {
                    activation.cache.put(blob_id, member);
                }
                return Ok(Some(Arc::clone(member)));
            }
        }
        Ok(None)
    }

    /// The live owner if there is one, else the first member holding the
    /// blob's attributes in any state.
    fn holder(
        &self,
        activation: &Activation,
        members: &Members,
        blob_id: &BlobId,
    ) -> StoreResult<Option<Arc<dyn BlobStore>>> {
        if let Some(owner) = self.locate(activation, members, blob_id)? {
            return Ok(Some(owner));
        }
        for member in members {
            if member.get_blob_attributes(blob_id)?.is_some() {
                return Ok(Some(Arc::clone(member)));
            }
        }
        Ok(None)
    }

    fn create_with<F>(&self, operation: &str, headers: &BlobHeaders, create: F) -> StoreResult<Blob>
    where
        F: FnOnce(&dyn BlobStore) -> StoreResult<Blob>,
    {
        let activation = self.activation(operation)?;
        let members = self.resolve(&activation)?;
        let target = activation
            .fill_policy
            .choose(self, headers)?
            .filter(|target| members.iter().any(|m| Arc::ptr_eq(m, target)));
        let Some(target) = target else {
            warn!(group = %self.name(), policy = activation.fill_policy.name(), "no member available for create");
            return Err(StoreError::Placement { group: self.name() });
        };

        let blob = create(target.as_ref())?;
        trace!(blob_id = %blob.id(), member = %target.name(), "created blob");
        activation.cache.put(blob.id(), &target);
        Ok(blob)
    }

    /// Apply `op` to every member holding `blob_id`; true only if there was
    /// at least one holder and every holder succeeded.
    fn delete_from_holders(
        &self,
        members: &Members,
        blob_id: &BlobId,
        holds: impl Fn(&dyn BlobStore) -> StoreResult<bool>,
        op: impl Fn(&dyn BlobStore) -> StoreResult<bool>,
    ) -> StoreResult<bool> {
        let mut holders = Vec::new();
        for member in members {
            if holds(member.as_ref())? {
                holders.push(member);
            }
        }
        if holders.is_empty() {
            debug!(group = %self.name(), %blob_id, "no member holds blob");
            return Ok(false);
        }

        let mut deleted = true;
        for holder in holders {
            match op(holder.as_ref()) {
                Ok(true) => {}
                Ok(false) => deleted = false,
                Err(e) => {
                    warn!(%blob_id, member = %holder.name(), error = %e, "member failed to delete blob");
                    deleted = false;
                }
            }
        }
        Ok(deleted)
    }

    fn concat_streams(
        members: &Members,
        open: impl Fn(&dyn BlobStore) -> StoreResult<BlobIdStream>,
    ) -> StoreResult<BlobIdStream> {
        let streams = members
            .iter()
            .map(|member| open(member.as_ref()))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Box::new(streams.into_iter().flatten()))
    }

    fn member_list(&self) -> Vec<String> {
        GroupConfiguration::from_configuration(&self.configuration())
            .map(|group| group.members)
            .unwrap_or_default()
    }
}

impl BlobStore for BlobStoreGroup {
    fn init(&self, configuration: BlobStoreConfiguration) -> StoreResult<()> {
        let previous = self.guard.current();
        self.guard.ensure(
            &configuration.name,
            "init",
            &[LifecycleState::New, LifecycleState::Stopped, LifecycleState::Failed],
        )?;
        if configuration.store_type != GROUP_TYPE {
            return Err(StoreError::InvalidConfiguration {
                store: configuration.name,
                reason: format!("expected type {GROUP_TYPE}, got {}", configuration.store_type),
            });
        }
        GroupConfiguration::from_configuration(&configuration)?;
        *self.configuration.write().expect("lock poisoned") = configuration;
        if previous == LifecycleState::Failed {
            self.guard.force(LifecycleState::New);
        }
        Ok(())
    }

    fn start(&self) -> StoreResult<()> {
        let configuration = self.configuration();
        let mut slot = self.activation.write().expect("lock poisoned");
        self.guard
            .ensure(&configuration.name, "start", LifecycleState::STARTABLE)?;
        let group = GroupConfiguration::from_configuration(&configuration)?;
        let activation = Activation {
            fill_policy: self
                .policies
                .resolve(&configuration.name, group.fill_policy.as_deref()),
            resolver: MemberResolver::new(&configuration.name, group.members, self.registry.clone()),
            cache: LocationCache::new(
                self.settings.location_cache_capacity,
                self.settings.location_cache_ttl,
            ),
        };

        self.guard.transition(
            &configuration.name,
            "start",
            LifecycleState::STARTABLE,
            LifecycleState::Started,
        )?;
        *slot = Some(Arc::new(activation));
        Ok(())
    }

    fn stop(&self) -> StoreResult<()> {
        let mut slot = self.activation.write().expect("lock poisoned");
        self.guard.transition(
            &self.name(),
            "stop",
            &[LifecycleState::Started],
            LifecycleState::Stopped,
        )?;
        if let Some(activation) = slot.take() {
            activation.cache.clear();
        }
        Ok(())
    }

    fn shutdown(&self) -> StoreResult<()> {
        let mut slot = self.activation.write().expect("lock poisoned");
        self.guard.force(LifecycleState::Shutdown);
        slot.take();
        Ok(())
    }

    fn remove(&self) -> StoreResult<()> {
        let name = self.name();
        self.guard.ensure(&name, "remove", LifecycleState::NOT_RUNNING)?;
        debug!(group = %name, "removing group, members are left untouched");
        Ok(())
    }

    fn state(&self) -> LifecycleState {
        self.guard.current()
    }

    fn configuration(&self) -> BlobStoreConfiguration {
        self.configuration.read().expect("lock poisoned").clone()
    }

    fn create(
        &self,
        content: &mut dyn Read,
        headers: &BlobHeaders,
        blob_id: Option<BlobId>,
    ) -> StoreResult<Blob> {
        self.create_with("create", headers, |target| target.create(content, headers, blob_id))
    }

    fn create_from_path(
        &self,
        path: &Path,
        headers: &BlobHeaders,
        size: u64,
        hash: ContentHash,
    ) -> StoreResult<Blob> {
        self.create_with("create", headers, |target| {
            target.create_from_path(path, headers, size, hash)
        })
    }

    fn copy(&self, blob_id: &BlobId, headers: &BlobHeaders) -> StoreResult<Blob> {
        let activation = self.activation("copy")?;
        let members = self.resolve(&activation)?;
        let owner = self
            .locate(&activation, members, blob_id)?
            .ok_or_else(|| StoreError::NotFound(blob_id.clone()))?;
        let copy = owner.copy(blob_id, headers)?;
        activation.cache.put(copy.id(), &owner);
        Ok(copy)
    }

    fn get_with_deleted(&self, blob_id: &BlobId, include_deleted: bool) -> StoreResult<Option<Blob>> {
        let activation = self.activation("get")?;
        let members = self.resolve(&activation)?;
        if include_deleted {
            // soft-deleted blobs never go through the cache
            for member in members {
                if let Some(blob) = member.get_with_deleted(blob_id, true)? {
                    return Ok(Some(blob));
                }
            }
            return Ok(None);
        }
        match self.locate(&activation, members, blob_id)? {
            Some(owner) => owner.get(blob_id),
            None => Ok(None),
        }
    }

    fn exists(&self, blob_id: &BlobId) -> StoreResult<bool> {
        let activation = self.activation("exists")?;
        for member in self.resolve(&activation)? {
            if member.exists(blob_id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn delete(&self, blob_id: &BlobId, reason: &str) -> StoreResult<bool> {
        let activation = self.activation("delete")?;
        let members = self.resolve(&activation)?;
        activation.cache.invalidate(blob_id);
        self.delete_from_holders(
            members,
            blob_id,
            |member| member.exists(blob_id),
            |member| member.delete(blob_id, reason),
        )
    }

    fn delete_hard(&self, blob_id: &BlobId) -> StoreResult<bool> {
        let activation = self.activation("delete_hard")?;
        let members = self.resolve(&activation)?;
        activation.cache.invalidate(blob_id);
        self.delete_from_holders(
            members,
            blob_id,
            |member| Ok(member.get_blob_attributes(blob_id)?.is_some()),
            |member| member.delete_hard(blob_id),
        )
    }

    fn undelete(
        &self,
        checker: Option<&dyn BlobStoreUsageChecker>,
        blob_id: &BlobId,
        attributes: &BlobAttributes,
        dry_run: bool,
    ) -> StoreResult<bool> {
        let activation = self.activation("undelete")?;
        let mut undeleted = false;
        for member in self.resolve(&activation)? {
            undeleted |= member.undelete(checker, blob_id, attributes, dry_run)?;
        }
        Ok(undeleted)
    }

    fn compact(&self, checker: Option<&dyn BlobStoreUsageChecker>) -> StoreResult<()> {
        let activation = self.activation("compact")?;
        let members = self.resolve(&activation)?;
        let _compacting = self.compaction.lock().expect("lock poisoned");
        for member in members {
            debug!(group = %self.name(), member = %member.name(), "compacting member");
            member.compact(checker)?;
        }
        Ok(())
    }

    fn blob_id_stream(&self) -> StoreResult<BlobIdStream> {
        let activation = self.activation("blob_id_stream")?;
        Self::concat_streams(self.resolve(&activation)?, |member| member.blob_id_stream())
    }

    fn direct_path_blob_id_stream(&self, prefix: &str) -> StoreResult<BlobIdStream> {
        let activation = self.activation("direct_path_blob_id_stream")?;
        Self::concat_streams(self.resolve(&activation)?, |member| {
            member.direct_path_blob_id_stream(prefix)
        })
    }

    fn blob_id_updated_since_stream(&self, window: Duration) -> StoreResult<BlobIdStream> {
        let activation = self.activation("blob_id_updated_since_stream")?;
        Self::concat_streams(self.resolve(&activation)?, |member| {
            member.blob_id_updated_since_stream(window)
        })
    }

    fn get_blob_attributes(&self, blob_id: &BlobId) -> StoreResult<Option<BlobAttributes>> {
        let activation = self.activation("get_blob_attributes")?;
        let members = self.resolve(&activation)?;
        match self.holder(&activation, members, blob_id)? {
            Some(holder) => holder.get_blob_attributes(blob_id),
            None => Ok(None),
        }
    }

    fn set_blob_attributes(&self, blob_id: &BlobId, attributes: BlobAttributes) -> StoreResult<()> {
        let activation = self.activation("set_blob_attributes")?;
        let members = self.resolve(&activation)?;
        match self.holder(&activation, members, blob_id)? {
            Some(holder) => holder.set_blob_attributes(blob_id, attributes),
            None => {
                debug!(group = %self.name(), %blob_id, "no member holds blob, attributes ignored");
                Ok(())
            }
        }
    }

    fn metrics(&self) -> StoreResult<BlobStoreMetrics> {
        let activation = self.activation("metrics")?;
        let mut total = BlobStoreMetrics::default();
        for member in self.resolve(&activation)?.iter().filter(|m| m.is_started()) {
            total = total.merge(member.metrics()?);
        }
        Ok(total)
    }

    fn operation_metrics(&self) -> StoreResult<OperationMetricsByType> {
        let activation = self.activation("operation_metrics")?;
        let mut total = OperationMetricsByType::new();
        for member in self.resolve(&activation)? {
            for (operation, metrics) in member.operation_metrics()? {
                let entry = total.entry(operation).or_default();
                *entry = entry.add(metrics);
            }
        }
        Ok(total)
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn is_groupable(&self) -> bool {
        false
    }

    fn is_empty(&self) -> StoreResult<bool> {
        let activation = self.activation("is_empty")?;
        for member in self.resolve(&activation)? {
            if !member.is_empty()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn member_names(&self) -> Vec<String> {
        self.member_list()
    }
}

impl fmt::Display for BlobStoreGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlobStoreGroup{{name='{}', members=[{}]}}",
            self.name(),
            self.member_list().join(", ")
        )
    }
}

impl fmt::Debug for BlobStoreGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStoreGroup")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("members", &self.member_list())
            .field("fill_policy", &self.fill_policy_name())
            .finish()
    }
}
