//! The `EntityStore` capability
//!
//! Both layouts implement one trait and are picked by configuration through
//! [`store_for`]. Shared plumbing (provisioning, key scans, reference reads,
//! lifecycle and the write gate) lives in [`StoreShared`].

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use stowage_config::{PersistenceConfig, StoreLayout};
use stowage_core::{ChangeLog, EntityId, ItemState, NodeReferences, NodeState, PropertyId, PropertyState};
use tracing::{debug, info, trace, warn};

use crate::bundle_store::BundleStore;
use crate::cache::CacheStats;
use crate::consistency::ConsistencyReport;
use crate::error::{PersistenceError, PersistenceResult};
use crate::kv::{Item, KvClient, Projection, ScanRequest, TableRef};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::provisioner::{TableProvisioner, TableReadiness};
use crate::state_store::StateStore;

/// Partition-key attribute of the bundle table
pub const BUNDLE_KEY: &str = "id";
/// Partition-key attribute of the split-layout node table
pub const NODE_KEY: &str = "nodeId";
/// Partition-key attribute of the split-layout property table
pub const PROPERTY_KEY: &str = "propertyId";

/// Persistence backend consumed by the hosting repository
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Provision tables, become `Ready` and run the configured consistency check
    async fn init(&self) -> PersistenceResult<()>;

    async fn close(&self) -> PersistenceResult<()>;

    fn lifecycle(&self) -> LifecycleState;

    /// Fresh, uncommitted node shell; any cached entry for `id` is dropped
    fn create_new_node(&self, id: EntityId) -> NodeState;

    fn create_new_property(&self, id: PropertyId) -> PropertyState;

    async fn load_node(&self, id: &EntityId) -> PersistenceResult<NodeState>;

    async fn load_property(&self, id: &PropertyId) -> PersistenceResult<PropertyState>;

    async fn exists_node(&self, id: &EntityId) -> PersistenceResult<bool>;

    async fn exists_property(&self, id: &PropertyId) -> PersistenceResult<bool>;

    async fn load_references_to(&self, target: &EntityId) -> PersistenceResult<NodeReferences>;

    async fn exists_references_to(&self, target: &EntityId) -> PersistenceResult<bool>;

    /// Apply a change log: deletions, then upserts, then reference updates
    ///
    /// On success every written state is stamped with its new `mod_count`
    /// and marked existing. On failure the states are left untouched.
    async fn store(&self, changes: &mut ChangeLog) -> PersistenceResult<()>;

    /// Page of node ids after `after`; `max_count == 0` returns all of them
    async fn all_node_ids(
        &self,
        after: Option<&EntityId>,
        max_count: usize,
    ) -> PersistenceResult<Vec<EntityId>>;

    /// Invalidate cache entries for a change log applied elsewhere
    fn on_external_update(&self, changes: &ChangeLog);

    async fn check_consistency(&self, fix: bool) -> PersistenceResult<ConsistencyReport>;

    fn cache_stats(&self) -> CacheStats;
}

/// Build the store selected by `config.layout`
pub fn store_for(
    config: PersistenceConfig,
    client: Arc<dyn KvClient>,
) -> PersistenceResult<Arc<dyn EntityStore>> {
    config.validate()?;
    let store: Arc<dyn EntityStore> = match config.layout {
        StoreLayout::Bundle => Arc::new(BundleStore::new(config, client)),
        StoreLayout::Split => Arc::new(StateStore::new(config, client)),
    };
    Ok(store)
}

/// Plumbing shared by both layouts
pub(crate) struct StoreShared {
    pub client: Arc<dyn KvClient>,
    pub config: PersistenceConfig,
    pub lifecycle: Lifecycle,
    /// Serializes `store` for the whole adapter
    pub write_gate: tokio::sync::Mutex<()>,
    provisioner: TableProvisioner,
}

impl StoreShared {
    pub fn new(config: PersistenceConfig, client: Arc<dyn KvClient>) -> Self {
        Self {
            provisioner: TableProvisioner::new(&config.provisioning),
            client,
            config,
            lifecycle: Lifecycle::new(),
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Provision every table and move to `Ready`
    pub async fn open(&self, tables: &[&TableRef]) -> PersistenceResult<()> {
        self.lifecycle.ensure(LifecycleState::Uninitialized)?;
        info!(layout = %self.config.layout, "Initializing entity store");

        for table in tables {
            let readiness = self
                .provisioner
                .ensure_table(
                    self.client.as_ref(),
                    &table.name,
                    &table.key_attribute,
                    self.config.create_on_missing,
                )
                .await?;
            if readiness == TableReadiness::Pending {
                warn!(table = %table, "Table readiness not confirmed; first item operations will tell");
            }
        }

        self.lifecycle
            .transition(LifecycleState::Uninitialized, LifecycleState::Ready)
    }

    /// Undo `open` after a failed start-up step
    pub fn abort_open(&self) {
        if self
            .lifecycle
            .transition(LifecycleState::Ready, LifecycleState::Uninitialized)
            .is_err()
        {
            warn!("Entity store left its ready state during initialization");
        }
    }

    pub fn shut(&self) -> PersistenceResult<()> {
        self.lifecycle
            .transition(LifecycleState::Ready, LifecycleState::Closed)?;
        info!(layout = %self.config.layout, "Entity store closed");
        Ok(())
    }

    pub async fn get(
        &self,
        table: &TableRef,
        key: &str,
        projection: Projection,
    ) -> PersistenceResult<Option<Item>> {
        Ok(self.client.get_item(table, key, projection).await?)
    }

    /// Reference strings currently stored on `key`
    pub async fn stored_references(
        &self,
        table: &TableRef,
        key: &str,
    ) -> PersistenceResult<BTreeSet<String>> {
        Ok(self
            .get(table, key, Projection::References)
            .await?
            .map(|item| item.references)
            .unwrap_or_default())
    }

    /// Reference set for the node item stored under `target`
    pub async fn references_to(
        &self,
        table: &TableRef,
        target: &EntityId,
    ) -> PersistenceResult<NodeReferences> {
        let item = self
            .get(table, &target.to_string(), Projection::References)
            .await?
            .ok_or_else(|| {
                warn!(id = %target, "References requested for an absent node");
                PersistenceError::not_found(target.to_string())
            })?;
        Ok(NodeReferences::from_strings(*target, item.references.iter())?)
    }

    /// References to write with a node put
    ///
    /// The change log's set wins; otherwise an existing node keeps what is
    /// already stored.
    pub async fn references_for_put(
        &self,
        table: &TableRef,
        changes: &ChangeLog,
        id: &EntityId,
        is_new: bool,
    ) -> PersistenceResult<BTreeSet<String>> {
        match changes.refs_for(id) {
            Some(refs) => Ok(refs.to_strings()),
            None if is_new => Ok(BTreeSet::new()),
            None => self.stored_references(table, &id.to_string()).await,
        }
    }

    /// Collect node ids from the key scan, following pages as needed
    pub async fn scan_node_ids(
        &self,
        table: &TableRef,
        after: Option<&EntityId>,
        max_count: usize,
    ) -> PersistenceResult<Vec<EntityId>> {
        let mut ids = Vec::new();
        let mut start = after.map(ToString::to_string);

        loop {
            let limit = (max_count > 0).then(|| max_count - ids.len());
            let page = self
                .client
                .scan_keys(
                    table,
                    ScanRequest {
                        exclusive_start_key: start.take(),
                        limit,
                    },
                )
                .await?;

            for key in &page.keys {
                ids.push(EntityId::parse(key)?);
            }
            if max_count > 0 && ids.len() >= max_count {
                ids.truncate(max_count);
                break;
            }
            match page.last_evaluated_key {
                Some(key) => start = Some(key),
                None => break,
            }
        }

        debug!(table = %table, count = ids.len(), "Scanned node ids");
        Ok(ids)
    }
}

/// Trace the contents of a change log before it is applied
pub(crate) fn trace_change_log(changes: &ChangeLog) {
    trace!(
        added = changes.added.len(),
        modified = changes.modified.len(),
        deleted = changes.deleted.len(),
        modified_refs = changes.modified_refs.len(),
        "Applying change log"
    );
    for (kind, states) in [
        ("added", &changes.added),
        ("modified", &changes.modified),
        ("deleted", &changes.deleted),
    ] {
        for state in states {
            trace!(kind, key = %state.key(), node = state.is_node(), "Change log entry");
        }
    }
    for refs in &changes.modified_refs {
        trace!(id = %refs.target, count = refs.references.len(), "Modified references");
    }
}

/// Ids of nodes deleted by a change log
pub(crate) fn deleted_node_ids(changes: &ChangeLog) -> BTreeSet<EntityId> {
    changes
        .deleted
        .iter()
        .filter_map(|s| match s {
            ItemState::Node(n) => Some(n.id),
            ItemState::Property(_) => None,
        })
        .collect()
}
