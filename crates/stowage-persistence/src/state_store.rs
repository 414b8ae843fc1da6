//! Split layout
//!
//! Nodes and properties live in separate tables, `nodeId` and `propertyId`
//! keyed. Node documents carry property names only; the reverse-reference
//! set rides on the node item. Writes go out as batches.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use stowage_config::PersistenceConfig;
use stowage_core::codec::{decode_node, decode_property, encode_node, encode_property};
use stowage_core::{
    ChangeLog, EntityId, ItemState, ItemStatus, NodeReferences, NodeState, PropertyId,
    PropertyState,
};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheLookup, CacheStats, NodeStateCache};
use crate::consistency::{ConsistencyChecker, ConsistencyReport};
use crate::error::{PersistenceError, PersistenceResult};
use crate::kv::{BatchOperation, Item, KvClient, Projection, TableRef};
use crate::lifecycle::LifecycleState;
use crate::store::{
    deleted_node_ids, trace_change_log, EntityStore, StoreShared, NODE_KEY, PROPERTY_KEY,
};

/// Entity store over separate node and property tables
///
/// Unlike [`BundleStore`](crate::BundleStore), which bumps the count read
/// back from the stored bundle, a put here writes the caller's `mod_count`
/// plus one without reading the stored document first. Callers must store
/// states they loaded or stamped last; a stale state rewrites the count it
/// carries.
pub struct StateStore {
    shared: StoreShared,
    nodes: TableRef,
    properties: TableRef,
    cache: NodeStateCache<NodeState>,
}

impl StateStore {
    pub fn new(config: PersistenceConfig, client: Arc<dyn KvClient>) -> Self {
        let nodes = TableRef::new(config.tables.nodes.clone(), NODE_KEY);
        let properties = TableRef::new(config.tables.properties.clone(), PROPERTY_KEY);
        Self {
            shared: StoreShared::new(config, client),
            nodes,
            properties,
            cache: NodeStateCache::new(),
        }
    }

    pub fn node_table(&self) -> &TableRef {
        &self.nodes
    }

    pub fn property_table(&self) -> &TableRef {
        &self.properties
    }

    async fn cached_node(&self, id: &EntityId) -> PersistenceResult<Arc<NodeState>> {
        self.shared.lifecycle.ensure_ready()?;

        match self.cache.lookup(id) {
            CacheLookup::Present(state) => {
                debug!(id = %id, "Node cache hit");
                return Ok(state);
            }
            CacheLookup::Missing => {
                debug!(id = %id, "Node known missing");
                return Err(PersistenceError::not_found(id.to_string()));
            }
            CacheLookup::Absent => debug!(id = %id, "Node cache miss"),
        }

        let seen = self.cache.generation();
        let key = id.to_string();
        let Some(item) = self.shared.get(&self.nodes, &key, Projection::All).await? else {
            warn!(id = %id, "Node not found");
            self.cache.mark_missing_loaded(*id, seen);
            return Err(PersistenceError::not_found(key));
        };
        let data = item
            .data
            .ok_or_else(|| PersistenceError::decode(format!("node {}: data missing", id)))?;
        let state = Arc::new(decode_node(*id, &data)?);
        self.cache.insert_loaded(*id, Arc::clone(&state), seen);
        Ok(state)
    }

    fn owner_missing(&self, id: &PropertyId) -> bool {
        matches!(self.cache.lookup(&id.parent_id()), CacheLookup::Missing)
    }

    /// Submit one batch, failing on anything left unprocessed
    async fn submit(&self, phase: &str, operations: Vec<BatchOperation>) -> PersistenceResult<()> {
        if operations.is_empty() {
            return Ok(());
        }
        let submitted = operations.len();
        let outcome = self.shared.client.batch_write(operations).await?;
        if !outcome.is_complete() {
            let unprocessed = outcome.unprocessed.len();
            error!(phase, submitted, unprocessed, "Batch write incomplete");
            return Err(PersistenceError::IncompleteBatch { unprocessed });
        }
        debug!(phase, submitted, "Batch written");
        Ok(())
    }

    async fn apply(
        &self,
        changes: &ChangeLog,
        deleted: &BTreeSet<EntityId>,
        written: &BTreeSet<EntityId>,
    ) -> PersistenceResult<()> {
        let mut deletes = Vec::with_capacity(changes.deleted.len());
        for state in &changes.deleted {
            let (table, key) = match state {
                ItemState::Node(n) => (&self.nodes, n.id.to_string()),
                ItemState::Property(p) => (&self.properties, p.id.to_string()),
            };
            deletes.push(BatchOperation::Delete {
                table: table.clone(),
                key,
            });
        }

        let mut puts = Vec::new();
        for state in changes.upserts() {
            match state {
                ItemState::Node(node) => {
                    let mut next = node.clone();
                    next.mod_count = node.mod_count.wrapping_add(1);
                    let references = self
                        .shared
                        .references_for_put(
                            &self.nodes,
                            changes,
                            &node.id,
                            node.status == ItemStatus::New,
                        )
                        .await?;
                    puts.push(BatchOperation::Put {
                        table: self.nodes.clone(),
                        key: node.id.to_string(),
                        item: Item::new(encode_node(&next)?).with_references(references),
                    });
                }
                ItemState::Property(property) => {
                    let mut next = property.clone();
                    next.mod_count = property.mod_count.wrapping_add(1);
                    puts.push(BatchOperation::Put {
                        table: self.properties.clone(),
                        key: property.id.to_string(),
                        item: Item::new(encode_property(&next)?),
                    });
                }
            }
        }

        self.submit("delete", deletes).await?;
        for id in deleted {
            self.cache.force_missing(*id);
        }
        self.submit("put", puts).await?;

        for refs in &changes.modified_refs {
            if written.contains(&refs.target) || deleted.contains(&refs.target) {
                continue;
            }
            self.shared
                .client
                .set_references(&self.nodes, &refs.target.to_string(), refs.to_strings())
                .await?;
            debug!(id = %refs.target, count = refs.references.len(), "Stored references");
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for StateStore {
    async fn init(&self) -> PersistenceResult<()> {
        self.shared.open(&[&self.nodes, &self.properties]).await?;
        if self.shared.config.consistency_check {
            let fix = self.shared.config.consistency_fix;
            if let Err(e) = self.check_consistency(fix).await {
                error!(error = %e, "Consistency check failed during initialization");
                self.shared.abort_open();
                return Err(e);
            }
        }
        info!(nodes = %self.nodes, properties = %self.properties, "State store ready");
        Ok(())
    }

    async fn close(&self) -> PersistenceResult<()> {
        self.shared.shut()?;
        self.cache.clear();
        Ok(())
    }

    fn lifecycle(&self) -> LifecycleState {
        self.shared.lifecycle.state()
    }

    fn create_new_node(&self, id: EntityId) -> NodeState {
        self.cache.evict(&id);
        NodeState::new(id)
    }

    fn create_new_property(&self, id: PropertyId) -> PropertyState {
        PropertyState::new(id)
    }

    async fn load_node(&self, id: &EntityId) -> PersistenceResult<NodeState> {
        Ok((*self.cached_node(id).await?).clone())
    }

    async fn load_property(&self, id: &PropertyId) -> PersistenceResult<PropertyState> {
        self.shared.lifecycle.ensure_ready()?;
        if self.owner_missing(id) {
            return Err(PersistenceError::not_found(id.to_string()));
        }

        let key = id.to_string();
        let Some(item) = self.shared.get(&self.properties, &key, Projection::All).await? else {
            warn!(property = %id, "Property not found");
            return Err(PersistenceError::not_found(key));
        };
        let data = item
            .data
            .ok_or_else(|| PersistenceError::decode(format!("property {}: data missing", id)))?;
        Ok(decode_property(id.clone(), &data)?)
    }

    async fn exists_node(&self, id: &EntityId) -> PersistenceResult<bool> {
        self.shared.lifecycle.ensure_ready()?;
        match self.cache.lookup(id) {
            CacheLookup::Present(_) => return Ok(true),
            CacheLookup::Missing => return Ok(false),
            CacheLookup::Absent => {}
        }

        let seen = self.cache.generation();
        match self
            .shared
            .get(&self.nodes, &id.to_string(), Projection::All)
            .await?
        {
            Some(item) => Ok(item.data.is_some()),
            None => {
                self.cache.mark_missing_loaded(*id, seen);
                Ok(false)
            }
        }
    }

    async fn exists_property(&self, id: &PropertyId) -> PersistenceResult<bool> {
        self.shared.lifecycle.ensure_ready()?;
        if self.owner_missing(id) {
            return Ok(false);
        }
        let item = self
            .shared
            .get(&self.properties, &id.to_string(), Projection::All)
            .await?;
        Ok(item.is_some_and(|i| i.data.is_some()))
    }

    async fn load_references_to(&self, target: &EntityId) -> PersistenceResult<NodeReferences> {
        self.shared.lifecycle.ensure_ready()?;
        if let CacheLookup::Missing = self.cache.lookup(target) {
            return Err(PersistenceError::not_found(target.to_string()));
        }
        self.shared.references_to(&self.nodes, target).await
    }

    async fn exists_references_to(&self, target: &EntityId) -> PersistenceResult<bool> {
        Ok(self.load_references_to(target).await?.has_references())
    }

    async fn store(&self, changes: &mut ChangeLog) -> PersistenceResult<()> {
        let _gate = self.shared.write_gate.lock().await;
        self.shared.lifecycle.ensure_ready()?;
        trace_change_log(changes);

        let deleted = deleted_node_ids(changes);
        let written: BTreeSet<EntityId> = changes
            .upserts()
            .filter_map(|s| match s {
                ItemState::Node(n) => Some(n.id),
                ItemState::Property(_) => None,
            })
            .collect();

        let result = self.apply(changes, &deleted, &written).await;
        self.cache.invalidate(written.iter());

        if let Err(e) = result {
            error!(error = %e, "Failed to apply change log");
            return Err(e);
        }

        for state in changes.upserts_mut() {
            let mod_count = state.mod_count().wrapping_add(1);
            state.mark_persisted(mod_count);
        }
        info!(nodes = written.len(), deleted = deleted.len(), "Change log stored");
        Ok(())
    }

    async fn all_node_ids(
        &self,
        after: Option<&EntityId>,
        max_count: usize,
    ) -> PersistenceResult<Vec<EntityId>> {
        self.shared.lifecycle.ensure_ready()?;
        self.shared.scan_node_ids(&self.nodes, after, max_count).await
    }

    fn on_external_update(&self, changes: &ChangeLog) {
        let touched: Vec<EntityId> = changes
            .upserts()
            .filter_map(|s| match s {
                ItemState::Node(n) => Some(n.id),
                ItemState::Property(_) => None,
            })
            .collect();
        self.cache.invalidate(touched.iter());
        for id in deleted_node_ids(changes) {
            self.cache.force_missing(id);
        }
        debug!(evicted = touched.len(), "Applied external update to cache");
    }

    async fn check_consistency(&self, fix: bool) -> PersistenceResult<ConsistencyReport> {
        self.shared.lifecycle.ensure_ready()?;
        ConsistencyChecker::new(false).run(self, fix).await
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
