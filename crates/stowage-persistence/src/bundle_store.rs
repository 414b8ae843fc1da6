//! Bundle layout
//!
//! One table keyed by `id`. Each item holds a node with all of its
//! properties plus the node's own reverse-reference set. Node and property
//! states handed to the repository are projections of cached bundles.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use stowage_config::PersistenceConfig;
use stowage_core::codec::{decode_bundle, encode_bundle};
use stowage_core::{
    ChangeLog, EntityId, ItemState, ItemStatus, NodePropBundle, NodeReferences, NodeState,
    PropertyEntry, PropertyId, PropertyState,
};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheLookup, CacheStats, NodeStateCache};
use crate::consistency::{ConsistencyChecker, ConsistencyReport};
use crate::error::{PersistenceError, PersistenceResult};
use crate::kv::{Item, KvClient, Projection, TableRef};
use crate::lifecycle::LifecycleState;
use crate::store::{deleted_node_ids, trace_change_log, EntityStore, StoreShared, BUNDLE_KEY};

pub struct BundleStore {
    shared: StoreShared,
    table: TableRef,
    cache: NodeStateCache<NodePropBundle>,
}

impl BundleStore {
    pub fn new(config: PersistenceConfig, client: Arc<dyn KvClient>) -> Self {
        let table = TableRef::new(config.tables.bundles.clone(), BUNDLE_KEY);
        Self {
            shared: StoreShared::new(config, client),
            table,
            cache: NodeStateCache::new(),
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Load the full bundle for `id`, consulting the cache first
    pub async fn load_bundle(&self, id: &EntityId) -> PersistenceResult<Arc<NodePropBundle>> {
        self.shared.lifecycle.ensure_ready()?;

        match self.cache.lookup(id) {
            CacheLookup::Present(bundle) => {
                debug!(id = %id, "Bundle cache hit");
                return Ok(bundle);
            }
            CacheLookup::Missing => {
                debug!(id = %id, "Bundle known missing");
                return Err(PersistenceError::not_found(id.to_string()));
            }
            CacheLookup::Absent => debug!(id = %id, "Bundle cache miss"),
        }

        let seen = self.cache.generation();
        let key = id.to_string();
        let item = match self.shared.get(&self.table, &key, Projection::All).await {
            Ok(item) => item,
            Err(e) => {
                error!(id = %id, error = %e, "Failed to read bundle");
                return Err(e);
            }
        };

        let Some(item) = item else {
            warn!(id = %id, "Bundle not found");
            self.cache.mark_missing_loaded(*id, seen);
            return Err(PersistenceError::not_found(key));
        };
        let data = item
            .data
            .ok_or_else(|| PersistenceError::decode(format!("bundle {}: data missing", id)))?;
        let bundle = Arc::new(decode_bundle(*id, &data)?);
        self.cache.insert_loaded(*id, Arc::clone(&bundle), seen);
        Ok(bundle)
    }

    /// Bundle to mutate during a store: already planned, or loaded
    async fn planned<'a>(
        &self,
        bundles: &'a mut BTreeMap<EntityId, NodePropBundle>,
        id: EntityId,
    ) -> PersistenceResult<&'a mut NodePropBundle> {
        match bundles.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let loaded = self.load_bundle(&id).await?;
                Ok(entry.insert((*loaded).clone()))
            }
        }
    }

    /// Work out every bundle a change log touches, without writing anything
    async fn plan(
        &self,
        changes: &ChangeLog,
        deleted: &BTreeSet<EntityId>,
    ) -> PersistenceResult<BTreeMap<EntityId, NodePropBundle>> {
        let mut bundles: BTreeMap<EntityId, NodePropBundle> = BTreeMap::new();

        for state in changes.upserts() {
            let ItemState::Node(node) = state else {
                continue;
            };
            if let Some(bundle) = bundles.get_mut(&node.id) {
                bundle.update(node);
                continue;
            }
            let bundle = if node.status == ItemStatus::New {
                NodePropBundle::from_node_state(node)
            } else {
                match self.load_bundle(&node.id).await {
                    Ok(existing) => {
                        let mut bundle = (*existing).clone();
                        bundle.update(node);
                        bundle
                    }
                    Err(e) if e.is_not_found() => NodePropBundle::from_node_state(node),
                    Err(e) => return Err(e),
                }
            };
            bundles.insert(node.id, bundle);
        }

        for state in &changes.deleted {
            let ItemState::Property(property) = state else {
                continue;
            };
            let owner = property.id.parent_id();
            if deleted.contains(&owner) {
                continue;
            }
            self.planned(&mut bundles, owner)
                .await?
                .remove_property(property.name());
        }

        for state in changes.upserts() {
            let ItemState::Property(property) = state else {
                continue;
            };
            let owner = property.id.parent_id();
            if deleted.contains(&owner) {
                warn!(property = %property.id, "Skipping property of a deleted node");
                continue;
            }
            let mut entry = PropertyEntry::from_state(property);
            entry.mod_count = property.mod_count.wrapping_add(1);
            self.planned(&mut bundles, owner).await?.add_property(entry);
        }

        for bundle in bundles.values_mut() {
            bundle.mod_count = bundle.mod_count.wrapping_add(1);
        }
        Ok(bundles)
    }

    async fn apply(
        &self,
        changes: &ChangeLog,
        deleted: &BTreeSet<EntityId>,
        bundles: &BTreeMap<EntityId, NodePropBundle>,
    ) -> PersistenceResult<()> {
        let mut encoded = Vec::with_capacity(bundles.len());
        for bundle in bundles.values() {
            encoded.push((bundle.id, encode_bundle(bundle)?, bundle.is_new));
        }

        for id in deleted {
            self.shared
                .client
                .delete_item(&self.table, &id.to_string())
                .await?;
            self.cache.force_missing(*id);
            debug!(id = %id, "Deleted bundle");
        }

        for (id, data, is_new) in encoded {
            let references = self
                .shared
                .references_for_put(&self.table, changes, &id, is_new)
                .await?;
            self.shared
                .client
                .put_item(
                    &self.table,
                    &id.to_string(),
                    Item::new(data).with_references(references),
                )
                .await?;
            debug!(id = %id, "Stored bundle");
        }

        for refs in &changes.modified_refs {
            if bundles.contains_key(&refs.target) || deleted.contains(&refs.target) {
                continue;
            }
            self.shared
                .client
                .set_references(&self.table, &refs.target.to_string(), refs.to_strings())
                .await?;
            debug!(id = %refs.target, count = refs.references.len(), "Stored references");
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for BundleStore {
    async fn init(&self) -> PersistenceResult<()> {
        self.shared.open(&[&self.table]).await?;
        if self.shared.config.consistency_check {
            let fix = self.shared.config.consistency_fix;
            if let Err(e) = self.check_consistency(fix).await {
                error!(error = %e, "Consistency check failed during initialization");
                self.shared.abort_open();
                return Err(e);
            }
        }
        info!(table = %self.table, "Bundle store ready");
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
        Ok(self.load_bundle(id).await?.to_node_state())
    }

    async fn load_property(&self, id: &PropertyId) -> PersistenceResult<PropertyState> {
        let bundle = self.load_bundle(&id.parent_id()).await?;
        bundle
            .property(id.name())
            .map(PropertyEntry::to_state)
            .ok_or_else(|| {
                warn!(property = %id, "Property not found");
                PersistenceError::not_found(id.to_string())
            })
    }

    async fn exists_node(&self, id: &EntityId) -> PersistenceResult<bool> {
        self.shared.lifecycle.ensure_ready()?;
        match self.cache.lookup(id) {
            CacheLookup::Present(_) => return Ok(true),
            CacheLookup::Missing => return Ok(false),
            CacheLookup::Absent => {}
        }

        let seen = self.cache.generation();
        let item = self
            .shared
            .get(&self.table, &id.to_string(), Projection::All)
            .await?;
        match item {
            Some(item) => Ok(item.data.is_some()),
            None => {
                self.cache.mark_missing_loaded(*id, seen);
                Ok(false)
            }
        }
    }

    async fn exists_property(&self, id: &PropertyId) -> PersistenceResult<bool> {
        match self.load_bundle(&id.parent_id()).await {
            Ok(bundle) => Ok(bundle.property(id.name()).is_some()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn load_references_to(&self, target: &EntityId) -> PersistenceResult<NodeReferences> {
        self.shared.lifecycle.ensure_ready()?;
        if let CacheLookup::Missing = self.cache.lookup(target) {
            return Err(PersistenceError::not_found(target.to_string()));
        }
        self.shared.references_to(&self.table, target).await
    }

    async fn exists_references_to(&self, target: &EntityId) -> PersistenceResult<bool> {
        Ok(self.load_references_to(target).await?.has_references())
    }

    async fn store(&self, changes: &mut ChangeLog) -> PersistenceResult<()> {
        let _gate = self.shared.write_gate.lock().await;
        self.shared.lifecycle.ensure_ready()?;
        trace_change_log(changes);

        let deleted = deleted_node_ids(changes);
        let bundles = self.plan(changes, &deleted).await?;
        let result = self.apply(changes, &deleted, &bundles).await;
        self.cache.invalidate(bundles.keys());

        if let Err(e) = result {
            error!(error = %e, "Failed to apply change log");
            return Err(e);
        }

        for state in changes.upserts_mut() {
            let stamp = match &*state {
                ItemState::Node(node) => bundles.get(&node.id).map(|b| b.mod_count),
                ItemState::Property(property) => (!deleted.contains(&property.id.parent_id()))
                    .then(|| property.mod_count.wrapping_add(1)),
            };
            if let Some(mod_count) = stamp {
                state.mark_persisted(mod_count);
            }
        }
        info!(bundles = bundles.len(), deleted = deleted.len(), "Change log stored");
        Ok(())
    }

    async fn all_node_ids(
        &self,
        after: Option<&EntityId>,
        max_count: usize,
    ) -> PersistenceResult<Vec<EntityId>> {
        self.shared.lifecycle.ensure_ready()?;
        self.shared.scan_node_ids(&self.table, after, max_count).await
    }

    fn on_external_update(&self, changes: &ChangeLog) {
        let mut touched = BTreeSet::new();
        for state in changes.upserts() {
            match state {
                ItemState::Node(n) => touched.insert(n.id),
                ItemState::Property(p) => touched.insert(p.id.parent_id()),
            };
        }
        for state in &changes.deleted {
            if let ItemState::Property(p) = state {
                touched.insert(p.id.parent_id());
            }
        }
        self.cache.invalidate(touched.iter());
        for id in deleted_node_ids(changes) {
            self.cache.force_missing(id);
        }
        debug!(evicted = touched.len(), "Applied external update to cache");
    }

    async fn check_consistency(&self, fix: bool) -> PersistenceResult<ConsistencyReport> {
        self.shared.lifecycle.ensure_ready()?;
        ConsistencyChecker::new(true).run(self, fix).await
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
