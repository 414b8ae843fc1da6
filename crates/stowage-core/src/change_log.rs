//! Change logs
//!
//! A `ChangeLog` is the unit of work handed to `store`: items added, items
//! modified, items deleted, and the reverse-reference sets that changed.

use crate::ids::EntityId;
use crate::state::{ItemState, NodeReferences};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLog {
    pub added: Vec<ItemState>,
    pub modified: Vec<ItemState>,
    pub deleted: Vec<ItemState>,
    pub modified_refs: Vec<NodeReferences>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: record an added item
    #[must_use]
    pub fn added(mut self, state: impl Into<ItemState>) -> Self {
        self.added.push(state.into());
        self
    }

    /// Builder-style: record a modified item
    #[must_use]
    pub fn modified(mut self, state: impl Into<ItemState>) -> Self {
        self.modified.push(state.into());
        self
    }

    /// Builder-style: record a deleted item
    #[must_use]
    pub fn deleted(mut self, state: impl Into<ItemState>) -> Self {
        self.deleted.push(state.into());
        self
    }

    /// Builder-style: record a changed reverse-reference set
    #[must_use]
    pub fn modified_refs(mut self, refs: NodeReferences) -> Self {
        self.modified_refs.push(refs);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.modified_refs.is_empty()
    }

    /// Added then modified items, in that order
    pub fn upserts(&self) -> impl Iterator<Item = &ItemState> {
        self.added.iter().chain(self.modified.iter())
    }

    pub fn upserts_mut(&mut self) -> impl Iterator<Item = &mut ItemState> {
        self.added.iter_mut().chain(self.modified.iter_mut())
    }

    /// Reverse-reference set recorded for `target`, if any
    pub fn refs_for(&self, target: &EntityId) -> Option<&NodeReferences> {
        self.modified_refs.iter().find(|r| &r.target == target)
    }

    /// Ids of all nodes (not properties) touched by the log
    pub fn node_ids(&self) -> Vec<EntityId> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
            .filter_map(|s| match s {
                ItemState::Node(n) => Some(n.id),
                ItemState::Property(_) => None,
            })
            .collect()
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len() + self.modified_refs.len()
    }
}
