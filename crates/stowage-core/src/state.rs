//! Item states
//!
//! The in-memory shapes the hosting repository hands to the persistence
//! layer: node and property states, the aggregated bundle form used by the
//! single-item layout, and reverse-reference sets.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::CodecResult;
use crate::ids::{EntityId, PropertyId};
use crate::name::Name;
use crate::value::{PropertyType, Value};

/// Namespace of the built-in node types
pub const NT_NAMESPACE: &str = "http://www.jcp.org/jcr/nt/1.0";

/// Persistence status of an item state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemStatus {
    /// Created through `create_new_*`, never stored
    #[default]
    New,
    /// Loaded from or written to the store
    Existing,
}

/// A named link from a parent to one child node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildNodeEntry {
    pub name: Name,
    pub id: EntityId,
}

impl ChildNodeEntry {
    pub fn new(name: Name, id: EntityId) -> Self {
        Self { name, id }
    }
}

/// Default primary type given to fresh node shells
pub fn unstructured_type() -> Name {
    Name::from_static(NT_NAMESPACE, "unstructured")
}

/// State of one node, without property values
#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    pub id: EntityId,
    pub node_type: Name,
    /// `None` only for the root node
    pub parent_id: Option<EntityId>,
    pub mixin_types: BTreeSet<Name>,
    pub mod_count: u16,
    pub property_names: BTreeSet<Name>,
    /// Sibling order is significant
    pub children: Vec<ChildNodeEntry>,
    pub status: ItemStatus,
}

impl NodeState {
    /// Create a fresh, uncommitted node shell
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            node_type: unstructured_type(),
            parent_id: None,
            mixin_types: BTreeSet::new(),
            mod_count: 0,
            property_names: BTreeSet::new(),
            children: Vec::new(),
            status: ItemStatus::New,
        }
    }

    /// Builder-style: set the primary type
    #[must_use]
    pub fn with_type(mut self, node_type: Name) -> Self {
        self.node_type = node_type;
        self
    }

    /// Builder-style: set the parent
    #[must_use]
    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    /// Builder-style: add a mixin type
    #[must_use]
    pub fn with_mixin(mut self, mixin: Name) -> Self {
        self.mixin_types.insert(mixin);
        self
    }

    pub fn add_child_node_entry(&mut self, name: Name, id: EntityId) {
        self.children.push(ChildNodeEntry::new(name, id));
    }

    /// Remove the entry pointing at `id`; returns whether one was removed
    pub fn remove_child_node_entry(&mut self, id: &EntityId) -> bool {
        let before = self.children.len();
        self.children.retain(|c| &c.id != id);
        before != self.children.len()
    }

    pub fn child_node_entry(&self, id: &EntityId) -> Option<&ChildNodeEntry> {
        self.children.iter().find(|c| &c.id == id)
    }

    pub fn add_property_name(&mut self, name: Name) {
        self.property_names.insert(name);
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// State of one property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyState {
    pub id: PropertyId,
    pub property_type: PropertyType,
    pub multi_valued: bool,
    pub mod_count: u16,
    pub values: Vec<Value>,
    pub status: ItemStatus,
}

impl PropertyState {
    /// Create a fresh, uncommitted property shell
    pub fn new(id: PropertyId) -> Self {
        Self {
            id,
            property_type: PropertyType::Undefined,
            multi_valued: false,
            mod_count: 0,
            values: Vec::new(),
            status: ItemStatus::New,
        }
    }

    /// Single-valued property holding `value`
    pub fn single(id: PropertyId, value: Value) -> Self {
        let property_type = value.property_type();
        Self {
            property_type,
            values: vec![value],
            ..Self::new(id)
        }
    }

    /// Multi-valued property of the given type
    pub fn multi(id: PropertyId, property_type: PropertyType, values: Vec<Value>) -> Self {
        Self {
            property_type,
            multi_valued: true,
            values,
            ..Self::new(id)
        }
    }

    pub fn name(&self) -> &Name {
        self.id.name()
    }

    /// Targets of all reference values held by this property
    pub fn reference_targets(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.values.iter().filter_map(Value::reference_target)
    }
}

/// Property as embedded in a bundle
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    pub id: PropertyId,
    pub property_type: PropertyType,
    pub multi_valued: bool,
    pub mod_count: u16,
    pub values: Vec<Value>,
}

impl PropertyEntry {
    pub fn from_state(state: &PropertyState) -> Self {
        Self {
            id: state.id.clone(),
            property_type: state.property_type,
            multi_valued: state.multi_valued,
            mod_count: state.mod_count,
            values: state.values.clone(),
        }
    }

    pub fn to_state(&self) -> PropertyState {
        PropertyState {
            id: self.id.clone(),
            property_type: self.property_type,
            multi_valued: self.multi_valued,
            mod_count: self.mod_count,
            values: self.values.clone(),
            status: ItemStatus::Existing,
        }
    }

    pub fn name(&self) -> &Name {
        self.id.name()
    }
}

/// A node together with all of its properties
#[derive(Debug, Clone, PartialEq)]
pub struct NodePropBundle {
    pub id: EntityId,
    pub node_type: Name,
    pub parent_id: Option<EntityId>,
    pub mixin_types: BTreeSet<Name>,
    pub mod_count: u16,
    pub properties: BTreeMap<Name, PropertyEntry>,
    pub children: Vec<ChildNodeEntry>,
    pub is_new: bool,
}

impl NodePropBundle {
    /// Start a bundle from a node state; properties are added separately
    pub fn from_node_state(state: &NodeState) -> Self {
        Self {
            id: state.id,
            node_type: state.node_type.clone(),
            parent_id: state.parent_id,
            mixin_types: state.mixin_types.clone(),
            mod_count: state.mod_count,
            properties: BTreeMap::new(),
            children: state.children.clone(),
            is_new: state.status == ItemStatus::New,
        }
    }

    /// Copy the node-level fields of `state` into this bundle
    ///
    /// Property entries whose names are no longer listed on the state are
    /// dropped; values for the remaining ones are kept.
    pub fn update(&mut self, state: &NodeState) {
        self.node_type = state.node_type.clone();
        self.parent_id = state.parent_id;
        self.mixin_types = state.mixin_types.clone();
        self.children = state.children.clone();
        if !state.property_names.is_empty() {
            self.properties
                .retain(|name, _| state.property_names.contains(name));
        }
    }

    pub fn add_property(&mut self, entry: PropertyEntry) {
        self.properties.insert(entry.name().clone(), entry);
    }

    pub fn remove_property(&mut self, name: &Name) -> Option<PropertyEntry> {
        self.properties.remove(name)
    }

    pub fn property(&self, name: &Name) -> Option<&PropertyEntry> {
        self.properties.get(name)
    }

    /// Project the node-level view of this bundle
    pub fn to_node_state(&self) -> NodeState {
        NodeState {
            id: self.id,
            node_type: self.node_type.clone(),
            parent_id: self.parent_id,
            mixin_types: self.mixin_types.clone(),
            mod_count: self.mod_count,
            property_names: self.properties.keys().cloned().collect(),
            children: self.children.clone(),
            status: ItemStatus::Existing,
        }
    }

    /// Build a property entry for `name` owned by this bundle
    pub fn property_id(&self, name: Name) -> PropertyId {
        PropertyId::new(self.id, name)
    }
}

/// The set of properties that reference a target node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReferences {
    pub target: EntityId,
    pub references: BTreeSet<PropertyId>,
}

impl NodeReferences {
    pub fn new(target: EntityId) -> Self {
        Self {
            target,
            references: BTreeSet::new(),
        }
    }

    pub fn add_reference(&mut self, property: PropertyId) {
        self.references.insert(property);
    }

    pub fn remove_reference(&mut self, property: &PropertyId) -> bool {
        self.references.remove(property)
    }

    pub fn has_references(&self) -> bool {
        !self.references.is_empty()
    }

    /// Canonical strings as stored in the references attribute
    pub fn to_strings(&self) -> BTreeSet<String> {
        self.references.iter().map(ToString::to_string).collect()
    }

    /// Rebuild from stored strings
    pub fn from_strings<'a>(
        target: EntityId,
        strings: impl IntoIterator<Item = &'a String>,
    ) -> CodecResult<Self> {
        let mut refs = Self::new(target);
        for s in strings {
            refs.add_reference(PropertyId::parse(s)?);
        }
        Ok(refs)
    }
}

/// Either kind of item state
#[derive(Debug, Clone, PartialEq)]
pub enum ItemState {
    Node(NodeState),
    Property(PropertyState),
}

impl ItemState {
    pub fn is_node(&self) -> bool {
        matches!(self, ItemState::Node(_))
    }

    /// Canonical key of the item
    pub fn key(&self) -> String {
        match self {
            ItemState::Node(n) => n.id.to_string(),
            ItemState::Property(p) => p.id.to_string(),
        }
    }

    pub fn mod_count(&self) -> u16 {
        match self {
            ItemState::Node(n) => n.mod_count,
            ItemState::Property(p) => p.mod_count,
        }
    }

    /// Record a successful write: bump the counter and mark existing
    pub fn mark_persisted(&mut self, mod_count: u16) {
        match self {
            ItemState::Node(n) => {
                n.mod_count = mod_count;
                n.status = ItemStatus::Existing;
            }
            ItemState::Property(p) => {
                p.mod_count = mod_count;
                p.status = ItemStatus::Existing;
            }
        }
    }
}

impl From<NodeState> for ItemState {
    fn from(state: NodeState) -> Self {
        ItemState::Node(state)
    }
}

impl From<PropertyState> for ItemState {
    fn from(state: PropertyState) -> Self {
        ItemState::Property(state)
    }
}
