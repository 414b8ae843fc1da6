//! State codec
//!
//! Split-layout documents. A node document lists its properties by name
//! only; each property is stored as its own document.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::codec::bundle::{check_arity, decode_children, encode_children, within, ChildDocument};
use crate::codec::value::{decode_all, encode_all};
use crate::error::CodecResult;
use crate::ids::{EntityId, PropertyId};
use crate::name::Name;
use crate::state::{ItemStatus, NodeState, PropertyState};
use crate::value::PropertyType;

/// Stored form of a node shell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStateDocument {
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub mixin_types: BTreeSet<String>,
    pub mod_count: u16,
    #[serde(default)]
    pub properties: BTreeSet<String>,
    #[serde(default)]
    pub children: Vec<ChildDocument>,
}

/// Stored form of a standalone property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyStateDocument {
    #[serde(rename = "type")]
    pub property_type: String,
    pub multi_valued: bool,
    pub mod_count: u16,
    pub values: Vec<Json>,
}

impl NodeStateDocument {
    pub fn from_state(state: &NodeState) -> Self {
        Self {
            node_type: state.node_type.to_string(),
            parent_id: state.parent_id.map(|p| p.to_string()),
            mixin_types: state.mixin_types.iter().map(ToString::to_string).collect(),
            mod_count: state.mod_count,
            properties: state.property_names.iter().map(ToString::to_string).collect(),
            children: encode_children(&state.children),
        }
    }

    pub fn into_state(self, id: EntityId) -> CodecResult<NodeState> {
        Ok(NodeState {
            id,
            node_type: within(id, Name::parse(&self.node_type))?,
            parent_id: self
                .parent_id
                .as_deref()
                .map(|p| within(id, EntityId::parse(p)))
                .transpose()?,
            mixin_types: self
                .mixin_types
                .iter()
                .map(|m| within(id, Name::parse(m)))
                .collect::<CodecResult<_>>()?,
            mod_count: self.mod_count,
            property_names: self
                .properties
                .iter()
                .map(|p| within(id, Name::parse(p)))
                .collect::<CodecResult<_>>()?,
            children: decode_children(id, &self.children)?,
            status: ItemStatus::Existing,
        })
    }
}

impl PropertyStateDocument {
    pub fn from_state(state: &PropertyState) -> CodecResult<Self> {
        check_arity(state.multi_valued, state.values.len(), state.name())?;
        Ok(Self {
            property_type: state.property_type.as_str().to_string(),
            multi_valued: state.multi_valued,
            mod_count: state.mod_count,
            values: encode_all(state.property_type, &state.values)?,
        })
    }

    pub fn into_state(self, id: PropertyId) -> CodecResult<PropertyState> {
        let property_type: PropertyType = self.property_type.parse()?;
        let values = within(id.parent_id(), decode_all(property_type, &self.values))?;
        Ok(PropertyState {
            id,
            property_type,
            multi_valued: self.multi_valued,
            mod_count: self.mod_count,
            values,
            status: ItemStatus::Existing,
        })
    }
}

pub fn encode_node(state: &NodeState) -> CodecResult<String> {
    Ok(serde_json::to_string(&NodeStateDocument::from_state(state))?)
}

pub fn decode_node(id: EntityId, json: &str) -> CodecResult<NodeState> {
    serde_json::from_str::<NodeStateDocument>(json)?.into_state(id)
}

pub fn encode_property(state: &PropertyState) -> CodecResult<String> {
    Ok(serde_json::to_string(&PropertyStateDocument::from_state(state)?)?)
}

pub fn decode_property(id: PropertyId, json: &str) -> CodecResult<PropertyState> {
    serde_json::from_str::<PropertyStateDocument>(json)?.into_state(id)
}
