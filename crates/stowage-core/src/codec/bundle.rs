//! Bundle codec
//!
//! Flattens a `NodePropBundle` into a JSON document and rebuilds it. Property
//! entries form an unordered set; children keep their sibling order.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::codec::value::{decode_all, encode_all};
use crate::error::{CodecError, CodecResult};
use crate::ids::{EntityId, PropertyId};
use crate::name::Name;
use crate::state::{ChildNodeEntry, NodePropBundle, PropertyEntry};
use crate::value::PropertyType;

/// Stored form of a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleDocument {
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub mixin_types: BTreeSet<String>,
    pub mod_count: u16,
    #[serde(default)]
    pub properties: Vec<PropertyDocument>,
    #[serde(default)]
    pub children: Vec<ChildDocument>,
}

/// Stored form of one embedded property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDocument {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: String,
    pub multi_valued: bool,
    pub mod_count: u16,
    pub values: Vec<Json>,
}

/// Stored form of a child link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildDocument {
    pub name: String,
    pub entity_id: String,
}

impl BundleDocument {
    /// Build the document for a bundle
    pub fn from_bundle(bundle: &NodePropBundle) -> CodecResult<Self> {
        let properties = bundle
            .properties
            .values()
            .map(|entry| {
                check_arity(entry.multi_valued, entry.values.len(), entry.name())?;
                Ok(PropertyDocument {
                    name: entry.name().to_string(),
                    property_type: entry.property_type.as_str().to_string(),
                    multi_valued: entry.multi_valued,
                    mod_count: entry.mod_count,
                    values: encode_all(entry.property_type, &entry.values)?,
                })
            })
            .collect::<CodecResult<Vec<_>>>()?;

        Ok(Self {
            node_type: bundle.node_type.to_string(),
            parent_id: bundle.parent_id.map(|p| p.to_string()),
            mixin_types: bundle.mixin_types.iter().map(ToString::to_string).collect(),
            mod_count: bundle.mod_count,
            properties,
            children: encode_children(&bundle.children),
        })
    }

    /// Rebuild the bundle stored under `id`
    ///
    /// Property ids are re-synthesized from `id` and each recorded name.
    /// Grammar violations in recorded strings surface as deserialization
    /// errors; an unknown type name stays `UnsupportedType`.
    pub fn into_bundle(self, id: EntityId) -> CodecResult<NodePropBundle> {
        let mut properties = BTreeMap::new();
        for doc in self.properties {
            let name = within(id, Name::parse(&doc.name))?;
            let property_type: PropertyType = doc.property_type.parse()?;
            let values = within(id, decode_all(property_type, &doc.values))?;
            let entry = PropertyEntry {
                id: PropertyId::new(id, name.clone()),
                property_type,
                multi_valued: doc.multi_valued,
                mod_count: doc.mod_count,
                values,
            };
            if properties.insert(name.clone(), entry).is_some() {
                return Err(CodecError::deserialization(format!(
                    "bundle {} records property {} twice",
                    id, name
                )));
            }
        }

        Ok(NodePropBundle {
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
            properties,
            children: decode_children(id, &self.children)?,
            is_new: false,
        })
    }

    pub fn to_json(&self) -> CodecResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> CodecResult<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Encode a bundle straight to its JSON text
pub fn encode_bundle(bundle: &NodePropBundle) -> CodecResult<String> {
    BundleDocument::from_bundle(bundle)?.to_json()
}

/// Decode the JSON text stored under `id`
pub fn decode_bundle(id: EntityId, json: &str) -> CodecResult<NodePropBundle> {
    BundleDocument::from_json(json)?.into_bundle(id)
}

pub(crate) fn encode_children(children: &[ChildNodeEntry]) -> Vec<ChildDocument> {
    children
        .iter()
        .map(|c| ChildDocument {
            name: c.name.to_string(),
            entity_id: c.id.to_string(),
        })
        .collect()
}

pub(crate) fn decode_children(
    owner: EntityId,
    children: &[ChildDocument],
) -> CodecResult<Vec<ChildNodeEntry>> {
    children
        .iter()
        .map(|c| {
            Ok(ChildNodeEntry::new(
                within(owner, Name::parse(&c.name))?,
                within(owner, EntityId::parse(&c.entity_id))?,
            ))
        })
        .collect()
}

pub(crate) fn check_arity(multi_valued: bool, count: usize, name: &Name) -> CodecResult<()> {
    if !multi_valued && count != 1 {
        return Err(CodecError::deserialization(format!(
            "single-valued property {} holds {} values",
            name, count
        )));
    }
    Ok(())
}

/// Re-tag grammar failures inside a stored document as deserialization errors
pub(crate) fn within<T>(owner: EntityId, result: CodecResult<T>) -> CodecResult<T> {
    result.map_err(|e| match e {
        CodecError::Format { .. } => {
            CodecError::deserialization(format!("document for {}: {}", owner, e))
        }
        other => other,
    })
}
