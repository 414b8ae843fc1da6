//! Item identifiers
//!
//! `EntityId` identifies a node; `PropertyId` identifies a property by its
//! owner and name. Both have a canonical string form used as the partition
//! key of the backing store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{CodecError, CodecResult};
use crate::name::Name;

/// Globally unique node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Generate a fresh random id
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build an id from a raw 128-bit value (handy for fixtures)
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Parse the canonical hyphenated form
    pub fn parse(s: &str) -> CodecResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CodecError::format("entity id", s, e.to_string()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for EntityId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Identifier of a property: owning node plus property name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId {
    parent: EntityId,
    name: Name,
}

impl PropertyId {
    pub fn new(parent: EntityId, name: Name) -> Self {
        Self { parent, name }
    }

    /// Parse `<entity id>/<name>`
    ///
    /// The name may contain `/` inside its namespace, so only the first
    /// separator is significant.
    pub fn parse(s: &str) -> CodecResult<Self> {
        let (parent, name) = s
            .split_once('/')
            .ok_or_else(|| CodecError::format("property id", s, "missing '/' separator"))?;
        let parent = EntityId::parse(parent)
            .map_err(|e| CodecError::format("property id", s, e.to_string()))?;
        let name =
            Name::parse(name).map_err(|e| CodecError::format("property id", s, e.to_string()))?;
        Ok(Self { parent, name })
    }

    pub fn parent_id(&self) -> EntityId {
        self.parent
    }

    pub fn name(&self) -> &Name {
        &self.name
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parent, self.name)
    }
}

impl FromStr for PropertyId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_canonical_form() {
        let id = EntityId::from_u128(1);
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000001");
        assert_eq!(EntityId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_entity_id_rejects_garbage() {
        let err = EntityId::parse("n1").unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_property_id_with_namespaced_name() {
        let parent = EntityId::random();
        let name = Name::parse("{http://www.jcp.org/jcr/1.0}title").unwrap();
        let id = PropertyId::new(parent, name.clone());

        let parsed = PropertyId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed.parent_id(), parent);
        assert_eq!(parsed.name(), &name);
    }

    #[test]
    fn test_property_id_rejects_missing_separator() {
        assert!(PropertyId::parse("00000000-0000-0000-0000-000000000001").is_err());
        assert!(PropertyId::parse("not-a-uuid/{}title").is_err());
    }
}
