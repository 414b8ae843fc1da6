//! Typed property values
//!
//! `PropertyType` is the fixed type enumeration of the content model and
//! `Value` carries one scalar of one of those types. Every match over either
//! enum is exhaustive, so adding a type forces every codec path to handle it.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset};

use crate::error::CodecError;
use crate::ids::EntityId;
use crate::name::Name;
use crate::path::Path;
use crate::uri::Uri;

/// Property type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Binary,
    Boolean,
    Date,
    Decimal,
    Double,
    Long,
    Name,
    Path,
    Reference,
    WeakReference,
    String,
    Undefined,
    Uri,
}

impl PropertyType {
    pub const ALL: [PropertyType; 13] = [
        PropertyType::Binary,
        PropertyType::Boolean,
        PropertyType::Date,
        PropertyType::Decimal,
        PropertyType::Double,
        PropertyType::Long,
        PropertyType::Name,
        PropertyType::Path,
        PropertyType::Reference,
        PropertyType::WeakReference,
        PropertyType::String,
        PropertyType::Undefined,
        PropertyType::Uri,
    ];

    /// Name recorded in stored documents
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Binary => "Binary",
            PropertyType::Boolean => "Boolean",
            PropertyType::Date => "Date",
            PropertyType::Decimal => "Decimal",
            PropertyType::Double => "Double",
            PropertyType::Long => "Long",
            PropertyType::Name => "Name",
            PropertyType::Path => "Path",
            PropertyType::Reference => "Reference",
            PropertyType::WeakReference => "WeakReference",
            PropertyType::String => "String",
            PropertyType::Undefined => "undefined",
            PropertyType::Uri => "URI",
        }
    }

    /// Reference types contribute to the reverse-reference index
    pub fn is_reference(&self) -> bool {
        matches!(self, PropertyType::Reference | PropertyType::WeakReference)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CodecError::UnsupportedType(s.to_string()))
    }
}

/// A single typed scalar
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Binary(Vec<u8>),
    Boolean(bool),
    Date(DateTime<FixedOffset>),
    Decimal(BigDecimal),
    Double(f64),
    Long(i64),
    Name(Name),
    Path(Path),
    Reference(EntityId),
    WeakReference(EntityId),
    String(String),
    Undefined(String),
    Uri(Uri),
}

impl Value {
    pub fn property_type(&self) -> PropertyType {
        match self {
            Value::Binary(_) => PropertyType::Binary,
            Value::Boolean(_) => PropertyType::Boolean,
            Value::Date(_) => PropertyType::Date,
            Value::Decimal(_) => PropertyType::Decimal,
            Value::Double(_) => PropertyType::Double,
            Value::Long(_) => PropertyType::Long,
            Value::Name(_) => PropertyType::Name,
            Value::Path(_) => PropertyType::Path,
            Value::Reference(_) => PropertyType::Reference,
            Value::WeakReference(_) => PropertyType::WeakReference,
            Value::String(_) => PropertyType::String,
            Value::Undefined(_) => PropertyType::Undefined,
            Value::Uri(_) => PropertyType::Uri,
        }
    }

    /// Target of a REFERENCE or WEAKREFERENCE value
    pub fn reference_target(&self) -> Option<EntityId> {
        match self {
            Value::Reference(id) | Value::WeakReference(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_round_trip() {
        for t in PropertyType::ALL {
            assert_eq!(t.as_str().parse::<PropertyType>().unwrap(), t);
        }
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let err = "Geometry".parse::<PropertyType>().unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedType(ref t) if t == "Geometry"));
    }

    #[test]
    fn test_reference_target() {
        let id = EntityId::random();
        assert_eq!(Value::Reference(id).reference_target(), Some(id));
        assert_eq!(Value::WeakReference(id).reference_target(), Some(id));
        assert_eq!(Value::from("x").reference_target(), None);
        assert!(PropertyType::WeakReference.is_reference());
        assert!(!PropertyType::Path.is_reference());
    }
}
