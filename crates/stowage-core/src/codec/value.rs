//! Value codec
//!
//! Converts typed scalars to JSON values the backing store can hold and back.
//!
//! ## Encoding rules
//!
//! - `Binary`: standard base64 text, or the sentinel `false` for zero bytes
//! - `Boolean`: JSON boolean
//! - `Date`: milliseconds since the epoch as a JSON integer
//! - `Decimal`: plain decimal string, never exponent notation
//! - `Double`: the shortest round-trip string form, not a JSON number
//! - `Long`: JSON integer
//! - `Name`, `Path`, `Uri`, `Undefined`: canonical string
//! - `Reference`, `WeakReference`: the target id string
//! - `String`: the string itself, or the sentinel `false` when empty
//!
//! The time zone of a `Date` is not persisted. Decoding yields the same
//! instant expressed in the reader's local offset.

use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bigdecimal::BigDecimal;
use chrono::{Local, TimeZone};
use serde_json::Value as Json;

use crate::error::{CodecError, CodecResult};
use crate::ids::EntityId;
use crate::name::Name;
use crate::path::Path;
use crate::uri::Uri;
use crate::value::{PropertyType, Value};

/// Stand-in for values the store cannot represent (empty string, empty binary)
pub const EMPTY_SENTINEL: Json = Json::Bool(false);

/// Encode one scalar of a property declared as `declared`
pub fn encode(declared: PropertyType, value: &Value) -> CodecResult<Json> {
    if value.property_type() != declared {
        return Err(CodecError::TypeMismatch {
            declared: declared.as_str(),
            actual: value.property_type().as_str(),
        });
    }

    let encoded = match value {
        Value::Binary(bytes) if bytes.is_empty() => EMPTY_SENTINEL,
        Value::Binary(bytes) => Json::String(STANDARD.encode(bytes)),
        Value::Boolean(b) => Json::Bool(*b),
        Value::Date(dt) => Json::from(dt.timestamp_millis()),
        Value::Decimal(d) => Json::String(d.to_plain_string()),
        Value::Double(d) => Json::String(d.to_string()),
        Value::Long(l) => Json::from(*l),
        Value::Name(n) => Json::String(n.to_string()),
        Value::Path(p) => Json::String(p.to_string()),
        Value::Reference(id) | Value::WeakReference(id) => Json::String(id.to_string()),
        Value::String(s) if s.is_empty() => EMPTY_SENTINEL,
        Value::String(s) => Json::String(s.clone()),
        Value::Undefined(s) => Json::String(s.clone()),
        Value::Uri(u) => Json::String(u.as_str().to_string()),
    };
    Ok(encoded)
}

/// Decode one scalar recorded for a property declared as `declared`
pub fn decode(declared: PropertyType, encoded: &Json) -> CodecResult<Value> {
    let value = match declared {
        PropertyType::Binary => match encoded {
            Json::Bool(false) => Value::Binary(Vec::new()),
            other => {
                let text = expect_str(declared, other)?;
                let bytes = STANDARD
                    .decode(text)
                    .map_err(|e| CodecError::format("binary", text, e.to_string()))?;
                Value::Binary(bytes)
            }
        },
        PropertyType::Boolean => match encoded {
            Json::Bool(b) => Value::Boolean(*b),
            other => return Err(wrong_kind(declared, other)),
        },
        PropertyType::Date => {
            let millis = encoded
                .as_i64()
                .ok_or_else(|| wrong_kind(declared, encoded))?;
            let local = Local
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| {
                    CodecError::format("date", millis.to_string(), "out of range instant")
                })?;
            Value::Date(local.fixed_offset())
        }
        PropertyType::Decimal => {
            let text = expect_str(declared, encoded)?;
            let decimal = BigDecimal::from_str(text)
                .map_err(|e| CodecError::format("decimal", text, e.to_string()))?;
            Value::Decimal(decimal)
        }
        PropertyType::Double => match encoded {
            Json::String(text) => Value::Double(
                text.parse::<f64>()
                    .map_err(|e| CodecError::format("double", text.as_str(), e.to_string()))?,
            ),
            Json::Number(n) => Value::Double(n.as_f64().ok_or_else(|| wrong_kind(declared, encoded))?),
            other => return Err(wrong_kind(declared, other)),
        },
        PropertyType::Long => match encoded {
            Json::Number(n) => Value::Long(n.as_i64().ok_or_else(|| wrong_kind(declared, encoded))?),
            Json::String(text) => Value::Long(
                text.parse::<i64>()
                    .map_err(|e| CodecError::format("long", text.as_str(), e.to_string()))?,
            ),
            other => return Err(wrong_kind(declared, other)),
        },
        PropertyType::Name => Value::Name(Name::parse(expect_str(declared, encoded)?)?),
        PropertyType::Path => Value::Path(Path::parse(expect_str(declared, encoded)?)?),
        PropertyType::Reference => {
            Value::Reference(EntityId::parse(expect_str(declared, encoded)?)?)
        }
        PropertyType::WeakReference => {
            Value::WeakReference(EntityId::parse(expect_str(declared, encoded)?)?)
        }
        PropertyType::String => match encoded {
            Json::Bool(false) => Value::String(String::new()),
            other => Value::String(expect_str(declared, other)?.to_string()),
        },
        PropertyType::Undefined => Value::Undefined(expect_str(declared, encoded)?.to_string()),
        PropertyType::Uri => Value::Uri(Uri::parse(expect_str(declared, encoded)?)?),
    };
    Ok(value)
}

/// Encode every value of a property, preserving order
pub fn encode_all(declared: PropertyType, values: &[Value]) -> CodecResult<Vec<Json>> {
    values.iter().map(|v| encode(declared, v)).collect()
}

/// Decode every recorded value of a property, preserving order
pub fn decode_all(declared: PropertyType, encoded: &[Json]) -> CodecResult<Vec<Value>> {
    encoded.iter().map(|v| decode(declared, v)).collect()
}

fn expect_str(declared: PropertyType, encoded: &Json) -> CodecResult<&str> {
    encoded.as_str().ok_or_else(|| wrong_kind(declared, encoded))
}

fn wrong_kind(declared: PropertyType, encoded: &Json) -> CodecError {
    CodecError::deserialization(format!(
        "unexpected JSON value {} for a {} value",
        encoded, declared
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;
    use test_case::test_case;

    fn round_trip(value: Value) -> Value {
        let t = value.property_type();
        let encoded = encode(t, &value).unwrap();
        decode(t, &encoded).unwrap()
    }

    #[test]
    fn test_empty_string_uses_sentinel() {
        let encoded = encode(PropertyType::String, &Value::from("")).unwrap();
        assert_eq!(encoded, json!(false));
        assert_eq!(
            decode(PropertyType::String, &encoded).unwrap(),
            Value::from("")
        );
    }

    #[test]
    fn test_empty_binary_uses_sentinel() {
        let encoded = encode(PropertyType::Binary, &Value::Binary(Vec::new())).unwrap();
        assert_eq!(encoded, json!(false));
        assert_eq!(
            decode(PropertyType::Binary, &encoded).unwrap(),
            Value::Binary(Vec::new())
        );
    }

    #[test]
    fn test_binary_is_base64() {
        let encoded = encode(PropertyType::Binary, &Value::Binary(b"hello".to_vec())).unwrap();
        assert_eq!(encoded, json!("aGVsbG8="));
    }

    #[test]
    fn test_double_is_stored_as_string() {
        let encoded = encode(PropertyType::Double, &Value::Double(0.1)).unwrap();
        assert_eq!(encoded, json!("0.1"));
        assert_eq!(round_trip(Value::Double(f64::MAX)), Value::Double(f64::MAX));
        assert_eq!(
            round_trip(Value::Double(f64::NEG_INFINITY)),
            Value::Double(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn test_decimal_is_plain_string() {
        let d = BigDecimal::from_str("1.5E+3").unwrap();
        let encoded = encode(PropertyType::Decimal, &Value::Decimal(d.clone())).unwrap();
        assert_eq!(encoded, json!("1500"));
        assert_eq!(round_trip(Value::Decimal(d.clone())), Value::Decimal(d));
    }

    #[test]
    fn test_date_is_epoch_millis_and_keeps_instant() {
        let dt = DateTime::parse_from_rfc3339("2009-06-15T13:45:30.123+05:30").unwrap();
        let encoded = encode(PropertyType::Date, &Value::Date(dt)).unwrap();
        assert_eq!(encoded, json!(dt.timestamp_millis()));
        match round_trip(Value::Date(dt)) {
            Value::Date(back) => assert_eq!(back.timestamp_millis(), dt.timestamp_millis()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_long_accepts_number_or_string() {
        assert_eq!(
            decode(PropertyType::Long, &json!(42)).unwrap(),
            Value::Long(42)
        );
        assert_eq!(
            decode(PropertyType::Long, &json!("-7")).unwrap(),
            Value::Long(-7)
        );
    }

    #[test_case(PropertyType::Name, "{ns}bad[" ; "name")]
    #[test_case(PropertyType::Path, "{}a\t{}" ; "path")]
    #[test_case(PropertyType::Reference, "not-an-id" ; "reference")]
    #[test_case(PropertyType::Uri, "http://[::1" ; "uri")]
    fn test_malformed_strings_are_format_errors(t: PropertyType, raw: &str) {
        let err = decode(t, &json!(raw)).unwrap_err();
        assert!(err.is_format(), "{:?}", err);
    }

    #[test]
    fn test_type_mismatch_on_encode() {
        let err = encode(PropertyType::Long, &Value::from("x")).unwrap_err();
        assert!(matches!(
            err,
            CodecError::TypeMismatch {
                declared: "Long",
                actual: "String"
            }
        ));
    }

    #[test]
    fn test_wrong_json_kind_is_deserialization_error() {
        let err = decode(PropertyType::Boolean, &json!("true")).unwrap_err();
        assert!(matches!(err, CodecError::Deserialization(_)));
        let err = decode(PropertyType::Date, &json!("yesterday")).unwrap_err();
        assert!(matches!(err, CodecError::Deserialization(_)));
    }

    #[test]
    fn test_sentinel_only_applies_to_string_and_binary() {
        assert_eq!(
            decode(PropertyType::Boolean, &json!(false)).unwrap(),
            Value::Boolean(false)
        );
        assert!(decode(PropertyType::Name, &json!(false)).is_err());
    }
}
