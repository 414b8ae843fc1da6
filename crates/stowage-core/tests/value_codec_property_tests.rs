//! Property-based tests for the value codec
//!
//! Every supported type must survive encode/decode unchanged, including the
//! empty-string and zero-length-binary sentinel path.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use stowage_core::codec::{decode_value, encode_value, EMPTY_SENTINEL};
use stowage_core::{EntityId, Name, Path, PropertyType, Uri, Value};

fn name_strategy() -> impl Strategy<Value = Name> {
    (
        prop_oneof![Just(""), Just("http://www.jcp.org/jcr/1.0"), Just("urn:x")],
        "[a-zA-Z_][a-zA-Z0-9_.-]{0,10}",
    )
        .prop_map(|(ns, local)| Name::new(ns, local).unwrap())
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Binary),
        any::<bool>().prop_map(Value::Boolean),
        (-10_000_000_000_000i64..10_000_000_000_000i64).prop_map(|ms| {
            Value::Date(Utc.timestamp_millis_opt(ms).single().unwrap().fixed_offset())
        }),
        (any::<i64>(), 0u32..1000).prop_map(|(whole, frac)| {
            Value::Decimal(BigDecimal::from_str(&format!("{}.{:03}", whole, frac)).unwrap())
        }),
        any::<f64>()
            .prop_filter("NaN never equals itself", |d| !d.is_nan())
            .prop_map(Value::Double),
        any::<i64>().prop_map(Value::Long),
        name_strategy().prop_map(Value::Name),
        prop::collection::vec(name_strategy(), 0..4).prop_map(|names| {
            Value::Path(names.into_iter().fold(Path::root(), Path::child))
        }),
        any::<u128>().prop_map(|v| Value::Reference(EntityId::from_u128(v))),
        any::<u128>().prop_map(|v| Value::WeakReference(EntityId::from_u128(v))),
        ".*".prop_map(Value::String),
        "[a-z0-9 ]{0,16}".prop_map(Value::Undefined),
        "[a-z0-9]{0,12}".prop_map(|p| Value::Uri(
            Uri::parse(&format!("https://example.com/{}", p)).unwrap()
        )),
    ]
}

proptest! {
    /// Property: decode(encode(v)) == v for every type
    #[test]
    fn round_trip_preserves_value(value in value_strategy()) {
        let t = value.property_type();
        let encoded = encode_value(t, &value).unwrap();
        let decoded = decode_value(t, &encoded).unwrap();
        prop_assert_eq!(decoded, value);
    }

    /// Property: the store never sees an empty string
    #[test]
    fn never_encodes_empty_strings(value in value_strategy()) {
        let t = value.property_type();
        let encoded = encode_value(t, &value).unwrap();
        if matches!(t, PropertyType::String | PropertyType::Binary) {
            prop_assert_ne!(encoded.as_str(), Some(""));
        }
    }

    /// Property: only empty STRING and BINARY values produce the sentinel
    #[test]
    fn sentinel_marks_only_empty_string_or_binary(value in value_strategy()) {
        let t = value.property_type();
        let encoded = encode_value(t, &value).unwrap();
        let is_empty = match &value {
            Value::String(s) => s.is_empty(),
            Value::Binary(b) => b.is_empty(),
            _ => false,
        };
        if is_empty {
            prop_assert_eq!(encoded, EMPTY_SENTINEL);
        } else if !matches!(value, Value::Boolean(false)) {
            prop_assert_ne!(encoded, EMPTY_SENTINEL);
        }
    }
}
