//! Tests for typed values and keys
//!
//! These tests verify:
//! - Payload encoding per type
//! - Decoding with width and content checks
//! - Key identity across types
//! - Structured (serde) payloads

use bytes::Bytes;
use caskkv::entry::{Key, Value, ValueType};
use caskkv::CaskError;
use serde::{Deserialize, Serialize};

// =============================================================================
// ValueType Tests
// =============================================================================

#[test]
fn test_value_type_tags() {
    assert_eq!(ValueType::Int.as_u8(), 1);
    assert_eq!(ValueType::Float.as_u8(), 2);
    assert_eq!(ValueType::Bool.as_u8(), 3);
    assert_eq!(ValueType::Str.as_u8(), 4);
    assert_eq!(ValueType::Bytes.as_u8(), 5);
    assert_eq!(ValueType::Structured.as_u8(), 6);

    for tag in 1u8..=6 {
        assert_eq!(ValueType::try_from(tag).unwrap().as_u8(), tag);
    }
}

#[test]
fn test_value_type_unknown_tag() {
    assert!(matches!(ValueType::try_from(0), Err(CaskError::UnsupportedType(_))));
    assert!(matches!(ValueType::try_from(7), Err(CaskError::UnsupportedType(_))));
}

#[test]
fn test_fixed_widths() {
    assert_eq!(ValueType::Int.fixed_width(), Some(8));
    assert_eq!(ValueType::Float.fixed_width(), Some(8));
    assert_eq!(ValueType::Bool.fixed_width(), Some(1));
    assert_eq!(ValueType::Str.fixed_width(), None);
}

// =============================================================================
// Encode / Decode Tests
// =============================================================================

#[test]
fn test_encode_each_type() {
    assert_eq!(Value::Int(1).encode().as_ref(), &1i64.to_be_bytes());
    assert_eq!(Value::Float(1.5).encode().as_ref(), &1.5f64.to_bits().to_be_bytes());
    assert_eq!(Value::Bool(true).encode().as_ref(), &[1]);
    assert_eq!(Value::Bool(false).encode().as_ref(), &[0]);
    assert_eq!(Value::from("héllo").encode().as_ref(), "héllo".as_bytes());
    assert_eq!(Value::from(vec![9u8, 8, 7]).encode().as_ref(), &[9, 8, 7]);
}

#[test]
fn test_decode_each_type() {
    let values = [
        Value::Int(i64::MIN),
        Value::Float(-0.25),
        Value::Bool(true),
        Value::from("text"),
        Value::Bytes(Bytes::from_static(b"\x00raw")),
    ];

    for value in values {
        let decoded = Value::decode(value.value_type(), &value.encode()).unwrap();
        assert_eq!(decoded, value);
    }
}

#[test]
fn test_decode_wrong_width() {
    let result = Value::decode(ValueType::Int, &[0, 1, 2]);
    assert!(matches!(result, Err(CaskError::CorruptEntry(_))));

    let result = Value::decode(ValueType::Bool, &[]);
    assert!(matches!(result, Err(CaskError::CorruptEntry(_))));
}

#[test]
fn test_decode_invalid_bool() {
    let result = Value::decode(ValueType::Bool, &[2]);
    assert!(matches!(result, Err(CaskError::CorruptEntry(_))));
}

#[test]
fn test_decode_invalid_utf8() {
    let result = Value::decode(ValueType::Str, &[0xff, 0xfe]);
    assert!(matches!(result, Err(CaskError::CorruptEntry(_))));
}

// =============================================================================
// Conversion Tests
// =============================================================================

#[test]
fn test_from_conversions() {
    assert_eq!(Value::from(7u8), Value::Int(7));
    assert_eq!(Value::from(-3i32), Value::Int(-3));
    assert_eq!(Value::from(2.0f32), Value::Float(2.0));
    assert_eq!(Value::from(false), Value::Bool(false));
    assert_eq!(Value::from(String::from("s")), Value::Str("s".to_string()));
    assert_eq!(Value::from(b"ab"), Value::Bytes(Bytes::from_static(b"ab")));
}

#[test]
fn test_u64_conversion_overflow() {
    assert_eq!(Value::try_from(5u64).unwrap(), Value::Int(5));
    assert!(matches!(Value::try_from(u64::MAX), Err(CaskError::InvalidValue(_))));
}

#[test]
fn test_accessors() {
    assert_eq!(Value::Int(3).as_int(), Some(3));
    assert_eq!(Value::from("x").as_str(), Some("x"));
    assert_eq!(Value::Bool(true).as_bool(), Some(true));
    assert_eq!(Value::Float(0.5).as_float(), Some(0.5));
    assert_eq!(Value::from(b"z").as_bytes(), Some(&b"z"[..]));
    assert_eq!(Value::Int(3).as_str(), None);
}

#[test]
fn test_display() {
    assert_eq!(Value::Int(-9).to_string(), "-9");
    assert_eq!(Value::from("hi").to_string(), "hi");
    assert_eq!(Value::from(vec![0xde, 0xad]).to_string(), "0xdead");
    assert_eq!(ValueType::Structured.to_string(), "structured");
}

// =============================================================================
// Key Tests
// =============================================================================

#[test]
fn test_keys_of_different_types_are_distinct() {
    let int_key = Key::from(Value::Int(1));
    let str_key = Key::from(Value::from("1"));

    assert_ne!(int_key, str_key);
    assert_eq!(int_key.kind(), ValueType::Int);
    assert_eq!(str_key.kind(), ValueType::Str);
}

#[test]
fn test_key_roundtrips_to_value() {
    let key = Key::from(Value::Float(3.25));

    assert_eq!(key.len(), 8);
    assert_eq!(key.to_value().unwrap(), Value::Float(3.25));
    assert_eq!(key.to_string(), "3.25");
}

// =============================================================================
// Structured Payload Tests
// =============================================================================

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    visits: u32,
    tags: Vec<String>,
}

#[test]
fn test_structured_value() {
    let profile = Profile {
        name: "ada".to_string(),
        visits: 12,
        tags: vec!["admin".to_string()],
    };

    let value = Value::structured(&profile).unwrap();
    assert_eq!(value.value_type(), ValueType::Structured);

    let decoded = Value::decode(ValueType::Structured, &value.encode()).unwrap();
    let back: Profile = decoded.deserialize().unwrap();
    assert_eq!(back, profile);
}

#[test]
fn test_deserialize_non_structured_fails() {
    let result: Result<Profile, _> = Value::Int(1).deserialize();
    assert!(matches!(result, Err(CaskError::UnsupportedType(_))));
}
