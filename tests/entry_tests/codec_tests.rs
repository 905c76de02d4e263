//! Tests for the entry codec
//!
//! These tests verify:
//! - Exact on-disk layout (big-endian header, key, value, CRC)
//! - Tombstone encoding
//! - Rejection of empty values
//! - Corruption detection (truncation, checksum, bad tags)

use bytes::Bytes;
use caskkv::entry::{Entry, EntryHeader, Key, Value, ValueType, CRC_SIZE, HEADER_SIZE, TOMBSTONE_TAG};
use caskkv::CaskError;

// =============================================================================
// Helper Functions
// =============================================================================

fn str_key(s: &str) -> Key {
    Key::from(Value::from(s))
}

fn sample_entry() -> Entry {
    Entry::new(1_700_000_000_000, str_key("a"), &Value::from("1")).unwrap()
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_encode_layout_matches_format() {
    let entry = sample_entry();
    let bytes = entry.encode();

    assert_eq!(bytes.len(), HEADER_SIZE + 1 + 1 + CRC_SIZE);
    assert_eq!(&bytes[0..8], &1_700_000_000_000u64.to_be_bytes());
    assert_eq!(bytes[8], ValueType::Str.as_u8());
    assert_eq!(bytes[9], ValueType::Str.as_u8());
    assert_eq!(&bytes[10..14], &1u32.to_be_bytes());
    assert_eq!(&bytes[14..18], &1u32.to_be_bytes());
    assert_eq!(bytes[18], b'a');
    assert_eq!(bytes[19], b'1');

    let crc = crc32fast::hash(&bytes[..20]);
    assert_eq!(&bytes[20..24], &crc.to_be_bytes());
}

#[test]
fn test_encoded_len_and_value_offset() {
    let entry = Entry::new(7, str_key("key"), &Value::from(42i64)).unwrap();

    assert_eq!(entry.encoded_len(), HEADER_SIZE + 3 + 8 + CRC_SIZE);
    assert_eq!(entry.encode().len(), entry.encoded_len());
    assert_eq!(entry.value_offset(), (HEADER_SIZE + 3) as u64);
}

#[test]
fn test_int_value_is_big_endian() {
    let entry = Entry::new(1, Key::from(Value::Int(5)), &Value::Int(-2)).unwrap();
    let bytes = entry.encode();

    assert_eq!(bytes[8], 1);
    assert_eq!(bytes[9], 1);
    assert_eq!(&bytes[18..26], &5i64.to_be_bytes());
    assert_eq!(&bytes[26..34], &(-2i64).to_be_bytes());
}

#[test]
fn test_header_decode() {
    let entry = sample_entry();
    let header = EntryHeader::decode(&entry.encode()).unwrap();

    assert_eq!(header, entry.header());
    assert_eq!(header.key_type, ValueType::Str);
    assert_eq!(header.value_type, Some(ValueType::Str));
    assert_eq!(header.entry_len(), entry.encoded_len() as u64);
    assert!(!header.is_tombstone());
}

// =============================================================================
// Decode Tests
// =============================================================================

#[test]
fn test_decode_recovers_entry() {
    let entry = Entry::new(99, str_key("user"), &Value::from(&b"\x00\x01\xff"[..])).unwrap();
    let decoded = Entry::decode(&entry.encode()).unwrap();

    assert_eq!(decoded, entry);
    assert_eq!(
        decoded.typed_value().unwrap(),
        Some(Value::Bytes(Bytes::from_static(b"\x00\x01\xff")))
    );
}

#[test]
fn test_decode_ignores_trailing_bytes() {
    let first = sample_entry();
    let second = Entry::new(2, str_key("b"), &Value::from(true)).unwrap();

    let mut buf = first.encode().to_vec();
    buf.extend_from_slice(&second.encode());

    assert_eq!(Entry::decode(&buf).unwrap(), first);
    assert_eq!(Entry::decode(&buf[first.encoded_len()..]).unwrap(), second);
}

// =============================================================================
// Tombstone Tests
// =============================================================================

#[test]
fn test_tombstone_encoding() {
    let tombstone = Entry::tombstone(5, str_key("gone")).unwrap();
    let bytes = tombstone.encode();

    assert!(tombstone.is_tombstone());
    assert_eq!(bytes[9], TOMBSTONE_TAG);
    assert_eq!(&bytes[14..18], &0u32.to_be_bytes());
    assert_eq!(bytes.len(), HEADER_SIZE + 4 + CRC_SIZE);

    let decoded = Entry::decode(&bytes).unwrap();
    assert!(decoded.is_tombstone());
    assert_eq!(decoded.key, str_key("gone"));
    assert_eq!(decoded.typed_value().unwrap(), None);
}

#[test]
fn test_empty_values_rejected() {
    let empty_str = Entry::new(1, str_key("k"), &Value::from(""));
    assert!(matches!(empty_str, Err(CaskError::InvalidValue(_))));

    let empty_bytes = Entry::new(1, str_key("k"), &Value::from(Vec::<u8>::new()));
    assert!(matches!(empty_bytes, Err(CaskError::InvalidValue(_))));
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_decode_truncated_header() {
    let bytes = sample_entry().encode();
    let result = Entry::decode(&bytes[..HEADER_SIZE - 1]);

    assert!(matches!(result, Err(CaskError::CorruptEntry(_))));
}

#[test]
fn test_decode_truncated_body() {
    let bytes = sample_entry().encode();
    let result = Entry::decode(&bytes[..bytes.len() - 1]);

    assert!(matches!(result, Err(CaskError::CorruptEntry(_))));
}

#[test]
fn test_decode_detects_flipped_value_byte() {
    let mut bytes = sample_entry().encode().to_vec();
    bytes[HEADER_SIZE + 1] ^= 0xff;

    let result = Entry::decode(&bytes);
    assert!(matches!(result, Err(CaskError::CorruptEntry(msg)) if msg.contains("checksum")));
}

#[test]
fn test_decode_unknown_key_tag() {
    let mut bytes = sample_entry().encode().to_vec();
    bytes[8] = 42;

    let result = Entry::decode(&bytes);
    assert!(matches!(result, Err(CaskError::UnsupportedType(_))));
}

#[test]
fn test_decode_tombstone_tag_with_value_bytes() {
    let mut bytes = sample_entry().encode().to_vec();
    bytes[9] = TOMBSTONE_TAG;

    let result = EntryHeader::decode(&bytes);
    assert!(matches!(result, Err(CaskError::CorruptEntry(_))));
}
