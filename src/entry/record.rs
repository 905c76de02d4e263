//! Entry encoding and decoding

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CaskError, Result};

use super::value::{Key, Value, ValueType};

/// Timestamp (8) + KeyType (1) + ValueType (1) + KeyLen (4) + ValueLen (4)
pub const HEADER_SIZE: usize = 18;

/// Trailing CRC32
pub const CRC_SIZE: usize = 4;

/// Value-type byte written for tombstones
pub const TOMBSTONE_TAG: u8 = 0;

// =============================================================================
// Header
// =============================================================================

/// Fixed-size prefix of every entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub timestamp: u64,
    pub key_type: ValueType,
    /// `None` for a tombstone
    pub value_type: Option<ValueType>,
    pub key_len: u32,
    pub value_len: u32,
}

impl EntryHeader {
    /// Parse the first `HEADER_SIZE` bytes of `buf`
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(CaskError::CorruptEntry(format!(
                "truncated header: {} of {} bytes",
                buf.len(),
                HEADER_SIZE
            )));
        }

        let mut cur = &buf[..HEADER_SIZE];
        let timestamp = cur.get_u64();
        let key_tag = cur.get_u8();
        let value_tag = cur.get_u8();
        let key_len = cur.get_u32();
        let value_len = cur.get_u32();

        let key_type = ValueType::try_from(key_tag)?;
        let value_type = if value_len == 0 {
            None
        } else if value_tag == TOMBSTONE_TAG {
            return Err(CaskError::CorruptEntry(format!(
                "tombstone tag with {} value bytes",
                value_len
            )));
        } else {
            Some(ValueType::try_from(value_tag)?)
        };

        Ok(Self {
            timestamp,
            key_type,
            value_type,
            key_len,
            value_len,
        })
    }

    /// Bytes that follow the header: key, value and CRC
    pub fn body_len(&self) -> u64 {
        self.key_len as u64 + self.value_len as u64 + CRC_SIZE as u64
    }

    /// Total encoded size of the entry
    pub fn entry_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.body_len()
    }

    /// Offset of the value bytes relative to the start of the entry
    pub fn value_offset(&self) -> u64 {
        HEADER_SIZE as u64 + self.key_len as u64
    }

    pub fn is_tombstone(&self) -> bool {
        self.value_type.is_none()
    }
}

// =============================================================================
// Entry
// =============================================================================

/// A single log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Unix millis when the entry was created
    pub timestamp: u64,
    pub key: Key,
    /// `None` for a tombstone
    pub value_type: Option<ValueType>,
    /// Encoded value payload, empty for a tombstone
    pub value: Bytes,
}

impl Entry {
    /// Build a live entry
    ///
    /// Empty string/byte values are rejected: on disk a zero-length value
    /// means the key was deleted.
    pub fn new(timestamp: u64, key: Key, value: &Value) -> Result<Self> {
        let payload = value.encode();
        if payload.is_empty() {
            return Err(CaskError::InvalidValue(
                "empty values are indistinguishable from tombstones".to_string(),
            ));
        }
        check_len("value", payload.len())?;
        check_len("key", key.len())?;

        Ok(Self {
            timestamp,
            key,
            value_type: Some(value.value_type()),
            value: payload,
        })
    }

    /// Build a tombstone for `key`
    pub fn tombstone(timestamp: u64, key: Key) -> Result<Self> {
        check_len("key", key.len())?;
        Ok(Self {
            timestamp,
            key,
            value_type: None,
            value: Bytes::new(),
        })
    }

    pub fn is_tombstone(&self) -> bool {
        self.value_type.is_none()
    }

    pub fn header(&self) -> EntryHeader {
        EntryHeader {
            timestamp: self.timestamp,
            key_type: self.key.kind(),
            value_type: self.value_type,
            key_len: self.key.len() as u32,
            value_len: self.value.len() as u32,
        }
    }

    /// Total encoded size
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len() + CRC_SIZE
    }

    /// Offset of the value bytes relative to the start of the entry
    pub fn value_offset(&self) -> u64 {
        (HEADER_SIZE + self.key.len()) as u64
    }

    /// Serialize to the on-disk layout
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u64(self.timestamp);
        buf.put_u8(self.key.kind().as_u8());
        buf.put_u8(self.value_type.map_or(TOMBSTONE_TAG, ValueType::as_u8));
        buf.put_u32(self.key.len() as u32);
        buf.put_u32(self.value.len() as u32);
        buf.put_slice(self.key.bytes());
        buf.put_slice(&self.value);

        let crc = crc32fast::hash(&buf);
        buf.put_u32(crc);
        buf.freeze()
    }

    /// Parse one complete entry from the start of `buf`
    ///
    /// Fails with `CorruptEntry` if the declared lengths run past the end
    /// of `buf` or the checksum does not match.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let header = EntryHeader::decode(buf)?;
        let total = header.entry_len();
        if total > buf.len() as u64 {
            return Err(CaskError::CorruptEntry(format!(
                "entry declares {} bytes but only {} remain",
                total,
                buf.len()
            )));
        }
        let total = total as usize;

        verify_checksum(&buf[..total])?;

        let key_start = HEADER_SIZE;
        let value_start = key_start + header.key_len as usize;
        let value_end = value_start + header.value_len as usize;

        Ok(Self {
            timestamp: header.timestamp,
            key: Key::new(header.key_type, Bytes::copy_from_slice(&buf[key_start..value_start])),
            value_type: header.value_type,
            value: Bytes::copy_from_slice(&buf[value_start..value_end]),
        })
    }

    /// Decode the value into a typed payload
    pub fn typed_value(&self) -> Result<Option<Value>> {
        match self.value_type {
            Some(kind) => Value::decode(kind, &self.value).map(Some),
            None => Ok(None),
        }
    }
}

/// Check the trailing CRC of one complete encoded entry
pub(crate) fn verify_checksum(entry: &[u8]) -> Result<()> {
    if entry.len() < HEADER_SIZE + CRC_SIZE {
        return Err(CaskError::CorruptEntry(format!(
            "entry of {} bytes is shorter than header and checksum",
            entry.len()
        )));
    }
    let (body, mut trailer) = entry.split_at(entry.len() - CRC_SIZE);
    let stored = trailer.get_u32();
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(CaskError::CorruptEntry(format!(
            "checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored, computed
        )));
    }
    Ok(())
}

fn check_len(what: &str, len: usize) -> Result<()> {
    if len > u32::MAX as usize {
        return Err(CaskError::InvalidValue(format!(
            "{} of {} bytes exceeds the u32 length field",
            what, len
        )));
    }
    Ok(())
}
