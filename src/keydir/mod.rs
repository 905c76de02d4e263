//! KeyDir Module
//!
//! In-memory index from key to the location of its current value.
//!
//! ## Responsibilities
//! - O(1) point lookups for the engine
//! - Last-writer-wins replay during recovery
//! - Snapshot and compare-and-swap repointing for merge
//!
//! ## Data Structure Choice
//! `HashMap` wrapped in a `parking_lot::RwLock`:
//! - Lookups vastly outnumber writes
//! - `ValueMeta` is `Copy`, so readers never observe a torn record

mod table;

pub use table::{KeyDir, ReplayOutcome};

use crate::entry::{ValueType, CRC_SIZE, HEADER_SIZE};

/// Where the current value of a key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueMeta {
    /// Segment holding the entry
    pub segment_id: u32,

    /// Tag of the value payload
    pub value_type: ValueType,

    /// Length of the key bytes (locates the entry start for checksumming)
    pub key_len: u32,

    /// Length of the value bytes
    pub value_len: u32,

    /// Absolute offset of the value bytes within the segment
    pub value_offset: u64,

    /// Timestamp copied from the entry
    pub timestamp: u64,
}

impl ValueMeta {
    /// Absolute offset of the entry header
    pub fn entry_offset(&self) -> u64 {
        self.value_offset - HEADER_SIZE as u64 - self.key_len as u64
    }

    /// Total encoded size of the entry
    pub fn entry_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.key_len as u64 + self.value_len as u64 + CRC_SIZE as u64
    }

    /// Same entry, copied to another segment at `entry_offset`
    pub fn relocated(&self, segment_id: u32, entry_offset: u64) -> Self {
        Self {
            segment_id,
            value_offset: entry_offset + HEADER_SIZE as u64 + self.key_len as u64,
            ..*self
        }
    }
}
