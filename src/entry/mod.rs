//! Entry Module
//!
//! The on-disk record format and the typed payloads stored in it.
//!
//! ## Responsibilities
//! - Tag keys and values with a one-byte type
//! - Encode numbers fixed-width big-endian, strings and bytes raw
//! - Lay out a self-describing entry that parses without look-ahead
//! - CRC32 checksum per entry for corruption detection
//!
//! ## Entry Format
//! ```text
//! ┌───────────────┬──────────┬──────────┬──────────┬──────────┬─────┬───────┬─────────┐
//! │ Timestamp (8) │ KType(1) │ VType(1) │ KLen (4) │ VLen (4) │ Key │ Value │ CRC (4) │
//! └───────────────┴──────────┴──────────┴──────────┴──────────┴─────┴───────┴─────────┘
//! ```
//! All integers are big-endian. `VLen == 0` marks a tombstone; its `VType`
//! slot holds `0` and no value bytes follow. The CRC covers every byte
//! before it.

mod record;
mod value;

pub use record::{Entry, EntryHeader, CRC_SIZE, HEADER_SIZE, TOMBSTONE_TAG};
pub(crate) use record::verify_checksum;
pub use value::{Key, Value, ValueType};
