//! Error types for caskkv
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using CaskError
pub type Result<T> = std::result::Result<T, CaskError>;

/// Unified error type for caskkv operations
#[derive(Debug, Error)]
pub enum CaskError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // On-disk Consistency Errors
    // -------------------------------------------------------------------------
    /// Declared lengths, checksum or field contents disagree with the bytes on disk
    #[error("Corrupt entry: {0}")]
    CorruptEntry(String),

    /// Fewer bytes available than a `ValueMeta` promised
    #[error(
        "Short read in segment {segment_id} at offset {offset}: expected {expected} bytes, {available} available"
    )]
    ShortRead {
        segment_id: u32,
        offset: u64,
        expected: u64,
        available: u64,
    },

    /// A segment referenced by the index is no longer on disk
    #[error("Segment {0} is missing")]
    SegmentMissing(u32),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Merge Errors
    // -------------------------------------------------------------------------
    #[error("Merge failed: {0}")]
    Merge(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store is locked by another process: {}", .0.display())]
    Locked(PathBuf),
}

impl From<bincode::Error> for CaskError {
    fn from(err: bincode::Error) -> Self {
        CaskError::Serialization(err.to_string())
    }
}
