//! Segment Iterator
//!
//! Sequential decoding of every entry in one segment file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::entry::{Entry, EntryHeader, HEADER_SIZE};
use crate::error::{CaskError, Result};

/// One decoded entry and where it starts
#[derive(Debug, Clone)]
pub struct ScannedEntry {
    /// Offset of the entry header within the segment
    pub offset: u64,
    pub entry: Entry,
}

impl ScannedEntry {
    /// Absolute offset of the value bytes
    pub fn value_offset(&self) -> u64 {
        self.offset + self.entry.value_offset()
    }

    pub fn encoded_len(&self) -> u64 {
        self.entry.encoded_len() as u64
    }
}

/// Iterator over entries in write order
///
/// Stops at the end of the file. A partial trailing entry, a checksum
/// mismatch or an unknown tag yields one error and then ends the iteration.
pub struct SegmentIterator {
    segment_id: u32,
    reader: BufReader<File>,
    /// Stop reading when we reach this offset (file size at open time)
    end_offset: u64,
    /// Current position in file
    current_offset: u64,
    failed: bool,
}

impl SegmentIterator {
    pub fn open(path: &Path, segment_id: u32) -> Result<Self> {
        let file = File::open(path)?;
        let end_offset = file.metadata()?.len();

        Ok(Self {
            segment_id,
            reader: BufReader::new(file),
            end_offset,
            current_offset: 0,
            failed: false,
        })
    }

    pub fn segment_id(&self) -> u32 {
        self.segment_id
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.current_offset
    }

    fn read_next(&mut self) -> Result<ScannedEntry> {
        let offset = self.current_offset;
        let remaining = self.end_offset - offset;

        if remaining < HEADER_SIZE as u64 {
            return Err(self.corrupt(
                offset,
                format!("truncated header: {} of {} bytes", remaining, HEADER_SIZE),
            ));
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header_buf)?;
        let header = EntryHeader::decode(&header_buf).map_err(|e| self.with_context(offset, e))?;

        let entry_len = header.entry_len();
        if entry_len > remaining {
            return Err(self.corrupt(
                offset,
                format!("entry declares {} bytes but only {} remain", entry_len, remaining),
            ));
        }

        let mut buf = vec![0u8; entry_len as usize];
        buf[..HEADER_SIZE].copy_from_slice(&header_buf);
        self.reader.read_exact(&mut buf[HEADER_SIZE..])?;

        let entry = Entry::decode(&buf).map_err(|e| self.with_context(offset, e))?;
        self.current_offset += entry_len;

        Ok(ScannedEntry { offset, entry })
    }

    fn corrupt(&self, offset: u64, reason: String) -> CaskError {
        CaskError::CorruptEntry(format!(
            "segment {} offset {}: {}",
            self.segment_id, offset, reason
        ))
    }

    fn with_context(&self, offset: u64, err: CaskError) -> CaskError {
        match err {
            CaskError::CorruptEntry(reason) => self.corrupt(offset, reason),
            CaskError::UnsupportedType(reason) => CaskError::UnsupportedType(format!(
                "segment {} offset {}: {}",
                self.segment_id, offset, reason
            )),
            other => other,
        }
    }
}

impl Iterator for SegmentIterator {
    type Item = Result<ScannedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.current_offset >= self.end_offset {
            return None;
        }

        let item = self.read_next();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}
