//! Recovery
//!
//! Rebuilds the KeyDir by replaying every segment at startup.
//!
//! Segments are replayed in ascending id order, which is write order.
//! Within a segment entries are applied in file order with
//! last-writer-wins on the entry timestamp. Any damaged entry aborts
//! recovery: silently truncating could drop a committed write.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::keydir::{KeyDir, ReplayOutcome, ValueMeta};
use crate::segment::{list_segments, SegmentIterator, SegmentManager};

/// Handles index reconstruction from segments
pub struct Recovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of segment files replayed
    pub segments_scanned: usize,

    /// Number of entries decoded (values and tombstones)
    pub entries_replayed: u64,

    /// Number of tombstones among them
    pub tombstones: u64,

    /// Entries that lost to a newer write, or tombstones for absent keys
    pub entries_ignored: u64,

    /// Keys live after replay
    pub live_keys: usize,

    /// Total bytes read
    pub bytes_scanned: u64,

    /// Largest entry timestamp seen (0 for an empty store)
    pub max_timestamp: u64,

    /// Segment that accepts appends after startup
    pub active_segment_id: u32,
}

/// Per-segment integrity report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentReport {
    pub segment_id: u32,

    /// Entries decoded before the end of file or the first error
    pub entries: u64,

    pub tombstones: u64,

    /// Bytes covered by valid entries
    pub valid_bytes: u64,

    /// Segment size on disk
    pub file_bytes: u64,

    /// First error, if the segment is damaged
    pub error: Option<String>,
}

impl SegmentReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl Recovery {
    /// Replay every segment of `manager` into a fresh KeyDir
    pub fn recover(manager: &SegmentManager) -> Result<(KeyDir, RecoveryResult)> {
        let keydir = KeyDir::new();
        let result = Self::replay_into(manager, &keydir)?;
        Ok((keydir, result))
    }

    /// Replay every segment of `manager` into `keydir`
    pub fn replay_into(manager: &SegmentManager, keydir: &KeyDir) -> Result<RecoveryResult> {
        let mut result = RecoveryResult {
            active_segment_id: manager.active_id(),
            ..RecoveryResult::default()
        };

        for segment_id in manager.segment_ids() {
            let mut replayed = 0u64;

            for scanned in manager.iter_segment(segment_id)? {
                let scanned = scanned?;
                let entry = &scanned.entry;

                let meta = entry.value_type.map(|value_type| ValueMeta {
                    segment_id,
                    value_type,
                    key_len: entry.key.len() as u32,
                    value_len: entry.value.len() as u32,
                    value_offset: scanned.value_offset(),
                    timestamp: entry.timestamp,
                });

                if entry.is_tombstone() {
                    result.tombstones += 1;
                }
                if keydir.replay(entry.key.clone(), meta, entry.timestamp) == ReplayOutcome::Ignored {
                    result.entries_ignored += 1;
                }

                result.max_timestamp = result.max_timestamp.max(entry.timestamp);
                result.bytes_scanned += scanned.encoded_len();
                replayed += 1;
            }

            debug!(segment = segment_id, entries = replayed, "replayed segment");
            result.entries_replayed += replayed;
            result.segments_scanned += 1;
        }

        result.live_keys = keydir.len();

        info!(
            segments = result.segments_scanned,
            entries = result.entries_replayed,
            tombstones = result.tombstones,
            live_keys = result.live_keys,
            active = result.active_segment_id,
            "recovery complete"
        );

        Ok(result)
    }

    /// Scan every segment without touching any index
    ///
    /// Unlike `recover`, a damaged segment does not stop the scan; its
    /// first error is recorded in the report.
    pub fn verify(manager: &SegmentManager) -> Vec<SegmentReport> {
        manager
            .segment_ids()
            .into_iter()
            .map(|segment_id| {
                let file_bytes = manager.segment_size(segment_id).unwrap_or(0);
                Self::scan_segment(segment_id, file_bytes, manager.iter_segment(segment_id))
            })
            .collect()
    }

    /// Scan the segment files in `dir` without opening a store
    ///
    /// Nothing is created or locked. A missing directory has no segments.
    /// A segment another process is appending to may report a torn tail.
    pub fn verify_dir(dir: &Path, base_name: &str) -> Result<Vec<SegmentReport>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let reports = list_segments(dir, base_name)?
            .into_iter()
            .map(|(segment_id, path)| {
                let file_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                Self::scan_segment(segment_id, file_bytes, SegmentIterator::open(&path, segment_id))
            })
            .collect();
        Ok(reports)
    }

    fn scan_segment(
        segment_id: u32,
        file_bytes: u64,
        iter: Result<SegmentIterator>,
    ) -> SegmentReport {
        let mut report = SegmentReport {
            segment_id,
            entries: 0,
            tombstones: 0,
            valid_bytes: 0,
            file_bytes,
            error: None,
        };

        let iter = match iter {
            Ok(iter) => iter,
            Err(e) => {
                report.error = Some(e.to_string());
                return report;
            }
        };

        for scanned in iter {
            match scanned {
                Ok(scanned) => {
                    report.entries += 1;
                    if scanned.entry.is_tombstone() {
                        report.tombstones += 1;
                    }
                    report.valid_bytes += scanned.encoded_len();
                }
                Err(e) => {
                    report.error = Some(e.to_string());
                    break;
                }
            }
        }

        report
    }
}
