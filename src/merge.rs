//! Merge
//!
//! Reclaims space held by overwritten values and tombstones.
//!
//! ## Algorithm
//! 1. Under the engine write lock: seal the active segment, reserving ids
//!    for the output, and snapshot every index entry that points into a
//!    segment up to and including the one just sealed.
//! 2. Copy each live entry verbatim (original timestamp) into output
//!    segments at the reserved ids, named `<base>-<id>.bin.merge`.
//! 3. Sync the output and rename it to `<base>-<id>.bin`, then sync the
//!    directory. This is the commit point.
//! 4. Register the output, then repoint the index key by key, skipping
//!    keys written or deleted since the snapshot.
//! 5. Delete every merged segment the index no longer references.
//!
//! Output ids sit between the merged segments and the new active segment,
//! so replay after a restart still sees entries in write order. All
//! segments are merged in one pass; a tombstone is never dropped while an
//! older value for its key survives elsewhere.
//!
//! If any step before the repoint fails, the partial output is deleted and
//! the old segments stay authoritative. A crash before the rename leaves
//! only `.merge` files, which the segment scanner skips and the next open
//! deletes. A crash after it leaves complete copies of live entries next
//! to their originals, which replay resolves to the same values.

use std::collections::BTreeSet;
use std::fs;
use std::ops::Range;

use tracing::{debug, info, warn};

use crate::entry::Key;
use crate::error::{CaskError, Result};
use crate::keydir::{KeyDir, ValueMeta};
use crate::segment::{SegmentFile, SegmentManager};

/// Why a merge did no work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another merge is running
    InProgress,
    /// Fewer sealed segments than `merge_min_segments`
    TooFewSegments,
    /// Every byte on disk belongs to a live entry
    NoDeadData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Completed,
    Skipped(SkipReason),
}

/// Summary of one `try_merge` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeStats {
    pub outcome: MergeOutcome,

    /// Input segments deleted
    pub segments_merged: usize,

    /// Input segments kept because the index still referenced them
    pub segments_kept: usize,

    /// Output segments written
    pub segments_written: usize,

    /// Live entries copied and repointed
    pub entries_rewritten: usize,

    /// Entries copied but superseded before the repoint
    pub entries_skipped: usize,

    /// Size of the input segments
    pub bytes_before: u64,

    /// Size of the output segments plus any kept inputs
    pub bytes_after: u64,
}

impl MergeStats {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            outcome: MergeOutcome::Skipped(reason),
            segments_merged: 0,
            segments_kept: 0,
            segments_written: 0,
            entries_rewritten: 0,
            entries_skipped: 0,
            bytes_before: 0,
            bytes_after: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == MergeOutcome::Completed
    }

    pub fn bytes_reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Work captured under the write lock
pub(crate) struct MergePlan {
    /// Segments being merged
    inputs: BTreeSet<u32>,
    /// Ids the output may use
    reserved: Range<u32>,
    /// Live entries in the inputs, in file order
    live: Vec<(Key, ValueMeta)>,
    bytes_before: u64,
}

pub(crate) enum Prepared {
    Skip(SkipReason),
    Ready(MergePlan),
}

/// Decide whether to merge and, if so, seal and snapshot
///
/// Must be called with the engine write lock held so that no append lands
/// between the rotation and the snapshot.
pub(crate) fn prepare(
    manager: &SegmentManager,
    keydir: &KeyDir,
    min_segments: usize,
) -> Result<Prepared> {
    let sealed = manager.sealed_ids();
    if sealed.len() < min_segments {
        debug!(sealed = sealed.len(), min_segments, "merge skipped: too few segments");
        return Ok(Prepared::Skip(SkipReason::TooFewSegments));
    }

    let inputs: BTreeSet<u32> = manager.segment_ids().into_iter().collect();
    let live_by_segment = keydir.live_bytes_by_segment();

    let bytes_before: u64 = inputs
        .iter()
        .filter_map(|id| manager.segment_size(*id))
        .sum();
    let live_bytes: u64 = inputs
        .iter()
        .filter_map(|id| live_by_segment.get(id))
        .sum();

    if bytes_before <= live_bytes {
        debug!(bytes_before, live_bytes, "merge skipped: no dead data");
        return Ok(Prepared::Skip(SkipReason::NoDeadData));
    }

    // Each full output segment holds at least max_segment_size bytes
    let reserve = u32::try_from(live_bytes / manager.max_segment_size() + 1)
        .map_err(|_| CaskError::Merge("too many output segments".to_string()))?;
    let (sealed_id, reserved) = manager.rotate_reserving(reserve)?;

    let inputs: BTreeSet<u32> = inputs.into_iter().filter(|id| *id <= sealed_id).collect();
    let mut live = keydir.snapshot_segments(&inputs);
    live.sort_by_key(|(_, meta)| (meta.segment_id, meta.value_offset));

    debug!(
        inputs = inputs.len(),
        live_entries = live.len(),
        reserved = ?reserved,
        "merge prepared"
    );

    Ok(Prepared::Ready(MergePlan {
        inputs,
        reserved,
        live,
        bytes_before,
    }))
}

/// Copy, commit and clean up a prepared merge
pub(crate) fn execute(
    manager: &SegmentManager,
    keydir: &KeyDir,
    plan: MergePlan,
) -> Result<MergeStats> {
    let mut writer = MergeWriter::new(manager, plan.reserved.clone());
    let mut updates = Vec::with_capacity(plan.live.len());

    let committed = copy_live(manager, &plan.live, &mut writer, &mut updates)
        .and_then(|()| writer.finish())
        .and_then(|()| writer.commit());
    if let Err(e) = committed {
        warn!(error = %e, "merge aborted, discarding partial output");
        writer.discard();
        return Err(e);
    }

    // Output is durable under its final names, make it readable then repoint
    let outputs = writer.into_files();
    let segments_written = outputs.len();
    let mut bytes_after: u64 = outputs.iter().map(|f| f.len()).sum();
    for file in outputs {
        manager.install(file);
    }

    let entries_rewritten = keydir.repoint(&updates);
    let entries_skipped = updates.len() - entries_rewritten;

    // Only delete inputs nothing points at any more
    let still_live = keydir.live_bytes_by_segment();
    let mut segments_merged = 0;
    let mut segments_kept = 0;
    for id in &plan.inputs {
        if still_live.contains_key(id) {
            warn!(segment = id, "segment still referenced after merge, keeping it");
            bytes_after += manager.segment_size(*id).unwrap_or(0);
            segments_kept += 1;
        } else {
            manager.remove_segment(*id)?;
            segments_merged += 1;
        }
    }

    let stats = MergeStats {
        outcome: MergeOutcome::Completed,
        segments_merged,
        segments_kept,
        segments_written,
        entries_rewritten,
        entries_skipped,
        bytes_before: plan.bytes_before,
        bytes_after,
    };

    info!(
        merged = stats.segments_merged,
        written = stats.segments_written,
        rewritten = stats.entries_rewritten,
        skipped = stats.entries_skipped,
        reclaimed = stats.bytes_reclaimed(),
        "merge complete"
    );

    Ok(stats)
}

fn copy_live(
    manager: &SegmentManager,
    live: &[(Key, ValueMeta)],
    writer: &mut MergeWriter<'_>,
    updates: &mut Vec<(Key, ValueMeta, ValueMeta)>,
) -> Result<()> {
    for (key, meta) in live {
        let bytes = manager.read_entry_bytes(meta)?;
        let (segment_id, entry_offset) = writer.append(&bytes)?;
        updates.push((key.clone(), *meta, meta.relocated(segment_id, entry_offset)));
    }
    Ok(())
}

// =============================================================================
// Output Writer
// =============================================================================

/// Writes merge output into the reserved id range
struct MergeWriter<'a> {
    manager: &'a SegmentManager,
    reserved: Range<u32>,
    next_id: u32,
    current: Option<SegmentFile>,
    finished: Vec<SegmentFile>,
}

impl<'a> MergeWriter<'a> {
    fn new(manager: &'a SegmentManager, reserved: Range<u32>) -> Self {
        Self {
            manager,
            next_id: reserved.start,
            reserved,
            current: None,
            finished: Vec::new(),
        }
    }

    /// Append one encoded entry, returning (segment id, entry offset)
    fn append(&mut self, bytes: &[u8]) -> Result<(u32, u64)> {
        let file = self.writable()?;
        let offset = file.append(bytes)?;
        Ok((file.id(), offset))
    }

    /// Current output segment, rolling to the next reserved id when full
    fn writable(&mut self) -> Result<&SegmentFile> {
        let full = self
            .current
            .as_ref()
            .map_or(true, |f| f.len() >= self.manager.max_segment_size());

        if full {
            if let Some(done) = self.current.take() {
                done.sync()?;
                self.finished.push(done);
            }
            if !self.reserved.contains(&self.next_id) {
                return Err(CaskError::Merge(format!(
                    "output outgrew reserved segment ids {:?}",
                    self.reserved
                )));
            }
            self.current = Some(self.manager.create_merge_output(self.next_id)?);
            self.next_id += 1;
        }

        self.current
            .as_ref()
            .ok_or_else(|| CaskError::Merge("no output segment open".to_string()))
    }

    /// Sync the last output segment
    fn finish(&mut self) -> Result<()> {
        if let Some(done) = self.current.take() {
            done.sync()?;
            self.finished.push(done);
        }
        Ok(())
    }

    /// Rename every finished output to its segment name
    fn commit(&mut self) -> Result<()> {
        for file in &mut self.finished {
            self.manager.commit_merge_output(file)?;
        }
        self.manager.sync_dir()
    }

    fn into_files(self) -> Vec<SegmentFile> {
        self.finished
    }

    /// Delete everything written so far, committed or not
    fn discard(mut self) {
        if let Some(file) = self.current.take() {
            self.finished.push(file);
        }
        for file in self.finished.drain(..) {
            let path = file.path().to_path_buf();
            drop(file);
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove partial merge output");
            }
        }
    }
}
