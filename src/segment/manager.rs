//! Segment Manager
//!
//! Owns every segment handle and the active segment.
//!
//! ## Responsibilities
//! - Discover existing segments on startup
//! - Append to the active segment, sealing it once it is full
//! - Positional, checksummed reads for the index
//! - Reserve ids, install output and delete inputs for merge

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{Config, SyncStrategy};
use crate::entry::{Entry, EntryHeader, HEADER_SIZE};
use crate::error::{CaskError, Result};
use crate::keydir::ValueMeta;

use super::{
    list_merge_leftovers, list_segments, merge_temp_path, segment_path, sync_dir, SegmentFile,
    SegmentIterator,
};

/// The segment currently accepting appends
struct ActiveSegment {
    file: Arc<SegmentFile>,
    /// Appends since the last fsync
    unsynced: usize,
}

/// Manages the segment files of one store
///
/// ## Concurrency:
/// - `active`: Mutex around the writable handle and its sync counter;
///   the rotate decision and the append happen under it
/// - `segments`: RwLock over all open handles; readers clone an `Arc`
///   and read positionally without blocking writers
pub struct SegmentManager {
    /// Directory where segments are stored
    data_dir: PathBuf,

    /// Segment file prefix
    base_name: String,

    /// Rotation threshold in bytes
    max_segment_size: u64,

    sync_strategy: SyncStrategy,

    active: Mutex<ActiveSegment>,

    /// Every live segment by id, active one included
    segments: RwLock<BTreeMap<u32, Arc<SegmentFile>>>,
}

impl SegmentManager {
    /// Open or create the segments described by `config`
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Delete merge output an interrupted merge never committed
    /// 3. Discover existing segment files
    /// 4. Open a handle for each
    /// 5. The highest id becomes active; id 1 is created for an empty store
    pub fn open(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        for path in list_merge_leftovers(&config.data_dir, &config.base_name)? {
            warn!(path = %path.display(), "deleting uncommitted merge output");
            fs::remove_file(&path)?;
        }

        let mut segments = BTreeMap::new();
        for (id, path) in list_segments(&config.data_dir, &config.base_name)? {
            segments.insert(id, Arc::new(SegmentFile::open(&path, id)?));
        }

        let active = match segments.values().next_back() {
            Some(file) => Arc::clone(file),
            None => {
                let path = segment_path(&config.data_dir, &config.base_name, 1);
                let file = Arc::new(SegmentFile::create(&path, 1)?);
                segments.insert(1, Arc::clone(&file));
                file
            }
        };

        info!(
            dir = %config.data_dir.display(),
            segments = segments.len(),
            active = active.id(),
            "opened segment manager"
        );

        Ok(Self {
            data_dir: config.data_dir.clone(),
            base_name: config.base_name.clone(),
            max_segment_size: config.max_segment_size,
            sync_strategy: config.sync_strategy,
            active: Mutex::new(ActiveSegment {
                file: active,
                unsynced: 0,
            }),
            segments: RwLock::new(segments),
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append an entry to the active segment
    ///
    /// Rotates first if the active segment has reached the size threshold.
    /// Returns the segment written to and the absolute offset of the value.
    ///
    /// If the write or its sync fails the entry is cut from the file again,
    /// so an `Err` means the entry will not reappear after a restart. The
    /// one exception is a failed cut, which is logged.
    pub fn append(&self, entry: &Entry) -> Result<(u32, u64)> {
        let bytes = entry.encode();
        let mut active = self.active.lock();

        if active.file.len() >= self.max_segment_size {
            let next_id = active.file.id() + 1;
            self.rotate_locked(&mut active, next_id)?;
        }

        let offset = active.file.append(&bytes)?;
        active.unsynced += 1;

        let sync_now = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => active.unsynced >= count,
        };
        if sync_now {
            if let Err(e) = active.file.sync() {
                active.unsynced -= 1;
                if let Err(undo) = active.file.truncate(offset) {
                    warn!(
                        segment = active.file.id(),
                        offset,
                        error = %undo,
                        "failed to drop entry after sync error"
                    );
                }
                return Err(e);
            }
            active.unsynced = 0;
        }

        Ok((active.file.id(), offset + entry.value_offset()))
    }

    /// Force the active segment to disk
    pub fn sync(&self) -> Result<()> {
        let mut active = self.active.lock();
        active.file.sync()?;
        active.unsynced = 0;
        Ok(())
    }

    /// Seal the active segment and skip `reserve` ids before the next one
    ///
    /// Returns the id that was sealed and the reserved range, which lies
    /// strictly between the sealed segment and the new active segment.
    pub fn rotate_reserving(&self, reserve: u32) -> Result<(u32, Range<u32>)> {
        let mut active = self.active.lock();
        let sealed = active.file.id();
        let next_id = sealed
            .checked_add(reserve)
            .and_then(|id| id.checked_add(1))
            .ok_or_else(|| CaskError::Merge("segment id space exhausted".to_string()))?;

        self.rotate_locked(&mut active, next_id)?;
        Ok((sealed, sealed + 1..next_id))
    }

    /// Called with the active lock held
    fn rotate_locked(&self, active: &mut ActiveSegment, next_id: u32) -> Result<()> {
        active.file.sync()?;

        let file = Arc::new(SegmentFile::create(&self.path_for(next_id), next_id)?);
        self.segments.write().insert(next_id, Arc::clone(&file));

        debug!(
            sealed = active.file.id(),
            sealed_bytes = active.file.len(),
            active = next_id,
            "rotated active segment"
        );

        active.file = file;
        active.unsynced = 0;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read the value bytes `meta` points at
    pub fn read_value(&self, meta: &ValueMeta) -> Result<Bytes> {
        let entry = self.read_entry_bytes(meta)?;
        let start = HEADER_SIZE + meta.key_len as usize;
        let end = start + meta.value_len as usize;
        Ok(entry.slice(start..end))
    }

    /// Read and verify the whole entry `meta` points at
    ///
    /// Errors:
    /// - `SegmentMissing`: segment is not (or no longer) on disk
    /// - `ShortRead`: segment ends before the entry does
    /// - `CorruptEntry`: header disagrees with `meta` or checksum mismatch
    pub fn read_entry_bytes(&self, meta: &ValueMeta) -> Result<Bytes> {
        let file = self.segment(meta.segment_id)?;
        let offset = meta.entry_offset();
        let buf = file.read_at(offset, meta.entry_len() as usize)?;

        let header = EntryHeader::decode(&buf)?;
        if header.key_len != meta.key_len
            || header.value_len != meta.value_len
            || header.timestamp != meta.timestamp
        {
            return Err(CaskError::CorruptEntry(format!(
                "segment {} offset {}: header does not match index",
                meta.segment_id, offset
            )));
        }
        crate::entry::verify_checksum(&buf).map_err(|e| match e {
            CaskError::CorruptEntry(reason) => CaskError::CorruptEntry(format!(
                "segment {} offset {}: {}",
                meta.segment_id, offset, reason
            )),
            other => other,
        })?;

        Ok(Bytes::from(buf))
    }

    /// Handle for segment `id`
    pub fn segment(&self, id: u32) -> Result<Arc<SegmentFile>> {
        self.segments
            .read()
            .get(&id)
            .cloned()
            .ok_or(CaskError::SegmentMissing(id))
    }

    /// Sequential iterator over segment `id`
    pub fn iter_segment(&self, id: u32) -> Result<SegmentIterator> {
        let file = self.segment(id)?;
        SegmentIterator::open(file.path(), id)
    }

    // =========================================================================
    // Merge Support
    // =========================================================================

    /// Create merge output for `id` under its uncommitted name
    ///
    /// The scanner ignores the file until `commit_merge_output` renames it.
    pub fn create_merge_output(&self, id: u32) -> Result<SegmentFile> {
        SegmentFile::create(&merge_temp_path(&self.data_dir, &self.base_name, id), id)
    }

    /// Rename synced merge output to its segment name
    ///
    /// Call `sync_dir` once every output is committed.
    pub fn commit_merge_output(&self, file: &mut SegmentFile) -> Result<()> {
        let path = self.path_for(file.id());
        file.rename_to(&path)?;
        debug!(segment = file.id(), bytes = file.len(), "committed merge output");
        Ok(())
    }

    /// Make renames in the data directory durable
    pub fn sync_dir(&self) -> Result<()> {
        sync_dir(&self.data_dir)
    }

    /// Register a finished segment so reads can reach it
    pub fn install(&self, file: SegmentFile) {
        let id = file.id();
        self.segments.write().insert(id, Arc::new(file));
    }

    /// Unregister and delete a sealed segment
    pub fn remove_segment(&self, id: u32) -> Result<()> {
        if id == self.active_id() {
            return Err(CaskError::Merge(format!(
                "refusing to delete active segment {}",
                id
            )));
        }

        let file = self
            .segments
            .write()
            .remove(&id)
            .ok_or(CaskError::SegmentMissing(id))?;

        match fs::remove_file(file.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        debug!(segment = id, bytes = file.len(), "deleted segment");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Id of the segment accepting appends
    pub fn active_id(&self) -> u32 {
        self.active.lock().file.id()
    }

    /// All segment ids, ascending
    pub fn segment_ids(&self) -> Vec<u32> {
        self.segments.read().keys().copied().collect()
    }

    /// Ids of every segment except the active one, ascending
    pub fn sealed_ids(&self) -> Vec<u32> {
        let active = self.active_id();
        self.segments
            .read()
            .keys()
            .copied()
            .filter(|id| *id != active)
            .collect()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Size of segment `id`, if it exists
    pub fn segment_size(&self, id: u32) -> Option<u64> {
        self.segments.read().get(&id).map(|f| f.len())
    }

    /// Total bytes across all segments
    pub fn disk_usage(&self) -> u64 {
        self.segments.read().values().map(|f| f.len()).sum()
    }

    pub fn max_segment_size(&self) -> u64 {
        self.max_segment_size
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Generate the file path for a segment with given ID
    pub fn path_for(&self, id: u32) -> PathBuf {
        segment_path(&self.data_dir, &self.base_name, id)
    }
}
