//! Engine Module
//!
//! The storage engine facade that coordinates all components.
//!
//! ## Responsibilities
//! - Take the process lock on the data directory
//! - Rebuild the index from segments on startup
//! - Put/Get/Delete over the segment manager and KeyDir
//! - Run merges on request from a scheduler

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::entry::{Entry, Key, Value};
use crate::error::{CaskError, Result};
use crate::keydir::{KeyDir, ValueMeta};
use crate::merge::{self, MergeStats, Prepared, SkipReason};
use crate::recovery::{Recovery, RecoveryResult};
use crate::segment::SegmentManager;

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete): Serialized by `write_lock`
///   - Only ONE write operation at a time
///   - Must acquire: write_lock → segment append → keydir (write)
///
/// - **Reads** (get): No write_lock needed
///   - KeyDir lookup under its read lock
///   - Positional read on a shared segment handle
///
/// - **Merge**: Serialized by `merge_lock`; takes `write_lock` only to
///   seal the active segment and snapshot the index
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Held for the engine's lifetime; the OS releases it on drop
    _lock_file: File,

    /// Segment files and the active segment
    storage: SegmentManager,

    /// Key → location of current value
    keydir: KeyDir,

    /// Serializes write operations (put/delete/merge prepare)
    write_lock: Mutex<()>,

    /// At most one merge at a time
    merge_lock: Mutex<()>,

    /// Last timestamp handed out; timestamps are strictly increasing
    last_timestamp: AtomicU64,

    /// What startup recovery found
    recovery: RecoveryResult,
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub live_keys: usize,
    pub segment_count: usize,
    pub active_segment_id: u32,
    pub disk_usage: u64,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config and create the data directory
    /// 2. Take the exclusive process lock
    /// 3. Open every segment
    /// 4. Replay segments into the KeyDir
    /// 5. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let lock_path = config.data_dir.join(format!("{}.lock", config.base_name));
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| CaskError::Locked(lock_path.clone()))?;

        let storage = SegmentManager::open(&config)?;
        let (keydir, recovery) = Recovery::recover(&storage)?;

        info!(
            dir = %config.data_dir.display(),
            live_keys = recovery.live_keys,
            active = recovery.active_segment_id,
            "engine ready"
        );

        Ok(Self {
            last_timestamp: AtomicU64::new(recovery.max_timestamp),
            config,
            _lock_file: lock_file,
            storage,
            keydir,
            write_lock: Mutex::new(()),
            merge_lock: Mutex::new(()),
            recovery,
        })
    }

    /// Open with a directory and segment base name, other settings default
    pub fn open_path(path: &Path, base_name: &str) -> Result<Self> {
        let config = Config::builder()
            .data_dir(path)
            .base_name(base_name)
            .build();
        Self::open(config)
    }

    /// Get the current value of `key`
    ///
    /// Fails with `KeyNotFound` if the key was never written or was deleted.
    pub fn get(&self, key: impl Into<Value>) -> Result<Value> {
        let key = Key::from(key.into());
        let meta = self.keydir.get(&key).ok_or(CaskError::KeyNotFound)?;

        match self.storage.read_value(&meta) {
            Ok(bytes) => Value::decode(meta.value_type, &bytes),
            // A merge may have repointed the key and deleted the old segment
            // between the lookup and the read
            Err(CaskError::SegmentMissing(id)) => {
                let fresh = self.keydir.get(&key).ok_or(CaskError::KeyNotFound)?;
                if fresh == meta {
                    return Err(CaskError::SegmentMissing(id));
                }
                let bytes = self.storage.read_value(&fresh)?;
                Value::decode(fresh.value_type, &bytes)
            }
            Err(e) => Err(e),
        }
    }

    /// Put a key-value pair
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Append the entry (may rotate the active segment)
    /// 3. Point the KeyDir at the new value
    ///
    /// An error from step 2, including a failed sync, leaves neither the
    /// KeyDir nor the segment holding the entry.
    pub fn put(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        let key = Key::from(key.into());
        let value = value.into();

        let _write_guard = self.write_lock.lock();

        let entry = Entry::new(self.next_timestamp(), key, &value)?;
        let (segment_id, value_offset) = self.storage.append(&entry)?;

        let meta = ValueMeta {
            segment_id,
            value_type: value.value_type(),
            key_len: entry.key.len() as u32,
            value_len: entry.value.len() as u32,
            value_offset,
            timestamp: entry.timestamp,
        };
        self.keydir.insert(entry.key, meta);

        Ok(())
    }

    /// Delete a key
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Append a tombstone
    /// 3. Drop the key from the KeyDir
    ///
    /// Deleting an absent key writes nothing and succeeds.
    pub fn delete(&self, key: impl Into<Value>) -> Result<()> {
        let key = Key::from(key.into());

        let _write_guard = self.write_lock.lock();

        if !self.keydir.contains(&key) {
            debug!(key = %key, "delete of absent key");
            return Ok(());
        }

        let entry = Entry::tombstone(self.next_timestamp(), key)?;
        self.storage.append(&entry)?;
        self.keydir.remove(&entry.key);

        Ok(())
    }

    /// Whether `key` currently has a value
    pub fn contains_key(&self, key: impl Into<Value>) -> bool {
        self.keydir.contains(&Key::from(key.into()))
    }

    /// Compact segments if there is anything to reclaim
    ///
    /// Safe to call at any time; returns a skipped outcome when another
    /// merge is running or there is no work.
    pub fn try_merge(&self) -> Result<MergeStats> {
        let Some(_merge_guard) = self.merge_lock.try_lock() else {
            return Ok(MergeStats::skipped(SkipReason::InProgress));
        };

        let plan = {
            let _write_guard = self.write_lock.lock();
            match merge::prepare(&self.storage, &self.keydir, self.config.merge_min_segments)? {
                Prepared::Skip(reason) => return Ok(MergeStats::skipped(reason)),
                Prepared::Ready(plan) => plan,
            }
        };

        merge::execute(&self.storage, &self.keydir, plan)
    }

    /// Force buffered appends to disk
    pub fn sync(&self) -> Result<()> {
        self.storage.sync()
    }

    /// Close the engine gracefully
    ///
    /// Syncs the active segment; the process lock is released on drop.
    pub fn close(self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.storage.sync()
    }

    /// Strictly increasing millisecond timestamp (called with write lock held)
    fn next_timestamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let ts = now.max(self.last_timestamp.load(Ordering::Acquire) + 1);
        self.last_timestamp.store(ts, Ordering::Release);
        ts
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.keydir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keydir.is_empty()
    }

    /// Every live key, in no particular order
    pub fn keys(&self) -> Vec<Key> {
        self.keydir.keys()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            live_keys: self.keydir.len(),
            segment_count: self.storage.segment_count(),
            active_segment_id: self.storage.active_id(),
            disk_usage: self.storage.disk_usage(),
        }
    }

    /// Result of the startup replay
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    /// Segment manager (for inspection)
    pub fn storage(&self) -> &SegmentManager {
        &self.storage
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
