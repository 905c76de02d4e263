//! KeyDir implementation
//!
//! HashMap-based index with RwLock for concurrency.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

use crate::entry::Key;

use super::ValueMeta;

/// What replaying one entry did to the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Key was absent and is now live
    Inserted,
    /// Newer value replaced an older one
    Updated,
    /// Newer tombstone removed a live key
    Removed,
    /// Entry was not newer than the indexed one, or a tombstone for an absent key
    Ignored,
}

/// In-memory key directory
pub struct KeyDir {
    entries: RwLock<HashMap<Key, ValueMeta>>,
}

impl KeyDir {
    /// Create an empty KeyDir
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Current location of `key` (read lock)
    pub fn get(&self, key: &Key) -> Option<ValueMeta> {
        self.entries.read().get(key).copied()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Point `key` at a new location, returning the previous one (write lock)
    pub fn insert(&self, key: Key, meta: ValueMeta) -> Option<ValueMeta> {
        self.entries.write().insert(key, meta)
    }

    /// Drop `key` from the index (write lock)
    pub fn remove(&self, key: &Key) -> Option<ValueMeta> {
        self.entries.write().remove(key)
    }

    /// Apply one replayed entry with last-writer-wins semantics
    ///
    /// `meta` is `None` for a tombstone. An entry only takes effect if the
    /// key is absent or the entry's timestamp is strictly greater than the
    /// indexed one.
    pub fn replay(&self, key: Key, meta: Option<ValueMeta>, timestamp: u64) -> ReplayOutcome {
        let mut entries = self.entries.write();

        match entries.get(&key) {
            None => match meta {
                Some(meta) => {
                    entries.insert(key, meta);
                    ReplayOutcome::Inserted
                }
                None => ReplayOutcome::Ignored,
            },
            Some(current) if timestamp > current.timestamp => match meta {
                Some(meta) => {
                    entries.insert(key, meta);
                    ReplayOutcome::Updated
                }
                None => {
                    entries.remove(&key);
                    ReplayOutcome::Removed
                }
            },
            Some(_) => ReplayOutcome::Ignored,
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All live keys, in no particular order
    pub fn keys(&self) -> Vec<Key> {
        self.entries.read().keys().cloned().collect()
    }

    /// Copy of the whole index
    pub fn snapshot(&self) -> HashMap<Key, ValueMeta> {
        self.entries.read().clone()
    }

    /// Entries whose value lives in one of `segments`
    pub fn snapshot_segments(&self, segments: &BTreeSet<u32>) -> Vec<(Key, ValueMeta)> {
        self.entries
            .read()
            .iter()
            .filter(|(_, meta)| segments.contains(&meta.segment_id))
            .map(|(key, meta)| (key.clone(), *meta))
            .collect()
    }

    /// Encoded bytes of live entries, grouped by segment
    pub fn live_bytes_by_segment(&self) -> HashMap<u32, u64> {
        let mut totals = HashMap::new();
        for meta in self.entries.read().values() {
            *totals.entry(meta.segment_id).or_insert(0) += meta.entry_len();
        }
        totals
    }

    /// Whether any live entry still points into `segment_id`
    pub fn references(&self, segment_id: u32) -> bool {
        self.entries
            .read()
            .values()
            .any(|meta| meta.segment_id == segment_id)
    }

    /// Swap locations atomically under one write lock
    ///
    /// Each `(key, expected, new)` is applied only if the key still maps to
    /// `expected`; keys written or deleted since the snapshot are left alone.
    /// Returns the number of keys repointed.
    pub fn repoint(&self, updates: &[(Key, ValueMeta, ValueMeta)]) -> usize {
        let mut entries = self.entries.write();
        let mut repointed = 0;

        for (key, expected, new) in updates {
            if let Some(current) = entries.get_mut(key) {
                if current == expected {
                    *current = *new;
                    repointed += 1;
                }
            }
        }

        repointed
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for KeyDir {
    fn default() -> Self {
        Self::new()
    }
}
