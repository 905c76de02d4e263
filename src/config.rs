//! Configuration for caskkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CaskError, Result};
use crate::segment::DEFAULT_MAX_SEGMENT_SIZE;

/// Main configuration for a caskkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the segment files and the lock file
    ///   {data_dir}/
    ///     ├── {base_name}.lock
    ///     ├── {base_name}-1.bin
    ///     └── {base_name}-2.bin   (active)
    pub data_dir: PathBuf,

    /// Prefix shared by every segment file of this store
    pub base_name: String,

    /// Size at which the active segment is sealed and a new one opened (bytes)
    pub max_segment_size: u64,

    /// How often appends are fsynced
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Merge Configuration
    // -------------------------------------------------------------------------
    /// Minimum number of sealed segments before a merge does any work
    pub merge_min_segments: usize,

    /// Interval used by `MergeScheduler::for_engine`
    pub merge_interval: Duration,
}

/// Segment sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced appends (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./caskkv_data"),
            base_name: "caskkv".to_string(),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            sync_strategy: SyncStrategy::EveryNEntries { count: 100 },
            merge_min_segments: 2,
            merge_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.base_name.is_empty() {
            return Err(CaskError::Config("base_name must not be empty".to_string()));
        }
        if self.base_name.contains(['/', '\\']) {
            return Err(CaskError::Config(format!(
                "base_name must not contain path separators: {:?}",
                self.base_name
            )));
        }
        if self.max_segment_size == 0 {
            return Err(CaskError::Config(
                "max_segment_size must be greater than zero".to_string(),
            ));
        }
        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(CaskError::Config(
                "sync count must be greater than zero".to_string(),
            ));
        }
        if self.merge_interval.is_zero() {
            return Err(CaskError::Config(
                "merge_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment file prefix
    pub fn base_name(mut self, name: impl Into<String>) -> Self {
        self.config.base_name = name.into();
        self
    }

    /// Set the rotation threshold (in bytes)
    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.config.max_segment_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the sealed segment count below which merges are skipped
    pub fn merge_min_segments(mut self, count: usize) -> Self {
        self.config.merge_min_segments = count;
        self
    }

    /// Set the merge scheduler interval
    pub fn merge_interval(mut self, interval: Duration) -> Self {
        self.config.merge_interval = interval;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
