//! # caskkv
//!
//! A Bitcask-style log-structured key-value store with:
//! - Append-only segment files with per-entry CRC32
//! - O(1) point lookups through an in-memory KeyDir
//! - Crash recovery by replaying segments in write order
//! - Background merge that reclaims overwritten and deleted data
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Engine (put / get / delete)                 │
//! │            (Single Writer / Multi Reader)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Segment   │          │   KeyDir    │
//!   │   Manager   │◄─────────│  (RwLock)   │
//!   │  (Append)   │ locates  └──────▲──────┘
//!   └──────┬──────┘                 │
//!          │                        │ rebuilds / repoints
//!          ▼                        │
//!   ┌─────────────┐          ┌──────┴──────┐
//!   │  Segments   │─────────►│  Recovery   │
//!   │  *.bin      │          │  / Merge    │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod entry;
pub mod keydir;
pub mod segment;
pub mod recovery;
pub mod merge;
pub mod engine;
pub mod scheduler;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CaskError, Result};
pub use config::{Config, SyncStrategy};
pub use engine::{Engine, EngineStats};
pub use entry::{Key, Value, ValueType};
pub use merge::{MergeOutcome, MergeStats, SkipReason};
pub use scheduler::MergeScheduler;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of caskkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
