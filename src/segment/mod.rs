//! Segment Module
//!
//! Append-only data files and the manager that owns them.
//!
//! ## Responsibilities
//! - Name and discover segment files in the data directory
//! - Append entries to the single active segment, rotating by size
//! - Positional reads of values from any segment
//! - Install merge output and retire merged segments
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── {base_name}.lock      (process lock, ignored by the scanner)
//!   ├── {base_name}-1.bin     (sealed)
//!   ├── {base_name}-2.bin     (sealed)
//!   ├── {base_name}-3.bin     (active: highest id)
//!   └── {base_name}-5.bin.merge (merge output not yet committed)
//! ```
//! Ids are decimal with no leading zeros and grow strictly. A merge may
//! leave gaps in the sequence. Merge output is written under the `.merge`
//! suffix and renamed into place once synced, so the scanner never sees a
//! half-written output; leftovers are deleted on open.

mod file;
mod iterator;
mod manager;

use std::fs;
use std::path::{Path, PathBuf};

pub use file::SegmentFile;
pub use iterator::{ScannedEntry, SegmentIterator};
pub use manager::SegmentManager;

use crate::error::Result;

/// Extension shared by every segment file
pub const SEGMENT_SUFFIX: &str = ".bin";

/// Appended to a segment name while merge output is being written
pub const MERGE_TEMP_SUFFIX: &str = ".merge";

/// Size at which the active segment is sealed (100 MiB)
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 100 * 1024 * 1024;

/// `<base_name>-<id>.bin`
pub fn segment_file_name(base_name: &str, id: u32) -> String {
    format!("{}-{}{}", base_name, id, SEGMENT_SUFFIX)
}

/// Full path of segment `id`
pub fn segment_path(dir: &Path, base_name: &str, id: u32) -> PathBuf {
    dir.join(segment_file_name(base_name, id))
}

/// Path merge output for `id` is written to before it is committed
pub fn merge_temp_path(dir: &Path, base_name: &str, id: u32) -> PathBuf {
    dir.join(format!("{}{}", segment_file_name(base_name, id), MERGE_TEMP_SUFFIX))
}

/// Parse a segment id from a file name
/// "caskkv-42.bin" → Some(42); "caskkv-042.bin", "caskkv-0.bin" → None
pub fn parse_segment_id(base_name: &str, file_name: &str) -> Option<u32> {
    let digits = file_name
        .strip_prefix(base_name)?
        .strip_prefix('-')?
        .strip_suffix(SEGMENT_SUFFIX)?;

    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Every segment file in `dir`, ascending by id
pub fn list_segments(dir: &Path, base_name: &str) -> Result<Vec<(u32, PathBuf)>> {
    let mut segments = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(id) = parse_segment_id(base_name, name) {
            segments.push((id, entry.path()));
        }
    }

    segments.sort_by_key(|(id, _)| *id);
    Ok(segments)
}

/// Uncommitted merge output left in `dir` by an interrupted merge
pub fn list_merge_leftovers(dir: &Path, base_name: &str) -> Result<Vec<PathBuf>> {
    let mut leftovers = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let is_leftover = name
            .strip_suffix(MERGE_TEMP_SUFFIX)
            .and_then(|segment| parse_segment_id(base_name, segment))
            .is_some();
        if is_leftover {
            leftovers.push(entry.path());
        }
    }

    leftovers.sort();
    Ok(leftovers)
}

/// Make renames and deletions in `dir` durable
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

/// NTFS journals directory metadata; there is no directory handle to sync
#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
