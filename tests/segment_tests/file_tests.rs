//! Tests for segment files and naming
//!
//! These tests verify:
//! - File naming and id parsing
//! - Directory discovery order
//! - Append offsets and positional reads
//! - Short reads past the end of a segment
//! - Rollback of failed appends and renames of merge output
//! - Sequential iteration and corruption reporting

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use caskkv::entry::{Entry, Key, Value};
use caskkv::segment::{
    list_merge_leftovers, list_segments, merge_temp_path, parse_segment_id, segment_file_name,
    SegmentFile, SegmentIterator,
};
use caskkv::CaskError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_segment() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(segment_file_name("test", 1));
    (temp_dir, path)
}

fn entry(ts: u64, key: &str, value: &str) -> Entry {
    Entry::new(ts, Key::from(Value::from(key)), &Value::from(value)).unwrap()
}

// =============================================================================
// Naming Tests
// =============================================================================

#[test]
fn test_segment_file_name() {
    assert_eq!(segment_file_name("caskkv", 1), "caskkv-1.bin");
    assert_eq!(segment_file_name("db", 42), "db-42.bin");
}

#[test]
fn test_parse_segment_id() {
    assert_eq!(parse_segment_id("caskkv", "caskkv-1.bin"), Some(1));
    assert_eq!(parse_segment_id("caskkv", "caskkv-1234.bin"), Some(1234));

    assert_eq!(parse_segment_id("caskkv", "caskkv-01.bin"), None);
    assert_eq!(parse_segment_id("caskkv", "caskkv-0.bin"), None);
    assert_eq!(parse_segment_id("caskkv", "caskkv-.bin"), None);
    assert_eq!(parse_segment_id("caskkv", "caskkv-1.dat"), None);
    assert_eq!(parse_segment_id("caskkv", "other-1.bin"), None);
    assert_eq!(parse_segment_id("caskkv", "caskkv.lock"), None);
    assert_eq!(parse_segment_id("caskkv", "caskkv-1a.bin"), None);
}

#[test]
fn test_list_segments_sorted_numerically() {
    let temp_dir = TempDir::new().unwrap();
    for name in ["kv-10.bin", "kv-2.bin", "kv-1.bin", "kv.lock", "other-3.bin", "kv-03.bin"] {
        fs::write(temp_dir.path().join(name), b"").unwrap();
    }

    let ids: Vec<u32> = list_segments(temp_dir.path(), "kv")
        .unwrap()
        .into_iter()
        .map(|(id, _)| id)
        .collect();

    assert_eq!(ids, vec![1, 2, 10]);
}

#[test]
fn test_merge_output_is_invisible_to_scanner() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = merge_temp_path(temp_dir.path(), "kv", 4);
    assert_eq!(temp_path.file_name().unwrap(), "kv-4.bin.merge");

    for name in ["kv-1.bin", "kv-4.bin.merge", "kv-04.bin.merge", "other-5.bin.merge"] {
        fs::write(temp_dir.path().join(name), b"").unwrap();
    }

    let ids: Vec<u32> = list_segments(temp_dir.path(), "kv")
        .unwrap()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec![1]);

    let leftovers = list_merge_leftovers(temp_dir.path(), "kv").unwrap();
    assert_eq!(leftovers, vec![temp_path]);
}

// =============================================================================
// Append / Read Tests
// =============================================================================

#[test]
fn test_create_is_empty() {
    let (_temp, path) = setup_temp_segment();
    let segment = SegmentFile::create(&path, 1).unwrap();

    assert_eq!(segment.id(), 1);
    assert!(segment.is_empty());
    assert!(path.exists());
}

#[test]
fn test_create_refuses_existing_file() {
    let (_temp, path) = setup_temp_segment();
    SegmentFile::create(&path, 1).unwrap();

    assert!(SegmentFile::create(&path, 1).is_err());
}

#[test]
fn test_append_returns_offsets() {
    let (_temp, path) = setup_temp_segment();
    let segment = SegmentFile::create(&path, 1).unwrap();

    assert_eq!(segment.append(b"hello").unwrap(), 0);
    assert_eq!(segment.append(b"world!").unwrap(), 5);
    assert_eq!(segment.len(), 11);

    assert_eq!(segment.read_at(5, 6).unwrap(), b"world!");
    assert_eq!(segment.read_at(0, 11).unwrap(), b"helloworld!");
}

#[test]
fn test_open_existing_keeps_length() {
    let (_temp, path) = setup_temp_segment();
    {
        let segment = SegmentFile::create(&path, 1).unwrap();
        segment.append(b"abc").unwrap();
        segment.sync().unwrap();
    }

    let segment = SegmentFile::open(&path, 1).unwrap();
    assert_eq!(segment.len(), 3);
    assert_eq!(segment.append(b"d").unwrap(), 3);
    assert_eq!(segment.read_at(0, 4).unwrap(), b"abcd");
}

#[test]
fn test_read_past_end_is_short_read() {
    let (_temp, path) = setup_temp_segment();
    let segment = SegmentFile::create(&path, 7).unwrap();
    segment.append(b"0123456789").unwrap();

    match segment.read_at(8, 5) {
        Err(CaskError::ShortRead {
            segment_id,
            offset,
            expected,
            available,
        }) => {
            assert_eq!(segment_id, 7);
            assert_eq!(offset, 8);
            assert_eq!(expected, 5);
            assert_eq!(available, 2);
        }
        other => panic!("expected short read, got {:?}", other),
    }
}

// =============================================================================
// Rollback / Rename Tests
// =============================================================================

#[test]
fn test_truncate_drops_torn_tail() {
    let (_temp, path) = setup_temp_segment();
    let segment = SegmentFile::create(&path, 1).unwrap();
    let first = entry(1, "a", "1").encode();
    segment.append(&first).unwrap();

    // Half a record, as left by a write that failed partway
    let torn = entry(2, "b", "2").encode();
    segment.append(&torn[..torn.len() / 2]).unwrap();
    segment.truncate(first.len() as u64).unwrap();

    let second = entry(3, "c", "3").encode();
    assert_eq!(segment.append(&second).unwrap(), first.len() as u64);
    assert_eq!(fs::metadata(&path).unwrap().len(), (first.len() + second.len()) as u64);

    let entries: Vec<Entry> = SegmentIterator::open(&path, 1)
        .unwrap()
        .map(|r| r.unwrap().entry)
        .collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].timestamp, 3);
}

#[cfg(target_os = "linux")]
#[test]
fn test_failed_append_leaves_length_unchanged() {
    // Every write to /dev/full fails with ENOSPC
    let full = Path::new("/dev/full");
    if !full.exists() {
        return;
    }
    let segment = SegmentFile::open(full, 1).unwrap();

    assert!(matches!(segment.append(b"hello"), Err(CaskError::Io(_))));
    assert_eq!(segment.len(), 0);
    assert!(matches!(segment.append(b"again"), Err(CaskError::Io(_))));
    assert_eq!(segment.len(), 0);
}

#[test]
fn test_rename_to_moves_file() {
    let temp_dir = TempDir::new().unwrap();
    let from = merge_temp_path(temp_dir.path(), "kv", 3);
    let to = temp_dir.path().join(segment_file_name("kv", 3));

    let mut segment = SegmentFile::create(&from, 3).unwrap();
    segment.append(b"payload").unwrap();
    segment.rename_to(&to).unwrap();

    assert_eq!(segment.path(), to.as_path());
    assert!(!from.exists());
    assert_eq!(segment.read_at(0, 7).unwrap(), b"payload");
    assert_eq!(fs::read(&to).unwrap(), b"payload");
}

#[test]
fn test_rename_to_refuses_existing_target() {
    let temp_dir = TempDir::new().unwrap();
    let from = merge_temp_path(temp_dir.path(), "kv", 3);
    let to = temp_dir.path().join(segment_file_name("kv", 3));
    fs::write(&to, b"keep").unwrap();

    let mut segment = SegmentFile::create(&from, 3).unwrap();
    match segment.rename_to(&to) {
        Err(CaskError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::AlreadyExists),
        other => panic!("expected AlreadyExists, got {:?}", other),
    }

    assert_eq!(segment.path(), from.as_path());
    assert_eq!(fs::read(&to).unwrap(), b"keep");
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iterator_yields_entries_in_order() {
    let (_temp, path) = setup_temp_segment();
    let segment = SegmentFile::create(&path, 1).unwrap();
    let entries = [entry(1, "a", "1"), entry(2, "b", "22"), entry(3, "a", "333")];

    let mut offsets = Vec::new();
    for e in &entries {
        offsets.push(segment.append(&e.encode()).unwrap());
    }

    let scanned: Vec<_> = SegmentIterator::open(&path, 1)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(scanned.len(), 3);
    for ((s, e), offset) in scanned.iter().zip(&entries).zip(&offsets) {
        assert_eq!(&s.entry, e);
        assert_eq!(s.offset, *offset);
        assert_eq!(s.value_offset(), offset + e.value_offset());
    }
}

#[test]
fn test_iterator_empty_file() {
    let (_temp, path) = setup_temp_segment();
    SegmentFile::create(&path, 1).unwrap();

    assert_eq!(SegmentIterator::open(&path, 1).unwrap().count(), 0);
}

#[test]
fn test_iterator_reports_truncated_tail_once() {
    let (_temp, path) = setup_temp_segment();
    let first = entry(1, "a", "1").encode();
    let second = entry(2, "b", "2").encode();

    let mut file = OpenOptions::new().create(true).write(true).open(&path).unwrap();
    file.write_all(&first).unwrap();
    file.write_all(&second[..second.len() - 3]).unwrap();
    drop(file);

    let results: Vec<_> = SegmentIterator::open(&path, 9).unwrap().collect();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    match &results[1] {
        Err(CaskError::CorruptEntry(msg)) => {
            assert!(msg.contains("segment 9"));
            assert!(msg.contains(&format!("offset {}", first.len())));
        }
        other => panic!("expected corrupt entry, got {:?}", other),
    }
}

#[test]
fn test_iterator_detects_checksum_mismatch() {
    let (_temp, path) = setup_temp_segment();
    let mut bytes = entry(1, "key", "value").encode().to_vec();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    let mut iter = SegmentIterator::open(&path, 1).unwrap();
    assert!(matches!(iter.next(), Some(Err(CaskError::CorruptEntry(_)))));
    assert!(iter.next().is_none());
}
