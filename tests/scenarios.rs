//! Large-scale scenarios for the off-heap arrays and the disk store

mod common;

use common::mixed_hash_of;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;
use vleaf::store::DATA_FILE_EXTENSION;
use vleaf::{
    HashList, HeapLongArray, LongList, MemoryIndexDiskStore, OffHeapHashArray, OffHeapLongArray,
};

#[test]
fn test_three_million_hashes_then_far_index() {
    let hashes = OffHeapHashArray::new();
    const COUNT: u64 = 3_000_000;

    for i in 0..COUNT {
        hashes.put(i, &mixed_hash_of(i)).unwrap();
    }
    for i in 0..COUNT {
        assert_eq!(hashes.get(i), Some(mixed_hash_of(i)), "index {}", i);
    }

    let far = 3_000_123;
    assert_eq!(hashes.get(far), None);
    hashes.put(far, &mixed_hash_of(far)).unwrap();
    assert_eq!(hashes.get(far), Some(mixed_hash_of(far)));
    assert_eq!(hashes.get(far - 1), None);
}

#[test]
fn test_three_batches_three_files() {
    let dir = tempdir().unwrap();
    let store = MemoryIndexDiskStore::create(dir.path(), "scenario", 24).unwrap();

    let record = |i: u64| {
        let mut out = [0u8; 24];
        out[..8].copy_from_slice(&i.to_le_bytes());
        out[8..16].copy_from_slice(&(i * i).to_le_bytes());
        out[16..].copy_from_slice(&(i ^ 0xABCD).to_le_bytes());
        out
    };

    let mut next = 0u64;
    for batch in [1000u64, 500, 500] {
        store.start_writing().unwrap();
        for i in next..next + batch {
            store.put(i, &record(i)).unwrap();
        }
        store.end_writing(next, next + batch - 1).unwrap();
        next += batch;
    }

    let data_files = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map_or(false, |ext| ext == DATA_FILE_EXTENSION)
        })
        .count();
    assert_eq!(data_files, 3);
    assert_eq!(store.file_count(), 3);

    let mut buf = [0u8; 24];
    for i in 0..2000u64 {
        assert!(store.get(i, 0..24, &mut buf).unwrap(), "index {}", i);
        assert_eq!(buf, record(i));
    }
    assert!(!store.get(2000, 0..24, &mut buf).unwrap());
}

#[test]
fn test_off_heap_and_heap_long_arrays_agree() {
    let off_heap = OffHeapLongArray::with_chunks(512, 128);
    let heap = HeapLongArray::with_chunks(512, 128);
    let lists: [&dyn LongList; 2] = [&off_heap, &heap];

    // A fixed pseudo-random mix of puts and conditional puts
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    let mut observed: [Vec<(u64, bool)>; 2] = [Vec::new(), Vec::new()];
    for step in 0..20_000u64 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let index = state % 60_000;
        let value = step + 1;
        for (list, seen) in lists.iter().zip(observed.iter_mut()) {
            let wrote = match step % 3 {
                0 => {
                    list.put(index, value).unwrap();
                    true
                }
                1 => list
                    .put_if_equal(index, list.get(index, 0), value)
                    .unwrap(),
                _ => list.put_if_equal_safe(index, step, value).unwrap(),
            };
            seen.push((list.get(index, u64::MAX), wrote));
        }
    }

    assert_eq!(observed[0], observed[1]);
    assert_eq!(off_heap.capacity(), heap.capacity());
    for i in 0..60_000u64 {
        assert_eq!(off_heap.get(i, 7), heap.get(i, 7), "index {}", i);
    }
}

#[test]
fn test_concurrent_cas_exactly_one_winner() {
    let list = Arc::new(OffHeapLongArray::new());
    let index = 12_345_678;
    list.put(index, 1).unwrap();

    for round in 0..50u64 {
        let expected = list.get(index, 0);
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let list = Arc::clone(&list);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    let value = (round + 1) * 100 + t + 2;
                    if list.put_if_equal_safe(index, expected, value).unwrap() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1, "round {}", round);
        assert_ne!(list.get(index, 0), expected);
    }
}
