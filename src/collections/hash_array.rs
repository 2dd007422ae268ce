//! Growable arrays of fixed-length hashes indexed by `u64`

use super::arena::ChunkArena;
use super::{check_chunk_geometry, covered_capacity, DEFAULT_MAX_CHUNKS, MAX_CHUNKS_LIMIT};
use crate::model::{Hash, HASH_SIZE_BYTES};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::sync::atomic::{fence, Ordering};

/// Default hashes per chunk
pub const DEFAULT_HASH_CHUNK_LEN: usize = 1 << 16;

const HASH_WORDS: usize = HASH_SIZE_BYTES / 8;
// stamp word + digest words
const SLOT_WORDS: usize = 1 + HASH_WORDS;
// Stamp of a slot that was never written. Odd stamps mark a write in
// progress, even non-zero stamps a stable digest.
const NEVER_WRITTEN: u64 = 0;

/// Index-addressed hash storage
pub trait HashList: Send + Sync {
    /// The hash at `index`, or `None` if it was never written
    fn get(&self, index: u64) -> Option<Hash>;

    /// Store `hash` at `index`, growing as needed
    fn put(&self, index: u64, hash: &Hash) -> Result<()>;

    /// One past the highest slot backed by storage
    fn capacity(&self) -> u64;

    /// Largest number of slots this array can ever hold
    fn max_capacity(&self) -> u64;
}

fn check_index(index: u64, max_capacity: u64) -> Result<()> {
    if index >= max_capacity {
        return Err(Error::InvalidArgument(format!(
            "index {} is beyond the maximum capacity {}",
            index, max_capacity
        )));
    }
    Ok(())
}

/// Hash array kept in anonymous memory maps.
///
/// Each slot is a stamp word followed by the digest words, written like a
/// seqlock: the writer makes the stamp odd, stores the digest, then bumps
/// the stamp to the next even value. Readers retry until they see the same
/// even stamp before and after copying the digest, so an overwrite racing
/// a read never yields a mix of the old and new digest. Writers to the
/// same index must still be serialized by the caller.
pub struct OffHeapHashArray {
    arena: ChunkArena,
    chunk_len: usize,
}

impl OffHeapHashArray {
    pub fn new() -> Self {
        Self::with_chunks(DEFAULT_HASH_CHUNK_LEN, DEFAULT_MAX_CHUNKS)
    }

    pub fn with_chunks(chunk_len: usize, max_chunks: usize) -> Self {
        OffHeapHashArray {
            arena: ChunkArena::new(chunk_len.saturating_mul(SLOT_WORDS), max_chunks),
            chunk_len,
        }
    }

    /// Whether `with_chunks(chunk_len, max_chunks)` describes an array
    /// that can be addressed without overflow
    pub fn check_geometry(chunk_len: usize, max_chunks: usize) -> Result<()> {
        check_chunk_geometry(chunk_len, max_chunks, SLOT_WORDS)
    }

    /// Chunk index and slot within the chunk. A slot's first word is at
    /// `slot * SLOT_WORDS` of its chunk.
    fn locate(&self, index: u64) -> (usize, usize) {
        let chunk_len = self.chunk_len as u64;
        ((index / chunk_len) as usize, (index % chunk_len) as usize)
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.arena.allocated_bytes()
    }
}

impl Default for OffHeapHashArray {
    fn default() -> Self {
        Self::new()
    }
}

impl HashList for OffHeapHashArray {
    fn get(&self, index: u64) -> Option<Hash> {
        let (chunk, slot) = self.locate(index);
        let words = self.arena.chunk(chunk)?;
        let start = slot * SLOT_WORDS;
        let slot = &words[start..start + SLOT_WORDS];
        let mut digest = [0u64; HASH_WORDS];
        loop {
            let stamp = slot[0].load(Ordering::Acquire);
            if stamp == NEVER_WRITTEN {
                return None;
            }
            if stamp & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            for (out, word) in digest.iter_mut().zip(&slot[1..]) {
                *out = word.load(Ordering::Relaxed);
            }
            fence(Ordering::Acquire);
            if slot[0].load(Ordering::Relaxed) == stamp {
                return Some(Hash::from_words(&digest));
            }
        }
    }

    fn put(&self, index: u64, hash: &Hash) -> Result<()> {
        check_index(index, self.max_capacity())?;
        let (chunk, slot) = self.locate(index);
        let words = self.arena.chunk_or_allocate(chunk)?;
        let start = slot * SLOT_WORDS;
        let slot = &words[start..start + SLOT_WORDS];

        let writing = slot[0].load(Ordering::Relaxed) | 1;
        slot[0].store(writing, Ordering::Relaxed);
        fence(Ordering::Release);
        for (word, value) in slot[1..].iter().zip(hash.to_words()) {
            word.store(value, Ordering::Relaxed);
        }
        slot[0].store(writing + 1, Ordering::Release);
        Ok(())
    }

    fn capacity(&self) -> u64 {
        (self.arena.high_water() * self.chunk_len) as u64
    }

    fn max_capacity(&self) -> u64 {
        (self.arena.max_chunks() as u64).saturating_mul(self.chunk_len as u64)
    }
}

/// Hash array kept in a `Vec`, used as a reference for the off-heap one.
pub struct HeapHashArray {
    data: RwLock<Vec<Option<Hash>>>,
    chunk_len: usize,
    max_chunks: usize,
}

impl HeapHashArray {
    pub fn new() -> Self {
        Self::with_chunks(DEFAULT_HASH_CHUNK_LEN, DEFAULT_MAX_CHUNKS)
    }

    pub fn with_chunks(chunk_len: usize, max_chunks: usize) -> Self {
        HeapHashArray {
            data: RwLock::new(Vec::new()),
            chunk_len,
            max_chunks: max_chunks.min(MAX_CHUNKS_LIMIT),
        }
    }
}

impl Default for HeapHashArray {
    fn default() -> Self {
        Self::new()
    }
}

impl HashList for HeapHashArray {
    fn get(&self, index: u64) -> Option<Hash> {
        self.data.read().get(index as usize).copied().flatten()
    }

    fn put(&self, index: u64, hash: &Hash) -> Result<()> {
        check_index(index, self.max_capacity())?;
        let mut data = self.data.write();
        let needed = covered_capacity(index, self.chunk_len) as usize;
        if data.len() < needed {
            data.resize(needed, None);
        }
        data[index as usize] = Some(*hash);
        Ok(())
    }

    fn capacity(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn max_capacity(&self) -> u64 {
        (self.max_chunks as u64).saturating_mul(self.chunk_len as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn hash_of(i: u64) -> Hash {
        let mut bytes = [0u8; HASH_SIZE_BYTES];
        for (n, chunk) in bytes.chunks_exact_mut(8).enumerate() {
            chunk.copy_from_slice(&(i.wrapping_mul(31).wrapping_add(n as u64)).to_le_bytes());
        }
        Hash::from_bytes(bytes)
    }

    #[test]
    fn test_absent_until_written() {
        let lists: Vec<Box<dyn HashList>> = vec![
            Box::new(OffHeapHashArray::with_chunks(64, 16)) as Box<dyn HashList>,
            Box::new(HeapHashArray::with_chunks(64, 16)),
        ];
        for list in lists {
            assert_eq!(list.get(0), None);
            list.put(3, &Hash::ZERO).unwrap();
            // A stored zero digest is still present
            assert_eq!(list.get(3), Some(Hash::ZERO));
            assert_eq!(list.get(2), None);
            assert_eq!(list.get(4), None);
        }
    }

    #[test]
    fn test_overwrite_and_sparse_growth() {
        let list = OffHeapHashArray::with_chunks(64, 1024);
        list.put(5, &hash_of(5)).unwrap();
        list.put(5, &hash_of(6)).unwrap();
        assert_eq!(list.get(5), Some(hash_of(6)));

        list.put(60_000, &hash_of(60_000)).unwrap();
        assert_eq!(list.get(60_000), Some(hash_of(60_000)));
        assert_eq!(list.get(30_000), None);
        // Only the two touched chunks are mapped
        assert_eq!(list.allocated_bytes(), 2 * 64 * SLOT_WORDS as u64 * 8);
    }

    #[test]
    fn test_beyond_max_capacity() {
        let list = HeapHashArray::with_chunks(8, 2);
        assert!(matches!(
            list.put(16, &Hash::ZERO),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(list.get(16), None);
    }

    #[test]
    fn test_oversized_chunks_fail_cleanly() {
        assert!(OffHeapHashArray::check_geometry(usize::MAX / 4, 4).is_err());
        let list = OffHeapHashArray::with_chunks(usize::MAX / 4, 4);
        assert!(matches!(list.put(0, &Hash::ZERO), Err(Error::Io(_))));
        assert_eq!(list.get(0), None);
        assert_eq!(list.get(u64::MAX), None);
    }

    #[test]
    fn test_heap_equivalence() {
        let off_heap = OffHeapHashArray::with_chunks(32, 64);
        let heap = HeapHashArray::with_chunks(32, 64);
        for i in (0..2000u64).step_by(7) {
            off_heap.put(i, &hash_of(i)).unwrap();
            heap.put(i, &hash_of(i)).unwrap();
        }
        for i in 0..2000u64 {
            assert_eq!(off_heap.get(i), heap.get(i), "index {}", i);
        }
        assert_eq!(off_heap.capacity(), heap.capacity());
    }

    #[test]
    fn test_concurrent_readers_see_whole_digests() {
        let list = Arc::new(OffHeapHashArray::with_chunks(128, 64));
        let writer = {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                for i in 0..5000u64 {
                    list.put(i, &hash_of(i)).unwrap();
                }
            })
        };
        let reader = {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                for _ in 0..3 {
                    for i in 0..5000u64 {
                        if let Some(h) = list.get(i) {
                            assert_eq!(h, hash_of(i));
                        }
                    }
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
    }

    #[test]
    fn test_overwrites_never_tear() {
        let list = Arc::new(OffHeapHashArray::with_chunks(16, 4));
        let (a, b) = (hash_of(1), hash_of(2));
        list.put(7, &a).unwrap();

        let writer = {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                for round in 0..20_000u32 {
                    list.put(7, if round % 2 == 0 { &b } else { &a }).unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let list = Arc::clone(&list);
                thread::spawn(move || {
                    for _ in 0..20_000 {
                        let seen = list.get(7).unwrap();
                        assert!(seen == a || seen == b, "torn digest {}", seen);
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
