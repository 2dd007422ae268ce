//! Growable arrays of `u64` indexed by `u64`

use super::arena::ChunkArena;
use super::{check_chunk_geometry, covered_capacity, DEFAULT_MAX_CHUNKS, EMPTY, MAX_CHUNKS_LIMIT};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::sync::atomic::Ordering;

/// Default slots per chunk (8 MiB of longs)
pub const DEFAULT_LONG_CHUNK_LEN: usize = 1 << 20;

/// Index-addressed `u64` storage.
///
/// `0` is the empty marker: it is what an unwritten slot holds and it can
/// not be stored. Readers and writers on different indices never block
/// each other; concurrent writers to the same index must use
/// `put_if_equal_safe`.
pub trait LongList: Send + Sync {
    /// The value at `index`, or `default` if it was never written
    fn get(&self, index: u64, default: u64) -> u64;

    /// Store `value` at `index`, growing as needed
    fn put(&self, index: u64, value: u64) -> Result<()>;

    /// Replace the slot only if it holds `expected`. Not safe against a
    /// concurrent writer on the same index.
    fn put_if_equal(&self, index: u64, expected: u64, value: u64) -> Result<bool>;

    /// Atomic compare-and-set on one slot
    fn put_if_equal_safe(&self, index: u64, expected: u64, value: u64) -> Result<bool>;

    /// One past the highest slot backed by storage
    fn capacity(&self) -> u64;

    /// Largest number of slots this array can ever hold
    fn max_capacity(&self) -> u64;
}

fn check_put(index: u64, value: u64, max_capacity: u64) -> Result<()> {
    if value == EMPTY {
        return Err(Error::InvalidArgument(
            "0 is the empty marker and can not be stored".into(),
        ));
    }
    if index >= max_capacity {
        return Err(Error::InvalidArgument(format!(
            "index {} is beyond the maximum capacity {}",
            index, max_capacity
        )));
    }
    Ok(())
}

/// Long array kept in anonymous memory maps, one chunk at a time.
pub struct OffHeapLongArray {
    arena: ChunkArena,
    chunk_len: usize,
}

impl OffHeapLongArray {
    pub fn new() -> Self {
        Self::with_chunks(DEFAULT_LONG_CHUNK_LEN, DEFAULT_MAX_CHUNKS)
    }

    pub fn with_chunks(chunk_len: usize, max_chunks: usize) -> Self {
        OffHeapLongArray {
            arena: ChunkArena::new(chunk_len, max_chunks),
            chunk_len,
        }
    }

    /// Whether `with_chunks(chunk_len, max_chunks)` describes an array
    /// that can be addressed without overflow
    pub fn check_geometry(chunk_len: usize, max_chunks: usize) -> Result<()> {
        check_chunk_geometry(chunk_len, max_chunks, 1)
    }

    fn locate(&self, index: u64) -> (usize, usize) {
        let chunk_len = self.chunk_len as u64;
        ((index / chunk_len) as usize, (index % chunk_len) as usize)
    }

    /// Bytes of anonymous memory currently mapped
    pub fn allocated_bytes(&self) -> u64 {
        self.arena.allocated_bytes()
    }
}

impl Default for OffHeapLongArray {
    fn default() -> Self {
        Self::new()
    }
}

impl LongList for OffHeapLongArray {
    fn get(&self, index: u64, default: u64) -> u64 {
        let (chunk, slot) = self.locate(index);
        match self.arena.chunk(chunk) {
            Some(words) => match words[slot].load(Ordering::Acquire) {
                EMPTY => default,
                value => value,
            },
            None => default,
        }
    }

    fn put(&self, index: u64, value: u64) -> Result<()> {
        check_put(index, value, self.max_capacity())?;
        let (chunk, slot) = self.locate(index);
        let words = self.arena.chunk_or_allocate(chunk)?;
        words[slot].store(value, Ordering::Release);
        Ok(())
    }

    fn put_if_equal(&self, index: u64, expected: u64, value: u64) -> Result<bool> {
        check_put(index, value, self.max_capacity())?;
        let (chunk, slot) = self.locate(index);
        let words = match self.arena.chunk(chunk) {
            Some(words) => words,
            None if expected == EMPTY => self.arena.chunk_or_allocate(chunk)?,
            None => return Ok(false),
        };
        if words[slot].load(Ordering::Acquire) != expected {
            return Ok(false);
        }
        words[slot].store(value, Ordering::Release);
        Ok(true)
    }

    fn put_if_equal_safe(&self, index: u64, expected: u64, value: u64) -> Result<bool> {
        check_put(index, value, self.max_capacity())?;
        let (chunk, slot) = self.locate(index);
        let words = match self.arena.chunk(chunk) {
            Some(words) => words,
            None if expected == EMPTY => self.arena.chunk_or_allocate(chunk)?,
            None => return Ok(false),
        };
        Ok(words[slot]
            .compare_exchange(expected, value, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    fn capacity(&self) -> u64 {
        (self.arena.high_water() * self.chunk_len) as u64
    }

    fn max_capacity(&self) -> u64 {
        (self.arena.max_chunks() as u64).saturating_mul(self.chunk_len as u64)
    }
}

/// Long array kept in a `Vec`, used as a reference for the off-heap one.
pub struct HeapLongArray {
    data: RwLock<Vec<u64>>,
    chunk_len: usize,
    max_chunks: usize,
}

impl HeapLongArray {
    pub fn new() -> Self {
        Self::with_chunks(DEFAULT_LONG_CHUNK_LEN, DEFAULT_MAX_CHUNKS)
    }

    pub fn with_chunks(chunk_len: usize, max_chunks: usize) -> Self {
        HeapLongArray {
            data: RwLock::new(Vec::new()),
            chunk_len,
            max_chunks: max_chunks.min(MAX_CHUNKS_LIMIT),
        }
    }

    fn grow_to(data: &mut Vec<u64>, index: u64, chunk_len: usize) {
        let needed = covered_capacity(index, chunk_len) as usize;
        if data.len() < needed {
            data.resize(needed, EMPTY);
        }
    }
}

impl Default for HeapLongArray {
    fn default() -> Self {
        Self::new()
    }
}

impl LongList for HeapLongArray {
    fn get(&self, index: u64, default: u64) -> u64 {
        let data = self.data.read();
        match data.get(index as usize) {
            Some(&EMPTY) | None => default,
            Some(&value) => value,
        }
    }

    fn put(&self, index: u64, value: u64) -> Result<()> {
        check_put(index, value, self.max_capacity())?;
        let mut data = self.data.write();
        Self::grow_to(&mut data, index, self.chunk_len);
        data[index as usize] = value;
        Ok(())
    }

    fn put_if_equal(&self, index: u64, expected: u64, value: u64) -> Result<bool> {
        self.put_if_equal_safe(index, expected, value)
    }

    fn put_if_equal_safe(&self, index: u64, expected: u64, value: u64) -> Result<bool> {
        check_put(index, value, self.max_capacity())?;
        let mut data = self.data.write();
        let current = data.get(index as usize).copied().unwrap_or(EMPTY);
        if current != expected {
            return Ok(false);
        }
        Self::grow_to(&mut data, index, self.chunk_len);
        data[index as usize] = value;
        Ok(true)
    }

    fn capacity(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn max_capacity(&self) -> u64 {
        (self.max_chunks as u64).saturating_mul(self.chunk_len as u64)
    }
}
