//! Chunk arena backing the off-heap arrays
//!
//! A fixed-length directory of lazily allocated chunks. Each chunk is an
//! anonymous memory map viewed as a slice of `AtomicU64` words. Chunks are
//! only released when the arena is dropped, so a slice handed out by
//! `chunk` stays valid for the arena's lifetime.

use super::MAX_CHUNKS_LIMIT;
use memmap2::MmapMut;
use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

struct Chunk {
    // Owns the mapping `words` points into.
    _map: MmapMut,
    words: NonNull<AtomicU64>,
    len: usize,
}

// The mapping is only reached through atomics.
unsafe impl Send for Chunk {}
unsafe impl Sync for Chunk {}

impl Chunk {
    fn allocate(len: usize) -> io::Result<Self> {
        let bytes = len
            .checked_mul(std::mem::size_of::<AtomicU64>())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("chunk of {} words is too large to map", len),
                )
            })?;
        let mut map = MmapMut::map_anon(bytes)?;
        let words = NonNull::new(map.as_mut_ptr() as *mut AtomicU64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "null anonymous mapping"))?;
        Ok(Chunk {
            _map: map,
            words,
            len,
        })
    }

    fn words(&self) -> &[AtomicU64] {
        // SAFETY: the mapping is page aligned, zero filled, `len` words long,
        // writable, and lives as long as `self`. AtomicU64 has the same layout
        // as u64 and every access goes through atomic operations.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr(), self.len) }
    }
}

pub(crate) struct ChunkArena {
    cells: Box<[OnceLock<Chunk>]>,
    words_per_chunk: usize,
    /// One past the highest allocated chunk
    high_water: AtomicUsize,
}

impl ChunkArena {
    /// `max_chunks` is clamped to `MAX_CHUNKS_LIMIT`
    pub(crate) fn new(words_per_chunk: usize, max_chunks: usize) -> Self {
        assert!(words_per_chunk > 0, "chunks must hold at least one word");
        let cells = (0..max_chunks.min(MAX_CHUNKS_LIMIT))
            .map(|_| OnceLock::new())
            .collect();
        ChunkArena {
            cells,
            words_per_chunk,
            high_water: AtomicUsize::new(0),
        }
    }

    pub(crate) fn max_chunks(&self) -> usize {
        self.cells.len()
    }

    /// The chunk at `chunk_index`, if it was ever allocated
    pub(crate) fn chunk(&self, chunk_index: usize) -> Option<&[AtomicU64]> {
        self.cells.get(chunk_index)?.get().map(Chunk::words)
    }

    /// The chunk at `chunk_index`, allocating it first if needed.
    ///
    /// Callers check `chunk_index < max_chunks()` beforehand.
    pub(crate) fn chunk_or_allocate(&self, chunk_index: usize) -> io::Result<&[AtomicU64]> {
        let cell = &self.cells[chunk_index];
        if let Some(chunk) = cell.get() {
            return Ok(chunk.words());
        }
        // Two threads may race here; the loser's mapping is dropped.
        let fresh = Chunk::allocate(self.words_per_chunk)?;
        let chunk = cell.get_or_init(|| fresh);
        self.high_water.fetch_max(chunk_index + 1, Ordering::AcqRel);
        Ok(chunk.words())
    }

    pub(crate) fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Acquire)
    }

    pub(crate) fn allocated_chunks(&self) -> usize {
        self.cells[..self.high_water()]
            .iter()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    pub(crate) fn allocated_bytes(&self) -> u64 {
        (self.allocated_chunks() as u64)
            .saturating_mul(self.words_per_chunk as u64)
            .saturating_mul(std::mem::size_of::<AtomicU64>() as u64)
    }
}
