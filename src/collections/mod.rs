//! Growable index-addressed collections
//!
//! The store keeps its path indexes here: `u64` data locations and
//! fixed-length hashes, addressed by path. Off-heap variants keep their
//! slots in anonymous memory maps allocated one chunk at a time; heap
//! variants are plain `Vec`s behind a lock and serve as a reference
//! implementation with identical observable behaviour.

use crate::{Error, Result};

mod arena;
mod hash_array;
mod long_array;
mod tuple_list;

pub use hash_array::{HashList, HeapHashArray, OffHeapHashArray, DEFAULT_HASH_CHUNK_LEN};
pub use long_array::{HeapLongArray, LongList, OffHeapLongArray, DEFAULT_LONG_CHUNK_LEN};
pub use tuple_list::ThreeLongList;

/// Default number of chunks an array may grow to
pub const DEFAULT_MAX_CHUNKS: usize = 1 << 14;

/// Upper bound on `max_chunks`. The chunk directory is allocated up front,
/// so larger values are clamped to this.
pub const MAX_CHUNKS_LIMIT: usize = 1 << 16;

/// Slot value meaning "never written". Long arrays refuse to store it.
pub const EMPTY: u64 = 0;

/// Number of slots covered by the chunks up to and including the one
/// holding `index`.
pub(crate) fn covered_capacity(index: u64, chunk_len: usize) -> u64 {
    (index / chunk_len as u64 + 1) * chunk_len as u64
}

/// Check that `max_chunks` chunks of `chunk_len` slots, each
/// `words_per_slot` words wide, can be addressed without overflow.
pub(crate) fn check_chunk_geometry(
    chunk_len: usize,
    max_chunks: usize,
    words_per_slot: usize,
) -> Result<()> {
    if chunk_len == 0 || max_chunks == 0 {
        return Err(Error::Config("index chunk sizes must be non-zero".into()));
    }
    if max_chunks > MAX_CHUNKS_LIMIT {
        return Err(Error::Config(format!(
            "max_chunks {} exceeds the limit of {}",
            max_chunks, MAX_CHUNKS_LIMIT
        )));
    }
    let total_bytes = chunk_len
        .checked_mul(words_per_slot)
        .and_then(|words| words.checked_mul(std::mem::size_of::<u64>()))
        .and_then(|chunk_bytes| chunk_bytes.checked_mul(max_chunks));
    if total_bytes.is_none() {
        return Err(Error::Config(format!(
            "{} chunks of {} slots can not be addressed",
            max_chunks, chunk_len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_geometry_limits() {
        assert!(check_chunk_geometry(1 << 20, DEFAULT_MAX_CHUNKS, 1).is_ok());
        assert!(check_chunk_geometry(1 << 16, DEFAULT_MAX_CHUNKS, 7).is_ok());

        assert!(matches!(
            check_chunk_geometry(0, 8, 1),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            check_chunk_geometry(1024, MAX_CHUNKS_LIMIT + 1, 1),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            check_chunk_geometry(usize::MAX / 4, 4, 7),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            check_chunk_geometry(usize::MAX / 8, 4, 1),
            Err(Error::Config(_))
        ));
    }
}
