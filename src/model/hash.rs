//! Fixed-length digest stored for internal nodes and inside leaf records

use std::fmt;

/// Size of every digest handled by the store (SHA-384 sized)
pub const HASH_SIZE_BYTES: usize = 48;

/// A 48-byte digest.
///
/// The store never computes digests; it only keeps the bytes handed to it
/// by the tree layer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash([u8; HASH_SIZE_BYTES]);

impl Hash {
    /// The all-zero digest
    pub const ZERO: Hash = Hash([0u8; HASH_SIZE_BYTES]);

    /// Create a hash from raw bytes
    pub fn from_bytes(bytes: [u8; HASH_SIZE_BYTES]) -> Self {
        Hash(bytes)
    }

    /// Create a hash from a slice, which must be exactly `HASH_SIZE_BYTES` long
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; HASH_SIZE_BYTES] = bytes.try_into().ok()?;
        Some(Hash(arr))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE_BYTES] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        Hash::from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }

    /// Get a short prefix for display
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }

    /// Check if this is the zero hash
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE_BYTES]
    }

    /// Split into native-endian words, the layout used by the off-heap hash array
    pub(crate) fn to_words(self) -> [u64; HASH_SIZE_BYTES / 8] {
        let mut words = [0u64; HASH_SIZE_BYTES / 8];
        for (word, chunk) in words.iter_mut().zip(self.0.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *word = u64::from_ne_bytes(raw);
        }
        words
    }

    pub(crate) fn from_words(words: &[u64; HASH_SIZE_BYTES / 8]) -> Self {
        let mut bytes = [0u8; HASH_SIZE_BYTES];
        for (chunk, word) in bytes.chunks_exact_mut(8).zip(words) {
            chunk.copy_from_slice(&word.to_ne_bytes());
        }
        Hash(bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Hash::ZERO
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
