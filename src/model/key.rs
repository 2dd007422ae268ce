//! Bare 64-bit key, the fast path for the long-key index mode

use super::serialize::{SelfSerializable, VirtualKey};
use crate::{Error, Result};
use bytes::{Buf, BufMut};
use std::fmt;

/// A key that is just a `u64`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LongKey(pub u64);

impl LongKey {
    pub const SERIALIZED_SIZE: usize = 8;
    const VERSION: u32 = 1;
}

impl SelfSerializable for LongKey {
    fn version(&self) -> u32 {
        Self::VERSION
    }

    fn serialize<B: BufMut>(&self, out: &mut B) {
        out.put_u64(self.0);
    }

    fn deserialize<B: Buf>(buf: &mut B, version: u32) -> Result<Self> {
        if version != Self::VERSION {
            return Err(Error::VersionMismatch {
                expected: Self::VERSION,
                found: version,
            });
        }
        if buf.remaining() < Self::SERIALIZED_SIZE {
            return Err(Error::Corruption(format!(
                "LongKey needs {} bytes, got {}",
                Self::SERIALIZED_SIZE,
                buf.remaining()
            )));
        }
        Ok(LongKey(buf.get_u64()))
    }
}

impl VirtualKey for LongKey {
    fn as_long(&self) -> Option<u64> {
        Some(self.0)
    }
}

impl From<u64> for LongKey {
    fn from(v: u64) -> Self {
        LongKey(v)
    }
}

impl fmt::Debug for LongKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LongKey({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_key_encoding() {
        let mut out = Vec::new();
        LongKey(0xDEAD_BEEF).serialize(&mut out);
        assert_eq!(out.len(), LongKey::SERIALIZED_SIZE);

        let mut slice = out.as_slice();
        let key = LongKey::deserialize(&mut slice, 1).unwrap();
        assert_eq!(key, LongKey(0xDEAD_BEEF));
        assert_eq!(key.as_long(), Some(0xDEAD_BEEF));
    }

    #[test]
    fn test_long_key_short_buffer() {
        let mut slice: &[u8] = &[1, 2, 3];
        assert!(matches!(
            LongKey::deserialize(&mut slice, 1),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_long_key_unknown_version() {
        let mut slice: &[u8] = &[0u8; 8];
        assert!(matches!(
            LongKey::deserialize(&mut slice, 9),
            Err(Error::VersionMismatch { found: 9, .. })
        ));
    }
}
