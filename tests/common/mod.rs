//! Key, value and hash fixtures shared by the integration tests

#![allow(dead_code)]

use bytes::{Buf, BufMut};
use vleaf::{Error, Hash, Result, SelfSerializable, VirtualKey, HASH_SIZE_BYTES};

/// Deterministic 48-byte digest of `i`
pub fn hash_of(i: u64) -> Hash {
    let mut bytes = [0u8; HASH_SIZE_BYTES];
    let mut hasher = blake3::Hasher::new();
    hasher.update(&i.to_le_bytes());
    hasher.finalize_xof().fill(&mut bytes);
    Hash::from_bytes(bytes)
}

/// Cheap deterministic digest of `i` for tests that need millions of them
pub fn mixed_hash_of(i: u64) -> Hash {
    let mut bytes = [0u8; HASH_SIZE_BYTES];
    let mut state = i;
    for chunk in bytes.chunks_exact_mut(8) {
        // splitmix64
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        chunk.copy_from_slice(&(z ^ (z >> 31)).to_le_bytes());
    }
    Hash::from_bytes(bytes)
}

/// Account-style key with no `u64` form, for the object-key mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccountKey {
    pub shard: u32,
    pub realm: u32,
    pub num: u64,
}

impl AccountKey {
    pub const SERIALIZED_SIZE: usize = 16;

    pub fn num(num: u64) -> Self {
        AccountKey {
            shard: 0,
            realm: 0,
            num,
        }
    }
}

impl SelfSerializable for AccountKey {
    fn version(&self) -> u32 {
        1
    }

    fn serialize<B: BufMut>(&self, out: &mut B) {
        out.put_u32(self.shard);
        out.put_u32(self.realm);
        out.put_u64(self.num);
    }

    fn deserialize<B: Buf>(buf: &mut B, _version: u32) -> Result<Self> {
        if buf.remaining() < Self::SERIALIZED_SIZE {
            return Err(Error::Corruption("short account key".into()));
        }
        Ok(AccountKey {
            shard: buf.get_u32(),
            realm: buf.get_u32(),
            num: buf.get_u64(),
        })
    }
}

impl VirtualKey for AccountKey {}

/// Account balance. Version 1 had no memo; version 2 adds a 24-byte memo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Balance {
    pub tinybars: u64,
    pub memo: String,
}

impl Balance {
    pub const SERIALIZED_SIZE: usize = 8 + 1 + 24;

    pub fn new(tinybars: u64, memo: &str) -> Self {
        Balance {
            tinybars,
            memo: memo.to_string(),
        }
    }
}

impl SelfSerializable for Balance {
    fn version(&self) -> u32 {
        2
    }

    fn serialize<B: BufMut>(&self, out: &mut B) {
        out.put_u64(self.tinybars);
        let memo = &self.memo.as_bytes()[..self.memo.len().min(24)];
        out.put_u8(memo.len() as u8);
        out.put_slice(memo);
    }

    fn deserialize<B: Buf>(buf: &mut B, version: u32) -> Result<Self> {
        if buf.remaining() < 8 {
            return Err(Error::Corruption("short balance".into()));
        }
        let tinybars = buf.get_u64();
        let memo = match version {
            1 => String::new(),
            2 => {
                let len = buf.get_u8() as usize;
                if buf.remaining() < len {
                    return Err(Error::Corruption("short memo".into()));
                }
                let mut raw = vec![0u8; len];
                buf.copy_to_slice(&mut raw);
                String::from_utf8(raw).map_err(|e| Error::Corruption(e.to_string()))?
            }
            other => {
                return Err(Error::VersionMismatch {
                    expected: 2,
                    found: other,
                })
            }
        };
        Ok(Balance { tinybars, memo })
    }
}
