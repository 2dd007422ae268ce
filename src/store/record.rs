//! Leaf record layout
//!
//! ```text
//! [keyVersion: u32][key: key_size][hash: 48][valueVersion: u32][value: value_size]
//! ```
//!
//! Versions are big-endian. Keys and values shorter than their configured
//! size are zero padded.

use crate::model::{Hash, SelfSerializable, HASH_SIZE_BYTES};
use crate::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::ops::Range;

const VERSION_BYTES: usize = 4;

/// Offsets of the parts of a leaf record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeafRecordLayout {
    key_size: usize,
    value_size: usize,
}

impl LeafRecordLayout {
    pub fn new(key_size: usize, value_size: usize) -> Self {
        LeafRecordLayout {
            key_size,
            value_size,
        }
    }

    pub fn slot_size(&self) -> usize {
        VERSION_BYTES + self.key_size + HASH_SIZE_BYTES + VERSION_BYTES + self.value_size
    }

    /// Key version and key
    pub fn key_range(&self) -> Range<usize> {
        0..VERSION_BYTES + self.key_size
    }

    pub fn hash_range(&self) -> Range<usize> {
        let start = self.key_range().end;
        start..start + HASH_SIZE_BYTES
    }

    /// Value version and value
    pub fn value_range(&self) -> Range<usize> {
        let start = self.hash_range().end;
        start..start + VERSION_BYTES + self.value_size
    }

    pub fn whole(&self) -> Range<usize> {
        0..self.slot_size()
    }

    /// Serialize a full record
    pub fn encode<K, V>(&self, key: &K, hash: &Hash, value: &V) -> Result<BytesMut>
    where
        K: SelfSerializable,
        V: SelfSerializable,
    {
        let mut out = BytesMut::with_capacity(self.slot_size());
        put_part(&mut out, key, self.key_size, "key")?;
        out.put_slice(hash.as_bytes());
        put_part(&mut out, value, self.value_size, "value")?;
        Ok(out)
    }

    /// Decode the key part, `bytes` being the `key_range` of a record
    pub fn decode_key<K: SelfSerializable>(&self, bytes: &[u8]) -> Result<K> {
        get_part(bytes, self.key_size, "key")
    }

    /// Decode the value part, `bytes` being the `value_range` of a record
    pub fn decode_value<V: SelfSerializable>(&self, bytes: &[u8]) -> Result<V> {
        get_part(bytes, self.value_size, "value")
    }

    pub fn decode_hash(&self, bytes: &[u8]) -> Result<Hash> {
        Hash::from_slice(bytes)
            .ok_or_else(|| Error::Corruption(format!("hash of {} bytes", bytes.len())))
    }
}

fn put_part<T: SelfSerializable>(out: &mut BytesMut, item: &T, size: usize, what: &str) -> Result<()> {
    out.put_u32(item.version());
    let start = out.len();
    item.serialize(out);
    let written = out.len() - start;
    if written > size {
        return Err(Error::InvalidArgument(format!(
            "{} serialized to {} bytes, configured size is {}",
            what, written, size
        )));
    }
    out.put_bytes(0, size - written);
    Ok(())
}

fn get_part<T: SelfSerializable>(bytes: &[u8], size: usize, what: &str) -> Result<T> {
    if bytes.len() != VERSION_BYTES + size {
        return Err(Error::Corruption(format!(
            "{} part of {} bytes, expected {}",
            what,
            bytes.len(),
            VERSION_BYTES + size
        )));
    }
    let mut buf = bytes;
    let version = buf.get_u32();
    T::deserialize(&mut buf, version)
}
