//! Serialization capability for keys and values stored in leaf records
//!
//! Every serialized part of a leaf record is laid out as
//! `[version: u32][payload]`. The version is written by the store, the
//! payload by the type itself, and the same version is handed back when
//! the payload is read so a type can keep decoding older layouts.

use crate::Result;
use bytes::{Buf, BufMut};

/// A type that knows how to write and read its own fixed-size encoding.
pub trait SelfSerializable: Sized {
    /// Version tag stored in front of the payload
    fn version(&self) -> u32;

    /// Write the payload. Must not write more than the configured size.
    fn serialize<B: BufMut>(&self, out: &mut B);

    /// Read a payload written under `version`.
    ///
    /// `buf` holds exactly the configured number of bytes, zero padded past
    /// whatever `serialize` wrote. Implementations should check
    /// `buf.remaining()` rather than let `Buf` getters panic.
    fn deserialize<B: Buf>(buf: &mut B, version: u32) -> Result<Self>;
}

/// Key of a leaf.
///
/// Keys that fit in a `u64` expose it through `as_long`, which is what the
/// long-key index mode uses.
pub trait VirtualKey: SelfSerializable + Clone + Eq + std::hash::Hash + Send + Sync {
    fn as_long(&self) -> Option<u64> {
        None
    }
}

/// Value of a leaf
pub trait VirtualValue: SelfSerializable + Clone + Send + Sync {}

impl<T: SelfSerializable + Clone + Send + Sync> VirtualValue for T {}
