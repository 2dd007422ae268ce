//! Data model: hashes, keys, values and their serialization capability

mod hash;
mod key;
mod serialize;

pub use hash::{Hash, HASH_SIZE_BYTES};
pub use key::LongKey;
pub use serialize::{SelfSerializable, VirtualKey, VirtualValue};
