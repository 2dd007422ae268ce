//! # vleaf
//!
//! Storage engine for the leaves and internal nodes of a virtual Merkle
//! tree holding far more entries than fit on the heap.
//!
//! ## Core Concepts
//!
//! - **Paths**: `u64` positions in a conceptual complete binary tree,
//!   assigned by the tree layer
//! - **Internal hashes**: kept per path in an off-heap hash array
//! - **Leaf records**: `[keyVersion][key][hash][valueVersion][value]` slots in
//!   append-only data files, found through an off-heap path index
//! - **Batches**: every transaction writes one new data file, sealed on commit
//!
//! ## Example
//!
//! ```ignore
//! use vleaf::{LongKey, StoreConfig, VirtualLeafStore};
//!
//! let store: VirtualLeafStore<LongKey, LongKey> =
//!     VirtualLeafStore::create(StoreConfig::new("/var/lib/ledger/accounts", 8, 8))?;
//! let tx = store.start_transaction()?;
//! store.add_leaf(5, &LongKey(42), &LongKey(1_000), &hash)?;
//! store.commit_transaction(&tx)?;
//! assert_eq!(store.load_leaf_path(&LongKey(42))?, Some(5));
//! ```

pub mod collections;
pub mod config;
pub mod model;
pub mod store;

mod error;
mod leaf_store;

pub use collections::{
    HashList, HeapHashArray, HeapLongArray, LongList, OffHeapHashArray, OffHeapLongArray,
    ThreeLongList,
};
pub use config::{KeyMode, StoreConfig};
pub use error::{Error, Result};
pub use leaf_store::{LeafRecord, Transaction, VirtualLeafStore, INVALID_PATH};
pub use model::{Hash, LongKey, SelfSerializable, VirtualKey, VirtualValue, HASH_SIZE_BYTES};
pub use store::{DataFile, MemoryIndexDiskStore, StoreMetadata};

/// On-disk format version
pub const VERSION: u32 = 1;

/// Magic bytes opening every data file
pub const MAGIC: &[u8; 8] = b"VLEAFDAT";
