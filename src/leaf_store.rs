//! Virtual leaf store
//!
//! The entry point used by the tree layer. Internal-node hashes live in an
//! off-heap hash array indexed by path. Leaves are stored as full records
//! in a memory-indexed disk store, and a key index maps each leaf key to
//! its current path.

use crate::collections::{HashList, LongList, OffHeapHashArray, OffHeapLongArray, EMPTY};
use crate::config::{KeyMode, StoreConfig};
use crate::model::{Hash, VirtualKey, VirtualValue};
use crate::store::{LeafRecordLayout, MemoryIndexDiskStore};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

/// Path value meaning "no path"
pub const INVALID_PATH: u64 = u64::MAX;

/// A leaf read back in full
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafRecord<K, V> {
    pub path: u64,
    pub key: K,
    pub hash: Hash,
    pub value: V,
}

/// Handle of an open write batch, returned by `start_transaction`
#[derive(Debug)]
#[must_use = "an open transaction has to be committed"]
pub struct Transaction {
    id: u64,
}

impl Transaction {
    pub fn id(&self) -> u64 {
        self.id
    }
}

struct OpenTransaction {
    id: u64,
    min_path: u64,
    max_path: u64,
}

/// Key to path index, fixed at construction
enum KeyIndex<K> {
    /// Slot `key` holds `path + 1`
    Long(OffHeapLongArray),
    Object(Mutex<HashMap<K, u64>>),
}

impl<K: VirtualKey> KeyIndex<K> {
    fn new(config: &StoreConfig) -> Self {
        match config.key_mode {
            KeyMode::Long => KeyIndex::Long(OffHeapLongArray::with_chunks(
                config.long_chunk_len,
                config.max_chunks,
            )),
            KeyMode::Object => KeyIndex::Object(Mutex::new(HashMap::new())),
        }
    }

    fn get(&self, key: &K) -> Option<u64> {
        match self {
            KeyIndex::Long(array) => match array.get(key.as_long()?, EMPTY) {
                EMPTY => None,
                stored => Some(stored - 1),
            },
            KeyIndex::Object(map) => map.lock().get(key).copied(),
        }
    }

    fn put(&self, key: &K, path: u64) -> Result<()> {
        match self {
            KeyIndex::Long(array) => {
                let long = key.as_long().ok_or_else(|| {
                    Error::InvalidArgument("long-key mode needs keys with a u64 form".into())
                })?;
                array.put(long, path + 1)
            }
            KeyIndex::Object(map) => {
                map.lock().insert(key.clone(), path);
                Ok(())
            }
        }
    }

    /// Validate a key before anything is written
    fn check(&self, key: &K) -> Result<()> {
        match self {
            KeyIndex::Long(array) => match key.as_long() {
                Some(long) if long < array.max_capacity() => Ok(()),
                Some(long) => Err(Error::InvalidArgument(format!(
                    "long key {} is beyond the key index capacity {}",
                    long,
                    array.max_capacity()
                ))),
                None => Err(Error::InvalidArgument(
                    "long-key mode needs keys with a u64 form".into(),
                )),
            },
            KeyIndex::Object(_) => Ok(()),
        }
    }
}

fn check_path(path: u64) -> Result<()> {
    if path == INVALID_PATH {
        return Err(Error::InvalidArgument(format!(
            "path {} is the invalid-path sentinel",
            path
        )));
    }
    Ok(())
}

/// Path and key addressable storage for the leaves and internal nodes of a
/// virtual Merkle tree.
///
/// One thread writes, inside `start_transaction` / `commit_transaction`;
/// any number of threads may read at any time.
pub struct VirtualLeafStore<K: VirtualKey, V: VirtualValue> {
    config: StoreConfig,
    layout: LeafRecordLayout,
    internal_hashes: OffHeapHashArray,
    leaves: MemoryIndexDiskStore<OffHeapLongArray>,
    key_index: KeyIndex<K>,
    transaction: Mutex<Option<OpenTransaction>>,
    next_transaction: AtomicU64,
    closed: AtomicBool,
    _value: PhantomData<fn() -> V>,
}

impl<K: VirtualKey, V: VirtualValue> VirtualLeafStore<K, V> {
    /// Create a new store in `config.storage_dir`
    pub fn create(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let layout = LeafRecordLayout::new(config.key_size_bytes, config.value_size_bytes);
        let leaves = MemoryIndexDiskStore::with_index(
            &config.storage_dir,
            &config.store_name,
            layout.slot_size(),
            OffHeapLongArray::with_chunks(config.long_chunk_len, config.max_chunks),
        )?;

        info!(
            dir = %config.storage_dir.display(),
            key_mode = ?config.key_mode,
            slot_size = layout.slot_size(),
            "created virtual leaf store"
        );
        Ok(Self::assemble(config, layout, leaves))
    }

    /// Reopen the store in `config.storage_dir`.
    ///
    /// The path index is rebuilt from the data files and the key index
    /// from the keys of the live leaf records. Internal hashes are not
    /// persisted and start out empty.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let layout = LeafRecordLayout::new(config.key_size_bytes, config.value_size_bytes);
        let leaves = MemoryIndexDiskStore::open_with_index(
            &config.storage_dir,
            &config.store_name,
            layout.slot_size(),
            OffHeapLongArray::with_chunks(config.long_chunk_len, config.max_chunks),
        )?;
        let store = Self::assemble(config, layout, leaves);

        let mut leaf_count = 0u64;
        store.leaves.for_each_live_path(|path| {
            if let Some(key) = store.load_leaf_key(path)? {
                store.key_index.check(&key)?;
                store.key_index.put(&key, path)?;
                leaf_count += 1;
            }
            Ok(())
        })?;

        info!(
            dir = %store.config.storage_dir.display(),
            key_mode = ?store.config.key_mode,
            leaves = leaf_count,
            "reopened virtual leaf store"
        );
        Ok(store)
    }

    fn assemble(
        config: StoreConfig,
        layout: LeafRecordLayout,
        leaves: MemoryIndexDiskStore<OffHeapLongArray>,
    ) -> Self {
        let internal_hashes = OffHeapHashArray::with_chunks(config.hash_chunk_len, config.max_chunks);
        let key_index = KeyIndex::new(&config);
        VirtualLeafStore {
            config,
            layout,
            internal_hashes,
            leaves,
            key_index,
            transaction: Mutex::new(None),
            next_transaction: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            _value: PhantomData,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The disk store holding the leaf records
    pub fn leaf_records(&self) -> &MemoryIndexDiskStore<OffHeapLongArray> {
        &self.leaves
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    // === Internal nodes ===

    pub fn load_internal_hash(&self, path: u64) -> Result<Option<Hash>> {
        self.ensure_open()?;
        Ok(self.internal_hashes.get(path))
    }

    /// Store the hash of the internal node at `path`.
    ///
    /// Readers racing an overwrite of the same path see either the old or
    /// the new hash, never a mix. Writers to one path must not race each
    /// other.
    pub fn save_internal(&self, path: u64, hash: &Hash) -> Result<()> {
        self.ensure_open()?;
        check_path(path)?;
        self.internal_hashes.put(path, hash)
    }

    // === Leaf reads ===

    fn read_part(&self, path: u64, range: Range<usize>) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; range.len()];
        if self.leaves.get(path, range, &mut buf)? {
            Ok(Some(buf))
        } else {
            Ok(None)
        }
    }

    pub fn load_leaf_value(&self, path: u64) -> Result<Option<V>> {
        self.ensure_open()?;
        match self.read_part(path, self.layout.value_range())? {
            Some(bytes) => Ok(Some(self.layout.decode_value(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn load_leaf_key(&self, path: u64) -> Result<Option<K>> {
        self.ensure_open()?;
        match self.read_part(path, self.layout.key_range())? {
            Some(bytes) => Ok(Some(self.layout.decode_key(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn load_leaf_hash(&self, path: u64) -> Result<Option<Hash>> {
        self.ensure_open()?;
        match self.read_part(path, self.layout.hash_range())? {
            Some(bytes) => Ok(Some(self.layout.decode_hash(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read the whole record at `path` with a single disk read
    pub fn load_leaf(&self, path: u64) -> Result<Option<LeafRecord<K, V>>> {
        self.ensure_open()?;
        let Some(bytes) = self.read_part(path, self.layout.whole())? else {
            return Ok(None);
        };
        Ok(Some(LeafRecord {
            path,
            key: self.layout.decode_key(&bytes[self.layout.key_range()])?,
            hash: self.layout.decode_hash(&bytes[self.layout.hash_range()])?,
            value: self.layout.decode_value(&bytes[self.layout.value_range()])?,
        }))
    }

    /// Current path of `key`, `None` if the key was never written
    pub fn load_leaf_path(&self, key: &K) -> Result<Option<u64>> {
        self.ensure_open()?;
        Ok(self.key_index.get(key))
    }

    pub fn load_leaf_value_by_key(&self, key: &K) -> Result<Option<V>> {
        match self.load_leaf_path(key)? {
            Some(path) => self.load_leaf_value(path),
            None => Ok(None),
        }
    }

    // === Leaf writes ===

    /// Write a leaf record at `path` and point `key` at it.
    ///
    /// Any record already at `path` is replaced. If it belonged to another
    /// key, that key's index entry is left as it was and still names
    /// `path`.
    pub fn add_leaf(&self, path: u64, key: &K, value: &V, hash: &Hash) -> Result<()> {
        self.ensure_open()?;
        check_path(path)?;
        self.key_index.check(key)?;
        let record = self.layout.encode(key, hash, value)?;

        self.leaves.put(path, &record)?;
        self.key_index.put(key, path)?;

        if let Some(open) = self.transaction.lock().as_mut() {
            open.min_path = open.min_path.min(path);
            open.max_path = open.max_path.max(path);
        }
        Ok(())
    }

    /// Replace the record at `path`; same effect as `add_leaf`
    pub fn update_leaf(&self, path: u64, key: &K, value: &V, hash: &Hash) -> Result<()> {
        self.add_leaf(path, key, value, hash)
    }

    /// Copy the value at `old_path` to a new record at `new_path`.
    ///
    /// The record at `old_path` is not erased.
    pub fn move_leaf(&self, old_path: u64, new_path: u64, key: &K, hash: &Hash) -> Result<()> {
        check_path(old_path)?;
        check_path(new_path)?;
        let value = self.load_leaf_value(old_path)?.ok_or_else(|| {
            Error::InvalidArgument(format!("no leaf at path {} to move", old_path))
        })?;
        self.add_leaf(new_path, key, &value, hash)
    }

    // === Batches ===

    /// Open a write batch; every leaf write goes into one new data file
    pub fn start_transaction(&self) -> Result<Transaction> {
        self.ensure_open()?;
        self.leaves.start_writing()?;
        let id = self.next_transaction.fetch_add(1, Ordering::Relaxed);
        *self.transaction.lock() = Some(OpenTransaction {
            id,
            min_path: INVALID_PATH,
            max_path: 0,
        });
        debug!(id, "started transaction");
        Ok(Transaction { id })
    }

    /// Seal the batch opened by `start_transaction`.
    ///
    /// There is no rollback: writes already made stay visible either way.
    /// If sealing fails the transaction stays open and committing it can
    /// be retried.
    pub fn commit_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.ensure_open()?;
        let mut current = self.transaction.lock();
        let (min_path, max_path) = match current.as_ref() {
            Some(open) if open.id == transaction.id => {
                if open.min_path <= open.max_path {
                    (open.min_path, open.max_path)
                } else {
                    self.leaves.valid_key_range().unwrap_or((0, 0))
                }
            }
            _ => {
                return Err(Error::ConcurrencyViolation(format!(
                    "transaction {} is not the open transaction",
                    transaction.id
                )))
            }
        };

        let info = self.leaves.end_writing(min_path, max_path)?;
        *current = None;
        debug!(
            id = transaction.id,
            records = info.record_count,
            min_path,
            max_path,
            "committed transaction"
        );
        Ok(())
    }

    /// Release every file. Later calls fail with `Error::Closed`.
    ///
    /// An open transaction is sealed first. If that fails the store stays
    /// open and `close` can be retried.
    pub fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.leaves.close()?;
        self.transaction.lock().take();
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
