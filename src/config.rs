//! Construction configuration for a leaf store

use crate::collections::{
    OffHeapHashArray, OffHeapLongArray, DEFAULT_HASH_CHUNK_LEN, DEFAULT_LONG_CHUNK_LEN,
    DEFAULT_MAX_CHUNKS,
};
use crate::model::HASH_SIZE_BYTES;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How keys are mapped to paths
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    /// Keys are `u64`s indexing an off-heap long array
    #[default]
    Long,
    /// Arbitrary keys in a locked hash map
    Object,
}

/// Configuration of a `VirtualLeafStore`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the data files
    pub storage_dir: PathBuf,
    /// Prefix of every file the store creates
    pub store_name: String,
    /// Maximum serialized key size, without the version tag
    pub key_size_bytes: usize,
    /// Maximum serialized value size, without the version tag
    pub value_size_bytes: usize,
    pub key_mode: KeyMode,
    /// Slots per chunk of the path and key indexes
    pub long_chunk_len: usize,
    /// Slots per chunk of the internal hash array
    pub hash_chunk_len: usize,
    /// Chunks any single index may grow to
    pub max_chunks: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            storage_dir: PathBuf::from("./leaves"),
            store_name: "leaves".to_string(),
            key_size_bytes: 8,
            value_size_bytes: 0,
            key_mode: KeyMode::Long,
            long_chunk_len: DEFAULT_LONG_CHUNK_LEN,
            hash_chunk_len: DEFAULT_HASH_CHUNK_LEN,
            max_chunks: DEFAULT_MAX_CHUNKS,
        }
    }
}

impl StoreConfig {
    pub fn new(storage_dir: impl Into<PathBuf>, key_size_bytes: usize, value_size_bytes: usize) -> Self {
        StoreConfig {
            storage_dir: storage_dir.into(),
            key_size_bytes,
            value_size_bytes,
            ..Self::default()
        }
    }

    pub fn with_key_mode(mut self, key_mode: KeyMode) -> Self {
        self.key_mode = key_mode;
        self
    }

    pub fn with_store_name(mut self, name: impl Into<String>) -> Self {
        self.store_name = name.into();
        self
    }

    /// Shrink or grow the index chunks, mostly useful to keep tests small
    pub fn with_chunks(mut self, long_chunk_len: usize, hash_chunk_len: usize, max_chunks: usize) -> Self {
        self.long_chunk_len = long_chunk_len;
        self.hash_chunk_len = hash_chunk_len;
        self.max_chunks = max_chunks;
        self
    }

    /// Size of one leaf record on disk:
    /// `[keyVersion][key][hash][valueVersion][value]`
    pub fn slot_size(&self) -> usize {
        (4 + HASH_SIZE_BYTES + 4)
            .saturating_add(self.key_size_bytes)
            .saturating_add(self.value_size_bytes)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_name.is_empty()
            || self
                .store_name
                .contains(|c: char| c == '/' || c == '\\' || c == '.')
        {
            return Err(Error::Config(format!(
                "store name '{}' must be non-empty and free of path separators and dots",
                self.store_name
            )));
        }
        OffHeapLongArray::check_geometry(self.long_chunk_len, self.max_chunks)?;
        OffHeapHashArray::check_geometry(self.hash_chunk_len, self.max_chunks)?;
        if self.slot_size() > u32::MAX as usize {
            return Err(Error::Config(format!(
                "record of {} bytes does not fit a data file slot",
                self.slot_size()
            )));
        }
        Ok(())
    }

    /// Load a config from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StoreConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the config as pretty JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
