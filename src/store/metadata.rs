//! Store metadata file, rewritten after every batch

use crate::{Error, Result, VERSION};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const METADATA_FILE_SUFFIX: &str = "_metadata.vlm";

/// Path of the metadata file of store `name`
pub fn metadata_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}{}", name, METADATA_FILE_SUFFIX))
}

/// Bookkeeping persisted next to the data files
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub format_version: u32,
    pub store_name: String,
    pub slot_size: u32,
    pub file_count: u32,
    /// Range handed to the last `end_writing`
    pub valid_key_range: Option<(u64, u64)>,
    pub total_records: u64,
    /// Records superseded by later writes to the same path
    pub stale_records: u64,
}

impl StoreMetadata {
    /// Write atomically: a temp file renamed over the old one
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = metadata_path(dir, &self.store_name);
        let tmp = path.with_extension("vlm.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            bincode::serialize_into(&mut out, self)?;
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load the metadata of store `name`, if it was ever written
    pub fn load(dir: &Path, name: &str) -> Result<Option<Self>> {
        let path = metadata_path(dir, name);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let metadata: StoreMetadata = bincode::deserialize(&bytes)?;
        if metadata.format_version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: metadata.format_version,
            });
        }
        Ok(Some(metadata))
    }
}
