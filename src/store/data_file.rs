//! Append-only data file of fixed-size slots
//!
//! File format:
//! ```text
//! [HEADER: 32 bytes]
//!   - magic: 8 bytes ("VLEAFDAT")
//!   - version: 4 bytes (u32 LE)
//!   - slot_size: 4 bytes (u32 LE)
//!   - file_index: 4 bytes (u32 LE)
//!   - record_count: 8 bytes (u64 LE, written when the file is finished)
//!   - reserved: 4 bytes
//!
//! [SLOTS: record_count * (8 + slot_size)]
//!   - path: 8 bytes (u64 LE), the path the record was written for
//!   - record: zero padded to slot_size
//! ```
//!
//! Records are appended at the write cursor only. Once `finish_writing`
//! returns the file never changes again and reads go through a read-only
//! memory map. The path prefix lets a store rebuild its index from the
//! files alone; record reads never see it.

use crate::{Error, Result, MAGIC, VERSION};
use memmap2::Mmap;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing::warn;

pub const HEADER_SIZE: u64 = 32;

/// Bytes in front of every record holding its path
pub const PATH_PREFIX_SIZE: u64 = 8;

/// Extension of data files
pub const DATA_FILE_EXTENSION: &str = "vld";

const RECORD_COUNT_OFFSET: u64 = 20;

/// Name of data file `index` of store `name`
pub fn data_file_name(name: &str, index: u32) -> String {
    format!("{}_{:08}.{}", name, index, DATA_FILE_EXTENSION)
}

/// Data files of store `name` found in `dir`, sorted by index
pub fn list_data_files(dir: &Path, name: &str) -> Result<Vec<(u32, PathBuf)>> {
    let mut found = Vec::new();
    if !dir.exists() {
        return Ok(found);
    }
    let prefix = format!("{}_", name);
    let suffix = format!(".{}", DATA_FILE_EXTENSION);
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let index = file_name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&suffix))
            .and_then(|digits| digits.parse::<u32>().ok());
        if let Some(index) = index {
            found.push((index, path));
        }
    }
    found.sort_by_key(|(index, _)| *index);
    Ok(found)
}

/// Summary of a data file, as reported by inspection
#[derive(Clone, Debug, Serialize)]
pub struct DataFileInfo {
    pub index: u32,
    pub path: PathBuf,
    pub slot_size: usize,
    pub record_count: u64,
    pub finished: bool,
}

/// One data file
pub struct DataFile {
    path: PathBuf,
    index: u32,
    slot_size: usize,
    /// Handle used for appends, and for reads until the file is finished
    file: Mutex<File>,
    /// Set once the file is finished
    map: OnceLock<Mmap>,
    records: AtomicU64,
}

impl DataFile {
    /// Create a new, empty data file open for appending
    pub fn create(dir: &Path, name: &str, index: u32, slot_size: usize) -> Result<Self> {
        if slot_size == 0 || slot_size > u32::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "slot size {} out of range",
                slot_size
            )));
        }
        let path = dir.join(data_file_name(name, index));

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        header[12..16].copy_from_slice(&(slot_size as u32).to_le_bytes());
        header[16..20].copy_from_slice(&index.to_le_bytes());
        // record_count: 0 until finished
        file.write_all(&header)?;

        Ok(DataFile {
            path,
            index,
            slot_size,
            file: Mutex::new(file),
            map: OnceLock::new(),
            records: AtomicU64::new(0),
        })
    }

    /// Open a finished data file read-only
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|_| Error::InvalidFile(format!("{} has no header", path.display())))?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }
        let version = read_u32(&header, 8);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }
        let slot_size = read_u32(&header, 12) as usize;
        let index = read_u32(&header, 16);
        let records = read_u64(&header, RECORD_COUNT_OFFSET as usize);

        if slot_size == 0 {
            return Err(Error::InvalidFile(format!(
                "{} declares an empty slot size",
                path.display()
            )));
        }
        let expected_len = records
            .checked_mul(PATH_PREFIX_SIZE + slot_size as u64)
            .and_then(|len| len.checked_add(HEADER_SIZE))
            .ok_or_else(|| {
                Error::Corruption(format!(
                    "{} claims an impossible {} records",
                    path.display(),
                    records
                ))
            })?;
        let actual_len = file.metadata()?.len();
        if actual_len > expected_len {
            // Records of a batch that was never sealed
            warn!(
                file = %path.display(),
                sealed_records = records,
                extra_bytes = actual_len - expected_len,
                "ignoring unsealed records"
            );
        }
        if actual_len < expected_len {
            return Err(Error::Corruption(format!(
                "{} holds {} bytes but its header claims {} records of {} bytes",
                path.display(),
                actual_len,
                records,
                slot_size
            )));
        }

        // SAFETY: finished data files are never written again.
        let map = unsafe { Mmap::map(&file)? };
        let data_file = DataFile {
            path,
            index,
            slot_size,
            file: Mutex::new(file),
            map: OnceLock::new(),
            records: AtomicU64::new(records),
        };
        let _ = data_file.map.set(map);
        Ok(data_file)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Records written so far
    pub fn record_count(&self) -> u64 {
        self.records.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.map.get().is_some()
    }

    pub fn info(&self) -> DataFileInfo {
        DataFileInfo {
            index: self.index,
            path: self.path.clone(),
            slot_size: self.slot_size,
            record_count: self.record_count(),
            finished: self.is_finished(),
        }
    }

    /// Append the record for `path` at the write cursor and return its
    /// slot.
    ///
    /// The record is fully written before the slot becomes readable.
    pub fn append(&self, path: u64, record: &[u8]) -> Result<u64> {
        if record.len() > self.slot_size {
            return Err(Error::InvalidArgument(format!(
                "record of {} bytes does not fit a {} byte slot",
                record.len(),
                self.slot_size
            )));
        }
        let mut file = self.file.lock();
        if self.is_finished() {
            return Err(Error::ConcurrencyViolation(format!(
                "append to finished data file {}",
                self.path.display()
            )));
        }

        let slot = self.records.load(Ordering::Acquire);
        let mut bytes = Vec::with_capacity(self.stride() as usize);
        bytes.extend_from_slice(&path.to_le_bytes());
        bytes.extend_from_slice(record);
        bytes.resize(self.stride() as usize, 0);
        file.seek(SeekFrom::Start(self.slot_offset(slot)))?;
        file.write_all(&bytes)?;

        self.records.store(slot + 1, Ordering::Release);
        Ok(slot)
    }

    /// Seal the file: record the count in the header, fsync, and switch
    /// reads to a memory map.
    ///
    /// If this fails the file stays open for writing and sealing can be
    /// retried.
    pub fn finish_writing(&self) -> Result<()> {
        let mut file = self.file.lock();
        if self.is_finished() {
            return Err(Error::ConcurrencyViolation(format!(
                "data file {} already finished",
                self.path.display()
            )));
        }

        file.seek(SeekFrom::Start(RECORD_COUNT_OFFSET))?;
        file.write_all(&self.record_count().to_le_bytes())?;
        file.sync_all()?;

        // SAFETY: the file is sealed; nothing writes to it from here on.
        let map = unsafe { Mmap::map(&*file)? };
        let _ = self.map.set(map);
        Ok(())
    }

    /// Read `range` of the record in `slot` into `buf`.
    ///
    /// `buf` must be exactly `range.len()` bytes. Passing `0..slot_size`
    /// reads the whole record.
    pub fn read(&self, slot: u64, range: Range<usize>, buf: &mut [u8]) -> Result<()> {
        if range.start > range.end || range.end > self.slot_size || buf.len() != range.len() {
            return Err(Error::InvalidArgument(format!(
                "read of {:?} into {} bytes from a {} byte slot",
                range,
                buf.len(),
                self.slot_size
            )));
        }
        self.check_slot(slot)?;
        let offset = self.slot_offset(slot) + PATH_PREFIX_SIZE + range.start as u64;
        self.read_at(offset, buf)
    }

    /// The path the record in `slot` was written for
    pub fn read_path(&self, slot: u64) -> Result<u64> {
        self.check_slot(slot)?;
        let mut raw = [0u8; PATH_PREFIX_SIZE as usize];
        self.read_at(self.slot_offset(slot), &mut raw)?;
        Ok(u64::from_le_bytes(raw))
    }

    fn check_slot(&self, slot: u64) -> Result<()> {
        let records = self.record_count();
        if slot >= records {
            return Err(Error::Corruption(format!(
                "slot {} requested from {} which holds {} records",
                slot,
                self.path.display(),
                records
            )));
        }
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if let Some(map) = self.map.get() {
            let start = offset as usize;
            buf.copy_from_slice(&map[start..start + buf.len()]);
            return Ok(());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Bytes per slot on disk, path prefix included
    fn stride(&self) -> u64 {
        PATH_PREFIX_SIZE + self.slot_size as u64
    }

    fn slot_offset(&self, slot: u64) -> u64 {
        HEADER_SIZE + slot * self.stride()
    }
}

impl std::fmt::Debug for DataFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFile")
            .field("path", &self.path)
            .field("records", &self.record_count())
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}
