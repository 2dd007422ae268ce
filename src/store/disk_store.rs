//! Disk key-value store with its path index held in memory
//!
//! Records live in append-only data files, one file per write batch. The
//! index maps each path to a packed data location,
//! `((file_index + 1) << 40) | slot`, so an empty index slot means "no
//! record" and lookups of absent paths never touch the disk. Every slot
//! also carries its path, which is how `open` rebuilds the index of an
//! existing store.

use super::data_file::{list_data_files, DataFile, DataFileInfo};
use super::metadata::StoreMetadata;
use crate::collections::{LongList, OffHeapLongArray, ThreeLongList, EMPTY};
use crate::{Error, Result, VERSION};
use parking_lot::{Mutex, RwLock};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const SLOT_BITS: u32 = 40;
const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;

/// Pack a file index and slot into one non-zero `u64`
pub fn data_location(file_index: u32, slot: u64) -> u64 {
    ((file_index as u64 + 1) << SLOT_BITS) | (slot & SLOT_MASK)
}

/// Split a data location back into `(file_index, slot)`
pub fn split_data_location(location: u64) -> Option<(u32, u64)> {
    let file = location >> SLOT_BITS;
    if file == 0 {
        return None;
    }
    Some(((file - 1) as u32, location & SLOT_MASK))
}

fn check_slot_size(slot_size: usize) -> Result<()> {
    if slot_size == 0 || slot_size > u32::MAX as usize {
        return Err(Error::InvalidArgument(format!(
            "slot size {} out of range",
            slot_size
        )));
    }
    Ok(())
}

/// Per-file view reported by `MemoryIndexDiskStore::files`
#[derive(Clone, Debug, serde::Serialize)]
pub struct FileSummary {
    #[serde(flatten)]
    pub info: DataFileInfo,
    pub stale_records: u64,
}

struct Batch {
    file: Arc<DataFile>,
    /// (path, previous location, new location) for every put
    moves: ThreeLongList,
    started: Instant,
}

/// Counters kept across batches
#[derive(Clone, Default)]
struct Bookkeeping {
    valid_key_range: Option<(u64, u64)>,
    total_records: u64,
    /// Superseded records, per file index
    stale: Vec<u64>,
}

impl Bookkeeping {
    /// Charge a superseded data location to the file holding it
    fn count_stale(&mut self, previous: u64) {
        if let Some((file, _)) = split_data_location(previous) {
            if let Some(count) = self.stale.get_mut(file as usize) {
                *count += 1;
            }
        }
    }

    fn record_batch(&mut self, batch: &Batch) {
        self.total_records += batch.file.record_count();
        batch
            .moves
            .for_each(|_path, previous, _location| self.count_stale(previous));
    }
}

/// Path-addressed record store over a growing set of data files
pub struct MemoryIndexDiskStore<L: LongList = OffHeapLongArray> {
    dir: PathBuf,
    name: String,
    slot_size: usize,
    index: L,
    /// All files, position == file index
    files: RwLock<Vec<Arc<DataFile>>>,
    writing: Mutex<Option<Batch>>,
    bookkeeping: Mutex<Bookkeeping>,
    closed: AtomicBool,
}

impl MemoryIndexDiskStore<OffHeapLongArray> {
    /// Create a store in `dir` with an off-heap path index
    pub fn create(dir: impl AsRef<Path>, name: &str, slot_size: usize) -> Result<Self> {
        Self::with_index(dir, name, slot_size, OffHeapLongArray::new())
    }

    /// Reopen the store `name` in `dir` with an off-heap path index
    pub fn open(dir: impl AsRef<Path>, name: &str, slot_size: usize) -> Result<Self> {
        Self::open_with_index(dir, name, slot_size, OffHeapLongArray::new())
    }
}

impl<L: LongList> MemoryIndexDiskStore<L> {
    /// Create a new store in `dir` using `index` for the path index.
    ///
    /// A directory that already holds data files for `name` is refused;
    /// use `open_with_index` to continue an existing store.
    pub fn with_index(dir: impl AsRef<Path>, name: &str, slot_size: usize, index: L) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        check_slot_size(slot_size)?;
        std::fs::create_dir_all(&dir)?;
        let existing = list_data_files(&dir, name)?;
        if !existing.is_empty() {
            return Err(Error::InvalidFile(format!(
                "{} already holds {} data files for store '{}'",
                dir.display(),
                existing.len(),
                name
            )));
        }

        info!(dir = %dir.display(), name, slot_size, "created disk store");
        Ok(Self::assemble(dir, name, slot_size, index, Vec::new(), Bookkeeping::default()))
    }

    /// Open the store `name` in `dir`, rebuilding the path index into
    /// `index` from every sealed record.
    ///
    /// Files are replayed in order, so the last record written for a path
    /// wins. Records of a batch that was never sealed are ignored. The
    /// valid key range comes back from the metadata file. An empty or
    /// missing directory yields an empty store.
    pub fn open_with_index(dir: impl AsRef<Path>, name: &str, slot_size: usize, index: L) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        check_slot_size(slot_size)?;
        std::fs::create_dir_all(&dir)?;
        let started = Instant::now();

        let metadata = StoreMetadata::load(&dir, name)?;
        if let Some(metadata) = &metadata {
            if metadata.slot_size as usize != slot_size {
                return Err(Error::InvalidFile(format!(
                    "store '{}' was written with {} byte slots, not {}",
                    name, metadata.slot_size, slot_size
                )));
            }
        }

        let mut files = Vec::new();
        let mut bookkeeping = Bookkeeping::default();
        for (position, (file_index, file_path)) in list_data_files(&dir, name)?.into_iter().enumerate() {
            if file_index as usize != position {
                return Err(Error::Corruption(format!(
                    "data file {} of store '{}' is missing",
                    position, name
                )));
            }
            let file = DataFile::open(&file_path)?;
            if file.index() != file_index || file.slot_size() != slot_size {
                return Err(Error::InvalidFile(format!(
                    "{} does not belong to store '{}': index {}, {} byte slots",
                    file_path.display(),
                    name,
                    file.index(),
                    file.slot_size()
                )));
            }

            bookkeeping.stale.push(0);
            for slot in 0..file.record_count() {
                let path = file.read_path(slot)?;
                let previous = index.get(path, EMPTY);
                index.put(path, data_location(file_index, slot))?;
                bookkeeping.count_stale(previous);
            }
            bookkeeping.total_records += file.record_count();
            files.push(Arc::new(file));
        }
        bookkeeping.valid_key_range = metadata.and_then(|m| m.valid_key_range);

        info!(
            dir = %dir.display(),
            name,
            files = files.len(),
            records = bookkeeping.total_records,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reopened disk store"
        );
        Ok(Self::assemble(dir, name, slot_size, index, files, bookkeeping))
    }

    fn assemble(
        dir: PathBuf,
        name: &str,
        slot_size: usize,
        index: L,
        files: Vec<Arc<DataFile>>,
        bookkeeping: Bookkeeping,
    ) -> Self {
        MemoryIndexDiskStore {
            dir,
            name: name.to_string(),
            slot_size,
            index,
            files: RwLock::new(files),
            writing: Mutex::new(None),
            bookkeeping: Mutex::new(bookkeeping),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Open a new batch by rolling to a brand-new data file
    pub fn start_writing(&self) -> Result<()> {
        self.ensure_open()?;
        let mut writing = self.writing.lock();
        if writing.is_some() {
            return Err(Error::ConcurrencyViolation(
                "start_writing called while a batch is already open".into(),
            ));
        }

        let file = {
            let mut files = self.files.write();
            let file_index = files.len() as u32;
            let file = Arc::new(DataFile::create(
                &self.dir,
                &self.name,
                file_index,
                self.slot_size,
            )?);
            files.push(Arc::clone(&file));
            file
        };
        self.bookkeeping.lock().stale.push(0);

        debug!(file = %file.path().display(), "started batch");
        *writing = Some(Batch {
            file,
            moves: ThreeLongList::new(),
            started: Instant::now(),
        });
        Ok(())
    }

    /// Append `record` for `path` to the open batch's file.
    ///
    /// The index entry is published only after the bytes are written.
    pub fn put(&self, path: u64, record: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut writing = self.writing.lock();
        let batch = writing.as_mut().ok_or_else(|| {
            Error::ConcurrencyViolation(format!("put of path {} outside a batch", path))
        })?;
        if path >= self.index.max_capacity() {
            return Err(Error::InvalidArgument(format!(
                "path {} is beyond the index capacity {}",
                path,
                self.index.max_capacity()
            )));
        }

        let slot = batch.file.append(path, record)?;
        if slot > SLOT_MASK {
            return Err(Error::Corruption(format!(
                "data file {} overflowed its slot range",
                batch.file.index()
            )));
        }
        let location = data_location(batch.file.index(), slot);
        let previous = self.index.get(path, EMPTY);
        self.index.put(path, location)?;
        batch.moves.add(path, previous, location);
        Ok(())
    }

    /// Seal the open batch's file. `min_path..=max_path` is recorded as the
    /// valid key range.
    ///
    /// On error the batch stays open and the call can be retried.
    pub fn end_writing(&self, min_path: u64, max_path: u64) -> Result<DataFileInfo> {
        self.ensure_open()?;
        let mut writing = self.writing.lock();
        let batch = writing.as_ref().ok_or_else(|| {
            Error::ConcurrencyViolation("end_writing called without an open batch".into())
        })?;
        self.seal(Some(batch), Some((min_path, max_path)))?;

        debug!(
            file = %batch.file.path().display(),
            records = batch.file.record_count(),
            elapsed_ms = batch.started.elapsed().as_millis() as u64,
            "finished batch"
        );
        let info = batch.file.info();
        *writing = None;
        Ok(info)
    }

    /// Seal `batch`, if any, and persist the metadata. Bookkeeping only
    /// changes once both have succeeded.
    fn seal(&self, batch: Option<&Batch>, key_range: Option<(u64, u64)>) -> Result<()> {
        if let Some(batch) = batch {
            if !batch.file.is_finished() {
                batch.file.finish_writing()?;
            }
        }

        let file_count = self.file_count();
        let mut bookkeeping = self.bookkeeping.lock();
        let mut next = bookkeeping.clone();
        if key_range.is_some() {
            next.valid_key_range = key_range;
        }
        if let Some(batch) = batch {
            next.record_batch(batch);
        }
        self.metadata_locked(&next, file_count).save(&self.dir)?;
        *bookkeeping = next;
        Ok(())
    }

    /// Read `range` of the record for `path` into `buf`.
    ///
    /// Returns `Ok(false)` without any I/O when the path has no record.
    pub fn get(&self, path: u64, range: Range<usize>, buf: &mut [u8]) -> Result<bool> {
        self.ensure_open()?;
        let location = self.index.get(path, EMPTY);
        let Some((file_index, slot)) = split_data_location(location) else {
            return Ok(false);
        };
        let file = self
            .files
            .read()
            .get(file_index as usize)
            .cloned()
            .ok_or_else(|| {
                Error::Corruption(format!(
                    "path {} points at missing data file {}",
                    path, file_index
                ))
            })?;
        file.read(slot, range, buf)?;
        Ok(true)
    }

    /// Whether `path` has a record, without touching the disk
    pub fn contains(&self, path: u64) -> bool {
        self.index.get(path, EMPTY) != EMPTY
    }

    /// Visit every path whose current record is in a data file, in the
    /// order the records were written
    pub fn for_each_live_path(&self, mut visit: impl FnMut(u64) -> Result<()>) -> Result<()> {
        self.ensure_open()?;
        let files = self.files.read().clone();
        for file in &files {
            for slot in 0..file.record_count() {
                let path = file.read_path(slot)?;
                if self.index.get(path, EMPTY) == data_location(file.index(), slot) {
                    visit(path)?;
                }
            }
        }
        Ok(())
    }

    pub fn is_writing(&self) -> bool {
        self.writing.lock().is_some()
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    pub fn valid_key_range(&self) -> Option<(u64, u64)> {
        self.bookkeeping.lock().valid_key_range
    }

    /// Records left behind by later writes to the same path
    pub fn stale_record_count(&self) -> u64 {
        self.bookkeeping.lock().stale.iter().sum()
    }

    pub fn files(&self) -> Vec<FileSummary> {
        let files = self.files.read().clone();
        let bookkeeping = self.bookkeeping.lock();
        files
            .iter()
            .map(|file| FileSummary {
                info: file.info(),
                stale_records: bookkeeping
                    .stale
                    .get(file.index() as usize)
                    .copied()
                    .unwrap_or(0),
            })
            .collect()
    }

    pub fn metadata(&self) -> StoreMetadata {
        let file_count = self.file_count();
        self.metadata_locked(&self.bookkeeping.lock(), file_count)
    }

    fn metadata_locked(&self, bookkeeping: &Bookkeeping, file_count: usize) -> StoreMetadata {
        StoreMetadata {
            format_version: VERSION,
            store_name: self.name.clone(),
            slot_size: self.slot_size as u32,
            file_count: file_count as u32,
            valid_key_range: bookkeeping.valid_key_range,
            total_records: bookkeeping.total_records,
            stale_records: bookkeeping.stale.iter().sum(),
        }
    }

    /// Copy every data file and the metadata into `target`, where `open`
    /// can pick them up. Files are hard linked when the filesystem allows.
    ///
    /// Not allowed while a batch is open.
    pub fn snapshot(&self, target: impl AsRef<Path>) -> Result<()> {
        self.ensure_open()?;
        let target = target.as_ref();
        let writing = self.writing.lock();
        if writing.is_some() {
            return Err(Error::ConcurrencyViolation(
                "snapshot taken while a batch is open".into(),
            ));
        }
        std::fs::create_dir_all(target)?;
        if target.canonicalize()? == self.dir.canonicalize()?
            || !list_data_files(target, &self.name)?.is_empty()
        {
            return Err(Error::InvalidArgument(format!(
                "snapshot target {} already holds store '{}'",
                target.display(),
                self.name
            )));
        }

        let started = Instant::now();
        let files = self.files.read().clone();
        for file in &files {
            let Some(file_name) = file.path().file_name() else {
                continue;
            };
            let destination = target.join(file_name);
            if std::fs::hard_link(file.path(), &destination).is_err() {
                std::fs::copy(file.path(), &destination)?;
            }
        }
        self.metadata().save(target)?;
        info!(
            target = %target.display(),
            files = files.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "snapshot written"
        );
        Ok(())
    }

    /// Seal any open batch, write the metadata and release every file.
    ///
    /// If sealing or the metadata write fails the store stays open, so
    /// `close` can be called again. Once it succeeds further calls are
    /// no-ops.
    pub fn close(&self) -> Result<()> {
        let mut writing = self.writing.lock();
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(batch) = writing.as_ref() {
            warn!(
                file = %batch.file.path().display(),
                "closing with an open batch, sealing it"
            );
        }
        self.seal(writing.as_ref(), None)?;
        *writing = None;
        self.closed.store(true, Ordering::Release);
        drop(writing);

        self.files.write().clear();
        info!(dir = %self.dir.display(), name = %self.name, "closed disk store");
        Ok(())
    }
}

impl<L: LongList> Drop for MemoryIndexDiskStore<L> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, dir = %self.dir.display(), "failed to close disk store");
        }
    }
}
