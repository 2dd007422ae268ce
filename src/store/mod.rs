//! On-disk storage: append-only data files and the path-indexed store over them

mod data_file;
mod disk_store;
mod metadata;
mod record;

pub use data_file::{data_file_name, list_data_files, DataFile, DataFileInfo, DATA_FILE_EXTENSION, HEADER_SIZE, PATH_PREFIX_SIZE};
pub use disk_store::{data_location, split_data_location, FileSummary, MemoryIndexDiskStore};
pub use metadata::{metadata_path, StoreMetadata, METADATA_FILE_SUFFIX};
pub use record::LeafRecordLayout;
