mod config;
mod error;
mod export;
mod log;
mod paths;
mod schema;
mod store;

pub use config::{HistoryConfig, StorageMode, DEFAULT_MAX_ENTRIES, DEFAULT_SNAPSHOT_INTERVAL};
pub use error::HistoryError;
pub use export::{HistoryExport, HistoryExportFormat};
pub use log::{HistoryLog, Recorded, Restored};
pub use paths::{history_file, history_file_name, history_root, snapshot_dir, snapshot_file};
pub use schema::{
    EntryRecord, HistoryDocument, HistoryEntry, HistoryListing, HistoryStatistics, Metadata,
};
pub use store::{HistoryStore, LoadedHistory, PersistView};
