//! Durability scheduling for tabular sessions: when to save, where the
//! artifact goes and how many old artifacts are kept.

mod config;
mod error;
mod placement;
mod retention;
mod scheduler;
mod shared;

pub use config::{
    DurabilityConfig, PlacementStrategy, TriggerMode, BACKUP_DIR, DEFAULT_INTERVAL_MS,
    DEFAULT_MAX_BACKUPS,
};
pub use error::AutosaveError;
pub use placement::{
    backup_file_name, is_session_artifact, resolve_target, version_file_name, BACKUP_PREFIX,
    VERSION_PREFIX,
};
pub use retention::prune_backups;
pub use scheduler::{AutosaveScheduler, AutosaveStatus, SaveReport, SaveTrigger};
pub use shared::SharedDataset;
