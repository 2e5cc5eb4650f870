use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::OffsetDateTime;

use crate::config::{DurabilityConfig, PlacementStrategy};
use crate::error::AutosaveError;

pub const BACKUP_PREFIX: &str = "backup_";
pub const VERSION_PREFIX: &str = "version_";

/// `backup_{id}_{YYYYMMDD_HHMMSS_micros}.{ext}`; names sort chronologically.
pub fn backup_file_name(
    session_id: &str,
    at: OffsetDateTime,
    extension: &str,
) -> Result<String, AutosaveError> {
    let stamp = at
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]_[subsecond digits:6]"
        ))
        .map_err(AutosaveError::ClockFormat)?;
    Ok(format!("{BACKUP_PREFIX}{session_id}_{stamp}.{extension}"))
}

#[must_use]
pub fn version_file_name(session_id: &str, version: u64, extension: &str) -> String {
    format!("{VERSION_PREFIX}{session_id}_v{version:04}.{extension}")
}

/// True when `file_name` is a backup or version artifact owned by `session_id`.
#[must_use]
pub fn is_session_artifact(file_name: &str, session_id: &str) -> bool {
    let backup = format!("{BACKUP_PREFIX}{session_id}_");
    let version = format!("{VERSION_PREFIX}{session_id}_v");
    file_name.starts_with(&backup) || file_name.starts_with(&version)
}

/// Resolves the target of the next save.
pub fn resolve_target(
    config: &DurabilityConfig,
    session_id: &str,
    source_path: Option<&Path>,
    save_count: u64,
    now: OffsetDateTime,
) -> Result<PathBuf, AutosaveError> {
    let extension = config.format.extension();
    match config.strategy {
        PlacementStrategy::OverwriteSource => source_path
            .map(Path::to_path_buf)
            .ok_or(AutosaveError::NoSourcePath),
        PlacementStrategy::TimestampedBackup => Ok(config
            .backup_dir
            .join(backup_file_name(session_id, now, extension)?)),
        PlacementStrategy::MonotonicVersion => Ok(config
            .backup_dir
            .join(version_file_name(session_id, save_count + 1, extension))),
        PlacementStrategy::FixedPath => config
            .fixed_path
            .clone()
            .ok_or_else(|| AutosaveError::invalid("fixed_path strategy requires fixed_path")),
    }
}
