use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::AutosaveError;
use crate::placement::is_session_artifact;

/// Deletes the oldest backup artifacts of `session_id` until at most `max_backups` remain.
///
/// Files are ordered by modification time with the file name breaking ties.
/// Returns the removed paths, oldest first. A missing directory prunes nothing.
pub async fn prune_backups(
    dir: &Path,
    session_id: &str,
    max_backups: usize,
) -> Result<Vec<PathBuf>, AutosaveError> {
    let mut listing = match tokio::fs::read_dir(dir).await {
        Ok(listing) => listing,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(AutosaveError::io("listing backup directory", dir, source)),
    };

    let mut artifacts: Vec<(SystemTime, String, PathBuf)> = Vec::new();
    while let Some(entry) = listing
        .next_entry()
        .await
        .map_err(|source| AutosaveError::io("listing backup directory", dir, source))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_session_artifact(&name, session_id) {
            continue;
        }
        let metadata = entry
            .metadata()
            .await
            .map_err(|source| AutosaveError::io("reading backup metadata", entry.path(), source))?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        artifacts.push((modified, name, entry.path()));
    }

    if artifacts.len() <= max_backups {
        return Ok(Vec::new());
    }

    artifacts.sort();
    let excess = artifacts.len() - max_backups;
    let mut removed = Vec::with_capacity(excess);
    for (_, _, path) in artifacts.into_iter().take(excess) {
        tokio::fs::remove_file(&path)
            .await
            .map_err(|source| AutosaveError::io("removing old backup", &path, source))?;
        tracing::info!(session_id, path = %path.display(), "old backup removed");
        removed.push(path);
    }
    Ok(removed)
}
