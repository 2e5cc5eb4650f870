use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tabular_contract::Dataset;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::HistoryError;
use crate::paths::{history_file, snapshot_dir, snapshot_file, BASELINE_FILE, CURRENT_FILE};
use crate::schema::{HistoryDocument, HistoryEntry, HISTORY_VERSION};

/// History state read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedHistory {
    pub entries: Vec<HistoryEntry>,
    pub cursor: Option<usize>,
    pub baseline: Option<Arc<Dataset>>,
    pub baseline_exact: bool,
    pub current: Option<Arc<Dataset>>,
}

/// Borrowed view of a log handed to [`HistoryStore::save`].
#[derive(Debug, Clone, Copy)]
pub struct PersistView<'a> {
    pub entries: &'a [HistoryEntry],
    pub cursor: Option<usize>,
    pub baseline: Option<&'a Dataset>,
    pub baseline_exact: bool,
    pub current: Option<&'a Dataset>,
}

/// On-disk layout for one session's history.
///
/// The document lives at `{root}/history_{session_id}.json` and every
/// snapshot at `{root}/snapshots/{session_id}/{operation_id}.json`, next to
/// `baseline.json` and `current.json`. Both are removed together by
/// [`HistoryStore::remove`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    root: PathBuf,
    session_id: String,
}

impl HistoryStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            session_id: session_id.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        history_file(&self.root, &self.session_id)
    }

    #[must_use]
    pub fn snapshot_dir(&self) -> PathBuf {
        snapshot_dir(&self.root, &self.session_id)
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Reads a previously persisted history.
    ///
    /// Returns `Ok(None)` when nothing was persisted for this session. Any
    /// file that exists but cannot be trusted is reported as an error rather
    /// than partially loaded.
    pub fn load(&self) -> Result<Option<LoadedHistory>, HistoryError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&path)
            .map_err(|source| HistoryError::io("reading history file", &path, source))?;
        let document: HistoryDocument =
            serde_json::from_str(&raw).map_err(|source| HistoryError::json_parse(&path, source))?;
        validate_document(&path, &self.session_id, &document)?;

        let mut entries = Vec::with_capacity(document.entries.len());
        for record in document.entries {
            let snapshot = if record.has_snapshot {
                let snapshot_path = snapshot_file(&self.root, &self.session_id, &record.operation_id);
                Some(Arc::new(read_dataset(&snapshot_path)?))
            } else {
                None
            };
            entries.push(HistoryEntry {
                operation_id: record.operation_id,
                operation_kind: record.operation_kind,
                details: record.details,
                timestamp: record.timestamp,
                metadata: record.metadata,
                snapshot,
            });
        }

        let snapshots = self.snapshot_dir();
        let baseline = if document.has_baseline {
            Some(Arc::new(read_dataset(&snapshots.join(BASELINE_FILE))?))
        } else {
            None
        };
        let current_path = snapshots.join(CURRENT_FILE);
        let current = if current_path.exists() {
            Some(Arc::new(read_dataset(&current_path)?))
        } else {
            None
        };

        Ok(Some(LoadedHistory {
            entries,
            cursor: document.cursor,
            baseline,
            baseline_exact: document.baseline_exact,
            current,
        }))
    }

    /// Writes the whole log through, then drops snapshot files no entry references.
    pub fn save(&self, view: PersistView<'_>) -> Result<(), HistoryError> {
        let snapshots = self.snapshot_dir();
        fs::create_dir_all(&snapshots)
            .map_err(|source| HistoryError::io("creating snapshot directory", &snapshots, source))?;

        let mut keep: HashSet<PathBuf> = HashSet::new();
        for entry in view.entries {
            let Some(snapshot) = &entry.snapshot else {
                continue;
            };
            let path = snapshot_file(&self.root, &self.session_id, &entry.operation_id);
            // Snapshots are immutable per operation id.
            if !path.exists() {
                write_json_atomic(&path, snapshot.as_ref(), false)?;
            }
            keep.insert(path);
        }

        for (name, state) in [(BASELINE_FILE, view.baseline), (CURRENT_FILE, view.current)] {
            let path = snapshots.join(name);
            if let Some(state) = state {
                write_json_atomic(&path, state, false)?;
                keep.insert(path);
            }
        }

        let document = HistoryDocument {
            version: HISTORY_VERSION,
            session_id: self.session_id.clone(),
            saved_at: now_rfc3339()?,
            cursor: view.cursor,
            has_baseline: view.baseline.is_some(),
            baseline_exact: view.baseline_exact,
            entries: view.entries.iter().map(HistoryEntry::to_record).collect(),
        };
        write_json_atomic(&self.path(), &document, true)?;

        let listing = fs::read_dir(&snapshots)
            .map_err(|source| HistoryError::io("listing snapshot directory", &snapshots, source))?;
        for dir_entry in listing.flatten() {
            let path = dir_entry.path();
            if path.extension().is_some_and(|ext| ext == "json") && !keep.contains(&path) {
                fs::remove_file(&path)
                    .map_err(|source| HistoryError::io("removing stale snapshot", &path, source))?;
            }
        }

        tracing::debug!(
            session_id = %self.session_id,
            entries = view.entries.len(),
            snapshots = keep.len(),
            "history persisted"
        );
        Ok(())
    }

    /// Removes the history document and the snapshot directory. Missing files are not an error.
    pub fn remove(&self) -> Result<(), HistoryError> {
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(HistoryError::io("removing history file", &path, source)),
        }

        let snapshots = self.snapshot_dir();
        match fs::remove_dir_all(&snapshots) {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(HistoryError::io(
                    "removing snapshot directory",
                    &snapshots,
                    source,
                ))
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_document(
    path: &Path,
    session_id: &str,
    document: &HistoryDocument,
) -> Result<(), HistoryError> {
    if document.version != HISTORY_VERSION {
        return Err(HistoryError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: document.version,
        });
    }

    if document.session_id != session_id {
        return Err(HistoryError::SessionMismatch {
            path: path.to_path_buf(),
            expected: session_id.to_string(),
            found: document.session_id.clone(),
        });
    }

    validate_rfc3339(path, "saved_at", &document.saved_at)?;

    let mut seen = HashSet::with_capacity(document.entries.len());
    for record in &document.entries {
        validate_rfc3339(path, "timestamp", &record.timestamp)?;
        if !seen.insert(record.operation_id.as_str()) {
            return Err(HistoryError::DuplicateOperationId {
                path: path.to_path_buf(),
                operation_id: record.operation_id.clone(),
            });
        }
    }

    if let Some(cursor) = document.cursor {
        if cursor >= document.entries.len() {
            return Err(HistoryError::CursorOutOfRange {
                path: path.to_path_buf(),
                cursor,
                len: document.entries.len(),
            });
        }
    }

    if let Some(first) = document.entries.first() {
        if !first.has_snapshot {
            return Err(HistoryError::MissingFirstSnapshot {
                path: path.to_path_buf(),
            });
        }
    }

    Ok(())
}

pub(crate) fn validate_rfc3339(
    path: &Path,
    field: &'static str,
    value: &str,
) -> Result<(), HistoryError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_err() {
        return Err(HistoryError::InvalidTimestamp {
            path: path.to_path_buf(),
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}

pub(crate) fn now_rfc3339() -> Result<String, HistoryError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(HistoryError::ClockFormat)
}

fn read_dataset(path: &Path) -> Result<Dataset, HistoryError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(HistoryError::MissingSnapshotFile {
                path: path.to_path_buf(),
            })
        }
        Err(source) => return Err(HistoryError::io("reading snapshot file", path, source)),
    };
    serde_json::from_str(&raw).map_err(|source| HistoryError::json_parse(path, source))
}

/// Writes to a sibling temp file and renames it over `path`.
fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    pretty: bool,
) -> Result<(), HistoryError> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    }
    .map_err(|source| HistoryError::json_serialize(path, source))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|source| HistoryError::io("creating history directory", parent, source))?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    fs::write(&temp, bytes)
        .map_err(|source| HistoryError::io("writing temporary history file", &temp, source))?;
    fs::rename(&temp, path)
        .map_err(|source| HistoryError::io("replacing history file", path, source))
}
