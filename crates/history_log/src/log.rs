use std::collections::BTreeMap;
use std::sync::Arc;

use tabular_contract::{Dataset, Operation};
use uuid::Uuid;

use crate::config::{HistoryConfig, StorageMode};
use crate::error::HistoryError;
use crate::schema::{HistoryEntry, HistoryListing, HistoryStatistics, Metadata};
use crate::store::{now_rfc3339, HistoryStore, LoadedHistory, PersistView};

/// An undone entry together with the exact state that was live before the undo.
#[derive(Debug, Clone, PartialEq)]
struct RedoFrame {
    entry: HistoryEntry,
    state: Arc<Dataset>,
}

/// State handed back by undo, redo and restore.
#[derive(Debug, Clone, PartialEq)]
pub struct Restored {
    /// The entry that was undone, redone or restored to.
    pub entry: HistoryEntry,
    pub dataset: Arc<Dataset>,
    /// False when the nearest snapshot predates the cursor, so operations
    /// between that snapshot and the cursor are not reflected in `dataset`.
    pub exact: bool,
    /// Operation whose snapshot supplied `dataset`; `None` for the baseline or a redo frame.
    pub source_operation_id: Option<String>,
}

/// Outcome of [`HistoryLog::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub operation_id: String,
    pub snapshot_taken: bool,
    pub evicted: usize,
}

/// Linear undo/redo log with periodic snapshots.
///
/// The cursor is `None` when every entry has been undone and the live state
/// is the baseline. Entry 0 always carries a snapshot, which is what lets
/// undo stop at a materialized state without replaying operations.
#[derive(Debug)]
pub struct HistoryLog {
    session_id: String,
    config: HistoryConfig,
    entries: Vec<HistoryEntry>,
    cursor: Option<usize>,
    redo: Vec<RedoFrame>,
    baseline: Option<Arc<Dataset>>,
    baseline_exact: bool,
    current: Option<Arc<Dataset>>,
    store: Option<HistoryStore>,
}

impl HistoryLog {
    /// Creates a log for `session_id`.
    ///
    /// Fails with [`HistoryError::InvalidConfig`] when `config` does not
    /// validate. In persisted mode prior state is loaded when present. A file
    /// that fails to load is logged and the log starts empty.
    pub fn new(
        session_id: impl Into<String>,
        config: HistoryConfig,
    ) -> Result<Self, HistoryError> {
        config.validate()?;
        let session_id = session_id.into();
        let store = match config.storage {
            StorageMode::Memory => None,
            StorageMode::Persisted => Some(HistoryStore::new(&config.root, &session_id)),
        };

        let mut log = Self {
            session_id,
            config,
            entries: Vec::new(),
            cursor: None,
            redo: Vec::new(),
            baseline: None,
            baseline_exact: true,
            current: None,
            store,
        };

        if let Some(store) = &log.store {
            match store.load() {
                Ok(Some(loaded)) => log.install(loaded),
                Ok(None) => {}
                Err(error) => tracing::warn!(
                    session_id = %log.session_id,
                    path = %store.path().display(),
                    %error,
                    "persisted history could not be loaded; starting empty"
                ),
            }
        }

        Ok(log)
    }

    fn install(&mut self, loaded: LoadedHistory) {
        let LoadedHistory {
            entries,
            cursor,
            baseline,
            baseline_exact,
            current,
        } = loaded;
        self.entries = entries;
        self.cursor = cursor;
        self.baseline = baseline;
        self.baseline_exact = baseline_exact;
        self.current = current.or_else(|| {
            self.nearest_state(self.cursor)
                .map(|(state, _, _)| state)
        });
        tracing::info!(
            session_id = %self.session_id,
            entries = self.entries.len(),
            cursor = ?self.cursor,
            "persisted history loaded"
        );
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn baseline(&self) -> Option<&Arc<Dataset>> {
        self.baseline.as_ref()
    }

    /// Exact live state as tracked by the log.
    #[must_use]
    pub fn current(&self) -> Option<&Arc<Dataset>> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn entry(&self, operation_id: &str) -> Option<&HistoryEntry> {
        self.entries
            .iter()
            .find(|entry| entry.operation_id == operation_id)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor.is_some()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Drops every entry and starts over with `baseline` as the state before the first entry.
    pub fn reset(&mut self, baseline: Arc<Dataset>) {
        self.entries.clear();
        self.redo.clear();
        self.cursor = None;
        self.current = Some(Arc::clone(&baseline));
        self.baseline = Some(baseline);
        self.baseline_exact = true;
        self.persist();
    }

    /// Appends `operation` with `dataset` as the resulting state.
    ///
    /// Entries past the cursor and the redo buffer are discarded first. The
    /// entry is snapshotted when the log was empty or its length is a multiple
    /// of the snapshot interval.
    pub fn record(
        &mut self,
        operation: Operation,
        dataset: Arc<Dataset>,
        metadata: Metadata,
    ) -> Result<Recorded, HistoryError> {
        let timestamp = now_rfc3339()?;

        let keep = self.cursor.map_or(0, |cursor| cursor + 1);
        self.entries.truncate(keep);
        self.redo.clear();

        let len = self.entries.len();
        let snapshot_taken = len == 0 || len % self.config.snapshot_interval == 0;
        let operation_id = Uuid::now_v7().to_string();
        self.entries.push(HistoryEntry {
            operation_id: operation_id.clone(),
            operation_kind: operation.kind(),
            details: operation,
            timestamp,
            metadata,
            snapshot: snapshot_taken.then(|| Arc::clone(&dataset)),
        });
        self.cursor = Some(self.entries.len() - 1);
        self.current = Some(dataset);

        let evicted = self.evict_overflow();
        let snapshot_taken = self
            .entries
            .last()
            .is_some_and(HistoryEntry::has_snapshot);

        tracing::debug!(
            session_id = %self.session_id,
            %operation_id,
            snapshot_taken,
            evicted,
            "operation recorded"
        );
        self.persist();

        Ok(Recorded {
            operation_id,
            snapshot_taken,
            evicted,
        })
    }

    /// Evicts from the front until the log fits `max_entries`.
    ///
    /// The block removed always ends right before an entry that carries a
    /// snapshot, so the new first entry keeps one. The newest snapshot inside
    /// the evicted block becomes the baseline; it is only exact when it belongs
    /// to the last evicted entry.
    fn evict_overflow(&mut self) -> usize {
        let len = self.entries.len();
        if len <= self.config.max_entries {
            return 0;
        }
        let overflow = len - self.config.max_entries;

        let cut = match (overflow..len).find(|index| self.entries[*index].has_snapshot()) {
            Some(cut) => cut,
            None => {
                let last = len - 1;
                self.entries[last].snapshot = self.current.clone();
                last
            }
        };

        self.baseline_exact = self.entries[cut - 1].has_snapshot();
        let evicted_snapshot = self.entries[..cut]
            .iter()
            .rev()
            .find_map(|entry| entry.snapshot.clone());
        if let Some(snapshot) = evicted_snapshot {
            self.baseline = Some(snapshot);
        } else {
            self.baseline_exact = false;
        }
        self.entries.drain(..cut);
        self.cursor = self.cursor.and_then(|cursor| cursor.checked_sub(cut));
        tracing::debug!(
            session_id = %self.session_id,
            evicted = cut,
            baseline_exact = self.baseline_exact,
            "history entries evicted"
        );
        cut
    }

    /// Newest snapshot at or before `position`, falling back to the baseline.
    fn nearest_state(&self, position: Option<usize>) -> Option<(Arc<Dataset>, bool, Option<String>)> {
        let Some(position) = position else {
            return self
                .baseline
                .clone()
                .map(|state| (state, self.baseline_exact, None));
        };
        let found = self.entries[..=position]
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, entry)| {
                entry.snapshot.as_ref().map(|snapshot| {
                    (
                        Arc::clone(snapshot),
                        index == position,
                        Some(entry.operation_id.clone()),
                    )
                })
            });
        found.or_else(|| self.baseline.clone().map(|state| (state, false, None)))
    }

    /// Steps the cursor back one entry and returns the state to show.
    ///
    /// The log is left unchanged on failure.
    pub fn undo(&mut self) -> Result<Restored, HistoryError> {
        let Some(cursor) = self.cursor else {
            return Err(HistoryError::NoHistory);
        };
        let target = cursor.checked_sub(1);

        let (dataset, exact, source_operation_id) =
            self.nearest_state(target)
                .ok_or_else(|| HistoryError::MissingSnapshot {
                    operation_id: target.map(|index| self.entries[index].operation_id.clone()),
                })?;
        let live = self
            .current
            .clone()
            .ok_or_else(|| HistoryError::MissingSnapshot {
                operation_id: Some(self.entries[cursor].operation_id.clone()),
            })?;

        let entry = self.entries[cursor].clone();
        self.redo.push(RedoFrame {
            entry: entry.clone(),
            state: live,
        });
        self.cursor = target;
        self.current = Some(Arc::clone(&dataset));

        tracing::debug!(
            session_id = %self.session_id,
            operation_id = %entry.operation_id,
            exact,
            "operation undone"
        );
        self.persist();

        Ok(Restored {
            entry,
            dataset,
            exact,
            source_operation_id,
        })
    }

    /// Re-applies the most recently undone entry by restoring its recorded state.
    pub fn redo(&mut self) -> Result<Restored, HistoryError> {
        let frame = self.redo.pop().ok_or(HistoryError::NoRedo)?;
        self.cursor = Some(self.cursor.map_or(0, |cursor| cursor + 1));
        self.current = Some(Arc::clone(&frame.state));

        tracing::debug!(
            session_id = %self.session_id,
            operation_id = %frame.entry.operation_id,
            "operation redone"
        );
        self.persist();

        Ok(Restored {
            entry: frame.entry,
            dataset: frame.state,
            exact: true,
            source_operation_id: None,
        })
    }

    /// Jumps the cursor to `operation_id` using the nearest snapshot at or before it.
    pub fn restore_to(&mut self, operation_id: &str) -> Result<Restored, HistoryError> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.operation_id == operation_id)
            .ok_or_else(|| HistoryError::UnknownOperation {
                operation_id: operation_id.to_string(),
            })?;

        let (dataset, exact, source_operation_id) = self
            .nearest_state(Some(index))
            .ok_or_else(|| HistoryError::MissingSnapshot {
                operation_id: Some(operation_id.to_string()),
            })?;

        self.cursor = Some(index);
        self.redo.clear();
        self.current = Some(Arc::clone(&dataset));

        tracing::info!(
            session_id = %self.session_id,
            %operation_id,
            exact,
            "history restored"
        );
        self.persist();

        Ok(Restored {
            entry: self.entries[index].clone(),
            dataset,
            exact,
            source_operation_id,
        })
    }

    /// Most recent `limit` entries in log order, or all of them.
    #[must_use]
    pub fn list(&self, limit: Option<usize>) -> Vec<HistoryListing> {
        let start = limit.map_or(0, |limit| self.entries.len().saturating_sub(limit));
        self.entries
            .iter()
            .enumerate()
            .skip(start)
            .map(|(index, entry)| HistoryListing {
                index,
                operation_id: entry.operation_id.clone(),
                operation_kind: entry.operation_kind,
                timestamp: entry.timestamp.clone(),
                details: entry.details.clone(),
                metadata: entry.metadata.clone(),
                has_snapshot: entry.has_snapshot(),
                is_current: self.cursor == Some(index),
                can_restore: self.entries[..=index].iter().any(HistoryEntry::has_snapshot),
            })
            .collect()
    }

    #[must_use]
    pub fn statistics(&self) -> HistoryStatistics {
        let mut operation_kinds = BTreeMap::new();
        for entry in &self.entries {
            *operation_kinds.entry(entry.operation_kind).or_insert(0) += 1;
        }

        HistoryStatistics {
            total_operations: self.entries.len(),
            current_position: self.cursor.map_or(0, |cursor| cursor + 1),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            redo_depth: self.redo.len(),
            operation_kinds,
            first_operation: self.entries.first().map(|entry| entry.timestamp.clone()),
            last_operation: self.entries.last().map(|entry| entry.timestamp.clone()),
            snapshot_count: self
                .entries
                .iter()
                .filter(|entry| entry.has_snapshot())
                .count(),
            storage_mode: self.config.storage.as_str(),
            max_entries: self.config.max_entries,
        }
    }

    /// Drops every entry and the redo buffer, then re-anchors on the live state.
    ///
    /// Persisted files are removed as a unit.
    pub fn clear(&mut self) -> Result<(), HistoryError> {
        self.entries.clear();
        self.redo.clear();
        self.cursor = None;
        self.baseline = self.current.clone();
        self.baseline_exact = true;

        if let Some(store) = &self.store {
            store.remove()?;
        }
        tracing::info!(session_id = %self.session_id, "history cleared");
        Ok(())
    }

    /// Releases every in-memory state without touching persisted files.
    pub fn release(&mut self) {
        self.entries.clear();
        self.redo.clear();
        self.cursor = None;
        self.baseline = None;
        self.baseline_exact = true;
        self.current = None;
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let view = PersistView {
            entries: &self.entries,
            cursor: self.cursor,
            baseline: self.baseline.as_deref(),
            baseline_exact: self.baseline_exact,
            current: self.current.as_deref(),
        };
        if let Err(error) = store.save(view) {
            tracing::warn!(
                session_id = %self.session_id,
                %error,
                "failed to persist history"
            );
        }
    }
}
