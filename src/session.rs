use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use artifact_writer::ArtifactWriter;
use autosave::{
    AutosaveScheduler, AutosaveStatus, DurabilityConfig, SaveReport, SaveTrigger, SharedDataset,
};
use history_log::{
    HistoryExport, HistoryExportFormat, HistoryListing, HistoryLog, HistoryStatistics, Metadata,
    Restored,
};
use serde::Serialize;
use tabular_contract::{Dataset, Operation, TabularEngine};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::SessionConfig;
use crate::error::SessionError;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// What an edit produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditReceipt {
    pub operation_id: String,
    /// The trigger mode wants a save now; follow up with
    /// [`Session::trigger_autosave_if_needed`].
    pub autosave_due: bool,
    pub snapshot_taken: bool,
    pub evicted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: String,
    pub idle_ms: u64,
    pub rows: Option<usize>,
    pub columns: Option<usize>,
    pub origin: Option<PathBuf>,
    pub history_len: usize,
    pub history_position: usize,
    pub unflushed: bool,
}

/// One working session over a tabular dataset.
///
/// The live dataset is only ever replaced, never mutated. Every method takes
/// `&self` so a session can be shared as `Arc<Session>` between the caller and
/// the directory; callers are expected to serialize their own edits.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: String,
    ttl: Duration,
    last_accessed: Mutex<Instant>,
    expired: AtomicBool,
    unflushed: AtomicBool,
    dataset: SharedDataset,
    history: Mutex<HistoryLog>,
    autosave: AutosaveScheduler,
}

impl Session {
    /// Creates a session, resuming persisted history for `id` when the config enables it.
    ///
    /// Fails with [`SessionError::Config`] when `config` does not validate.
    pub fn new(
        id: impl Into<String>,
        config: &SessionConfig,
        writer: ArtifactWriter,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let id = id.into();
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(SessionError::ClockFormat)?;

        let history = HistoryLog::new(id.clone(), config.history.clone())?;
        let dataset = SharedDataset::new();
        if let Some(current) = history.current() {
            dataset.set(Arc::clone(current));
        }
        let autosave = AutosaveScheduler::new(
            id.clone(),
            config.durability.clone(),
            writer,
            dataset.clone(),
        );

        Ok(Self {
            id,
            created_at,
            ttl: config.directory.session_ttl(),
            last_accessed: Mutex::new(Instant::now()),
            expired: AtomicBool::new(false),
            unflushed: AtomicBool::new(false),
            dataset,
            history: Mutex::new(history),
            autosave,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    #[must_use]
    pub fn dataset(&self) -> Option<Arc<Dataset>> {
        self.dataset.get()
    }

    /// File the dataset was loaded from, if any.
    #[must_use]
    pub fn origin(&self) -> Option<PathBuf> {
        self.autosave.source_path()
    }

    /// Whether edits, undos or restores happened since the last successful save.
    ///
    /// A periodic save that wrote the live dataset settles the obligation too.
    #[must_use]
    pub fn has_unflushed_edits(&self) -> bool {
        if !self.unflushed.load(Ordering::SeqCst) {
            return false;
        }
        self.dataset
            .get()
            .map_or(true, |current| !self.autosave.last_saved_is(&current))
    }

    #[must_use]
    pub fn last_accessed(&self) -> Instant {
        *lock_unpoisoned(&self.last_accessed)
    }

    pub(crate) fn touch(&self) {
        *lock_unpoisoned(&self.last_accessed) = Instant::now();
    }

    /// True once the session has been idle for its whole TTL.
    #[must_use]
    pub fn is_idle_past_ttl(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_accessed()) >= self.ttl
    }

    pub(crate) fn mark_expired(&self) -> bool {
        !self.expired.swap(true, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_marked_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    fn require_dataset(&self) -> Result<Arc<Dataset>, SessionError> {
        self.dataset.get().ok_or_else(|| SessionError::NoDataset {
            session_id: self.id.clone(),
        })
    }

    fn history_log(&self) -> MutexGuard<'_, HistoryLog> {
        lock_unpoisoned(&self.history)
    }

    /// Installs `dataset` as the live state and restarts history from it.
    ///
    /// `origin` is where overwrite-source saves go. The periodic loop is
    /// started when the trigger mode calls for one.
    pub async fn load(&self, dataset: Dataset, origin: Option<PathBuf>) -> Result<(), SessionError> {
        let dataset = Arc::new(dataset);
        {
            let mut history = self.history_log();
            history.reset(Arc::clone(&dataset));
            self.dataset.set(Arc::clone(&dataset));
        }
        self.autosave.set_source_path(origin);
        self.unflushed.store(false, Ordering::SeqCst);
        self.autosave.start_periodic();

        tracing::info!(
            session_id = %self.id,
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "dataset loaded"
        );
        Ok(())
    }

    /// Replaces the live dataset with the result of `operation` and records it.
    pub fn edit(&self, operation: Operation, dataset: Dataset) -> Result<EditReceipt, SessionError> {
        self.edit_with_metadata(operation, dataset, Metadata::new())
    }

    pub fn edit_with_metadata(
        &self,
        operation: Operation,
        dataset: Dataset,
        metadata: Metadata,
    ) -> Result<EditReceipt, SessionError> {
        self.require_dataset()?;
        let dataset = Arc::new(dataset);
        let recorded = {
            let mut history = self.history_log();
            let recorded = history.record(operation, Arc::clone(&dataset), metadata)?;
            self.dataset.set(dataset);
            recorded
        };
        self.unflushed.store(true, Ordering::SeqCst);

        Ok(EditReceipt {
            operation_id: recorded.operation_id,
            autosave_due: self.autosave.should_save_after_edit(),
            snapshot_taken: recorded.snapshot_taken,
            evicted: recorded.evicted,
        })
    }

    /// Runs `operation` through `engine` and records the result.
    ///
    /// Engine failures leave the session untouched.
    pub fn apply(
        &self,
        engine: &dyn TabularEngine,
        operation: Operation,
    ) -> Result<EditReceipt, SessionError> {
        let current = self.require_dataset()?;
        let next = engine.apply(&current, &operation)?;
        self.edit(operation, next)
    }

    pub fn undo(&self) -> Result<Restored, SessionError> {
        self.step(HistoryLog::undo)
    }

    pub fn redo(&self) -> Result<Restored, SessionError> {
        self.step(HistoryLog::redo)
    }

    pub fn restore_to(&self, operation_id: &str) -> Result<Restored, SessionError> {
        self.step(|history| history.restore_to(operation_id))
    }

    fn step(
        &self,
        action: impl FnOnce(&mut HistoryLog) -> Result<Restored, history_log::HistoryError>,
    ) -> Result<Restored, SessionError> {
        let restored = {
            let mut history = self.history_log();
            let restored = action(&mut *history)?;
            self.dataset.set(Arc::clone(&restored.dataset));
            restored
        };
        self.unflushed.store(true, Ordering::SeqCst);
        Ok(restored)
    }

    /// Saves with the `edit` trigger when edits are unsaved and the trigger mode asks for it.
    ///
    /// Returns `Ok(None)` when nothing was owed. A failed save keeps the
    /// obligation so a later call retries it.
    pub async fn trigger_autosave_if_needed(&self) -> Result<Option<SaveReport>, SessionError> {
        if !self.has_unflushed_edits() || !self.autosave.should_save_after_edit() {
            return Ok(None);
        }
        let Some(dataset) = self.dataset.get() else {
            return Ok(None);
        };
        self.flush(dataset, SaveTrigger::Edit).await.map(Some)
    }

    /// Saves immediately regardless of the trigger mode.
    pub async fn save_now(&self) -> Result<SaveReport, SessionError> {
        let dataset = self.require_dataset()?;
        self.flush(dataset, SaveTrigger::Manual).await
    }

    async fn flush(
        &self,
        dataset: Arc<Dataset>,
        trigger: SaveTrigger,
    ) -> Result<SaveReport, SessionError> {
        // Cleared first so an edit landing mid-save leaves the flag set.
        let owed = self.unflushed.swap(false, Ordering::SeqCst);
        match self.autosave.save(dataset, trigger).await {
            Ok(report) => Ok(report),
            Err(error) => {
                if owed {
                    self.unflushed.store(true, Ordering::SeqCst);
                }
                Err(error.into())
            }
        }
    }

    pub async fn configure_autosave(
        &self,
        config: DurabilityConfig,
    ) -> Result<AutosaveStatus, SessionError> {
        self.autosave.reconfigure(config).await?;
        Ok(self.autosave.status())
    }

    pub async fn disable_autosave(&self) -> AutosaveStatus {
        self.autosave.disable().await;
        self.autosave.status()
    }

    #[must_use]
    pub fn autosave_status(&self) -> AutosaveStatus {
        self.autosave.status()
    }

    #[must_use]
    pub fn history(&self, limit: Option<usize>) -> Vec<HistoryListing> {
        self.history_log().list(limit)
    }

    #[must_use]
    pub fn history_statistics(&self) -> HistoryStatistics {
        self.history_log().statistics()
    }

    pub fn export_history(
        &self,
        dest: &Path,
        format: HistoryExportFormat,
    ) -> Result<HistoryExport, SessionError> {
        Ok(self.history_log().export(dest, format)?)
    }

    /// Forgets every recorded operation; the live dataset stays as it is.
    pub fn clear_history(&self) -> Result<(), SessionError> {
        Ok(self.history_log().clear()?)
    }

    #[must_use]
    pub fn info(&self) -> SessionInfo {
        let dataset = self.dataset.get();
        let (history_len, history_position) = {
            let history = self.history_log();
            (history.len(), history.cursor().map_or(0, |cursor| cursor + 1))
        };
        let idle = Instant::now().saturating_duration_since(self.last_accessed());
        SessionInfo {
            session_id: self.id.clone(),
            created_at: self.created_at.clone(),
            idle_ms: u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
            rows: dataset.as_ref().map(|dataset| dataset.row_count()),
            columns: dataset.as_ref().map(|dataset| dataset.column_count()),
            origin: self.origin(),
            history_len,
            history_position,
            unflushed: self.has_unflushed_edits(),
        }
    }

    /// Stops the periodic loop and drops the in-memory dataset and history.
    ///
    /// Persisted history files stay on disk.
    pub async fn shutdown(&self) {
        self.autosave.stop_periodic().await;
        self.history_log().release();
        self.dataset.clear();
        tracing::debug!(session_id = %self.id, "session shut down");
    }
}
