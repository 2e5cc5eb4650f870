use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use artifact_writer::ArtifactWriter;
use serde::Serialize;
use tabular_contract::Dataset;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{DurabilityConfig, PlacementStrategy, TriggerMode};
use crate::error::AutosaveError;
use crate::placement::resolve_target;
use crate::retention::prune_backups;
use crate::shared::{lock_unpoisoned, SharedDataset};

/// What asked for a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveTrigger {
    Edit,
    Periodic,
    Manual,
}

impl SaveTrigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Periodic => "periodic",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for SaveTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub path: PathBuf,
    pub bytes: usize,
    pub trigger: SaveTrigger,
    pub save_count: u64,
    pub saved_at: String,
    pub pruned: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutosaveStatus {
    pub enabled: bool,
    pub trigger: TriggerMode,
    pub strategy: PlacementStrategy,
    pub last_save: Option<String>,
    pub save_count: u64,
    pub periodic_alive: bool,
    pub source_path: Option<PathBuf>,
    pub config: DurabilityConfig,
}

#[derive(Debug, Default)]
struct Ledger {
    save_count: u64,
    last_save: Option<String>,
}

#[derive(Debug)]
struct PeriodicTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct Inner {
    session_id: String,
    writer: ArtifactWriter,
    source: SharedDataset,
    config: Mutex<DurabilityConfig>,
    source_path: Mutex<Option<PathBuf>>,
    ledger: Mutex<Ledger>,
    last_saved: Mutex<Weak<Dataset>>,
    save_lock: tokio::sync::Mutex<()>,
    periodic: Mutex<Option<PeriodicTask>>,
}

/// Per-session durability scheduler.
///
/// Edit-triggered, periodic and manual saves all go through [`Self::save`],
/// which holds one async mutex for the whole resolve-write-prune sequence, so
/// two saves of the same session never interleave. Cloning shares the state.
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    inner: Arc<Inner>,
}

impl AutosaveScheduler {
    /// `source` is read by the periodic task on every tick.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        config: DurabilityConfig,
        writer: ArtifactWriter,
        source: SharedDataset,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session_id: session_id.into(),
                writer,
                source,
                config: Mutex::new(config),
                source_path: Mutex::new(None),
                ledger: Mutex::new(Ledger::default()),
                last_saved: Mutex::new(Weak::new()),
                save_lock: tokio::sync::Mutex::new(()),
                periodic: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    #[must_use]
    pub fn config(&self) -> DurabilityConfig {
        lock_unpoisoned(&self.inner.config).clone()
    }

    pub fn set_source_path(&self, path: Option<PathBuf>) {
        *lock_unpoisoned(&self.inner.source_path) = path;
    }

    #[must_use]
    pub fn source_path(&self) -> Option<PathBuf> {
        lock_unpoisoned(&self.inner.source_path).clone()
    }

    #[must_use]
    pub fn should_save_after_edit(&self) -> bool {
        lock_unpoisoned(&self.inner.config).saves_on_edit()
    }

    #[must_use]
    pub fn save_count(&self) -> u64 {
        lock_unpoisoned(&self.inner.ledger).save_count
    }

    /// Whether `dataset` is the exact handle written by the latest successful save.
    #[must_use]
    pub fn last_saved_is(&self, dataset: &Arc<Dataset>) -> bool {
        Weak::ptr_eq(
            &lock_unpoisoned(&self.inner.last_saved),
            &Arc::downgrade(dataset),
        )
    }

    /// Saves `dataset` to the target chosen by the placement strategy.
    ///
    /// Waits for any save already in flight. On success the ledger is updated
    /// and, for backup strategies, old artifacts are pruned. Pruning failures
    /// are logged and do not fail the save.
    pub async fn save(
        &self,
        dataset: Arc<Dataset>,
        trigger: SaveTrigger,
    ) -> Result<SaveReport, AutosaveError> {
        let _guard = self.inner.save_lock.lock().await;

        let config = self.config();
        let source_path = self.source_path();
        let save_count = self.save_count();
        let now = OffsetDateTime::now_utc();
        let saved = Arc::downgrade(&dataset);

        let result = self
            .write_locked(dataset, &config, source_path.as_deref(), save_count, now)
            .await;
        let report = match result {
            Ok(report) => report,
            Err(error) => {
                tracing::warn!(
                    session_id = %self.inner.session_id,
                    %trigger,
                    %error,
                    "autosave failed"
                );
                return Err(error);
            }
        };

        let saved_at = now.format(&Rfc3339).map_err(AutosaveError::ClockFormat)?;
        let save_count = {
            let mut ledger = lock_unpoisoned(&self.inner.ledger);
            ledger.save_count += 1;
            ledger.last_save = Some(saved_at.clone());
            ledger.save_count
        };
        *lock_unpoisoned(&self.inner.last_saved) = saved;

        let pruned = if config.strategy.keeps_history() {
            match prune_backups(&config.backup_dir, &self.inner.session_id, config.max_backups)
                .await
            {
                Ok(pruned) => pruned,
                Err(error) => {
                    tracing::warn!(
                        session_id = %self.inner.session_id,
                        %error,
                        "failed to prune old backups"
                    );
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        tracing::info!(
            session_id = %self.inner.session_id,
            %trigger,
            path = %report.path.display(),
            save_count,
            "autosave succeeded"
        );

        Ok(SaveReport {
            path: report.path,
            bytes: report.bytes,
            trigger,
            save_count,
            saved_at,
            pruned,
        })
    }

    async fn write_locked(
        &self,
        dataset: Arc<Dataset>,
        config: &DurabilityConfig,
        source_path: Option<&Path>,
        save_count: u64,
        now: OffsetDateTime,
    ) -> Result<artifact_writer::WriteReport, AutosaveError> {
        let target = resolve_target(config, &self.inner.session_id, source_path, save_count, now)?;
        Ok(self
            .inner
            .writer
            .write(dataset, &target, config.format, &config.encoding)
            .await?)
    }

    /// Starts the periodic loop when the config calls for one.
    ///
    /// Returns whether a loop is running afterwards. Must be called from
    /// within a tokio runtime.
    pub fn start_periodic(&self) -> bool {
        let config = self.config();
        if !config.saves_periodically() {
            return false;
        }

        let mut slot = lock_unpoisoned(&self.inner.periodic);
        if slot
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
        {
            return true;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_periodic(
            Arc::downgrade(&self.inner),
            config.interval(),
            cancel.clone(),
        ));
        *slot = Some(PeriodicTask { cancel, handle });
        tracing::info!(
            session_id = %self.inner.session_id,
            interval_ms = config.interval_ms,
            "periodic autosave started"
        );
        true
    }

    /// Cancels the periodic loop and waits for it to finish.
    ///
    /// A save already in progress completes first. Returns whether a loop was running.
    pub async fn stop_periodic(&self) -> bool {
        let task = lock_unpoisoned(&self.inner.periodic).take();
        let Some(PeriodicTask { cancel, handle }) = task else {
            return false;
        };

        cancel.cancel();
        if let Err(error) = handle.await {
            if error.is_panic() {
                tracing::error!(
                    session_id = %self.inner.session_id,
                    %error,
                    "periodic autosave task panicked"
                );
            }
        }
        tracing::info!(session_id = %self.inner.session_id, "periodic autosave stopped");
        true
    }

    #[must_use]
    pub fn is_periodic_alive(&self) -> bool {
        lock_unpoisoned(&self.inner.periodic)
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Replaces the config, restarting the periodic loop to match it.
    pub async fn reconfigure(&self, config: DurabilityConfig) -> Result<(), AutosaveError> {
        config.validate()?;
        self.stop_periodic().await;
        *lock_unpoisoned(&self.inner.config) = config;
        self.start_periodic();
        Ok(())
    }

    /// Turns automatic saving off. Manual saves keep working.
    pub async fn disable(&self) {
        self.stop_periodic().await;
        lock_unpoisoned(&self.inner.config).enabled = false;
    }

    #[must_use]
    pub fn status(&self) -> AutosaveStatus {
        let config = self.config();
        let (save_count, last_save) = {
            let ledger = lock_unpoisoned(&self.inner.ledger);
            (ledger.save_count, ledger.last_save.clone())
        };
        AutosaveStatus {
            enabled: config.enabled,
            trigger: config.trigger,
            strategy: config.strategy,
            last_save,
            save_count,
            periodic_alive: self.is_periodic_alive(),
            source_path: self.source_path(),
            config,
        }
    }
}

/// Sleeps, saves, repeats until cancelled or the scheduler is dropped.
async fn run_periodic(
    inner: Weak<Inner>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let scheduler = AutosaveScheduler { inner };
        let Some(dataset) = scheduler.inner.source.get() else {
            tracing::debug!(
                session_id = %scheduler.inner.session_id,
                "periodic autosave skipped; no dataset loaded"
            );
            continue;
        };
        // Failures are already logged by save().
        let _ = scheduler.save(dataset, SaveTrigger::Periodic).await;
    }
}
