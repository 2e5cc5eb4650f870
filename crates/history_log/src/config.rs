use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::HistoryError;
use crate::paths::history_root;

pub const DEFAULT_MAX_ENTRIES: usize = 100;
pub const DEFAULT_SNAPSHOT_INTERVAL: usize = 5;

/// Where a history log keeps its entries and snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    #[default]
    Memory,
    /// Every mutation is written through to `{root}/history_{session_id}.json`.
    Persisted,
}

impl StorageMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Persisted => "persisted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub storage: StorageMode,
    pub max_entries: usize,
    pub snapshot_interval: usize,
    pub root: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            storage: StorageMode::Memory,
            max_entries: DEFAULT_MAX_ENTRIES,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            root: history_root(&cwd),
        }
    }
}

impl HistoryConfig {
    #[must_use]
    pub fn with_storage(mut self, storage: StorageMode) -> Self {
        self.storage = storage;
        self
    }

    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    #[must_use]
    pub fn with_snapshot_interval(mut self, snapshot_interval: usize) -> Self {
        self.snapshot_interval = snapshot_interval;
        self
    }

    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Shortcut for a persisted log under `root`.
    #[must_use]
    pub fn persisted(root: impl Into<PathBuf>) -> Self {
        Self::default()
            .with_storage(StorageMode::Persisted)
            .with_root(root)
    }

    pub fn validate(&self) -> Result<(), HistoryError> {
        if self.max_entries == 0 {
            return Err(HistoryError::InvalidConfig {
                detail: "max_entries must be at least 1".to_string(),
            });
        }
        if self.snapshot_interval == 0 {
            return Err(HistoryError::InvalidConfig {
                detail: "snapshot_interval must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
