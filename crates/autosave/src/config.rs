use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use artifact_writer::TextEncoding;
use serde::{Deserialize, Serialize};
use tabular_contract::ExportFormat;

use crate::error::AutosaveError;

pub const DEFAULT_INTERVAL_MS: u64 = 300_000;
pub const DEFAULT_MAX_BACKUPS: usize = 10;
pub const BACKUP_DIR: &str = ".tabular_backups";

/// What causes an automatic save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    Off,
    #[default]
    OnEdit,
    Interval,
    Both,
}

impl TriggerMode {
    #[must_use]
    pub fn saves_on_edit(self) -> bool {
        matches!(self, Self::OnEdit | Self::Both)
    }

    #[must_use]
    pub fn saves_periodically(self) -> bool {
        matches!(self, Self::Interval | Self::Both)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::OnEdit => "on_edit",
            Self::Interval => "interval",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a save lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    #[default]
    OverwriteSource,
    TimestampedBackup,
    MonotonicVersion,
    FixedPath,
}

impl PlacementStrategy {
    /// Strategies that accumulate files and are subject to retention pruning.
    #[must_use]
    pub fn keeps_history(self) -> bool {
        matches!(self, Self::TimestampedBackup | Self::MonotonicVersion)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OverwriteSource => "overwrite_source",
            Self::TimestampedBackup => "timestamped_backup",
            Self::MonotonicVersion => "monotonic_version",
            Self::FixedPath => "fixed_path",
        }
    }
}

impl fmt::Display for PlacementStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurabilityConfig {
    pub enabled: bool,
    pub trigger: TriggerMode,
    pub strategy: PlacementStrategy,
    pub interval_ms: u64,
    pub max_backups: usize,
    pub backup_dir: PathBuf,
    pub fixed_path: Option<PathBuf>,
    pub format: ExportFormat,
    pub encoding: String,
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            enabled: true,
            trigger: TriggerMode::OnEdit,
            strategy: PlacementStrategy::OverwriteSource,
            interval_ms: DEFAULT_INTERVAL_MS,
            max_backups: DEFAULT_MAX_BACKUPS,
            backup_dir: cwd.join(BACKUP_DIR),
            fixed_path: None,
            format: ExportFormat::Csv,
            encoding: "utf-8".to_string(),
        }
    }
}

impl DurabilityConfig {
    /// A config that never saves automatically.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            trigger: TriggerMode::Off,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_trigger(mut self, trigger: TriggerMode) -> Self {
        self.trigger = trigger;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: PlacementStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    #[must_use]
    pub fn with_backup_dir(mut self, backup_dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = backup_dir.into();
        self
    }

    #[must_use]
    pub fn with_fixed_path(mut self, fixed_path: impl Into<PathBuf>) -> Self {
        self.fixed_path = Some(fixed_path.into());
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub fn saves_on_edit(&self) -> bool {
        self.enabled && self.trigger.saves_on_edit()
    }

    #[must_use]
    pub fn saves_periodically(&self) -> bool {
        self.enabled && self.trigger.saves_periodically()
    }

    pub fn validate(&self) -> Result<(), AutosaveError> {
        if self.strategy == PlacementStrategy::FixedPath && self.fixed_path.is_none() {
            return Err(AutosaveError::invalid(
                "fixed_path strategy requires fixed_path to be set",
            ));
        }
        if self.max_backups == 0 {
            return Err(AutosaveError::invalid("max_backups must be at least 1"));
        }
        if self.trigger.saves_periodically() && self.interval_ms == 0 {
            return Err(AutosaveError::invalid(
                "interval_ms must be positive for periodic triggers",
            ));
        }
        if self.format.is_text() && self.format != ExportFormat::Json {
            TextEncoding::resolve(&self.encoding)
                .map_err(|error| AutosaveError::invalid(error.to_string()))?;
        }
        Ok(())
    }
}
