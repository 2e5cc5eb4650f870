//! Layered session configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! environment variables prefixed with [`CONFIG_ENV_PREFIX`] where `__`
//! separates nested keys:
//!
//! ```text
//! TABULAR_SESSION__DIRECTORY__MAX_SESSIONS=20
//! TABULAR_SESSION__HISTORY__STORAGE=persisted
//! TABULAR_SESSION__DURABILITY__STRATEGY=timestamped_backup
//! ```

use std::path::Path;
use std::time::Duration;

use autosave::{AutosaveError, DurabilityConfig};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use history_log::{HistoryConfig, HistoryError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_ENV_PREFIX: &str = "TABULAR_SESSION__";
pub const DEFAULT_MAX_SESSIONS: usize = 100;
pub const DEFAULT_SESSION_TTL_MS: u64 = 3_600_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Extract(#[source] Box<figment::Error>),

    #[error("invalid directory configuration: {detail}")]
    Directory { detail: String },

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Durability(#[from] AutosaveError),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        Self::Extract(Box::new(value))
    }
}

/// Limits of the session directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub max_sessions: usize,
    pub session_ttl_ms: u64,
    /// Capacity eviction skips sessions whose latest edits are not yet saved.
    pub protect_unflushed: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_ttl_ms: DEFAULT_SESSION_TTL_MS,
            protect_unflushed: false,
        }
    }
}

impl DirectoryConfig {
    #[must_use]
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_protect_unflushed(mut self, protect_unflushed: bool) -> Self {
        self.protect_unflushed = protect_unflushed;
        self
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.session_ttl_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::Directory {
                detail: "max_sessions must be at least 1".to_string(),
            });
        }
        if self.session_ttl_ms == 0 {
            return Err(ConfigError::Directory {
                detail: "session_ttl_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Everything a [`crate::SessionDirectory`] needs to create sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub directory: DirectoryConfig,
    pub history: HistoryConfig,
    pub durability: DurabilityConfig,
}

impl SessionConfig {
    /// Loads defaults, then `file` when given, then the environment, and validates the result.
    ///
    /// A missing file is treated as empty.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(file).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The provider stack behind [`Self::load`], for callers that merge extra layers.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(CONFIG_ENV_PREFIX).split("__"))
    }

    #[must_use]
    pub fn with_directory(mut self, directory: DirectoryConfig) -> Self {
        self.directory = directory;
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: HistoryConfig) -> Self {
        self.history = history;
        self
    }

    #[must_use]
    pub fn with_durability(mut self, durability: DurabilityConfig) -> Self {
        self.durability = durability;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.directory.validate()?;
        self.history.validate()?;
        self.durability.validate()?;
        Ok(())
    }
}
