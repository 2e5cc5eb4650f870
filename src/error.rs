use std::fmt;

use artifact_writer::WriteError;
use autosave::AutosaveError;
use history_log::HistoryError;
use serde::{Deserialize, Serialize};
use tabular_contract::EngineError;
use thiserror::Error;

use crate::config::ConfigError;

/// Coarse classification shared by every failure a session can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    NoSourcePath,
    IoFailure,
    CorruptPersistedState,
    InvalidInput,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::NoSourcePath => "no_source_path",
            Self::IoFailure => "io_failure",
            Self::CorruptPersistedState => "corrupt_persisted_state",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session '{session_id}' not found")]
    NotFound { session_id: String },

    #[error("session '{session_id}' already exists")]
    AlreadyExists { session_id: String },

    #[error("session limit of {max_sessions} reached and every session has unsaved edits")]
    CapacityExhausted { max_sessions: usize },

    #[error("session '{session_id}' has no dataset loaded")]
    NoDataset { session_id: String },

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Autosave(#[from] AutosaveError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to format current UTC timestamp: {0}")]
    ClockFormat(#[source] time::error::Format),
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } | Self::CapacityExhausted { .. } | Self::NoDataset { .. } => {
                ErrorKind::InvalidState
            }
            Self::History(error) => history_kind(error),
            Self::Autosave(error) => autosave_kind(error),
            Self::Write(error) => write_kind(error),
            Self::Engine(_) | Self::Config(_) => ErrorKind::InvalidInput,
            Self::ClockFormat(_) => ErrorKind::IoFailure,
        }
    }
}

fn history_kind(error: &HistoryError) -> ErrorKind {
    if error.is_corruption() {
        return ErrorKind::CorruptPersistedState;
    }
    match error {
        HistoryError::UnknownOperation { .. } => ErrorKind::NotFound,
        HistoryError::NoHistory | HistoryError::NoRedo | HistoryError::MissingSnapshot { .. } => {
            ErrorKind::InvalidState
        }
        HistoryError::InvalidConfig { .. } => ErrorKind::InvalidInput,
        _ => ErrorKind::IoFailure,
    }
}

fn autosave_kind(error: &AutosaveError) -> ErrorKind {
    match error {
        AutosaveError::NoSourcePath => ErrorKind::NoSourcePath,
        AutosaveError::InvalidConfig { .. } => ErrorKind::InvalidInput,
        AutosaveError::NoDataset => ErrorKind::InvalidState,
        AutosaveError::Write(error) => write_kind(error),
        AutosaveError::Io { .. } | AutosaveError::ClockFormat(_) => ErrorKind::IoFailure,
    }
}

fn write_kind(error: &WriteError) -> ErrorKind {
    match error {
        WriteError::Codec(_) => ErrorKind::InvalidInput,
        WriteError::Io { .. } | WriteError::EncodeTask(_) => ErrorKind::IoFailure,
    }
}
