use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("nothing to undo")]
    NoHistory,

    #[error("nothing to redo")]
    NoRedo,

    #[error("unknown operation id '{operation_id}'")]
    UnknownOperation { operation_id: String },

    #[error("no snapshot is available at or before {}", describe_position(.operation_id))]
    MissingSnapshot { operation_id: Option<String> },

    #[error("invalid history configuration: {detail}")]
    InvalidConfig { detail: String },

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON at {path}: {source}")]
    JsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize history for {path}: {source}")]
    JsonSerialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} has unsupported history version {found}; expected 1")]
    UnsupportedVersion { path: PathBuf, found: u32 },

    #[error("{path} belongs to session '{found}', not '{expected}'")]
    SessionMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("{path} has invalid RFC3339 timestamp in field '{field}': {value}")]
    InvalidTimestamp {
        path: PathBuf,
        field: &'static str,
        value: String,
    },

    #[error("{path} contains a duplicate operation id '{operation_id}'")]
    DuplicateOperationId { path: PathBuf, operation_id: String },

    #[error("{path} has cursor {cursor} but only {len} entries")]
    CursorOutOfRange {
        path: PathBuf,
        cursor: usize,
        len: usize,
    },

    #[error("{path} has no snapshot for its first entry")]
    MissingFirstSnapshot { path: PathBuf },

    #[error("snapshot file {path} is missing")]
    MissingSnapshotFile { path: PathBuf },

    #[error("failed to format current UTC timestamp as RFC3339: {0}")]
    ClockFormat(#[source] time::error::Format),
}

fn describe_position(operation_id: &Option<String>) -> String {
    match operation_id {
        Some(operation_id) => format!("operation '{operation_id}'"),
        None => "the start of history".to_string(),
    }
}

impl HistoryError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn json_parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::JsonParse {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn json_serialize(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::JsonSerialize {
            path: path.into(),
            source,
        }
    }

    /// True for failures caused by a persisted file that cannot be trusted.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::JsonParse { .. }
                | Self::UnsupportedVersion { .. }
                | Self::SessionMismatch { .. }
                | Self::InvalidTimestamp { .. }
                | Self::DuplicateOperationId { .. }
                | Self::CursorOutOfRange { .. }
                | Self::MissingFirstSnapshot { .. }
                | Self::MissingSnapshotFile { .. }
        )
    }
}
