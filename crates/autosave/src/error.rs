use std::path::PathBuf;

use artifact_writer::WriteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutosaveError {
    #[error("overwrite_source requires a source path, but the dataset was not loaded from a file")]
    NoSourcePath,

    #[error("invalid autosave configuration: {detail}")]
    InvalidConfig { detail: String },

    #[error("no dataset is loaded")]
    NoDataset,

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to format current UTC timestamp: {0}")]
    ClockFormat(#[source] time::error::Format),
}

impl AutosaveError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }
}
