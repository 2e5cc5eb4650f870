//! Shared data model and collaborator contracts for tabular sessions.
//!
//! This crate defines the dataset value, the closed set of edit operations
//! recorded in history, and the two seams the session layer consumes without
//! implementing: a [`TabularEngine`] that applies operations and an
//! [`ArtifactCodec`] that turns a dataset into file bytes.

mod dataset;
mod operation;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use dataset::{Dataset, Row, ShapeError};
pub use operation::{
    ColumnUpdate, Comparison, FilterCondition, MatchMode, Operation, OperationKind, SortKey,
};

/// Output formats an artifact can be written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Csv,
    Tsv,
    Json,
    Excel,
    Parquet,
    Html,
    Markdown,
}

impl ExportFormat {
    /// File extension used when a placement strategy derives a file name.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Json => "json",
            Self::Excel => "xlsx",
            Self::Parquet => "parquet",
            Self::Html => "html",
            Self::Markdown => "md",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Json => "json",
            Self::Excel => "excel",
            Self::Parquet => "parquet",
            Self::Html => "html",
            Self::Markdown => "markdown",
        }
    }

    /// Whether the format is text and therefore subject to a character encoding.
    #[must_use]
    pub fn is_text(self) -> bool {
        !matches!(self, Self::Excel | Self::Parquet)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown column '{column}'")]
    UnknownColumn { column: String },

    #[error("row {row} is out of range for {rows} rows")]
    RowOutOfRange { row: usize, rows: usize },

    #[error("column '{column}' cannot be updated: {detail}")]
    TypeMismatch { column: String, detail: String },

    #[error("operation '{kind}' is not supported by this engine")]
    Unsupported { kind: OperationKind },

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("format '{format}' is not supported by this codec")]
    UnsupportedFormat { format: ExportFormat },

    #[error("unknown text encoding '{label}'")]
    UnknownEncoding { label: String },

    #[error("dataset contains characters not representable in {encoding}")]
    Unencodable { encoding: String },

    #[error("failed to serialize dataset: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Applies one operation to a dataset.
///
/// Implementations are pure: the input is never mutated and a failure leaves
/// the caller's state untouched.
pub trait TabularEngine: Send + Sync + 'static {
    fn apply(&self, dataset: &Dataset, operation: &Operation) -> Result<Dataset, EngineError>;
}

/// Encodes a dataset into the bytes of a file in `format`.
///
/// `encoding` is a WHATWG label and only applies to text formats.
pub trait ArtifactCodec: Send + Sync + 'static {
    fn encode(
        &self,
        dataset: &Dataset,
        format: ExportFormat,
        encoding: &str,
    ) -> Result<Vec<u8>, CodecError>;
}
