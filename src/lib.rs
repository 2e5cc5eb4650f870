//! Working sessions over tabular datasets.
//!
//! Invariant: a session's live dataset is only ever replaced, never mutated in
//! place, so history snapshots and in-flight saves share it by reference.
//!
//! # Public API Overview
//! - Create, look up and expire sessions through [`SessionDirectory`].
//! - Load a dataset into a [`Session`], edit it directly or through a
//!   [`TabularEngine`], and step through history with undo, redo and restore.
//! - Control automatic saving with [`DurabilityConfig`]: trigger mode,
//!   placement strategy and backup retention.
//! - Load layered settings with [`SessionConfig::load`] and wrap results for
//!   outer layers with [`Outcome`].
//!
//! # Member crates
//! The history engine, durability scheduler and artifact writer live in their
//! own crates and are re-exported here.

#![allow(clippy::too_many_arguments, clippy::type_complexity)]

pub mod config;
pub mod directory;
pub mod error;
pub mod outcome;
pub mod session;
pub mod telemetry;

/// Layered configuration.
pub use crate::config::{
    ConfigError, DirectoryConfig, SessionConfig, CONFIG_ENV_PREFIX, DEFAULT_MAX_SESSIONS,
    DEFAULT_SESSION_TTL_MS,
};

/// Session registry and per-session operations.
pub use crate::directory::SessionDirectory;
pub use crate::session::{EditReceipt, Session, SessionInfo};

/// Error taxonomy and result envelope.
pub use crate::error::{ErrorKind, SessionError};
pub use crate::outcome::Outcome;

/// Tracing bootstrap.
pub use crate::telemetry::init_tracing;

/// Dataset model and collaborator contracts.
pub use tabular_contract::{
    ArtifactCodec, CodecError, Dataset, EngineError, ExportFormat, Operation, OperationKind,
    TabularEngine,
};

/// Operation history.
pub use history_log::{
    HistoryConfig, HistoryEntry, HistoryError, HistoryExport, HistoryExportFormat, HistoryListing,
    HistoryStatistics, Metadata, Restored, StorageMode,
};

/// Durability scheduling.
pub use autosave::{
    AutosaveError, AutosaveStatus, DurabilityConfig, PlacementStrategy, SaveReport, SaveTrigger,
    TriggerMode,
};

/// Artifact output.
pub use artifact_writer::{ArtifactWriter, TextCodec, WriteError, WriteReport};
