#![allow(unused_imports)]

use tabular_session::{
    init_tracing, ArtifactCodec, ArtifactWriter, AutosaveError, AutosaveStatus, CodecError,
    ConfigError, Dataset, DirectoryConfig, DurabilityConfig, EditReceipt, EngineError, ErrorKind,
    ExportFormat, HistoryConfig, HistoryEntry, HistoryError, HistoryExport, HistoryExportFormat,
    HistoryListing, HistoryStatistics, Metadata, Operation, OperationKind, Outcome,
    PlacementStrategy, Restored, SaveReport, SaveTrigger, Session, SessionConfig,
    SessionDirectory, SessionError, SessionInfo, StorageMode, TabularEngine, TextCodec,
    TriggerMode, WriteError, WriteReport, CONFIG_ENV_PREFIX, DEFAULT_MAX_SESSIONS,
    DEFAULT_SESSION_TTL_MS,
};

#[test]
fn public_api_exports_compile() {}
