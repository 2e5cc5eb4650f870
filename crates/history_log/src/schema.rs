use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabular_contract::{Dataset, Operation, OperationKind};

pub const HISTORY_VERSION: u32 = 1;

pub type Metadata = BTreeMap<String, Value>;

/// One recorded operation.
///
/// `snapshot` holds the dataset as it was immediately after this operation,
/// when one was taken. Snapshots are shared handles, never deep copies.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub operation_id: String,
    pub operation_kind: OperationKind,
    pub details: Operation,
    pub timestamp: String,
    pub metadata: Metadata,
    pub snapshot: Option<Arc<Dataset>>,
}

impl HistoryEntry {
    #[must_use]
    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    pub(crate) fn to_record(&self) -> EntryRecord {
        EntryRecord {
            operation_id: self.operation_id.clone(),
            operation_kind: self.operation_kind,
            timestamp: self.timestamp.clone(),
            details: self.details.clone(),
            metadata: self.metadata.clone(),
            has_snapshot: self.has_snapshot(),
        }
    }
}

/// Serialized form of an entry; the snapshot payload lives in its own file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryRecord {
    pub operation_id: String,
    pub operation_kind: OperationKind,
    pub timestamp: String,
    pub details: Operation,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    pub has_snapshot: bool,
}

/// Top-level document stored at `{root}/history_{session_id}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryDocument {
    pub version: u32,
    pub session_id: String,
    pub saved_at: String,
    pub cursor: Option<usize>,
    pub has_baseline: bool,
    /// False once eviction left a baseline that predates the first entry's parent state.
    #[serde(default = "exact_by_default")]
    pub baseline_exact: bool,
    pub entries: Vec<EntryRecord>,
}

fn exact_by_default() -> bool {
    true
}

/// One row of [`crate::HistoryLog::list`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryListing {
    pub index: usize,
    pub operation_id: String,
    pub operation_kind: OperationKind,
    pub timestamp: String,
    pub details: Operation,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    pub has_snapshot: bool,
    pub is_current: bool,
    pub can_restore: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStatistics {
    pub total_operations: usize,
    /// One-based position of the cursor; zero when every entry is undone.
    pub current_position: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    pub redo_depth: usize,
    pub operation_kinds: BTreeMap<OperationKind, usize>,
    pub first_operation: Option<String>,
    pub last_operation: Option<String>,
    pub snapshot_count: usize,
    pub storage_mode: &'static str,
    pub max_entries: usize,
}
