use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One discrete edit, also used verbatim as the details payload of a history entry.
///
/// The serialized form is internally tagged by `kind`, so a persisted history
/// line reads `{"kind": "rename", "mapping": {...}}`. Adding a variant is a
/// format extension; renaming or removing one breaks previously persisted logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum Operation {
    /// Initial load of a dataset into a session. Never dispatched to an engine.
    Load {
        source: Option<String>,
        rows: usize,
        columns: usize,
    },
    Filter {
        conditions: Vec<FilterCondition>,
        #[serde(default)]
        mode: MatchMode,
    },
    Sort {
        keys: Vec<SortKey>,
    },
    Select {
        columns: Vec<String>,
    },
    Rename {
        mapping: BTreeMap<String, String>,
    },
    AddColumn {
        name: String,
        #[serde(default)]
        value: Value,
    },
    RemoveColumns {
        columns: Vec<String>,
    },
    UpdateColumn {
        column: String,
        update: ColumnUpdate,
    },
    FillMissing {
        #[serde(default)]
        columns: Option<Vec<String>>,
        value: Value,
    },
    RemoveDuplicates {
        #[serde(default)]
        subset: Option<Vec<String>>,
    },
    DropRows {
        indices: Vec<usize>,
    },
    InsertRow {
        #[serde(default)]
        index: Option<usize>,
        values: Vec<Value>,
    },
    SetCell {
        row: usize,
        column: String,
        value: Value,
    },
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Load { .. } => OperationKind::Load,
            Self::Filter { .. } => OperationKind::Filter,
            Self::Sort { .. } => OperationKind::Sort,
            Self::Select { .. } => OperationKind::Select,
            Self::Rename { .. } => OperationKind::Rename,
            Self::AddColumn { .. } => OperationKind::AddColumn,
            Self::RemoveColumns { .. } => OperationKind::RemoveColumns,
            Self::UpdateColumn { .. } => OperationKind::UpdateColumn,
            Self::FillMissing { .. } => OperationKind::FillMissing,
            Self::RemoveDuplicates { .. } => OperationKind::RemoveDuplicates,
            Self::DropRows { .. } => OperationKind::DropRows,
            Self::InsertRow { .. } => OperationKind::InsertRow,
            Self::SetCell { .. } => OperationKind::SetCell,
        }
    }
}

/// Tag of an [`Operation`], used for statistics and listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Load,
    Filter,
    Sort,
    Select,
    Rename,
    AddColumn,
    RemoveColumns,
    UpdateColumn,
    FillMissing,
    RemoveDuplicates,
    DropRows,
    InsertRow,
    SetCell,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Filter => "filter",
            Self::Sort => "sort",
            Self::Select => "select",
            Self::Rename => "rename",
            Self::AddColumn => "add_column",
            Self::RemoveColumns => "remove_columns",
            Self::UpdateColumn => "update_column",
            Self::FillMissing => "fill_missing",
            Self::RemoveDuplicates => "remove_duplicates",
            Self::DropRows => "drop_rows",
            Self::InsertRow => "insert_row",
            Self::SetCell => "set_cell",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterCondition {
    pub column: String,
    pub op: Comparison,
    #[serde(default)]
    pub value: Value,
}

impl FilterCondition {
    #[must_use]
    pub fn new(column: impl Into<String>, op: Comparison, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    StartsWith,
    EndsWith,
    In,
    IsNull,
    NotNull,
}

/// How multiple filter conditions combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortKey {
    pub column: String,
    #[serde(default = "ascending_default")]
    pub ascending: bool,
}

impl SortKey {
    #[must_use]
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    #[must_use]
    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

fn ascending_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum ColumnUpdate {
    Set { value: Value },
    Multiply { factor: f64 },
    Add { amount: f64 },
    Replace { from: Value, to: Value },
    Uppercase,
    Lowercase,
    Trim,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{ColumnUpdate, Operation, OperationKind};

    #[test]
    fn operation_serializes_with_kind_tag() {
        let operation = Operation::UpdateColumn {
            column: "v".to_string(),
            update: ColumnUpdate::Multiply { factor: 2.0 },
        };

        assert_eq!(
            serde_json::to_value(&operation).expect("operation should serialize"),
            json!({
                "kind": "update_column",
                "column": "v",
                "update": {"op": "multiply", "factor": 2.0},
            })
        );
        assert_eq!(operation.kind(), OperationKind::UpdateColumn);
    }

    #[test]
    fn operation_rejects_unknown_kind_and_fields() {
        assert!(serde_json::from_value::<Operation>(json!({"kind": "explode"})).is_err());
        assert!(serde_json::from_value::<Operation>(json!({
            "kind": "drop_rows",
            "indices": [0],
            "extra": true,
        }))
        .is_err());
    }

    #[test]
    fn optional_fields_take_defaults() {
        let operation: Operation = serde_json::from_value(json!({
            "kind": "filter",
            "conditions": [{"column": "v", "op": "is_null"}],
        }))
        .expect("filter without mode should deserialize");

        match operation {
            Operation::Filter { conditions, mode } => {
                assert_eq!(conditions[0].value, json!(null));
                assert_eq!(mode, super::MatchMode::All);
            }
            other => panic!("unexpected operation: {other:?}"),
        }
    }

    #[test]
    fn kind_display_matches_serde_tag() {
        for kind in [
            OperationKind::Load,
            OperationKind::RemoveDuplicates,
            OperationKind::SetCell,
        ] {
            let tag = serde_json::to_value(kind).expect("kind should serialize");
            assert_eq!(tag, json!(kind.to_string()));
        }
    }
}
