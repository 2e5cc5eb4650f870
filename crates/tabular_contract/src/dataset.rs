use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// One row of cells, positionally aligned with [`Dataset::columns`].
pub type Row = Vec<Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("row {row} has {found} cells; expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("column '{name}' appears more than once")]
    DuplicateColumn { name: String },

    #[error("record {index} is not a JSON object")]
    NotARecord { index: usize },
}

/// Immutable tabular value: ordered column names plus rows of JSON-typed cells.
///
/// Edits never mutate a dataset in place. Engines return a new `Dataset` and
/// sessions swap it in wholesale, which is what lets history snapshots share
/// the value behind an `Arc` instead of deep-copying it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "DatasetParts")]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Deserialize)]
struct DatasetParts {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl TryFrom<DatasetParts> for Dataset {
    type Error = ShapeError;

    fn try_from(parts: DatasetParts) -> Result<Self, Self::Error> {
        Self::new(parts.columns, parts.rows)
    }
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Result<Self, ShapeError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(ShapeError::DuplicateColumn { name: name.clone() });
            }
        }

        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != columns.len() {
                return Err(ShapeError::RaggedRow {
                    row,
                    expected: columns.len(),
                    found: cells.len(),
                });
            }
        }

        Ok(Self { columns, rows })
    }

    /// Builds a dataset from an array of JSON objects.
    ///
    /// Columns are the union of record keys in first-seen order; a record
    /// missing a key contributes `null` for that column.
    pub fn from_records(records: &[Value]) -> Result<Self, ShapeError> {
        let mut columns: Vec<String> = Vec::new();
        let mut objects: Vec<&Map<String, Value>> = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let object = record
                .as_object()
                .ok_or(ShapeError::NotARecord { index })?;
            for key in object.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.clone());
                }
            }
            objects.push(object);
        }

        let rows = objects
            .into_iter()
            .map(|object| {
                columns
                    .iter()
                    .map(|column| object.get(column).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self::new(columns, rows)
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|cells| cells.get(index))
    }

    /// Returns row `row` as a JSON object keyed by column name.
    #[must_use]
    pub fn record(&self, row: usize) -> Option<Map<String, Value>> {
        self.rows.get(row).map(|cells| {
            self.columns
                .iter()
                .cloned()
                .zip(cells.iter().cloned())
                .collect()
        })
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.columns, self.rows)
    }
}
