//! Deterministic in-memory implementation of the `tabular_contract` engine.
//!
//! This crate contains no file or codec logic and is intended for local
//! development and contract-level integration testing of sessions.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use serde_json::{Number, Value};
use tabular_contract::{
    ColumnUpdate, Comparison, Dataset, EngineError, FilterCondition, MatchMode, Operation,
    OperationKind, Row, SortKey, TabularEngine,
};

/// Deterministic engine used by session tests and local runs.
#[derive(Debug, Default)]
pub struct MockEngine {
    rejected: BTreeSet<OperationKind>,
}

impl MockEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation of `kind` fail with [`EngineError::Unsupported`].
    #[must_use]
    pub fn rejecting(mut self, kind: OperationKind) -> Self {
        self.rejected.insert(kind);
        self
    }
}

impl TabularEngine for MockEngine {
    fn apply(&self, dataset: &Dataset, operation: &Operation) -> Result<Dataset, EngineError> {
        let kind = operation.kind();
        if self.rejected.contains(&kind) {
            return Err(EngineError::Unsupported { kind });
        }

        match operation {
            Operation::Load { .. } => Err(EngineError::Unsupported { kind }),
            Operation::Filter { conditions, mode } => filter(dataset, conditions, *mode),
            Operation::Sort { keys } => sort(dataset, keys),
            Operation::Select { columns } => select(dataset, columns),
            Operation::Rename { mapping } => {
                for from in mapping.keys() {
                    require_column(dataset, from)?;
                }
                let columns = dataset
                    .columns()
                    .iter()
                    .map(|column| mapping.get(column).unwrap_or(column).clone())
                    .collect();
                Ok(Dataset::new(columns, dataset.rows().to_vec())?)
            }
            Operation::AddColumn { name, value } => {
                let mut columns = dataset.columns().to_vec();
                columns.push(name.clone());
                let rows = dataset
                    .rows()
                    .iter()
                    .map(|row| {
                        let mut row = row.clone();
                        row.push(value.clone());
                        row
                    })
                    .collect();
                Ok(Dataset::new(columns, rows)?)
            }
            Operation::RemoveColumns { columns } => {
                let mut drop = HashSet::new();
                for column in columns {
                    drop.insert(require_column(dataset, column)?);
                }
                let keep: Vec<usize> = (0..dataset.column_count())
                    .filter(|index| !drop.contains(index))
                    .collect();
                Ok(project(dataset, &keep)?)
            }
            Operation::UpdateColumn { column, update } => update_column(dataset, column, update),
            Operation::FillMissing { columns, value } => {
                let targets = match columns {
                    Some(columns) => columns
                        .iter()
                        .map(|column| require_column(dataset, column))
                        .collect::<Result<HashSet<_>, _>>()?,
                    None => (0..dataset.column_count()).collect(),
                };
                let rows = map_cells(dataset, |index, cell| {
                    if targets.contains(&index) && cell.is_null() {
                        value.clone()
                    } else {
                        cell.clone()
                    }
                });
                Ok(Dataset::new(dataset.columns().to_vec(), rows)?)
            }
            Operation::RemoveDuplicates { subset } => {
                let key_columns = match subset {
                    Some(columns) => columns
                        .iter()
                        .map(|column| require_column(dataset, column))
                        .collect::<Result<Vec<_>, _>>()?,
                    None => (0..dataset.column_count()).collect(),
                };
                let mut seen = HashSet::new();
                let rows = dataset
                    .rows()
                    .iter()
                    .filter(|row| {
                        let key: Vec<String> =
                            key_columns.iter().map(|index| row[*index].to_string()).collect();
                        seen.insert(key)
                    })
                    .cloned()
                    .collect();
                Ok(Dataset::new(dataset.columns().to_vec(), rows)?)
            }
            Operation::DropRows { indices } => {
                for index in indices {
                    require_row(dataset, *index)?;
                }
                let drop: HashSet<usize> = indices.iter().copied().collect();
                let rows = dataset
                    .rows()
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| !drop.contains(index))
                    .map(|(_, row)| row.clone())
                    .collect();
                Ok(Dataset::new(dataset.columns().to_vec(), rows)?)
            }
            Operation::InsertRow { index, values } => {
                let at = index.unwrap_or(dataset.row_count());
                if at > dataset.row_count() {
                    return Err(EngineError::RowOutOfRange {
                        row: at,
                        rows: dataset.row_count(),
                    });
                }
                let mut rows = dataset.rows().to_vec();
                rows.insert(at, values.clone());
                Ok(Dataset::new(dataset.columns().to_vec(), rows)?)
            }
            Operation::SetCell { row, column, value } => {
                let column_index = require_column(dataset, column)?;
                require_row(dataset, *row)?;
                let mut rows = dataset.rows().to_vec();
                rows[*row][column_index] = value.clone();
                Ok(Dataset::new(dataset.columns().to_vec(), rows)?)
            }
        }
    }
}

fn require_column(dataset: &Dataset, column: &str) -> Result<usize, EngineError> {
    dataset
        .column_index(column)
        .ok_or_else(|| EngineError::UnknownColumn {
            column: column.to_string(),
        })
}

fn require_row(dataset: &Dataset, row: usize) -> Result<(), EngineError> {
    if row < dataset.row_count() {
        Ok(())
    } else {
        Err(EngineError::RowOutOfRange {
            row,
            rows: dataset.row_count(),
        })
    }
}

fn project(dataset: &Dataset, keep: &[usize]) -> Result<Dataset, EngineError> {
    let columns = keep
        .iter()
        .map(|index| dataset.columns()[*index].clone())
        .collect();
    let rows = dataset
        .rows()
        .iter()
        .map(|row| keep.iter().map(|index| row[*index].clone()).collect())
        .collect();
    Ok(Dataset::new(columns, rows)?)
}

fn select(dataset: &Dataset, columns: &[String]) -> Result<Dataset, EngineError> {
    let keep = columns
        .iter()
        .map(|column| require_column(dataset, column))
        .collect::<Result<Vec<_>, _>>()?;
    project(dataset, &keep)
}

fn map_cells(dataset: &Dataset, mut f: impl FnMut(usize, &Value) -> Value) -> Vec<Row> {
    dataset
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(index, cell)| f(index, cell))
                .collect()
        })
        .collect()
}

fn filter(
    dataset: &Dataset,
    conditions: &[FilterCondition],
    mode: MatchMode,
) -> Result<Dataset, EngineError> {
    let resolved = conditions
        .iter()
        .map(|condition| Ok((require_column(dataset, &condition.column)?, condition)))
        .collect::<Result<Vec<_>, EngineError>>()?;

    let rows = dataset
        .rows()
        .iter()
        .filter(|row| {
            let mut results = resolved
                .iter()
                .map(|(index, condition)| matches(&row[*index], condition));
            match mode {
                MatchMode::All => results.all(|matched| matched),
                MatchMode::Any => results.any(|matched| matched),
            }
        })
        .cloned()
        .collect();
    Ok(Dataset::new(dataset.columns().to_vec(), rows)?)
}

fn matches(cell: &Value, condition: &FilterCondition) -> bool {
    let expected = &condition.value;
    match condition.op {
        Comparison::Eq => compare(cell, expected) == Some(Ordering::Equal),
        Comparison::Ne => compare(cell, expected) != Some(Ordering::Equal),
        Comparison::Gt => compare(cell, expected) == Some(Ordering::Greater),
        Comparison::Ge => matches!(
            compare(cell, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Comparison::Lt => compare(cell, expected) == Some(Ordering::Less),
        Comparison::Le => matches!(
            compare(cell, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Comparison::Contains => text_pair(cell, expected)
            .map(|(cell, needle)| cell.contains(needle))
            .unwrap_or(false),
        Comparison::StartsWith => text_pair(cell, expected)
            .map(|(cell, needle)| cell.starts_with(needle))
            .unwrap_or(false),
        Comparison::EndsWith => text_pair(cell, expected)
            .map(|(cell, needle)| cell.ends_with(needle))
            .unwrap_or(false),
        Comparison::In => expected
            .as_array()
            .map(|candidates| {
                candidates
                    .iter()
                    .any(|candidate| compare(cell, candidate) == Some(Ordering::Equal))
            })
            .unwrap_or(false),
        Comparison::IsNull => cell.is_null(),
        Comparison::NotNull => !cell.is_null(),
    }
}

fn text_pair<'a>(cell: &'a Value, expected: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((cell.as_str()?, expected.as_str()?))
}

/// Orders two cells of the same JSON type; mixed types are incomparable.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        (Value::Number(left), Value::Number(right)) => {
            if let (Some(left), Some(right)) = (left.as_i64(), right.as_i64()) {
                return Some(left.cmp(&right));
            }
            left.as_f64()?.partial_cmp(&right.as_f64()?)
        }
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

/// Sort order with nulls last regardless of direction.
fn sort(dataset: &Dataset, keys: &[SortKey]) -> Result<Dataset, EngineError> {
    let resolved = keys
        .iter()
        .map(|key| Ok((require_column(dataset, &key.column)?, key.ascending)))
        .collect::<Result<Vec<_>, EngineError>>()?;

    let mut rows = dataset.rows().to_vec();
    rows.sort_by(|left, right| {
        for (index, ascending) in &resolved {
            let (a, b) = (&left[*index], &right[*index]);
            let ordering = match (a.is_null(), b.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                (false, false) => {
                    let ordering = compare(a, b).unwrap_or(Ordering::Equal);
                    if *ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(Dataset::new(dataset.columns().to_vec(), rows)?)
}

fn update_column(
    dataset: &Dataset,
    column: &str,
    update: &ColumnUpdate,
) -> Result<Dataset, EngineError> {
    let target = require_column(dataset, column)?;
    let mut rows = dataset.rows().to_vec();
    for row in &mut rows {
        let cell = &row[target];
        if cell.is_null() && !matches!(update, ColumnUpdate::Set { .. }) {
            continue;
        }
        let next = updated_cell(cell, update).ok_or_else(|| EngineError::TypeMismatch {
            column: column.to_string(),
            detail: format!("cannot apply {update:?} to {cell}"),
        })?;
        row[target] = next;
    }
    Ok(Dataset::new(dataset.columns().to_vec(), rows)?)
}

fn updated_cell(cell: &Value, update: &ColumnUpdate) -> Option<Value> {
    match update {
        ColumnUpdate::Set { value } => Some(value.clone()),
        ColumnUpdate::Multiply { factor } => {
            arithmetic(cell, *factor, i64::checked_mul, |a, b| a * b)
        }
        ColumnUpdate::Add { amount } => arithmetic(cell, *amount, i64::checked_add, |a, b| a + b),
        ColumnUpdate::Replace { from, to } => {
            Some(if cell == from { to.clone() } else { cell.clone() })
        }
        ColumnUpdate::Uppercase => cell.as_str().map(|text| Value::from(text.to_uppercase())),
        ColumnUpdate::Lowercase => cell.as_str().map(|text| Value::from(text.to_lowercase())),
        ColumnUpdate::Trim => cell.as_str().map(|text| Value::from(text.trim())),
    }
}

/// Integer cells stay integers when the operand is integral and the result fits.
fn arithmetic(
    cell: &Value,
    operand: f64,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Option<Value> {
    let Value::Number(number) = cell else {
        return None;
    };
    if let Some(integer) = number.as_i64() {
        if operand.fract() == 0.0 && operand.abs() < i64::MAX as f64 {
            if let Some(result) = int_op(integer, operand as i64) {
                return Some(Value::from(result));
            }
        }
    }
    Number::from_f64(float_op(number.as_f64()?, operand)).map(Value::Number)
}
