use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::HistoryError;
use crate::log::HistoryLog;
use crate::schema::HistoryListing;
use crate::store::now_rfc3339;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryExportFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryExport {
    pub path: PathBuf,
    pub operations: usize,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    session_id: &'a str,
    exported_at: String,
    total_operations: usize,
    current_position: usize,
    operations: Vec<HistoryListing>,
}

const CSV_HEADER: &str = "index,operation_id,timestamp,operation_kind,details,has_snapshot";

impl HistoryLog {
    /// Writes the entries to `dest` without snapshot payloads.
    pub fn export(
        &self,
        dest: &Path,
        format: HistoryExportFormat,
    ) -> Result<HistoryExport, HistoryError> {
        let operations = self.list(None);
        let count = operations.len();

        let body = match format {
            HistoryExportFormat::Json => {
                let document = ExportDocument {
                    session_id: self.session_id(),
                    exported_at: now_rfc3339()?,
                    total_operations: count,
                    current_position: self.cursor().map_or(0, |cursor| cursor + 1),
                    operations,
                };
                serde_json::to_string_pretty(&document)
                    .map_err(|source| HistoryError::json_serialize(dest, source))?
            }
            HistoryExportFormat::Csv => {
                let mut body = String::from(CSV_HEADER);
                body.push('\n');
                for listing in &operations {
                    let details = serde_json::to_string(&listing.details)
                        .map_err(|source| HistoryError::json_serialize(dest, source))?;
                    let fields = [
                        listing.index.to_string(),
                        listing.operation_id.clone(),
                        listing.timestamp.clone(),
                        listing.operation_kind.to_string(),
                        details,
                        listing.has_snapshot.to_string(),
                    ];
                    let line = fields
                        .iter()
                        .map(|field| csv_field(field))
                        .collect::<Vec<_>>()
                        .join(",");
                    body.push_str(&line);
                    body.push('\n');
                }
                body
            }
        };

        if let Some(parent) = dest.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| HistoryError::io("creating export directory", parent, source))?;
        }
        fs::write(dest, body)
            .map_err(|source| HistoryError::io("writing history export", dest, source))?;

        tracing::info!(
            session_id = %self.session_id(),
            path = %dest.display(),
            operations = count,
            "history exported"
        );
        Ok(HistoryExport {
            path: dest.to_path_buf(),
            operations: count,
        })
    }
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
