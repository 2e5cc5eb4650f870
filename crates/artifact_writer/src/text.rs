use std::fmt::Write as _;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tabular_contract::{ArtifactCodec, CodecError, Dataset, ExportFormat, Row};

use crate::encoding::TextEncoding;

/// Built-in codec for the text formats.
///
/// Excel and Parquet are reported as [`CodecError::UnsupportedFormat`]; a
/// caller that needs them supplies its own [`ArtifactCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl ArtifactCodec for TextCodec {
    fn encode(
        &self,
        dataset: &Dataset,
        format: ExportFormat,
        encoding: &str,
    ) -> Result<Vec<u8>, CodecError> {
        let text = match format {
            ExportFormat::Csv => delimited(dataset, ','),
            ExportFormat::Tsv => delimited(dataset, '\t'),
            // JSON is always UTF-8.
            ExportFormat::Json => return Ok(serde_json::to_vec_pretty(&Records(dataset))?),
            ExportFormat::Html => html_table(dataset),
            ExportFormat::Markdown => markdown_table(dataset),
            ExportFormat::Excel | ExportFormat::Parquet => {
                return Err(CodecError::UnsupportedFormat { format })
            }
        };
        TextEncoding::resolve(encoding)?.encode(&text)
    }
}

/// Plain-text rendering of a cell: empty for null, unquoted for strings.
fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn delimited(dataset: &Dataset, delimiter: char) -> String {
    let mut out = String::new();
    push_delimited_line(&mut out, dataset.columns().iter().cloned(), delimiter);
    for row in dataset.rows() {
        push_delimited_line(&mut out, row.iter().map(cell_text), delimiter);
    }
    out
}

fn push_delimited_line(out: &mut String, fields: impl Iterator<Item = String>, delimiter: char) {
    for (index, field) in fields.enumerate() {
        if index > 0 {
            out.push(delimiter);
        }
        let needs_quotes = field
            .chars()
            .any(|c| c == delimiter || c == '"' || c == '\n' || c == '\r');
        if needs_quotes {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&field);
        }
    }
    out.push('\n');
}

/// Serializes rows as JSON objects whose keys keep column order.
struct Records<'a>(&'a Dataset);

struct Record<'a> {
    columns: &'a [String],
    row: &'a Row,
}

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.row_count()))?;
        for row in self.0.rows() {
            seq.serialize_element(&Record {
                columns: self.0.columns(),
                row,
            })?;
        }
        seq.end()
    }
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, cell) in self.columns.iter().zip(self.row) {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

fn html_table(dataset: &Dataset) -> String {
    let mut out = String::from("<table>\n  <thead>\n    <tr>\n");
    for column in dataset.columns() {
        let _ = writeln!(out, "      <th>{}</th>", escape_html(column));
    }
    out.push_str("    </tr>\n  </thead>\n  <tbody>\n");
    for row in dataset.rows() {
        out.push_str("    <tr>\n");
        for cell in row {
            let _ = writeln!(out, "      <td>{}</td>", escape_html(&cell_text(cell)));
        }
        out.push_str("    </tr>\n");
    }
    out.push_str("  </tbody>\n</table>\n");
    out
}

fn markdown_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn markdown_table(dataset: &Dataset) -> String {
    let mut out = String::new();
    let header: Vec<String> = dataset.columns().iter().map(|c| markdown_cell(c)).collect();
    let _ = writeln!(out, "| {} |", header.join(" | "));
    let rule: Vec<&str> = header.iter().map(|_| "---").collect();
    let _ = writeln!(out, "| {} |", rule.join(" | "));
    for row in dataset.rows() {
        let cells: Vec<String> = row.iter().map(|cell| markdown_cell(&cell_text(cell))).collect();
        let _ = writeln!(out, "| {} |", cells.join(" | "));
    }
    out
}
