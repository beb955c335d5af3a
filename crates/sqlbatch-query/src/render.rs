//! Result set rendering
//!
//! Rows are pulled from the driver's stream one at a time. The `tsv` and
//! `json` formats write each row as soon as it is read, while `table` has to
//! see every row to size its columns and so buffers formatted cells (never
//! the raw rows) until the stream ends or fails.

use std::io::Write;

use comfy_table::{Table, presets};
use serde::{Deserialize, Serialize};
use sqlbatch_core::{Result, RowStream, SqlBatchError, Value};
use strum::{Display, EnumString, VariantNames};

/// How query results are written
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Display,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Bordered text table
    #[default]
    Table,
    /// Header line plus one tab-separated line per row
    Tsv,
    /// One JSON object per row
    Json,
}

/// Write a result set to `out` and return how many rows were written.
///
/// Nothing is written for a result with no columns. A failing row read ends
/// rendering with a `Render` error; output already written stays written.
pub fn render_rows<W: Write + ?Sized>(
    out: &mut W,
    format: OutputFormat,
    columns: &[String],
    rows: &mut RowStream<'_>,
) -> Result<u64> {
    if columns.is_empty() {
        return Ok(0);
    }

    match format {
        OutputFormat::Table => render_table(out, columns, rows),
        OutputFormat::Tsv => render_tsv(out, columns, rows),
        OutputFormat::Json => render_json(out, columns, rows),
    }
}

fn render_table<W: Write + ?Sized>(
    out: &mut W,
    columns: &[String],
    rows: &mut RowStream<'_>,
) -> Result<u64> {
    let mut table = Table::new();
    table.load_preset(presets::ASCII_FULL_CONDENSED);
    table.set_header(columns.iter().map(String::as_str));

    let mut count = 0u64;
    let mut failure = None;
    for row in rows {
        match row {
            Ok(values) => {
                table.add_row(values.iter().map(format_cell));
                count += 1;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    writeln!(out, "{table}").map_err(|e| SqlBatchError::render(e.into()))?;

    match failure {
        Some(e) => Err(SqlBatchError::render(e)),
        None => Ok(count),
    }
}

fn render_tsv<W: Write + ?Sized>(
    out: &mut W,
    columns: &[String],
    rows: &mut RowStream<'_>,
) -> Result<u64> {
    let header: Vec<String> = columns.iter().map(|c| escape_tsv(c)).collect();
    writeln!(out, "{}", header.join("\t")).map_err(|e| SqlBatchError::render(e.into()))?;

    let mut count = 0u64;
    for row in rows {
        let values = row.map_err(SqlBatchError::render)?;
        let line: Vec<String> = values.iter().map(|v| escape_tsv(&format_cell(v))).collect();
        writeln!(out, "{}", line.join("\t")).map_err(|e| SqlBatchError::render(e.into()))?;
        count += 1;
    }
    Ok(count)
}

fn render_json<W: Write + ?Sized>(
    out: &mut W,
    columns: &[String],
    rows: &mut RowStream<'_>,
) -> Result<u64> {
    let mut count = 0u64;
    for row in rows {
        let values = row.map_err(SqlBatchError::render)?;
        let object: serde_json::Map<String, serde_json::Value> = columns
            .iter()
            .cloned()
            .zip(values.iter().map(json_value))
            .collect();
        serde_json::to_writer(&mut *out, &object)
            .map_err(|e| SqlBatchError::render(std::io::Error::from(e).into()))?;
        writeln!(out).map_err(|e| SqlBatchError::render(e.into()))?;
        count += 1;
    }
    Ok(count)
}

/// Text shown for one value in `table` and `tsv` output
pub fn format_cell(value: &Value) -> String {
    value.to_string()
}

fn escape_tsv(field: &str) -> String {
    let mut escaped = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        // NaN and infinities have no JSON form and become null
        Value::Real(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(b) => serde_json::Value::String(hex::encode(b)),
    }
}
