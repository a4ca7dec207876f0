//! JSON and CSV renderings of a query result.
//!
//! CSV values containing a comma are wrapped in double quotes. Nothing else
//! is escaped, so output reads back through `split_csv_line`.

use crate::error::{ExportError, Result};
use crate::execution::result::QueryResult;
use serde_json::Value;

pub const CSV_CONTENT_TYPE: &str = "text/csv";
pub const CSV_FILENAME: &str = "query_results.csv";

/// Rows as a JSON array of objects, keys in column order.
pub fn to_json(result: &QueryResult) -> Value {
    Value::Array(result.rows.iter().cloned().map(Value::Object).collect())
}

/// Header from the first row's keys, then one line per row. Nulls are empty.
pub fn to_csv(result: &QueryResult) -> Result<String> {
    let first = result.rows.first().ok_or(ExportError::NoDataToExport)?;
    let headers: Vec<&String> = first.keys().collect();

    let mut lines = Vec::with_capacity(result.rows.len() + 1);
    lines.push(headers.iter().map(|h| h.as_str()).collect::<Vec<_>>().join(","));

    for row in &result.rows {
        let fields: Vec<String> = headers
            .iter()
            .map(|h| csv_field(row.get(h.as_str()).unwrap_or(&Value::Null)))
            .collect();
        lines.push(fields.join(","));
    }

    Ok(lines.join("\n"))
}

fn csv_field(value: &Value) -> String {
    let text = match value {
        Value::Null => return String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.contains(',') {
        format!("\"{}\"", text)
    } else {
        text
    }
}
