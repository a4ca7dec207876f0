//! Schema & sample introspection of a loaded relation.
//!
//! Columns are stored as text, so `describe` also runs a bounded inference
//! pass to tell the prompt what each column actually holds.

use crate::error::{Result, SheetError};
use crate::execution::result::QueryResult;
use crate::session::Session;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Type a text column can be cast to without loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InferredType {
    Bigint,
    Double,
    Boolean,
    Date,
    Varchar,
}

impl InferredType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            InferredType::Bigint => "BIGINT",
            InferredType::Double => "DOUBLE",
            InferredType::Boolean => "BOOLEAN",
            InferredType::Date => "DATE",
            InferredType::Varchar => "VARCHAR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub column_name: String,
    /// Type the engine holds the column in.
    pub storage_type: String,
    pub inferred_type: InferredType,
    pub null_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.column_name.as_str()).collect()
    }
}

pub struct Introspector {
    type_sample_rows: usize,
}

impl Introspector {
    pub fn new(type_sample_rows: usize) -> Self {
        Self { type_sample_rows }
    }

    pub fn describe(&self, session: &Session) -> Result<TableSchema> {
        let frame = session.frame();
        let mut columns = Vec::with_capacity(frame.width());

        for series in frame.get_columns() {
            let inferred_type = match series.dtype() {
                DataType::String => {
                    let values = series.str().map_err(|e| {
                        SheetError::Introspection(format!("{}: {}", series.name(), e))
                    })?;
                    infer_column_type(values.into_iter().flatten(), self.type_sample_rows)
                }
                DataType::Boolean => InferredType::Boolean,
                DataType::Date => InferredType::Date,
                dtype if dtype.is_integer() => InferredType::Bigint,
                dtype if dtype.is_float() => InferredType::Double,
                _ => InferredType::Varchar,
            };

            columns.push(ColumnInfo {
                column_name: series.name().to_string(),
                storage_type: storage_type_name(series.dtype()),
                inferred_type,
                null_count: series.null_count(),
            });
        }

        debug!(
            "Schema for '{}': {:?}",
            session.table_name(),
            columns
                .iter()
                .map(|c| (&c.column_name, c.inferred_type))
                .collect::<Vec<_>>()
        );

        Ok(TableSchema {
            table_name: session.table_name().to_string(),
            columns,
        })
    }

    /// First `limit` rows of the relation. May be empty.
    pub fn sample(&self, session: &Session, limit: usize) -> Result<QueryResult> {
        let sql = format!("SELECT * FROM {} LIMIT {}", session.table_name(), limit);
        let frame = session
            .query(&sql)
            .map_err(|e| SheetError::Introspection(e.to_string()))?;
        let sample = QueryResult::from_frame(&frame)?;
        info!("Sampled {} rows from '{}'", sample.len(), session.table_name());
        Ok(sample)
    }
}

fn storage_type_name(dtype: &DataType) -> String {
    match dtype {
        DataType::String => "VARCHAR".to_string(),
        other => other.to_string().to_uppercase(),
    }
}

/// Narrowest type every inspected value parses as.
///
/// Looks at up to `limit` non-empty values; a column with none is `VARCHAR`.
pub fn infer_column_type<'a, I>(values: I, limit: usize) -> InferredType
where
    I: IntoIterator<Item = &'a str>,
{
    let mut bigint = true;
    let mut double = true;
    let mut boolean = true;
    let mut date = true;
    let mut seen = 0usize;

    for raw in values.into_iter() {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        if seen >= limit {
            break;
        }
        seen += 1;

        bigint = bigint && value.parse::<i64>().is_ok();
        double = double && value.parse::<f64>().map(|f| f.is_finite()).unwrap_or(false);
        boolean = boolean
            && (value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false"));
        date = date && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok();

        if !(bigint || double || boolean || date) {
            return InferredType::Varchar;
        }
    }

    if seen == 0 {
        InferredType::Varchar
    } else if bigint {
        InferredType::Bigint
    } else if double {
        InferredType::Double
    } else if boolean {
        InferredType::Boolean
    } else if date {
        InferredType::Date
    } else {
        InferredType::Varchar
    }
}
