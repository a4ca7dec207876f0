//! Prompt compiler for SQL generation.
//!
//! Output is deterministic for a given request, schema and sample: role
//! framing, the request, sample rows, schema, then the numbered rules. The
//! rules steer the model; `sanitizer` enforces what matters.

use crate::error::{Result, SheetError};
use crate::execution::result::QueryResult;
use crate::introspection::TableSchema;
use serde_json::json;

pub const SQL_DIALECT: &str = "the Polars SQL engine";

pub struct PromptCompiler {
    table_name: String,
}

impl PromptCompiler {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }

    pub fn compile(&self, request: &str, schema: &TableSchema, sample: &QueryResult) -> Result<String> {
        let sample_json = serde_json::to_string(&sample.rows)
            .map_err(|e| SheetError::Prompt(format!("Failed to serialize sample rows: {}", e)))?;

        let schema_rows: Vec<serde_json::Value> = schema
            .columns
            .iter()
            .map(|c| {
                json!({
                    "column_name": c.column_name,
                    "column_type": c.storage_type,
                    "inferred_type": c.inferred_type.sql_name(),
                })
            })
            .collect();
        let schema_json = serde_json::to_string(&schema_rows)
            .map_err(|e| SheetError::Prompt(format!("Failed to serialize schema: {}", e)))?;

        let table = &self.table_name;
        Ok(format!(
            r#"You are an SQL query generator for {dialect}.
Given this request: "{request}"
and this table structure: {sample_json},
and schema: {schema_json},
generate ONLY a valid SQL query for table '{table}'.
Rules:
1. Use only basic SQL operations (SELECT, WHERE, GROUP BY, ORDER BY, LIMIT, aggregate functions)
2. Do not use any engine-specific extensions
3. Table name is '{table}' and no other table may be referenced
4. Do not include any explanations or comments
5. Do not include markdown formatting
6. Ensure the query ends with a semicolon
7. Every column is stored as text: CAST a column to its inferred_type before numeric or date comparison, arithmetic, ordering or aggregation"#,
            dialect = SQL_DIALECT,
            request = request.trim(),
        ))
    }
}
