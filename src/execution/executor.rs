//! Query executor.
//!
//! Runs one guarded statement against a session. Engine errors are wrapped
//! verbatim; a query that matches nothing is reported as `EmptyResult`.

use crate::error::{ExecutionError, Result};
use crate::execution::result::QueryResult;
use crate::sanitizer::GeneratedQuery;
use crate::session::Session;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// A successful execution together with the statement that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedQuery {
    pub query: String,
    pub result: QueryResult,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor {
    max_rows: usize,
}

impl QueryExecutor {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }

    pub fn execute(&self, session: &Session, query: &GeneratedQuery) -> Result<ExecutedQuery> {
        let start_time = Instant::now();
        info!("Executing generated SQL on session {}: {}", session.id(), query);

        let frame = session
            .query(query.as_str())
            .map_err(|e| ExecutionError::QueryExecutionError(e.to_string()))?;

        if frame.height() == 0 {
            return Err(ExecutionError::EmptyResult.into());
        }

        let total_rows = frame.height();
        let truncated = total_rows > self.max_rows;
        let frame = if truncated {
            warn!("Result has {} rows, keeping the first {}", total_rows, self.max_rows);
            frame.head(Some(self.max_rows))
        } else {
            frame
        };

        let mut result = QueryResult::from_frame(&frame)?;
        result.truncated = truncated;

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        info!("Query returned {} rows in {}ms", result.len(), execution_time_ms);

        Ok(ExecutedQuery {
            query: query.to_string(),
            result,
            execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SheetError;
    use crate::ingestion::TabularLoader;
    use crate::sanitizer::SqlGuard;
    use serde_json::Value;

    fn session() -> Session {
        TabularLoader::new("uploaded_csv")
            .load(b"name,age\nAlice,30\nBob,25\nCara,41\n")
            .unwrap()
    }

    fn guarded(sql: &str) -> GeneratedQuery {
        SqlGuard::new("uploaded_csv").check(sql).unwrap()
    }

    #[test]
    fn test_cast_comparison_on_text_columns() {
        let executed = QueryExecutor::new(100)
            .execute(
                &session(),
                &guarded("SELECT name, age FROM uploaded_csv WHERE CAST(age AS INTEGER) > 26 ORDER BY name;"),
            )
            .unwrap();

        assert_eq!(executed.result.len(), 2);
        assert_eq!(executed.result.rows[0]["name"], Value::from("Alice"));
        assert_eq!(executed.result.rows[1]["name"], Value::from("Cara"));
        assert_eq!(
            executed.query,
            "SELECT name, age FROM uploaded_csv WHERE CAST(age AS INTEGER) > 26 ORDER BY name;"
        );
    }

    #[test]
    fn test_zero_rows_is_empty_result() {
        let err = QueryExecutor::new(100)
            .execute(&session(), &guarded("SELECT * FROM uploaded_csv WHERE name = 'Zed';"))
            .unwrap_err();
        assert!(matches!(err, SheetError::Execution(ExecutionError::EmptyResult)));
    }

    #[test]
    fn test_unknown_column_surfaces_engine_error() {
        let err = QueryExecutor::new(100)
            .execute(&session(), &guarded("SELECT salary FROM uploaded_csv;"))
            .unwrap_err();
        match err {
            SheetError::Execution(ExecutionError::QueryExecutionError(detail)) => {
                assert!(detail.contains("salary"), "unexpected detail: {}", detail)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_large_results_are_truncated() {
        let executed = QueryExecutor::new(2)
            .execute(&session(), &guarded("SELECT * FROM uploaded_csv;"))
            .unwrap();
        assert_eq!(executed.result.len(), 2);
        assert!(executed.result.truncated);
    }
}
