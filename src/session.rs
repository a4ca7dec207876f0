//! Per-request relation store.
//!
//! A `Session` is created by the loader for one request and dropped when the
//! request finishes. Nothing here is shared between requests: every query
//! gets its own SQL context with exactly one registered table.

use polars::prelude::*;
use polars::sql::SQLContext;
use uuid::Uuid;

#[derive(Clone)]
pub struct Session {
    id: Uuid,
    table_name: String,
    frame: DataFrame,
}

impl Session {
    pub fn new(table_name: impl Into<String>, frame: DataFrame) -> Self {
        Self {
            id: Uuid::new_v4(),
            table_name: table_name.into(),
            frame,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn row_count(&self) -> usize {
        self.frame.height()
    }

    pub fn column_count(&self) -> usize {
        self.frame.width()
    }

    /// Run one SQL statement against the session's table.
    pub fn query(&self, sql: &str) -> PolarsResult<DataFrame> {
        let mut ctx = SQLContext::new();
        ctx.register(&self.table_name, self.frame.clone().lazy());
        ctx.execute(sql)?.collect()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("table_name", &self.table_name)
            .field("rows", &self.frame.height())
            .field("columns", &self.frame.width())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_sees_only_its_own_table() {
        let frame = df![
            "name" => ["Alice", "Bob"],
            "age" => ["30", "25"]
        ]
        .unwrap();
        let session = Session::new("uploaded_csv", frame);

        let out = session.query("SELECT name FROM uploaded_csv WHERE age = '25'").unwrap();
        assert_eq!(out.height(), 1);

        assert!(session.query("SELECT * FROM some_other_table").is_err());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let a = Session::new("uploaded_csv", df!["x" => ["1"]].unwrap());
        let b = Session::new("uploaded_csv", df!["y" => ["2", "3"]].unwrap());

        assert_ne!(a.id(), b.id());
        assert_eq!(a.query("SELECT * FROM uploaded_csv").unwrap().height(), 1);
        assert_eq!(b.query("SELECT * FROM uploaded_csv").unwrap().height(), 2);
    }
}
