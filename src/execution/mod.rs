//! Execution of guarded SQL against a per-request session.

pub mod executor;
pub mod result;

pub use executor::{ExecutedQuery, QueryExecutor};
pub use result::{QueryResult, Row};
