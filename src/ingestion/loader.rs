//! Tabular loader.
//!
//! Stages the record lines the validator counted in a temporary file and
//! reads them into a DataFrame with fixed CSV options. Every column is ingested as text; typing
//! is left to introspection and to casts in the generated SQL.

use crate::error::{LoadError, Result};
use crate::ingestion::validator::record_lines;
use crate::session::Session;
use polars::prelude::*;
use std::io::{BufWriter, Write};
use tracing::{debug, info};

/// CSV ingestion options. Fixed for every upload.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub separator: u8,
    pub has_header: bool,
    pub quote_char: Option<u8>,
    pub skip_rows: usize,
    /// Tolerate malformed rows instead of failing the load.
    pub ignore_errors: bool,
    /// Long rows are cut, short rows are padded with nulls.
    pub truncate_ragged_lines: bool,
    pub missing_is_null: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            separator: b',',
            has_header: true,
            quote_char: Some(b'"'),
            skip_rows: 0,
            ignore_errors: true,
            truncate_ragged_lines: true,
            missing_is_null: true,
        }
    }
}

pub struct TabularLoader {
    table_name: String,
    options: LoadOptions,
}

impl TabularLoader {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            options: LoadOptions::default(),
        }
    }

    /// Materialize `bytes` as the session's single relation.
    ///
    /// Blank and whitespace-only lines are dropped before staging, so the
    /// relation has one row per record line. The staging file is removed
    /// when this returns, on success and failure.
    pub fn load(&self, bytes: &[u8]) -> Result<Session> {
        let staging = tempfile::Builder::new()
            .prefix("sheetsql-")
            .suffix(".csv")
            .tempfile()
            .map_err(|e| LoadError::LoadFailure(format!("Failed to create staging file: {}", e)))?;
        debug!("Staging {} bytes at {}", bytes.len(), staging.path().display());

        let content = String::from_utf8_lossy(bytes);
        {
            let mut handle = BufWriter::new(staging.as_file());
            record_lines(&content)
                .try_for_each(|line| writeln!(handle, "{}", line))
                .and_then(|_| handle.flush())
                .map_err(|e| LoadError::LoadFailure(format!("Failed to stage upload: {}", e)))?;
        }

        let opts = &self.options;
        // Schema inference over zero rows leaves every column as text.
        let frame = LazyCsvReader::new(staging.path())
            .with_separator(opts.separator)
            .with_has_header(opts.has_header)
            .with_quote_char(opts.quote_char)
            .with_skip_rows(opts.skip_rows)
            .with_infer_schema_length(Some(0))
            .with_ignore_errors(opts.ignore_errors)
            .with_truncate_ragged_lines(opts.truncate_ragged_lines)
            .with_missing_is_null(opts.missing_is_null)
            .finish()
            .and_then(|lf| lf.collect())
            .map_err(|e| LoadError::LoadFailure(e.to_string()))?;

        drop(staging);

        if frame.height() == 0 || frame.width() == 0 {
            return Err(LoadError::EmptyRelation.into());
        }

        info!(
            "Loaded table '{}' with {} rows and {} columns",
            self.table_name,
            frame.height(),
            frame.width()
        );

        Ok(Session::new(self.table_name.clone(), frame))
    }
}
