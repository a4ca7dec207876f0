//! Upload-to-answer pipeline.
//!
//! bytes -> validator -> loader -> introspector -> prompt -> model ->
//! sanitizer/guard -> executor. Stages run strictly in sequence and the
//! request's session and staging file are released before `run` returns.

use crate::config::{LlmConfig, PipelineConfig};
use crate::error::{ExecutionError, LoadError, Result, SheetError, ValidationError};
use crate::execution::{ExecutedQuery, QueryExecutor, QueryResult};
use crate::ingestion::{validate_csv, ByteSource, RawUpload, TabularLoader};
use crate::introspection::{Introspector, TableSchema};
use crate::llm::{generate_with_timeout, LanguageModel};
use crate::prompt::PromptCompiler;
use crate::sanitizer::{sanitize, SqlGuard};
use crate::session::Session;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, Instrument, Span};
use uuid::Uuid;

/// Loaded upload with its introspection, ready for prompting.
#[derive(Debug)]
pub struct PreparedUpload {
    pub session: Session,
    pub schema: TableSchema,
    pub sample: QueryResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub query: String,
    pub result: QueryResult,
    pub schema: TableSchema,
    pub elapsed_ms: u64,
}

pub struct Pipeline {
    config: PipelineConfig,
    llm: Arc<dyn LanguageModel>,
    llm_timeout: Duration,
    llm_max_retries: u32,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, llm: Arc<dyn LanguageModel>) -> Self {
        let defaults = LlmConfig::default();
        Self {
            config,
            llm,
            llm_timeout: defaults.timeout,
            llm_max_retries: defaults.max_retries,
        }
    }

    pub fn with_llm_limits(mut self, llm_config: &LlmConfig) -> Self {
        self.llm_timeout = llm_config.timeout;
        self.llm_max_retries = llm_config.max_retries;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate, load and introspect an upload.
    ///
    /// Blocking: stages a file and parses it. `run` calls this on the
    /// blocking pool.
    pub fn prepare(&self, upload: &RawUpload) -> Result<PreparedUpload> {
        prepare_upload(&self.config, upload)
    }

    pub fn compile_prompt(&self, request: &str, prepared: &PreparedUpload) -> Result<String> {
        PromptCompiler::new(&self.config.table_name).compile(request, &prepared.schema, &prepared.sample)
    }

    /// Answer `request` against `upload`.
    pub async fn run(&self, request: &str, upload: RawUpload) -> Result<PipelineOutput> {
        let span = info_span!("request", id = %Uuid::new_v4(), file = %upload.filename);
        let outcome = self.run_inner(request, upload).instrument(span.clone()).await;
        if let Err(e) = &outcome {
            span.in_scope(|| error!("Request failed ({}): {}", e.kind(), e));
        }
        outcome
    }

    /// Fetch the upload by reference, then `run`.
    pub async fn run_from_reference(
        &self,
        source: &dyn ByteSource,
        request: &str,
        reference: &str,
    ) -> Result<PipelineOutput> {
        let upload = source.fetch(reference).await?;
        self.run(request, upload).await
    }

    async fn run_inner(&self, request: &str, upload: RawUpload) -> Result<PipelineOutput> {
        let config = self.config.clone();
        let span = Span::current();
        let prepared = tokio::task::spawn_blocking(move || span.in_scope(|| prepare_upload(&config, &upload)))
            .await
            .map_err(|e| SheetError::from(LoadError::LoadFailure(e.to_string())))??;
        self.answer(request, prepared).await
    }

    /// Prompt, generate, guard and execute against a prepared upload.
    /// The session is consumed and dropped when the query finishes.
    pub async fn answer(&self, request: &str, prepared: PreparedUpload) -> Result<PipelineOutput> {
        let started = Instant::now();

        let prompt = self.compile_prompt(request, &prepared)?;
        debug!("Prompt:\n{}", prompt);

        let raw = generate_with_timeout(self.llm.as_ref(), &prompt, self.llm_timeout, self.llm_max_retries)
            .await?;
        debug!("Generated SQL (before cleanup): {}", raw);

        let cleaned = sanitize(&raw)?;
        let query = SqlGuard::new(&self.config.table_name).check(&cleaned)?;
        info!("Final SQL query: {}", query);

        let PreparedUpload {
            session, schema, ..
        } = prepared;
        let executor = QueryExecutor::new(self.config.max_result_rows);
        let executed: ExecutedQuery = tokio::task::spawn_blocking(move || executor.execute(&session, &query))
            .await
            .map_err(|e| SheetError::from(ExecutionError::QueryExecutionError(e.to_string())))??;

        Ok(PipelineOutput {
            query: executed.query,
            result: executed.result,
            schema,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn prepare_upload(config: &PipelineConfig, upload: &RawUpload) -> Result<PreparedUpload> {
    if upload.bytes.len() > config.max_upload_bytes {
        return Err(ValidationError::TooLarge {
            size: upload.bytes.len(),
            limit: config.max_upload_bytes,
        }
        .into());
    }

    let shape = validate_csv(&upload.bytes)?;
    info!(
        "Validated '{}': {} columns, {} data rows",
        upload.filename, shape.columns, shape.data_rows
    );

    let session = TabularLoader::new(&config.table_name).load(&upload.bytes)?;

    let introspector = Introspector::new(config.type_sample_rows);
    let schema = introspector.describe(&session)?;
    let sample = introspector.sample(&session, config.sample_limit)?;

    Ok(PreparedUpload {
        session,
        schema,
        sample,
    })
}
