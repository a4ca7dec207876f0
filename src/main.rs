use sheetsql::api::SuccessEnvelope;
use sheetsql::config::{LlmConfig, PipelineConfig};
use sheetsql::export;
use sheetsql::ingestion::{validate_csv, RawUpload};
use sheetsql::llm::LlmClient;
use sheetsql::logging::init_logging;
use sheetsql::pipeline::Pipeline;
use sheetsql::LanguageModel;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "sheetsql")]
#[command(about = "Ask questions of a CSV file in plain language")]
#[command(version)]
struct Args {
    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat model name (or set LLM_MODEL env var)
    #[arg(long, global = true, env = "LLM_MODEL")]
    model: Option<String>,

    /// OpenAI-compatible base URL (or set LLM_BASE_URL env var)
    #[arg(long, global = true, env = "LLM_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the CSV structure and report its shape
    Validate {
        /// CSV file to check
        file: PathBuf,
    },
    /// Load a CSV file and print its schema and sample rows as JSON
    Schema {
        /// CSV file to load
        file: PathBuf,
    },
    /// Generate and run SQL for a request
    Query {
        /// CSV file to query
        file: PathBuf,

        /// The request in natural language
        request: String,

        /// Also write the result as CSV to this path
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Print the prompt sent to the model
        #[arg(long)]
        show_prompt: bool,
    },
    /// Print the prompt for a request without calling the model
    Prompt {
        /// CSV file to describe
        file: PathBuf,

        /// The request in natural language
        request: String,
    },
}

/// Stands in for the model on commands that never generate SQL.
struct NoModel;

#[async_trait]
impl LanguageModel for NoModel {
    async fn complete(&self, _prompt: &str) -> sheetsql::Result<String> {
        Err(sheetsql::SheetError::Config(
            "no language model configured for this command".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_logging();

    let args = Args::parse();
    let pipeline_config = PipelineConfig::from_env()?;

    match args.command {
        Commands::Validate { file } => {
            let upload = read_upload(&file).await?;
            let shape = validate_csv(&upload.bytes)?;
            println!(
                "{}: {} columns, {} data rows",
                upload.filename, shape.columns, shape.data_rows
            );
            Ok(())
        }
        Commands::Schema { file } => {
            let pipeline = Pipeline::new(pipeline_config, Arc::new(NoModel));
            let upload = read_upload(&file).await?;
            let prepared = pipeline.prepare(&upload)?;
            let report = serde_json::json!({
                "schema": prepared.schema,
                "sample": prepared.sample.rows,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Prompt { file, request } => {
            let pipeline = Pipeline::new(pipeline_config, Arc::new(NoModel));
            let upload = read_upload(&file).await?;
            let prepared = pipeline.prepare(&upload)?;
            println!("{}", pipeline.compile_prompt(&request, &prepared)?);
            Ok(())
        }
        Commands::Query {
            file,
            request,
            csv,
            show_prompt,
        } => {
            let mut llm_config = LlmConfig::from_env()?;
            if let Some(key) = args.api_key {
                llm_config.api_key = key;
            }
            if let Some(model) = args.model {
                llm_config.model = model;
            }
            if let Some(base_url) = args.base_url {
                llm_config.base_url = base_url;
            }

            let client = LlmClient::new(&llm_config)?;
            info!("Using model {}", client.model());
            let pipeline = Pipeline::new(pipeline_config, Arc::new(client)).with_llm_limits(&llm_config);

            run_query(&pipeline, &file, &request, csv.as_deref(), show_prompt).await
        }
    }
}

async fn run_query(
    pipeline: &Pipeline,
    file: &Path,
    request: &str,
    csv_out: Option<&Path>,
    show_prompt: bool,
) -> Result<()> {
    let upload = read_upload(file).await?;
    let prepared = pipeline.prepare(&upload)?;
    drop(upload);

    if show_prompt {
        println!("{}\n", pipeline.compile_prompt(request, &prepared)?);
    }

    let output = pipeline.answer(request, prepared).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&SuccessEnvelope::from_output(&output))?
    );
    if output.result.truncated {
        eprintln!(
            "Result truncated to {} rows",
            pipeline.config().max_result_rows
        );
    }

    if let Some(path) = csv_out {
        let csv = export::to_csv(&output.result)?;
        tokio::fs::write(path, csv)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote CSV to {}", path.display());
    }
    Ok(())
}

async fn read_upload(path: &Path) -> Result<RawUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(RawUpload::new(filename, bytes))
}
