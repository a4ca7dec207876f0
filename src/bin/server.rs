//! HTTP server for SQL generation over uploaded CSV files.

use sheetsql::config::AppConfig;
use sheetsql::ingestion::ReferenceSource;
use sheetsql::llm::LlmClient;
use sheetsql::logging::init_logging;
use sheetsql::pipeline::Pipeline;
use sheetsql::server::Server;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_logging();

    let config = AppConfig::from_env()?;
    info!(
        "Starting sheetsql server on {}:{} (model {})",
        config.server.host, config.server.port, config.llm.model
    );
    if config.server.data_dir.is_none() {
        warn!("SHEETSQL_DATA_DIR not set, only http(s) file references are accepted");
    }

    let llm = LlmClient::new(&config.llm)?;
    let pipeline = Pipeline::new(config.pipeline.clone(), Arc::new(llm)).with_llm_limits(&config.llm);
    let source = ReferenceSource::new(
        config.pipeline.max_upload_bytes,
        config.server.fetch_timeout,
        config.server.data_dir.clone(),
    )?;

    Server::new(config.server, Arc::new(pipeline), Arc::new(source))
        .serve()
        .await?;
    Ok(())
}
