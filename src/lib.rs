pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod export;
pub mod ingestion;
pub mod introspection;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod sanitizer;
pub mod server;
pub mod session;

pub use config::{AppConfig, LlmConfig, PipelineConfig, ServerConfig};
pub use error::{Result, SheetError};
pub use execution::{QueryExecutor, QueryResult};
pub use ingestion::{ByteSource, RawUpload, ReferenceSource, TabularLoader};
pub use llm::{LanguageModel, LlmClient};
pub use pipeline::{Pipeline, PipelineOutput};
pub use server::Server;
pub use session::Session;
