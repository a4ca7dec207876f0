//! Runtime configuration.
//!
//! Values come from the process environment (a `.env` file is loaded by the
//! binaries through `dotenv` before this runs); CLI flags override them.

use crate::error::{Result, SheetError};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TABLE_NAME: &str = "uploaded_csv";
pub const DEFAULT_SAMPLE_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Extra attempts after a transport failure. Never more than one.
    pub max_retries: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 1,
            temperature: 0.0,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let timeout_secs: u64 = env_parse("LLM_TIMEOUT_SECS", defaults.timeout.as_secs())?;
        let max_retries: u32 = env_parse("LLM_MAX_RETRIES", defaults.max_retries)?;

        Ok(Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: std::env::var("LLM_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("LLM_BASE_URL").unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(timeout_secs),
            max_retries: max_retries.min(1),
            temperature: defaults.temperature,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub table_name: String,
    pub sample_limit: usize,
    /// Non-null values inspected per column when inferring a type.
    pub type_sample_rows: usize,
    pub max_result_rows: usize,
    pub max_upload_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            type_sample_rows: 1000,
            max_result_rows: 10_000,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_result_rows: env_parse("SHEETSQL_MAX_RESULT_ROWS", defaults.max_result_rows)?,
            max_upload_bytes: env_parse("SHEETSQL_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            ..defaults
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root directory for non-URL file references. `None` disables them.
    pub data_dir: Option<PathBuf>,
    /// Attach the error chain to failure envelopes.
    pub expose_stack: bool,
    pub allowed_origins: Vec<String>,
    /// Whole-request limit for fetching an upload over HTTP.
    pub fetch_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            data_dir: None,
            expose_stack: false,
            allowed_origins: Vec::new(),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let fetch_timeout_secs: u64 =
            env_parse("SHEETSQL_FETCH_TIMEOUT_SECS", defaults.fetch_timeout.as_secs())?;
        let allowed_origins = std::env::var("SHEETSQL_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT", defaults.port)?,
            data_dir: std::env::var("SHEETSQL_DATA_DIR").ok().map(PathBuf::from),
            expose_stack: std::env::var("APP_ENV")
                .map(|v| v.eq_ignore_ascii_case("development"))
                .unwrap_or(false),
            allowed_origins,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            llm: LlmConfig::from_env()?,
            pipeline: PipelineConfig::from_env()?,
            server: ServerConfig::from_env()?,
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SheetError::Config(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}
