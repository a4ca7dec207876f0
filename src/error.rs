use thiserror::Error;

/// Structural problems found in raw CSV bytes before any load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("CSV file must have a header row and at least one data row")]
    EmptyOrHeaderOnly,

    #[error("CSV file must have at least one column")]
    NoColumns,

    #[error("Row {row} has {actual} columns, expected {expected}")]
    RowWidthMismatch {
        row: usize,
        actual: usize,
        expected: usize,
    },

    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Failed to load CSV: {0}")]
    LoadFailure(String),

    #[error("The uploaded CSV file is empty")]
    EmptyRelation,
}

/// Unusable model output, never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Failed to generate SQL query")]
    EmptyGeneratedQuery,

    #[error("Generated SQL contains {0} statements, expected exactly one")]
    MultipleStatements(usize),

    #[error("Generated SQL is not a read-only query: {0}")]
    NotReadOnly(String),

    #[error("Generated SQL references unknown table '{0}'")]
    ForeignTable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("SQL execution failed: {0}")]
    QueryExecutionError(String),

    #[error("Query returned no results")]
    EmptyResult,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("No data to convert to CSV")]
    NoDataToExport,
}

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Load(#[from] LoadError),

    #[error("Introspection error: {0}")]
    Introspection(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("{0}")]
    Generation(#[from] GenerationError),

    #[error("{0}")]
    Execution(#[from] ExecutionError),

    #[error("{0}")]
    Export(#[from] ExportError),

    #[error("Failed to fetch file: {0}")]
    Fetch(String),

    /// The reference names no file this service can read.
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SheetError {
    /// Stable label of the failure family, surfaced to API consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            SheetError::Validation(_) => "ValidationError",
            SheetError::Load(_) => "LoadError",
            SheetError::Introspection(_) => "IntrospectionError",
            SheetError::Prompt(_) => "PromptError",
            SheetError::Generation(_) => "GenerationError",
            SheetError::Execution(_) => "ExecutionError",
            SheetError::Export(_) => "ExportError",
            SheetError::Fetch(_) | SheetError::FileNotFound(_) => "FetchFailure",
            SheetError::LlmUnavailable(_) => "LLMUnavailable",
            SheetError::Llm(_) => "LLMError",
            SheetError::Config(_) => "ConfigError",
            SheetError::Io(_) => "IoError",
            SheetError::Json(_) => "JsonError",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            SheetError::Validation(_)
            | SheetError::Generation(_)
            | SheetError::Execution(ExecutionError::EmptyResult)
            | SheetError::Export(_) => 400,
            SheetError::FileNotFound(_) => 404,
            SheetError::Fetch(_) => 502,
            SheetError::Llm(_) => 502,
            SheetError::LlmUnavailable(_) => 504,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, SheetError>;
