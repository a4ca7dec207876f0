//! JSON contracts exchanged with the presentation layer.

use crate::error::SheetError;
use crate::export;
use crate::pipeline::PipelineOutput;
use serde::{Deserialize, Serialize};

/// Body of `POST /generate_sql`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateSqlRequest {
    #[serde(default)]
    pub text: Option<String>,

    /// Opaque reference to the uploaded file (URL or data-dir path).
    #[serde(default, rename = "filePath")]
    pub file_path: Option<String>,
}

impl GenerateSqlRequest {
    /// Both fields, when present and non-blank.
    pub fn required(&self) -> Option<(&str, &str)> {
        let text = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let file_path = self.file_path.as_deref().map(str::trim).filter(|p| !p.is_empty())?;
        Some((text, file_path))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessEnvelope {
    pub success: bool,
    pub data: serde_json::Value,
    pub query: String,
    pub message: String,
}

impl SuccessEnvelope {
    pub fn from_output(output: &PipelineOutput) -> Self {
        Self {
            success: true,
            data: export::to_json(&output.result),
            query: output.query.clone(),
            message: "Query executed successfully".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: kind.into(),
            stack: None,
        }
    }

    /// `stack` carries the error's debug chain when `expose_stack` is set.
    pub fn from_error(err: &SheetError, expose_stack: bool) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
            stack: expose_stack.then(|| format!("{:?}", err)),
        }
    }
}
