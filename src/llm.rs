use crate::config::LlmConfig;
use crate::error::{Result, SheetError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Text-completion capability used for SQL generation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(SheetError::Config(
                "OPENAI_API_KEY is not set (use --api-key or the environment)".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SheetError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "Return a single SQL query only, no text."},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    SheetError::LlmUnavailable(e.to_string())
                } else {
                    SheetError::Llm(format!("LLM API call failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SheetError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SheetError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }
}

/// Pull the first choice's message text out of a chat completion body.
fn extract_content(response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(SheetError::Llm(format!("LLM API error: {}", error)));
    }

    let choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| SheetError::Llm("No choices in LLM response".to_string()))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("content_filter") => {
            return Err(SheetError::Llm("LLM response was filtered by content policy".to_string()))
        }
        Some("length") => warn!("LLM response was truncated due to length limit"),
        _ => {}
    }

    choice["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| SheetError::Llm("No content in LLM response".to_string()))
}

/// Call the model under a deadline.
///
/// A timeout or transport failure is `LlmUnavailable` and gets at most
/// `max_retries` (capped at one) further attempts. Any other failure, and
/// any text the model does return, is passed through untouched.
pub async fn generate_with_timeout(
    model: &dyn LanguageModel,
    prompt: &str,
    timeout: Duration,
    max_retries: u32,
) -> Result<String> {
    let attempts = 1 + max_retries.min(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        debug!("LLM attempt {}/{}", attempt, attempts);
        let outcome = match tokio::time::timeout(timeout, model.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(SheetError::LlmUnavailable(format!(
                "no response within {}s",
                timeout.as_secs_f32()
            ))),
        };

        match outcome {
            Ok(text) => {
                info!("LLM returned {} characters", text.len());
                return Ok(text);
            }
            Err(SheetError::LlmUnavailable(reason)) => {
                warn!("LLM unavailable on attempt {}: {}", attempt, reason);
                last_err = Some(SheetError::LlmUnavailable(reason));
            }
            Err(other) => return Err(other),
        }
    }

    Err(last_err.unwrap_or_else(|| SheetError::LlmUnavailable("no attempt made".to_string())))
}
