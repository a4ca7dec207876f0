use async_trait::async_trait;
use sheetsql::{LanguageModel, Result};
use std::sync::Mutex;

/// Replies with a fixed completion and records every prompt.
pub struct ScriptedModel {
    reply: String,
    pub prompts: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedModel {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

pub const PEOPLE_CSV: &str = "name,age\nAlice,30\nBob,25\n";
