use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Call a real model; when false the offline mock model answers.
    pub enabled: bool,
    /// OpenAI-compatible API base URL.
    ///
    /// Examples:
    /// - OpenAI:       https://api.openai.com/v1
    /// - Groq:         https://api.groq.com/openai/v1
    /// - Local Ollama: http://localhost:11434/v1
    /// - Local vLLM:   http://localhost:8000/v1
    pub base_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Comma-separated model list for failover.
    ///
    /// First model is primary; on 429/quota exhaustion, auto-switch to next.
    pub models: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Model used by the `api` embedding backend.
    pub embedding_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            api_key: String::new(),
            models: String::new(),
            temperature: 0.2,
            max_tokens: 2048,
            embedding_model: "text-embedding-3-small".to_string(),
        }
    }
}

impl LlmConfig {
    /// Parsed failover order, blanks dropped.
    pub fn model_list(&self) -> Vec<String> {
        self.models
            .split(',')
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }

    pub fn redacted_api_key(&self) -> String {
        mask_api_key(&self.api_key)
    }

    pub fn redacted_for_display(&self) -> Self {
        let mut redacted = self.clone();
        redacted.api_key = redacted.redacted_api_key();
        redacted
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("api_key", &self.redacted_api_key())
            .field("models", &self.models)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl fmt::Display for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "enabled={}, base_url=\"{}\", api_key=\"{}\", models=\"{}\"",
            self.enabled,
            self.base_url,
            self.redacted_api_key(),
            self.models
        )
    }
}

fn mask_api_key(api_key: &str) -> String {
    if api_key.is_empty() {
        return String::new();
    }

    let char_count = api_key.chars().count();
    let prefix: String = api_key.chars().take(3).collect();
    let suffix: String = api_key.chars().skip(char_count.saturating_sub(4)).collect();

    if char_count <= 4 {
        format!("***{suffix}")
    } else {
        format!("{prefix}...{suffix}")
    }
}
