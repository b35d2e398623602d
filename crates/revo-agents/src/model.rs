use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use revo_config::LlmConfig;
use serde::Serialize;

use crate::api_client::ApiModelManager;

const MOCK_SUMMARY_CHARS: usize = 80;

/// One prompt for a model manager.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, prompt: impl Into<String>) -> Self {
        let defaults = LlmConfig::default();
        Self {
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

/// Text generation backend used by agents.
#[async_trait]
pub trait ModelManager: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
    /// Short label for logs and status output.
    fn describe(&self) -> String;
}

/// Offline stand-in model.
///
/// Answers with queued scripted responses first, then with
/// `Mock response: <first line of the prompt>`.
#[derive(Debug, Default)]
pub struct MockModelManager {
    scripted: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<GenerationRequest>>,
}

impl MockModelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scripted: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelManager for MockModelManager {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.prompts
            .lock()
            .map_err(|_| anyhow!("mock model poisoned"))?
            .push(request.clone());

        let scripted = self
            .scripted
            .lock()
            .map_err(|_| anyhow!("mock model poisoned"))?
            .pop_front();
        if let Some(response) = scripted {
            return Ok(response);
        }

        let first_line = request
            .prompt
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("");
        let summary: String = first_line.chars().take(MOCK_SUMMARY_CHARS).collect();
        Ok(format!("Mock response: {summary}"))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// API-backed manager when `[llm] enabled`, otherwise the mock.
pub fn build_model_manager(config: &LlmConfig) -> Result<Arc<dyn ModelManager>> {
    if !config.enabled {
        tracing::debug!("llm disabled, using mock model manager");
        return Ok(Arc::new(MockModelManager::new()));
    }
    Ok(Arc::new(ApiModelManager::from_config(config)?))
}
