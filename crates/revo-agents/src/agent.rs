use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use revo_config::LlmConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::knowledge::{KnowledgeHit, KnowledgeMemory};
use crate::model::{GenerationRequest, ModelManager};

const DEFAULT_KNOWLEDGE_LIMIT: usize = 3;
const REMEMBERED_RESPONSE_CHARS: usize = 500;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRequest {
    pub id: String,
    /// What the caller wants done, in plain language.
    pub task: String,
    pub code: Option<String>,
    pub language: Option<String>,
    pub context: Map<String, Value>,
}

impl AgentRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            task: task.into(),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub request_id: String,
    pub agent: String,
    pub success: bool,
    /// Raw model output.
    pub content: String,
    /// Structured output: parsed model JSON merged with agent-computed fields.
    pub data: Option<Value>,
    pub error: Option<String>,
    pub knowledge_used: usize,
    pub duration_ms: u64,
}

impl AgentResponse {
    pub(crate) fn failure(agent: &str, request_id: &str, error: impl Into<String>, started: Instant) -> Self {
        Self {
            request_id: request_id.to_string(),
            agent: agent.to_string(),
            success: false,
            content: String::new(),
            data: None,
            error: Some(error.into()),
            knowledge_used: 0,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;
    fn capabilities(&self) -> &'static [&'static str];
    /// Never fails: model and memory errors come back as `success = false`.
    async fn handle(&self, request: AgentRequest) -> AgentResponse;
}

/// Collaborators shared by every agent.
#[derive(Clone)]
pub struct AgentContext {
    pub model: Arc<dyn ModelManager>,
    pub knowledge: Arc<dyn KnowledgeMemory>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub knowledge_limit: usize,
}

impl AgentContext {
    pub fn new(model: Arc<dyn ModelManager>, knowledge: Arc<dyn KnowledgeMemory>) -> Self {
        Self::from_config(&LlmConfig::default(), model, knowledge)
    }

    pub fn from_config(
        config: &LlmConfig,
        model: Arc<dyn ModelManager>,
        knowledge: Arc<dyn KnowledgeMemory>,
    ) -> Self {
        Self {
            model,
            knowledge,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            knowledge_limit: DEFAULT_KNOWLEDGE_LIMIT,
        }
    }

    /// Shared agent pipeline: related knowledge into the prompt, one model
    /// call, JSON extraction, then the interaction is written back to memory.
    pub(crate) async fn invoke(&self, invocation: Invocation<'_>) -> AgentResponse {
        let started = Instant::now();
        let Invocation {
            agent,
            request,
            system_prompt,
            prompt,
            knowledge_query,
            tags,
            extra,
        } = invocation;

        let knowledge = match self
            .knowledge
            .search(&knowledge_query, self.knowledge_limit)
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(agent, %reason, "knowledge search failed, continuing without it");
                Vec::new()
            }
        };

        let generation = GenerationRequest::new(system_prompt, with_knowledge(&prompt, &knowledge))
            .with_sampling(self.temperature, self.max_tokens);
        let content = match self.model.generate(&generation).await {
            Ok(content) => content,
            Err(err) => {
                let reason = format!("{err:#}");
                error!(agent, request_id = %request.id, %reason, "model call failed");
                let mut response = AgentResponse::failure(agent, &request.id, reason, started);
                response.knowledge_used = knowledge.len();
                return response;
            }
        };

        let data = merge_data(extract_json(&content), extra);

        let memory = format!(
            "[{agent}] {}\n{}",
            request.task.trim(),
            truncate(&content, REMEMBERED_RESPONSE_CHARS)
        );
        if let Err(err) = self.knowledge.remember(&memory, &tags).await {
            let reason = format!("{err:#}");
            warn!(agent, %reason, "failed to record agent interaction");
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(agent, request_id = %request.id, duration_ms, knowledge = knowledge.len(), "agent request handled");
        AgentResponse {
            request_id: request.id.clone(),
            agent: agent.to_string(),
            success: true,
            content,
            data,
            error: None,
            knowledge_used: knowledge.len(),
            duration_ms,
        }
    }
}

pub(crate) struct Invocation<'a> {
    pub agent: &'static str,
    pub request: &'a AgentRequest,
    pub system_prompt: &'static str,
    pub prompt: String,
    pub knowledge_query: String,
    pub tags: Vec<String>,
    /// Agent-computed fields added to the response data.
    pub extra: Map<String, Value>,
}

fn with_knowledge(prompt: &str, knowledge: &[KnowledgeHit]) -> String {
    if knowledge.is_empty() {
        return prompt.to_string();
    }
    let mut out = String::from(prompt);
    out.push_str("\n\nRelated knowledge from earlier work:\n");
    for hit in knowledge {
        out.push_str(&format!("- ({:.2}) {}\n", hit.similarity, hit.content.trim()));
    }
    out
}

/// Find a JSON value in model output: the whole text, a fenced block, or the
/// outermost `{...}` span.
pub(crate) fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() || value.is_array() {
            return Some(value);
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str::<Value>(body[..end].trim()) {
                return Some(value);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

fn merge_data(parsed: Option<Value>, extra: Map<String, Value>) -> Option<Value> {
    let mut data = extra;
    match parsed {
        Some(Value::Object(fields)) => {
            for (key, value) in fields {
                data.entry(key).or_insert(value);
            }
        }
        Some(other) => {
            data.insert("result".to_string(), other);
        }
        None => {}
    }
    (!data.is_empty()).then_some(Value::Object(data))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json(r#"{"a":1}"#), Some(json!({"a": 1})));
        assert_eq!(
            extract_json("Here you go:\n```json\n{\"a\": 2}\n```\nthanks"),
            Some(json!({"a": 2}))
        );
        assert_eq!(
            extract_json("Result: {\"a\": {\"b\": 3}} done"),
            Some(json!({"a": {"b": 3}}))
        );
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("42"), None);
    }

    #[test]
    fn test_merge_data_prefers_agent_fields() {
        let mut extra = Map::new();
        extra.insert("lines".into(), json!(10));
        let merged = merge_data(Some(json!({"lines": 99, "summary": "ok"})), extra).unwrap();
        assert_eq!(merged["lines"], 10);
        assert_eq!(merged["summary"], "ok");

        let wrapped = merge_data(Some(json!([1, 2])), Map::new()).unwrap();
        assert_eq!(wrapped["result"], json!([1, 2]));
        assert!(merge_data(None, Map::new()).is_none());
    }

    #[test]
    fn test_with_knowledge_appends_hits() {
        let hits = vec![KnowledgeHit {
            content: "fixed by retry".into(),
            similarity: 0.812,
        }];
        let prompt = with_knowledge("Diagnose", &hits);
        assert!(prompt.starts_with("Diagnose\n\nRelated knowledge"));
        assert!(prompt.contains("- (0.81) fixed by retry"));
        assert_eq!(with_knowledge("Diagnose", &[]), "Diagnose");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[test]
    fn test_request_builder() {
        let request = AgentRequest::new("review")
            .with_code("fn main() {}")
            .with_language("rust")
            .with_context("file", json!("main.rs"));
        assert_eq!(request.id.len(), 26);
        assert_eq!(request.language.as_deref(), Some("rust"));
        assert_eq!(request.context["file"], "main.rs");
    }
}
