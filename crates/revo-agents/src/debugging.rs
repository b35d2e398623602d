use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, json};

use crate::agent::{Agent, AgentContext, AgentRequest, AgentResponse, Invocation};

const NAME: &str = "debugging";

const SYSTEM_PROMPT: &str = "You are an expert debugger. Reply with JSON only: \
{\"diagnosis\": string, \"root_cause\": string, \"fix\": string, \"confidence\": number}";

/// Coarse error family, used to tag remembered debugging sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Panic,
    NullReference,
    Timeout,
    Permission,
    NotFound,
    Syntax,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Panic => "panic",
            Self::NullReference => "null_reference",
            Self::Timeout => "timeout",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::Syntax => "syntax",
            Self::Unknown => "unknown",
        }
    }
}

pub fn classify_error(text: &str) -> ErrorKind {
    let lower = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

    if has(&["panicked", "panic", "unwrap()", "segmentation fault"]) {
        ErrorKind::Panic
    } else if has(&["null", "nonetype", "nil pointer", "undefined is not"]) {
        ErrorKind::NullReference
    } else if has(&["timed out", "timeout", "deadline exceeded"]) {
        ErrorKind::Timeout
    } else if has(&["permission denied", "access denied", "forbidden", "eacces"]) {
        ErrorKind::Permission
    } else if has(&["not found", "no such file", "enoent", "404"]) {
        ErrorKind::NotFound
    } else if has(&["syntax", "unexpected token", "parse error", "expected"]) {
        ErrorKind::Syntax
    } else {
        ErrorKind::Unknown
    }
}

/// Diagnoses an error message, optionally with the code that produced it.
pub struct DebuggingAgent {
    context: AgentContext,
}

impl DebuggingAgent {
    pub fn new(context: AgentContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Agent for DebuggingAgent {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["error_diagnosis", "root_cause_analysis", "fix_suggestion"]
    }

    async fn handle(&self, request: AgentRequest) -> AgentResponse {
        let kind = classify_error(&request.task);

        let mut prompt = format!("Diagnose this error:\n{}", request.task.trim());
        if let Some(code) = request.code.as_deref().filter(|code| !code.trim().is_empty()) {
            let language = request.language.as_deref().unwrap_or("");
            prompt.push_str(&format!("\n\nRelevant code:\n```{language}\n{code}\n```"));
        }

        let mut extra = Map::new();
        extra.insert("error_kind".to_string(), json!(kind));

        self.context
            .invoke(Invocation {
                agent: NAME,
                request: &request,
                system_prompt: SYSTEM_PROMPT,
                prompt,
                knowledge_query: request.task.clone(),
                tags: vec![NAME.to_string(), kind.as_str().to_string()],
                extra,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{KnowledgeHit, KnowledgeMemory, NoopKnowledge};
    use crate::model::{GenerationRequest, MockModelManager, ModelManager};
    use anyhow::{Result, bail};
    use std::sync::{Arc, Mutex};

    struct FailingModel;

    #[async_trait]
    impl ModelManager for FailingModel {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            bail!("backend offline")
        }

        fn describe(&self) -> String {
            "failing".into()
        }
    }

    #[derive(Default)]
    struct RecordingKnowledge {
        remembered: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl KnowledgeMemory for RecordingKnowledge {
        async fn remember(&self, text: &str, tags: &[String]) -> Result<()> {
            self.remembered
                .lock()
                .unwrap()
                .push((text.to_string(), tags.to_vec()));
            Ok(())
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<KnowledgeHit>> {
            Ok(vec![KnowledgeHit {
                content: "last time the config path was wrong".into(),
                similarity: 0.7,
            }])
        }
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(
            classify_error("thread 'main' panicked at src/main.rs:3"),
            ErrorKind::Panic
        );
        assert_eq!(
            classify_error("TypeError: Cannot read properties of null"),
            ErrorKind::NullReference
        );
        assert_eq!(classify_error("request timed out after 30s"), ErrorKind::Timeout);
        assert_eq!(classify_error("open /etc/shadow: permission denied"), ErrorKind::Permission);
        assert_eq!(classify_error("No such file or directory"), ErrorKind::NotFound);
        assert_eq!(classify_error("SyntaxError: Unexpected token }"), ErrorKind::Syntax);
        assert_eq!(classify_error("it just misbehaves"), ErrorKind::Unknown);
    }

    #[tokio::test]
    async fn test_debugging_uses_and_records_knowledge() {
        let knowledge = Arc::new(RecordingKnowledge::default());
        let model = Arc::new(MockModelManager::with_responses([
            "```json\n{\"diagnosis\":\"bad path\",\"root_cause\":\"typo\",\"fix\":\"rename\",\"confidence\":0.8}\n```",
        ]));
        let agent = DebuggingAgent::new(AgentContext::new(model.clone(), knowledge.clone()));

        let response = agent
            .handle(AgentRequest::new("config.toml: No such file or directory"))
            .await;

        assert!(response.success);
        assert_eq!(response.knowledge_used, 1);
        let data = response.data.unwrap();
        assert_eq!(data["diagnosis"], "bad path");
        assert_eq!(data["error_kind"], "not_found");

        assert!(model.requests()[0].prompt.contains("config path was wrong"));
        let remembered = knowledge.remembered.lock().unwrap();
        assert_eq!(remembered.len(), 1);
        assert!(remembered[0].0.starts_with("[debugging] config.toml"));
        assert_eq!(remembered[0].1, vec!["debugging", "not_found"]);
    }

    #[tokio::test]
    async fn test_model_failure_becomes_failed_response() {
        let agent = DebuggingAgent::new(AgentContext::new(Arc::new(FailingModel), Arc::new(NoopKnowledge)));
        let response = agent.handle(AgentRequest::new("segfault")).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("backend offline"));
        assert_eq!(response.agent, "debugging");
    }

    #[tokio::test]
    async fn test_plain_text_reply_has_only_agent_fields() {
        let agent = DebuggingAgent::new(AgentContext::new(
            Arc::new(MockModelManager::new()),
            Arc::new(NoopKnowledge),
        ));
        let response = agent
            .handle(AgentRequest::new("weird output").with_code("print(x)").with_language("python"))
            .await;
        assert!(response.success);
        assert_eq!(response.content, "Mock response: Diagnose this error:");
        assert_eq!(response.data.unwrap(), json!({"error_kind": "unknown"}));
    }
}
