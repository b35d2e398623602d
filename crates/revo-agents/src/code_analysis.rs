use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::agent::{Agent, AgentContext, AgentRequest, AgentResponse, Invocation};

const NAME: &str = "code_analysis";
const LONG_LINE: usize = 100;

const SYSTEM_PROMPT: &str = "You are a senior code reviewer. Reply with JSON only: \
{\"summary\": string, \"issues\": [{\"line\": number, \"severity\": \"low|medium|high\", \
\"message\": string}], \"complexity\": \"low|medium|high\", \"suggestions\": [string]}";

/// Reviews source code for bugs, complexity and security problems.
pub struct CodeAnalysisAgent {
    context: AgentContext,
}

impl CodeAnalysisAgent {
    pub fn new(context: AgentContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Agent for CodeAnalysisAgent {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["code_review", "complexity_analysis", "bug_detection", "security_review"]
    }

    async fn handle(&self, request: AgentRequest) -> AgentResponse {
        let Some(code) = request.code.as_deref().filter(|code| !code.trim().is_empty()) else {
            return AgentResponse::failure(NAME, &request.id, "code analysis needs source code", Instant::now());
        };
        let language = request.language.as_deref().unwrap_or("text");

        let prompt = format!(
            "Analyze this {language} code.\nFocus: {}\n\n```{language}\n{code}\n```",
            request.task.trim()
        );
        let mut extra = Map::new();
        extra.insert("metrics".to_string(), code_metrics(code));
        extra.insert("language".to_string(), json!(language));

        self.context
            .invoke(Invocation {
                agent: NAME,
                request: &request,
                system_prompt: SYSTEM_PROMPT,
                prompt,
                knowledge_query: format!("{} {language}", request.task),
                tags: vec![NAME.to_string(), language.to_string()],
                extra,
            })
            .await
    }
}

/// Cheap line-based metrics computed without the model.
pub fn code_metrics(code: &str) -> Value {
    let lines: Vec<&str> = code.lines().collect();
    let non_blank = lines.iter().filter(|line| !line.trim().is_empty()).count();
    let comments = lines
        .iter()
        .map(|line| line.trim_start())
        .filter(|line| line.starts_with("//") || line.starts_with('#'))
        .count();
    let functions = lines
        .iter()
        .map(|line| line.trim_start())
        .filter(|line| {
            ["fn ", "pub fn ", "async fn ", "def ", "function ", "func "]
                .iter()
                .any(|prefix| line.starts_with(prefix))
        })
        .count();
    let long_lines = lines.iter().filter(|line| line.chars().count() > LONG_LINE).count();
    let todos = lines
        .iter()
        .filter(|line| line.contains("TODO") || line.contains("FIXME"))
        .count();
    let max_indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .max()
        .unwrap_or(0);

    json!({
        "lines": lines.len(),
        "non_blank_lines": non_blank,
        "comment_lines": comments,
        "functions": functions,
        "long_lines": long_lines,
        "todo_markers": todos,
        "max_indent": max_indent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::NoopKnowledge;
    use crate::model::MockModelManager;
    use std::sync::Arc;

    const SAMPLE: &str = "# helpers\ndef foo():\n    pass\n\ndef bar(x):\n    # TODO: validate\n    return x\n";

    #[test]
    fn test_code_metrics() {
        let metrics = code_metrics(SAMPLE);
        assert_eq!(metrics["lines"], 7);
        assert_eq!(metrics["non_blank_lines"], 6);
        assert_eq!(metrics["functions"], 2);
        assert_eq!(metrics["comment_lines"], 2);
        assert_eq!(metrics["todo_markers"], 1);
        assert_eq!(metrics["max_indent"], 4);
    }

    #[tokio::test]
    async fn test_structured_model_output_is_parsed() {
        let model = Arc::new(MockModelManager::with_responses([
            r#"{"summary":"small helpers","issues":[],"complexity":"low","suggestions":["add types"]}"#,
        ]));
        let agent = CodeAnalysisAgent::new(AgentContext::new(model.clone(), Arc::new(NoopKnowledge)));
        let response = agent
            .handle(AgentRequest::new("review").with_code(SAMPLE).with_language("python"))
            .await;

        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["summary"], "small helpers");
        assert_eq!(data["metrics"]["functions"], 2);
        assert_eq!(data["language"], "python");

        let prompt = &model.requests()[0].prompt;
        assert!(prompt.contains("```python\n# helpers"));
    }

    #[tokio::test]
    async fn test_missing_code_is_a_failed_response() {
        let agent = CodeAnalysisAgent::new(AgentContext::new(
            Arc::new(MockModelManager::new()),
            Arc::new(NoopKnowledge),
        ));
        let response = agent.handle(AgentRequest::new("review")).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("code analysis needs source code"));
    }
}
