use std::time::Instant;

use async_trait::async_trait;
use revo_parallel::{DecompositionCategory, Task, TaskGraph, decompose_complex_task};
use serde_json::{Map, Value, json};

use crate::agent::{Agent, AgentContext, AgentRequest, AgentResponse, Invocation};

const NAME: &str = "workflow";

const SYSTEM_PROMPT: &str = "You are a delivery planner. Given a goal and a proposed step plan, \
reply with JSON only: {\"assessment\": string, \"risks\": [string], \"improvements\": [string]}";

/// Turns a goal into a dependency-ordered step plan and asks the model to
/// review it.
pub struct WorkflowAgent {
    context: AgentContext,
}

impl WorkflowAgent {
    pub fn new(context: AgentContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Agent for WorkflowAgent {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["workflow_design", "task_decomposition", "dependency_planning"]
    }

    async fn handle(&self, request: AgentRequest) -> AgentResponse {
        let started = Instant::now();
        let category = request
            .context
            .get("category")
            .and_then(Value::as_str)
            .map(|raw| raw.parse().unwrap_or_default())
            .unwrap_or_else(|| DecompositionCategory::infer(&request.task));

        let tasks = decompose_complex_task(&request.task, category);
        let graph = match TaskGraph::build(&tasks) {
            Ok(graph) => graph,
            Err(err) => return AgentResponse::failure(NAME, &request.id, format!("{err:#}"), started),
        };
        let labels: Vec<String> = tasks.iter().map(|task| task.description.clone()).collect();

        let mut extra = Map::new();
        extra.insert("category".to_string(), json!(category));
        extra.insert("steps".to_string(), Value::Array(tasks.iter().map(step_json).collect()));
        extra.insert("mermaid".to_string(), json!(graph.to_mermaid(&labels)));

        let prompt = format!(
            "Goal: {}\nCategory: {category}\nProposed plan:\n{}",
            request.task.trim(),
            render_plan(&tasks)
        );

        self.context
            .invoke(Invocation {
                agent: NAME,
                request: &request,
                system_prompt: SYSTEM_PROMPT,
                prompt,
                knowledge_query: request.task.clone(),
                tags: vec![NAME.to_string(), category.as_str().to_string()],
                extra,
            })
            .await
    }
}

fn step_json(task: &Task) -> Value {
    json!({
        "id": task.id,
        "task_type": task.task_type,
        "description": task.description,
        "dependencies": task.dependencies,
        "priority": task.priority,
    })
}

fn render_plan(tasks: &[Task]) -> String {
    tasks
        .iter()
        .map(|task| {
            if task.dependencies.is_empty() {
                format!("- {} [{}] {}", task.id, task.task_type, task.description)
            } else {
                format!(
                    "- {} [{}] {} (after {})",
                    task.id,
                    task.task_type,
                    task.description,
                    task.dependencies.join(", ")
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::NoopKnowledge;
    use crate::model::MockModelManager;
    use std::sync::Arc;

    fn agent(model: Arc<MockModelManager>) -> WorkflowAgent {
        WorkflowAgent::new(AgentContext::new(model, Arc::new(NoopKnowledge)))
    }

    #[tokio::test]
    async fn test_plan_inferred_from_goal() {
        let model = Arc::new(MockModelManager::with_responses([
            r#"{"assessment":"reasonable","risks":["no rollback"],"improvements":[]}"#,
        ]));
        let response = agent(model.clone())
            .handle(AgentRequest::new("Deploy the billing API"))
            .await;

        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["category"], "deployment");
        assert_eq!(data["steps"].as_array().unwrap().len(), 4);
        assert_eq!(data["steps"][2]["priority"], "critical");
        assert_eq!(data["steps"][3]["dependencies"], json!(["step-3"]));
        assert_eq!(data["risks"][0], "no rollback");
        assert!(data["mermaid"].as_str().unwrap().starts_with("graph TD\n"));

        let prompt = &model.requests()[0].prompt;
        assert!(prompt.contains("- step-2 [testing] Run pre-deployment tests: Deploy the billing API (after step-1)"));
    }

    #[tokio::test]
    async fn test_category_from_context_overrides_inference() {
        let response = agent(Arc::new(MockModelManager::new()))
            .handle(
                AgentRequest::new("Deploy the billing API")
                    .with_context("category", json!("code_analysis")),
            )
            .await;
        let data = response.data.unwrap();
        assert_eq!(data["category"], "code_analysis");
        assert_eq!(data["steps"][3]["dependencies"], json!(["step-2", "step-3"]));
        assert!(data["mermaid"].as_str().unwrap().contains("N1 --> N3"));
    }

    #[test]
    fn test_agent_identity() {
        let agent = agent(Arc::new(MockModelManager::new()));
        assert_eq!(agent.name(), "workflow");
        assert!(agent.capabilities().contains(&"task_decomposition"));
    }
}
