use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use revo_agents::{
    Agent, AgentContext, AgentRequest, AgentResponse, CodeAnalysisAgent, DebuggingAgent,
    KnowledgeMemory, NoopKnowledge, RecallKnowledge, WorkflowAgent, build_model_manager,
};
use revo_config::RevoConfig;
use revo_core::OutputFormat;
use revo_recall::PerfectRecallEngine;
use serde_json::json;
use tracing::warn;

use crate::cli::AgentCommands;
use crate::output::print_json;

pub(crate) async fn handle_agent_command(
    command: AgentCommands,
    config: &RevoConfig,
    format: OutputFormat,
) -> Result<()> {
    let context = agent_context(config)?;

    let (agent, request): (Box<dyn Agent>, AgentRequest) = match command {
        AgentCommands::Analyze {
            file,
            language,
            focus,
        } => {
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let language = language.unwrap_or_else(|| language_for(&file).to_string());
            let request = AgentRequest::new(focus)
                .with_code(code)
                .with_language(language)
                .with_context("file", json!(file.display().to_string()));
            (Box::new(CodeAnalysisAgent::new(context)), request)
        }
        AgentCommands::Debug { error, code } => {
            let mut request = AgentRequest::new(error);
            if let Some(path) = code {
                let source = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                request = request
                    .with_code(source)
                    .with_language(language_for(&path))
                    .with_context("file", json!(path.display().to_string()));
            }
            (Box::new(DebuggingAgent::new(context)), request)
        }
        AgentCommands::Workflow {
            description,
            category,
        } => {
            let mut request = AgentRequest::new(description);
            if let Some(category) = category {
                request = request.with_context("category", json!(category.as_str()));
            }
            (Box::new(WorkflowAgent::new(context)), request)
        }
    };

    let response = agent.handle(request).await;
    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Text => print_response(&response)?,
    }
    if !response.success {
        bail!(
            "{} agent failed: {}",
            response.agent,
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Model from `[llm]`, knowledge from Perfect Recall. An unusable memory
/// store degrades to no knowledge instead of failing the command.
fn agent_context(config: &RevoConfig) -> Result<AgentContext> {
    let model = build_model_manager(&config.llm)?;
    let knowledge: Arc<dyn KnowledgeMemory> = match PerfectRecallEngine::from_config(config) {
        Ok(engine) => Arc::new(RecallKnowledge::new(engine)),
        Err(err) => {
            let reason = format!("{err:#}");
            warn!(%reason, "perfect recall unavailable, agents run without knowledge");
            Arc::new(NoopKnowledge)
        }
    };
    Ok(AgentContext::from_config(&config.llm, model, knowledge))
}

fn print_response(response: &AgentResponse) -> Result<()> {
    if !response.success {
        return Ok(());
    }
    println!("{}", response.content.trim());
    if let Some(data) = &response.data {
        println!();
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    if response.knowledge_used > 0 {
        eprintln!("(used {} related memories)", response.knowledge_used);
    }
    Ok(())
}

fn language_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()).unwrap_or("") {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" => "cpp",
        "sh" => "bash",
        _ => "text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_for_extension() {
        assert_eq!(language_for(Path::new("src/main.rs")), "rust");
        assert_eq!(language_for(Path::new("app.py")), "python");
        assert_eq!(language_for(Path::new("Makefile")), "text");
    }
}
