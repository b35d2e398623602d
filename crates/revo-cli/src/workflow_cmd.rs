use std::time::Duration;

use anyhow::{Result, bail};
use revo_config::RevoConfig;
use revo_core::OutputFormat;
use revo_parallel::{
    DecompositionCategory, ParallelMindEngine, TaskGraph, WorkflowResult, decompose_complex_task,
};
use serde_json::json;

use crate::cli::WorkflowCommands;
use crate::output::{one_line, print_json};

pub(crate) async fn handle_workflow_command(
    command: WorkflowCommands,
    config: &RevoConfig,
    format: OutputFormat,
) -> Result<()> {
    match command {
        WorkflowCommands::Run {
            description,
            category,
            timeout,
            plan,
        } => {
            let category = category.unwrap_or_else(|| DecompositionCategory::infer(&description));
            let tasks = decompose_complex_task(&description, category);

            if plan {
                let graph = TaskGraph::build(&tasks)?;
                let labels: Vec<String> = tasks
                    .iter()
                    .map(|task| format!("{}: {}", task.id, task.task_type))
                    .collect();
                let mermaid = graph.to_mermaid(&labels);
                return match format {
                    OutputFormat::Json => print_json(&json!({
                        "category": category,
                        "tasks": tasks,
                        "mermaid": mermaid,
                    })),
                    OutputFormat::Text => {
                        print!("{mermaid}");
                        Ok(())
                    }
                };
            }

            let engine = ParallelMindEngine::simulated(&config.parallel);
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| engine.default_timeout());
            let result = engine.execute_workflow(tasks, timeout).await?;

            match format {
                OutputFormat::Json => print_json(&result)?,
                OutputFormat::Text => print_result(category, &result),
            }
            ensure_success(&result)
        }
    }
}

fn print_result(category: DecompositionCategory, result: &WorkflowResult) {
    println!(
        "Workflow {} ({category}) finished in {:.1}s",
        result.workflow_id,
        result.duration.as_secs_f64()
    );
    for id in &result.completed_steps {
        let output = result
            .results
            .get(id)
            .and_then(|value| value.get("output"))
            .map(|value| value.to_string())
            .unwrap_or_default();
        println!("  [done]      {id}  {}", one_line(&output, 70));
    }
    for id in &result.failed_steps {
        let error = result.errors.get(id).map(String::as_str).unwrap_or("");
        println!("  [failed]    {id}  {error}");
    }
    for id in &result.cancelled_steps {
        let error = result.errors.get(id).map(String::as_str).unwrap_or("");
        println!("  [cancelled] {id}  {error}");
    }
}

fn ensure_success(result: &WorkflowResult) -> Result<()> {
    if result.timed_out {
        bail!(
            "workflow {} timed out with {} unfinished steps",
            result.workflow_id,
            result.cancelled_steps.len()
        );
    }
    if !result.is_success() {
        bail!(
            "workflow {} finished with {} failed and {} cancelled steps",
            result.workflow_id,
            result.failed_steps.len(),
            result.cancelled_steps.len()
        );
    }
    Ok(())
}
