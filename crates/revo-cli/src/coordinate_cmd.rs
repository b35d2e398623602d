use anyhow::Result;
use revo_config::RevoConfig;
use revo_core::{CoordinationStrategy, OutputFormat, TaskComplexity};
use revo_coordinator::{CoordinatedRequest, EngineCoordinator, EngineOutcome};
use serde_json::json;

use crate::output::print_json;

pub(crate) struct CoordinateArgs {
    pub description: String,
    pub task_type: String,
    pub complexity: TaskComplexity,
    pub strategy: Option<CoordinationStrategy>,
    pub domain: Option<String>,
}

pub(crate) async fn handle_coordinate(
    args: CoordinateArgs,
    config: &RevoConfig,
    format: OutputFormat,
) -> Result<()> {
    let coordinator = EngineCoordinator::from_config(config)?;

    let mut request = CoordinatedRequest::new(args.task_type, args.description)
        .with_complexity(args.complexity);
    if let Some(strategy) = args.strategy {
        request = request.with_strategy(strategy);
    }
    if let Some(domain) = args.domain {
        request = request.with_context("domain", json!(domain));
    }

    let response = coordinator.coordinate(request).await;
    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Text => {
            println!(
                "Request {} ({} strategy, {:.1}s, confidence {:.2})",
                response.request_id,
                response.strategy,
                response.duration.as_secs_f64(),
                response.confidence
            );
            let used: Vec<&str> = response.engines_used.iter().map(|kind| kind.as_str()).collect();
            println!("Engines: {}", used.join(" -> "));
            for (kind, outcome) in &response.outcomes {
                if let EngineOutcome::Failed { error } = outcome {
                    eprintln!("Warning: {kind} failed: {error}");
                }
            }
            println!();
            println!("{}", response.synthesis);
            Ok(())
        }
    }
}

pub(crate) fn handle_status(config: &RevoConfig, format: OutputFormat) -> Result<()> {
    let coordinator = EngineCoordinator::from_config(config)?;
    let status = coordinator.engine_status()?;
    match format {
        OutputFormat::Json => print_json(&status),
        OutputFormat::Text => {
            let recall = &status.perfect_recall;
            println!(
                "perfect_recall: {} memories, avg success {:.2}, {:?} embeddings",
                recall.total_memories, recall.average_success_score, recall.embedding_backend
            );
            let parallel = &status.parallel_mind;
            println!("parallel_mind:  {} pools", parallel.pools.len());
            for (task_type, pool) in &parallel.pools {
                println!("  {task_type:<14} size {}", pool.size);
            }
            let creative = &status.creative;
            println!("creative:       {} patterns", creative.patterns);
            Ok(())
        }
    }
}
