use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use revo_config::{CoordinatorConfig, RevoConfig};
use revo_core::{AppError, CoordinationStrategy, EngineKind, TaskType};
use revo_creative::{CreativeEngine, CreativeRequest, CreativeStats};
use revo_parallel::{
    DecompositionCategory, ParallelMindEngine, ParallelStats, decompose_complex_task,
    namespace_tasks,
};
use revo_recall::{PerfectRecallEngine, RecallQuery, RecallStats};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

use crate::request::{
    CoordinatedRequest, CoordinatedResponse, EngineOutcome, overall_confidence, synthesize,
};

pub const COORDINATION_CONTENT_TYPE: &str = "coordination";

const CREATIVE_KEYWORDS: [&str; 4] = ["design", "creative", "innovat", "architect"];
const EXECUTION_KEYWORDS: [&str; 6] = ["analysis", "test", "deploy", "optimi", "security", "monitor"];
const SNIPPET_CHARS: usize = 200;

/// Which engine the adaptive strategy hands a task type to after recall.
pub fn adaptive_route(task_type: &str) -> EngineKind {
    let lower = task_type.to_lowercase();
    if CREATIVE_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
        EngineKind::Creative
    } else if EXECUTION_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
        EngineKind::ParallelMind
    } else {
        EngineKind::Creative
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub perfect_recall: RecallStats,
    pub parallel_mind: ParallelStats,
    pub creative: CreativeStats,
    pub coordinations: u64,
}

/// Successful engine run before it is wrapped into an [`EngineOutcome`].
struct EngineReport {
    summary: String,
    data: Value,
    confidence: f32,
}

/// Dispatches requests across the three engines and merges their answers.
pub struct EngineCoordinator {
    recall: PerfectRecallEngine,
    parallel: ParallelMindEngine,
    creative: Arc<CreativeEngine>,
    config: CoordinatorConfig,
    coordinations: AtomicU64,
}

impl EngineCoordinator {
    pub fn new(
        recall: PerfectRecallEngine,
        parallel: ParallelMindEngine,
        creative: Arc<CreativeEngine>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            recall,
            parallel,
            creative,
            config,
            coordinations: AtomicU64::new(0),
        }
    }

    /// All three engines built from one config, with simulated task work.
    pub fn from_config(config: &RevoConfig) -> Result<Self> {
        let recall = PerfectRecallEngine::from_config(config)
            .context("failed to open perfect recall for the coordinator")?;
        Ok(Self::new(
            recall,
            ParallelMindEngine::simulated(&config.parallel),
            Arc::new(CreativeEngine::new(config.creative.clone())),
            config.coordinator.clone(),
        ))
    }

    pub fn recall(&self) -> &PerfectRecallEngine {
        &self.recall
    }

    pub fn parallel(&self) -> &ParallelMindEngine {
        &self.parallel
    }

    pub fn creative(&self) -> &CreativeEngine {
        &self.creative
    }

    /// Run `request` with its own strategy or the configured default.
    ///
    /// Engine failures never fail the request; they are recorded as
    /// [`EngineOutcome::Failed`] and the remaining engines still run.
    pub async fn coordinate(&self, request: CoordinatedRequest) -> CoordinatedResponse {
        let started = Instant::now();
        let strategy = request.strategy.unwrap_or(self.config.default_strategy);
        info!(
            request_id = %request.id,
            %strategy,
            task_type = %request.task_type,
            complexity = ?request.complexity,
            "coordinating request"
        );

        let mut run = Run::default();
        match strategy {
            CoordinationStrategy::Sequential => {
                let recalled = self.recall_step(&request, &mut run).await;
                let outcome = settle(EngineKind::Creative, self.run_creative(&request, &recalled));
                run.record(EngineKind::Creative, outcome);
                let outcome = settle(EngineKind::ParallelMind, self.run_parallel(&request).await);
                run.record(EngineKind::ParallelMind, outcome);
            }
            CoordinationStrategy::Parallel => {
                let (recall, creative, parallel) = tokio::join!(
                    self.run_recall(&request),
                    async { self.run_creative(&request, &[]) },
                    self.run_parallel(&request),
                );
                run.record(
                    EngineKind::PerfectRecall,
                    settle(EngineKind::PerfectRecall, recall.map(|(report, _)| report)),
                );
                run.record(EngineKind::Creative, settle(EngineKind::Creative, creative));
                run.record(EngineKind::ParallelMind, settle(EngineKind::ParallelMind, parallel));
            }
            CoordinationStrategy::Adaptive => {
                let recalled = if request.complexity.wants_recall_first() {
                    self.recall_step(&request, &mut run).await
                } else {
                    Vec::new()
                };
                match adaptive_route(&request.task_type) {
                    EngineKind::ParallelMind => {
                        let outcome = settle(EngineKind::ParallelMind, self.run_parallel(&request).await);
                        run.record(EngineKind::ParallelMind, outcome);
                    }
                    _ => {
                        let outcome = settle(EngineKind::Creative, self.run_creative(&request, &recalled));
                        run.record(EngineKind::Creative, outcome);
                    }
                }
            }
        }

        let synthesis = synthesize(&run.outcomes);
        let confidence = overall_confidence(&run.outcomes);
        self.coordinations.fetch_add(1, Ordering::Relaxed);

        let response = CoordinatedResponse {
            request_id: request.id.clone(),
            strategy,
            engines_used: run.engines_used,
            outcomes: run.outcomes,
            synthesis,
            confidence,
            duration: started.elapsed(),
        };

        if self.config.remember_outcomes {
            if let Err(err) = self.remember(&request, &response).await {
                let reason = format!("{err:#}");
                warn!(request_id = %request.id, %reason, "failed to store coordination outcome");
            }
        }

        info!(
            request_id = %response.request_id,
            engines = response.engines_used.len(),
            failed = response.failed_engines().len(),
            confidence = response.confidence,
            duration_ms = response.duration.as_millis() as u64,
            "coordination finished"
        );
        response
    }

    pub fn engine_status(&self) -> Result<EngineStatus> {
        Ok(EngineStatus {
            perfect_recall: self.recall.stats()?,
            parallel_mind: self.parallel.stats()?,
            creative: self.creative.stats(),
            coordinations: self.coordinations.load(Ordering::Relaxed),
        })
    }

    /// Recall, record the outcome, and hand back snippets for later engines.
    async fn recall_step(&self, request: &CoordinatedRequest, run: &mut Run) -> Vec<String> {
        match self.run_recall(request).await {
            Ok((report, snippets)) => {
                run.record(EngineKind::PerfectRecall, succeeded(report));
                snippets
            }
            Err(err) => {
                run.record(EngineKind::PerfectRecall, settle(EngineKind::PerfectRecall, Err(err)));
                Vec::new()
            }
        }
    }

    async fn run_recall(&self, request: &CoordinatedRequest) -> Result<(EngineReport, Vec<String>)> {
        let query = RecallQuery::new(&request.description).with_limit(self.config.recall_limit);
        let memories = self.recall.recall_memories(&query).await?;

        let snippets: Vec<String> = memories
            .iter()
            .map(|memory| memory.entry.content.chars().take(SNIPPET_CHARS).collect())
            .collect();
        let data = Value::Array(
            memories
                .iter()
                .map(|memory| {
                    json!({
                        "id": memory.entry.id.to_string(),
                        "content_type": memory.entry.content_type,
                        "content": memory.entry.content,
                        "similarity": memory.similarity,
                    })
                })
                .collect(),
        );
        let confidence = memories
            .iter()
            .map(|memory| memory.similarity)
            .fold(0.0, f32::max);

        Ok((
            EngineReport {
                summary: format!("recalled {} related memories", memories.len()),
                data,
                confidence,
            },
            snippets,
        ))
    }

    fn run_creative(&self, request: &CoordinatedRequest, recalled: &[String]) -> Result<EngineReport> {
        let mut problem = request.description.clone();
        if !recalled.is_empty() {
            problem.push_str("\n\nRelated experience:\n");
            for snippet in recalled {
                problem.push_str(&format!("- {snippet}\n"));
            }
        }

        let mut creative_request =
            CreativeRequest::default().with_constraints(request.context_strings("constraints"));
        if let Some(domain) = request.context_str("domain") {
            creative_request = creative_request.with_domain(domain);
        }

        let solution = self.creative.generate_novel_solution(&problem, &creative_request);
        Ok(EngineReport {
            summary: format!(
                "{} ({:?}, creativity {:.2})",
                solution.title, solution.innovation_level, solution.creativity_score
            ),
            confidence: solution.feasibility_score,
            data: serde_json::to_value(&solution).context("failed to serialize creative solution")?,
        })
    }

    async fn run_parallel(&self, request: &CoordinatedRequest) -> Result<EngineReport> {
        let category = request
            .task_type
            .parse::<TaskType>()
            .map(DecompositionCategory::from)
            .unwrap_or_else(|_| {
                DecompositionCategory::infer(&format!("{} {}", request.task_type, request.description))
            });
        let tasks = namespace_tasks(decompose_complex_task(&request.description, category), &request.id);
        let total = tasks.len();
        let timeout = self.parallel.default_timeout();

        let result = self.parallel.execute_workflow(tasks, timeout).await?;
        if result.timed_out {
            return Err(AppError::WorkflowTimeout {
                workflow: result.workflow_id,
                seconds: timeout.as_secs(),
            }
            .into());
        }

        let completed = result.completed_steps.len();
        Ok(EngineReport {
            summary: format!("{category} workflow: {completed}/{total} steps completed"),
            confidence: if total == 0 { 0.0 } else { completed as f32 / total as f32 },
            data: serde_json::to_value(&result).context("failed to serialize workflow result")?,
        })
    }

    async fn remember(&self, request: &CoordinatedRequest, response: &CoordinatedResponse) -> Result<()> {
        let content = format!(
            "[{}] {}: {}\n{}",
            response.strategy, request.task_type, request.description, response.synthesis
        );
        let mut context = Map::new();
        context.insert("request_id".into(), json!(request.id));
        context.insert("engines".into(), json!(response.engines_used));

        self.recall
            .store_memory(
                content,
                COORDINATION_CONTENT_TYPE,
                vec![request.task_type.clone(), response.strategy.to_string()],
                context,
                response.confidence,
            )
            .await?;
        Ok(())
    }
}

#[derive(Default)]
struct Run {
    engines_used: Vec<EngineKind>,
    outcomes: BTreeMap<EngineKind, EngineOutcome>,
}

impl Run {
    fn record(&mut self, kind: EngineKind, outcome: EngineOutcome) {
        self.engines_used.push(kind);
        self.outcomes.insert(kind, outcome);
    }
}

fn succeeded(report: EngineReport) -> EngineOutcome {
    EngineOutcome::Succeeded {
        summary: report.summary,
        data: report.data,
        confidence: report.confidence.clamp(0.0, 1.0),
    }
}

fn settle(kind: EngineKind, result: Result<EngineReport>) -> EngineOutcome {
    match result {
        Ok(report) => succeeded(report),
        Err(err) => {
            let reason = format!("{err:#}");
            error!(engine = %kind, %reason, "engine failed during coordination");
            EngineOutcome::Failed { error: reason }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use revo_core::TaskComplexity;
    use revo_parallel::{Task, TaskExecutor};
    use revo_recall::MemoryFilter;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> RevoConfig {
        let mut config = RevoConfig::default();
        config.recall.data_dir = Some(dir.path().to_path_buf());
        config.parallel.work_scale = 0.0;
        config
    }

    fn coordinator(dir: &TempDir) -> EngineCoordinator {
        EngineCoordinator::from_config(&config(dir)).unwrap()
    }

    struct Broken;

    #[async_trait]
    impl TaskExecutor for Broken {
        async fn execute(&self, task: &Task) -> Result<Value> {
            bail!("executor down for {}", task.id)
        }
    }

    struct Hangs;

    #[async_trait]
    impl TaskExecutor for Hangs {
        async fn execute(&self, _task: &Task) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }
    }

    fn with_executor(dir: &TempDir, executor: Arc<dyn TaskExecutor>, timeout_secs: u64) -> EngineCoordinator {
        let mut config = config(dir);
        config.parallel.max_retries = 0;
        config.parallel.workflow_timeout_secs = timeout_secs;
        EngineCoordinator::new(
            PerfectRecallEngine::from_config(&config).unwrap(),
            ParallelMindEngine::new(&config.parallel, executor),
            Arc::new(CreativeEngine::new(config.creative.clone())),
            config.coordinator.clone(),
        )
    }

    #[test]
    fn test_adaptive_route() {
        assert_eq!(adaptive_route("architecture_design"), EngineKind::Creative);
        assert_eq!(adaptive_route("Creative brainstorm"), EngineKind::Creative);
        assert_eq!(adaptive_route("code_analysis"), EngineKind::ParallelMind);
        assert_eq!(adaptive_route("security_scan"), EngineKind::ParallelMind);
        assert_eq!(adaptive_route("performance_optimization"), EngineKind::ParallelMind);
        assert_eq!(adaptive_route("chat"), EngineKind::Creative);
    }

    #[tokio::test]
    async fn test_sequential_runs_every_engine_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let response = coordinator
            .coordinate(
                CoordinatedRequest::new("code_analysis", "review the payment module")
                    .with_strategy(CoordinationStrategy::Sequential),
            )
            .await;

        assert_eq!(
            response.engines_used,
            vec![EngineKind::PerfectRecall, EngineKind::Creative, EngineKind::ParallelMind]
        );
        assert!(response.outcomes.values().all(EngineOutcome::is_success));
        assert!(response.synthesis.starts_with("perfect_recall: recalled 0 related memories"));
        assert!(response.synthesis.contains("parallel_mind: code_analysis workflow: 4/4 steps completed"));
        assert!((response.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_parallel_strategy_runs_all_engines_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let response = coordinator
            .coordinate(
                CoordinatedRequest::new("testing", "cover the parser")
                    .with_strategy(CoordinationStrategy::Parallel),
            )
            .await;
        assert_eq!(response.outcomes.len(), 3);
        assert!(response.failed_engines().is_empty());
    }

    #[tokio::test]
    async fn test_adaptive_simple_design_uses_only_creative() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let response = coordinator
            .coordinate(CoordinatedRequest::new("architecture_design", "event pipeline for orders"))
            .await;
        assert_eq!(response.strategy, CoordinationStrategy::Adaptive);
        assert_eq!(response.engines_used, vec![EngineKind::Creative]);
    }

    #[tokio::test]
    async fn test_adaptive_complex_recalls_first() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        coordinator
            .recall()
            .store_memory("payment module review found a race", "note", vec![], Map::new(), 0.8)
            .await
            .unwrap();

        let response = coordinator
            .coordinate(
                CoordinatedRequest::new("code_analysis", "payment module review")
                    .with_complexity(TaskComplexity::Complex),
            )
            .await;
        assert_eq!(
            response.engines_used,
            vec![EngineKind::PerfectRecall, EngineKind::ParallelMind]
        );
        let EngineOutcome::Succeeded { data, confidence, .. } = &response.outcomes[&EngineKind::PerfectRecall] else {
            panic!("recall should succeed");
        };
        assert_eq!(data.as_array().unwrap().len(), 1);
        assert!(*confidence > 0.3);
    }

    #[tokio::test]
    async fn test_outcome_is_remembered() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let response = coordinator
            .coordinate(CoordinatedRequest::new("design", "plugin system for exporters"))
            .await;

        let stored = coordinator
            .recall()
            .list_memories(&MemoryFilter {
                content_type: Some(COORDINATION_CONTENT_TYPE.into()),
                ..MemoryFilter::default()
            })
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].content.starts_with("[adaptive] design: plugin system for exporters"));
        assert_eq!(stored[0].context["request_id"], json!(response.request_id));
    }

    #[tokio::test]
    async fn test_remember_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        config.coordinator.remember_outcomes = false;
        let coordinator = EngineCoordinator::from_config(&config).unwrap();
        coordinator
            .coordinate(CoordinatedRequest::new("design", "anything"))
            .await;
        assert!(coordinator.recall().is_empty());
    }

    #[tokio::test]
    async fn test_failed_steps_lower_confidence_but_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = with_executor(&dir, Arc::new(Broken), 30);
        let response = coordinator
            .coordinate(
                CoordinatedRequest::new("testing", "flaky suite")
                    .with_strategy(CoordinationStrategy::Adaptive),
            )
            .await;
        let outcome = &response.outcomes[&EngineKind::ParallelMind];
        assert!(outcome.is_success());
        assert_eq!(outcome.confidence(), Some(0.0));
    }

    #[tokio::test]
    async fn test_engine_timeout_is_recorded_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = with_executor(&dir, Arc::new(Hangs), 1);
        let response = coordinator
            .coordinate(
                CoordinatedRequest::new("deploy", "ship it")
                    .with_strategy(CoordinationStrategy::Sequential),
            )
            .await;

        assert_eq!(response.failed_engines(), vec![EngineKind::ParallelMind]);
        let EngineOutcome::Failed { error } = &response.outcomes[&EngineKind::ParallelMind] else {
            panic!("parallel mind should fail");
        };
        assert!(error.contains("timed out after 1s"));
        assert!(response.outcomes[&EngineKind::Creative].is_success());
        assert!(response.synthesis.contains("parallel_mind: failed:"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_do_not_clash_on_task_ids() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let first = CoordinatedRequest::new("testing", "a").with_strategy(CoordinationStrategy::Parallel);
        let second = CoordinatedRequest::new("testing", "b").with_strategy(CoordinationStrategy::Parallel);
        let (a, b) = tokio::join!(coordinator.coordinate(first), coordinator.coordinate(second));
        assert!(a.failed_engines().is_empty());
        assert!(b.failed_engines().is_empty());
    }

    #[tokio::test]
    async fn test_engine_status() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        coordinator
            .coordinate(CoordinatedRequest::new("design", "x").with_strategy(CoordinationStrategy::Parallel))
            .await;
        let status = coordinator.engine_status().unwrap();
        assert_eq!(status.coordinations, 1);
        assert_eq!(status.parallel_mind.workflows_run, 1);
        assert_eq!(status.creative.solutions_generated, 1);
        assert_eq!(status.perfect_recall.total_memories, 1);
    }
}
