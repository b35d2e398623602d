use clap::ValueEnum;
use revo_core::{TaskPriority, TaskType};
use serde::{Deserialize, Serialize};

use crate::task::Task;

/// Template family used to split a request into workflow steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionCategory {
    CodeAnalysis,
    Testing,
    Deployment,
    Optimization,
    #[default]
    Research,
}

impl DecompositionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeAnalysis => "code_analysis",
            Self::Testing => "testing",
            Self::Deployment => "deployment",
            Self::Optimization => "optimization",
            Self::Research => "research",
        }
    }

    /// Guess a template from free text; research when nothing matches.
    pub fn infer(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("deploy") || lower.contains("release") {
            Self::Deployment
        } else if lower.contains("test") {
            Self::Testing
        } else if lower.contains("optimi") || lower.contains("perf") {
            Self::Optimization
        } else if ["analy", "review", "security", "audit"]
            .iter()
            .any(|keyword| lower.contains(keyword))
        {
            Self::CodeAnalysis
        } else {
            Self::Research
        }
    }
}

impl std::fmt::Display for DecompositionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DecompositionCategory {
    type Err = std::convert::Infallible;

    /// Unknown categories fall back to the research template.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let category = match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "code_analysis" | "analysis" => Self::CodeAnalysis,
            "testing" | "test" => Self::Testing,
            "deployment" | "deploy" => Self::Deployment,
            "optimization" | "optimisation" => Self::Optimization,
            _ => Self::Research,
        };
        Ok(category)
    }
}

impl From<TaskType> for DecompositionCategory {
    fn from(task_type: TaskType) -> Self {
        match task_type {
            TaskType::CodeAnalysis | TaskType::SecurityScan => Self::CodeAnalysis,
            TaskType::Testing => Self::Testing,
            TaskType::Deployment | TaskType::Monitoring => Self::Deployment,
            TaskType::Optimization => Self::Optimization,
            TaskType::Documentation | TaskType::Research => Self::Research,
        }
    }
}

/// One row of a decomposition template: type, description, indices of the
/// steps it waits on.
struct Step {
    task_type: TaskType,
    description: String,
    depends_on: &'static [usize],
    priority: TaskPriority,
}

fn step(task_type: TaskType, description: String, depends_on: &'static [usize]) -> Step {
    Step {
        task_type,
        description,
        depends_on,
        priority: TaskPriority::Normal,
    }
}

/// Split `description` into a small dependency-ordered workflow.
///
/// Task ids are `step-1`, `step-2`, ... so the result can be fed straight
/// into `ParallelMindEngine::execute_workflow`.
pub fn decompose_complex_task(description: &str, category: DecompositionCategory) -> Vec<Task> {
    let subject = description.trim();
    let steps = match category {
        DecompositionCategory::CodeAnalysis => vec![
            Step {
                priority: TaskPriority::High,
                ..step(
                    TaskType::CodeAnalysis,
                    format!("Analyze syntax and structure: {subject}"),
                    &[],
                )
            },
            step(
                TaskType::CodeAnalysis,
                format!("Compute complexity metrics: {subject}"),
                &[0],
            ),
            step(
                TaskType::SecurityScan,
                format!("Scan for security vulnerabilities: {subject}"),
                &[0],
            ),
            step(
                TaskType::Documentation,
                format!("Write analysis report: {subject}"),
                &[1, 2],
            ),
        ],
        DecompositionCategory::Testing => vec![
            step(TaskType::Testing, format!("Run unit tests: {subject}"), &[]),
            step(
                TaskType::Testing,
                format!("Run integration tests: {subject}"),
                &[0],
            ),
            step(
                TaskType::CodeAnalysis,
                format!("Analyze test coverage: {subject}"),
                &[1],
            ),
        ],
        DecompositionCategory::Deployment => vec![
            step(TaskType::Deployment, format!("Build and package: {subject}"), &[]),
            Step {
                priority: TaskPriority::High,
                ..step(
                    TaskType::Testing,
                    format!("Run pre-deployment tests: {subject}"),
                    &[0],
                )
            },
            Step {
                priority: TaskPriority::Critical,
                ..step(TaskType::Deployment, format!("Deploy: {subject}"), &[1])
            },
            step(
                TaskType::Monitoring,
                format!("Monitor deployment health: {subject}"),
                &[2],
            ),
        ],
        DecompositionCategory::Optimization => vec![
            step(
                TaskType::Optimization,
                format!("Profile performance: {subject}"),
                &[],
            ),
            step(
                TaskType::Optimization,
                format!("Apply optimizations: {subject}"),
                &[0],
            ),
            step(
                TaskType::Testing,
                format!("Verify no regressions: {subject}"),
                &[1],
            ),
        ],
        DecompositionCategory::Research => vec![
            step(TaskType::Research, format!("Research: {subject}"), &[]),
            step(TaskType::Research, format!("Analyze findings: {subject}"), &[0]),
            step(
                TaskType::Documentation,
                format!("Summarize results: {subject}"),
                &[1],
            ),
        ],
    };

    steps
        .into_iter()
        .enumerate()
        .map(|(index, step)| {
            Task::new(step.task_type, step.description)
                .with_id(step_id(index))
                .with_priority(step.priority)
                .with_dependencies(step.depends_on.iter().map(|dep| step_id(*dep)))
        })
        .collect()
}

fn step_id(index: usize) -> String {
    format!("step-{}", index + 1)
}

/// Prefix every task id and dependency with `prefix`, so several
/// decomposed workflows can share one engine registry.
pub fn namespace_tasks(tasks: Vec<Task>, prefix: &str) -> Vec<Task> {
    tasks
        .into_iter()
        .map(|mut task| {
            task.id = format!("{prefix}/{}", task.id);
            for dependency in &mut task.dependencies {
                *dependency = format!("{prefix}/{dependency}");
            }
            task
        })
        .collect()
}
