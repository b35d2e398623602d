use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Kind of unit of work the Parallel Mind pools know how to run.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CodeAnalysis,
    Testing,
    Documentation,
    Deployment,
    Monitoring,
    Optimization,
    SecurityScan,
    Research,
}

impl TaskType {
    pub const ALL: [TaskType; 8] = [
        Self::CodeAnalysis,
        Self::Testing,
        Self::Documentation,
        Self::Deployment,
        Self::Monitoring,
        Self::Optimization,
        Self::SecurityScan,
        Self::Research,
    ];

    /// Stable snake_case name used in config keys and persisted results.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeAnalysis => "code_analysis",
            Self::Testing => "testing",
            Self::Documentation => "documentation",
            Self::Deployment => "deployment",
            Self::Monitoring => "monitoring",
            Self::Optimization => "optimization",
            Self::SecurityScan => "security_scan",
            Self::Research => "research",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|task_type| task_type.as_str() == normalized)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(TaskType::as_str).collect();
                format!(
                    "Invalid task type '{}'. Valid values: {}",
                    s,
                    valid.join(", ")
                )
            })
    }
}

/// Scheduling priority. Ordering is significant: `Critical` runs first.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    ValueEnum,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Request complexity as declared by the caller of the coordinator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    Simple,
    #[default]
    Moderate,
    Complex,
    Enterprise,
}

impl TaskComplexity {
    /// Complex and enterprise requests consult memory before anything else.
    pub fn wants_recall_first(&self) -> bool {
        matches!(self, Self::Complex | Self::Enterprise)
    }
}

/// The three engines behind the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    PerfectRecall,
    ParallelMind,
    Creative,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerfectRecall => "perfect_recall",
            Self::ParallelMind => "parallel_mind",
            Self::Creative => "creative",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the coordinator dispatches a request across engines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationStrategy {
    Sequential,
    Parallel,
    #[default]
    Adaptive,
}

impl std::fmt::Display for CoordinationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Output format for CLI responses
#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_task_type_from_str_accepts_kebab_and_snake() {
        assert_eq!(
            <TaskType as FromStr>::from_str("code_analysis").unwrap(),
            TaskType::CodeAnalysis
        );
        assert_eq!(
            <TaskType as FromStr>::from_str("security-scan").unwrap(),
            TaskType::SecurityScan
        );
        assert_eq!(<TaskType as FromStr>::from_str(" Testing ").unwrap(), TaskType::Testing);
    }

    #[test]
    fn test_task_type_from_str_invalid() {
        let result = <TaskType as FromStr>::from_str("juggling");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .contains("Invalid task type 'juggling'")
        );
    }

    #[test]
    fn test_task_type_display_matches_serde() {
        for task_type in TaskType::ALL {
            let json = serde_json::to_string(&task_type).unwrap();
            assert_eq!(json, format!("\"{}\"", task_type));
        }
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Low);
        assert_eq!(TaskPriority::default(), TaskPriority::Normal);
    }

    #[test]
    fn test_complexity_recall_first() {
        assert!(!TaskComplexity::Simple.wants_recall_first());
        assert!(!TaskComplexity::Moderate.wants_recall_first());
        assert!(TaskComplexity::Complex.wants_recall_first());
        assert!(TaskComplexity::Enterprise.wants_recall_first());
    }

    #[test]
    fn test_engine_kind_order_is_stable() {
        let mut kinds = vec![
            EngineKind::Creative,
            EngineKind::PerfectRecall,
            EngineKind::ParallelMind,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                EngineKind::PerfectRecall,
                EngineKind::ParallelMind,
                EngineKind::Creative
            ]
        );
        assert_eq!(EngineKind::ParallelMind.to_string(), "parallel_mind");
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(CoordinationStrategy::Sequential.to_string(), "sequential");
        assert_eq!(CoordinationStrategy::Parallel.to_string(), "parallel");
        assert_eq!(CoordinationStrategy::default().to_string(), "adaptive");
    }
}
