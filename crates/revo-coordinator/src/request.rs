use std::collections::BTreeMap;
use std::time::Duration;

use revo_core::{CoordinationStrategy, EngineKind, TaskComplexity};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use ulid::Ulid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatedRequest {
    pub id: String,
    /// Free-form task kind, e.g. `code_analysis` or `architecture_design`.
    /// Adaptive routing matches keywords in it.
    pub task_type: String,
    pub description: String,
    #[serde(default)]
    pub complexity: TaskComplexity,
    /// None = the coordinator's configured default.
    #[serde(default)]
    pub strategy: Option<CoordinationStrategy>,
    /// Extra hints: `domain` and `constraints` feed the creative engine.
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl CoordinatedRequest {
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            task_type: task_type.into(),
            description: description.into(),
            complexity: TaskComplexity::default(),
            strategy: None,
            context: Map::new(),
        }
    }

    pub fn with_complexity(mut self, complexity: TaskComplexity) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_strategy(mut self, strategy: CoordinationStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub(crate) fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }

    pub(crate) fn context_strings(&self, key: &str) -> Vec<String> {
        match self.context.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        }
    }
}

/// What one engine contributed to a coordinated request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EngineOutcome {
    Succeeded {
        summary: String,
        data: Value,
        confidence: f32,
    },
    Failed {
        error: String,
    },
}

impl EngineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn confidence(&self) -> Option<f32> {
        match self {
            Self::Succeeded { confidence, .. } => Some(*confidence),
            Self::Failed { .. } => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Succeeded { summary, .. } => summary.clone(),
            Self::Failed { error } => format!("failed: {error}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatedResponse {
    pub request_id: String,
    pub strategy: CoordinationStrategy,
    /// Engines in the order they were invoked.
    pub engines_used: Vec<EngineKind>,
    pub outcomes: BTreeMap<EngineKind, EngineOutcome>,
    pub synthesis: String,
    /// Highest confidence among successful engines, 0 when none succeeded.
    pub confidence: f32,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl CoordinatedResponse {
    pub fn failed_engines(&self) -> Vec<EngineKind> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(kind, _)| *kind)
            .collect()
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// One line per engine, in engine order.
pub fn synthesize(outcomes: &BTreeMap<EngineKind, EngineOutcome>) -> String {
    outcomes
        .iter()
        .map(|(kind, outcome)| format!("{kind}: {}", outcome.summary()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn overall_confidence(outcomes: &BTreeMap<EngineKind, EngineOutcome>) -> f32 {
    outcomes
        .values()
        .filter_map(EngineOutcome::confidence)
        .fold(0.0, f32::max)
}
