//! Engine configuration (`~/.config/revo-agent/config.toml`).
//!
//! Every section falls back to defaults, so an empty or missing file yields a
//! fully working offline setup: hash embeddings, simulated task work and the
//! mock model.

use anyhow::{Context, Result};
use revo_core::{AppError, CoordinationStrategy, TaskType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::llm::LlmConfig;
use crate::paths;

const DEFAULT_MAX_MEMORIES: usize = 10_000;
const DEFAULT_POOL_SIZE: usize = 4;
/// One week.
const MAX_WORKFLOW_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;
const MAX_WORK_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RevoConfig {
    pub recall: RecallConfig,
    pub parallel: ParallelConfig,
    pub creative: CreativeConfig,
    pub coordinator: CoordinatorConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

/// Which embedder backs Perfect Recall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackendKind {
    #[default]
    Hash,
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Directory holding `memories.json`. None = XDG state dir.
    pub data_dir: Option<PathBuf>,
    /// Entry count above which the lowest-value memories are evicted.
    pub max_memories: usize,
    pub similarity_threshold: f32,
    pub embedding_dimensions: usize,
    pub embedding: EmbeddingBackendKind,
    /// How long a writer waits for another process holding the memory file.
    pub lock_timeout_ms: u64,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            max_memories: DEFAULT_MAX_MEMORIES,
            similarity_threshold: 0.3,
            embedding_dimensions: 384,
            embedding: EmbeddingBackendKind::Hash,
            lock_timeout_ms: 5_000,
        }
    }
}

impl RecallConfig {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(paths::default_recall_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Worker count for task types without an explicit override.
    pub default_pool_size: usize,
    /// Per task type overrides keyed by snake_case task type name.
    pub pool_sizes: BTreeMap<String, usize>,
    pub max_retries: u32,
    pub workflow_timeout_secs: u64,
    /// Multiplier applied to simulated work durations (0 = instant).
    pub work_scale: f64,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            default_pool_size: DEFAULT_POOL_SIZE,
            pool_sizes: BTreeMap::new(),
            max_retries: 2,
            workflow_timeout_secs: 300,
            work_scale: 1.0,
        }
    }
}

impl ParallelConfig {
    /// Resolved pool size: task type override -> default_pool_size.
    pub fn pool_size(&self, task_type: TaskType) -> usize {
        self.pool_sizes
            .get(task_type.as_str())
            .copied()
            .unwrap_or(self.default_pool_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreativeConfig {
    /// Patterns combined into one generated solution.
    pub top_patterns: usize,
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    /// Fixed RNG seed for reproducible evolution runs.
    pub seed: Option<u64>,
}

impl Default for CreativeConfig {
    fn default() -> Self {
        Self {
            top_patterns: 5,
            population_size: 20,
            generations: 10,
            mutation_rate: 0.1,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub default_strategy: CoordinationStrategy,
    /// Store each synthesis back into Perfect Recall.
    pub remember_outcomes: bool,
    /// Memories pulled into a coordinated request.
    pub recall_limit: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_strategy: CoordinationStrategy::Adaptive,
            remember_outcomes: true,
            recall_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write `run-{timestamp}.log` files here in addition to stderr.
    pub dir: Option<PathBuf>,
}

impl RevoConfig {
    /// Load from an explicit path, or the global config file when `None`.
    ///
    /// A missing global file (or no resolvable config dir) yields defaults.
    /// An explicit path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from(path)?,
            None => match paths::default_config_path() {
                Some(path) if path.exists() => Self::load_from(&path)?,
                _ => {
                    tracing::debug!("no global config file, using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let recall = &self.recall;
        if !(0.0..=1.0).contains(&recall.similarity_threshold) {
            return Err(invalid(format!(
                "recall.similarity_threshold must be within [0, 1], got {}",
                recall.similarity_threshold
            )));
        }
        if recall.embedding_dimensions == 0 {
            return Err(invalid("recall.embedding_dimensions must be > 0"));
        }
        if recall.max_memories == 0 {
            return Err(invalid("recall.max_memories must be > 0"));
        }

        let parallel = &self.parallel;
        if parallel.default_pool_size == 0 {
            return Err(invalid("parallel.default_pool_size must be > 0"));
        }
        for (task_type, size) in &parallel.pool_sizes {
            if task_type.parse::<TaskType>().is_err() {
                return Err(invalid(format!(
                    "parallel.pool_sizes has unknown task type '{task_type}'"
                )));
            }
            if *size == 0 {
                return Err(invalid(format!(
                    "parallel.pool_sizes.{task_type} must be > 0"
                )));
            }
        }
        if !(0.0..=MAX_WORK_SCALE).contains(&parallel.work_scale) {
            return Err(invalid(format!(
                "parallel.work_scale must be within [0, {MAX_WORK_SCALE}], got {}",
                parallel.work_scale
            )));
        }
        if parallel.workflow_timeout_secs == 0 || parallel.workflow_timeout_secs > MAX_WORKFLOW_TIMEOUT_SECS {
            return Err(invalid(format!(
                "parallel.workflow_timeout_secs must be within [1, {MAX_WORKFLOW_TIMEOUT_SECS}], got {}",
                parallel.workflow_timeout_secs
            )));
        }

        let creative = &self.creative;
        if creative.top_patterns == 0 {
            return Err(invalid("creative.top_patterns must be > 0"));
        }
        if creative.population_size < 2 {
            return Err(invalid("creative.population_size must be >= 2"));
        }
        if !(0.0..=1.0).contains(&creative.mutation_rate) {
            return Err(invalid(format!(
                "creative.mutation_rate must be within [0, 1], got {}",
                creative.mutation_rate
            )));
        }

        if self.llm.enabled {
            if self.llm.base_url.trim().is_empty() {
                return Err(invalid("llm.base_url is required when llm.enabled = true"));
            }
            if self.llm.model_list().is_empty() {
                return Err(invalid("llm.models is required when llm.enabled = true"));
            }
        }
        if recall.embedding == EmbeddingBackendKind::Api && self.llm.base_url.trim().is_empty() {
            return Err(invalid(
                "recall.embedding = \"api\" requires llm.base_url",
            ));
        }

        Ok(())
    }

    /// Config rendered back to TOML with the API key masked.
    pub fn to_display_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.llm = shown.llm.redacted_for_display();
        toml::to_string_pretty(&shown).context("Failed to render config as TOML")
    }
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    AppError::InvalidConfig(message.into()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: RevoConfig = toml::from_str("").unwrap();
        assert_eq!(config.recall.max_memories, 10_000);
        assert_eq!(config.recall.embedding, EmbeddingBackendKind::Hash);
        assert!((config.recall.similarity_threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.parallel.max_retries, 2);
        assert_eq!(config.creative.top_patterns, 5);
        assert_eq!(
            config.coordinator.default_strategy,
            CoordinationStrategy::Adaptive
        );
        assert!(config.coordinator.remember_outcomes);
        assert!(config.logging.dir.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_full_config_parses() {
        let toml = r#"
[recall]
data_dir = "/tmp/revo-recall"
max_memories = 50
similarity_threshold = 0.5
embedding_dimensions = 64

[parallel]
default_pool_size = 2
max_retries = 0
work_scale = 0.0

[parallel.pool_sizes]
deployment = 1

[creative]
population_size = 8
generations = 3
seed = 42

[coordinator]
default_strategy = "parallel"
remember_outcomes = false
"#;
        let config: RevoConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.recall.resolved_data_dir(),
            PathBuf::from("/tmp/revo-recall")
        );
        assert_eq!(config.recall.max_memories, 50);
        assert_eq!(config.parallel.pool_size(TaskType::Deployment), 1);
        assert_eq!(config.parallel.pool_size(TaskType::Testing), 2);
        assert_eq!(config.creative.seed, Some(42));
        assert_eq!(
            config.coordinator.default_strategy,
            CoordinationStrategy::Parallel
        );
        assert!(!config.coordinator.remember_outcomes);
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        let mut config = RevoConfig::default();
        config.recall.similarity_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("similarity_threshold"));
    }

    #[test]
    fn test_validate_rejects_unknown_pool_task_type() {
        let mut config = RevoConfig::default();
        config.parallel.pool_sizes.insert("juggling".into(), 2);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("juggling"));
    }

    #[test]
    fn test_validate_rejects_zero_pool_size() {
        let mut config = RevoConfig::default();
        config.parallel.pool_sizes.insert("testing".into(), 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_workflow_timeout() {
        let mut config = RevoConfig::default();
        config.parallel.workflow_timeout_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("workflow_timeout_secs"));

        config.parallel.workflow_timeout_secs = MAX_WORKFLOW_TIMEOUT_SECS;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_bounds_work_scale() {
        let mut config = RevoConfig::default();
        config.parallel.work_scale = 1e300;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("work_scale"));

        config.parallel.work_scale = f64::NAN;
        assert!(config.validate().is_err());

        config.parallel.work_scale = 0.0;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_requires_llm_endpoint_when_enabled() {
        let mut config = RevoConfig::default();
        config.llm.enabled = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("llm.base_url"));

        config.llm.base_url = "http://localhost:11434/v1".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("llm.models"));

        config.llm.models = "llama3".into();
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_api_embedding_needs_base_url() {
        let mut config = RevoConfig::default();
        config.recall.embedding = EmbeddingBackendKind::Api;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[creative]\ngenerations = 4\n").unwrap();

        let config = RevoConfig::load(Some(&path)).unwrap();
        assert_eq!(config.creative.generations, 4);
    }

    #[test]
    fn test_load_explicit_missing_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = RevoConfig::load(Some(&missing)).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read config"));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[creative]\nmutation_rate = 2.0\n").unwrap();
        assert!(RevoConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_display_toml_masks_key() {
        let mut config = RevoConfig::default();
        config.llm.api_key = "sk-live-abcdef-9999".into();
        let rendered = config.to_display_toml().unwrap();
        assert!(!rendered.contains("sk-live-abcdef-9999"));
        assert!(rendered.contains("sk-...9999"));
    }
}
