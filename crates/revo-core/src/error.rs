#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("No memory with id '{0}'")]
    MemoryNotFound(String),

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    InvalidEmbeddingDimensions { expected: usize, actual: usize },

    #[error("Memory store locked by PID {0}")]
    MemoryLocked(u32),

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Workflow '{workflow}' timed out after {seconds}s")]
    WorkflowTimeout { workflow: String, seconds: u64 },

    #[error("No task with id '{0}'")]
    TaskNotFound(String),

    #[error("Unknown creative pattern '{0}'")]
    PatternNotFound(String),

    #[error("Genetic evolution needs a non-empty population")]
    EmptyPopulation,

    #[error("All models are in cooldown (last model: {last_model})")]
    ModelsExhausted { last_model: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
