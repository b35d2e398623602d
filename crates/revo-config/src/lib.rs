pub mod config;
pub mod llm;
pub mod paths;

pub use config::{
    CoordinatorConfig, CreativeConfig, EmbeddingBackendKind, LoggingConfig, ParallelConfig,
    RecallConfig, RevoConfig,
};
pub use llm::LlmConfig;
