//! Shared vocabulary for the reVoAgent engines: task and engine enums plus the
//! domain error taxonomy.

pub mod error;
pub mod types;

pub use error::AppError;
pub use types::{
    CoordinationStrategy, EngineKind, OutputFormat, TaskComplexity, TaskPriority, TaskType,
};
