//! Parallel Mind: per-task-type worker pools running dependency-ordered
//! workflows of simulated tasks.

mod decompose;
mod engine;
mod executor;
mod graph;
mod task;

pub use decompose::{DecompositionCategory, decompose_complex_task, namespace_tasks};
pub use engine::{ParallelMindEngine, ParallelStats, PoolStats, WorkflowResult};
pub use executor::{SimulatedExecutor, TaskExecutor};
pub use graph::TaskGraph;
pub use task::{Task, TaskStatus};
