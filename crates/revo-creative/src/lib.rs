//! Creative engine: a fixed catalog of solution patterns, deterministic
//! pattern combination, and a seeded genetic search over combinations.

mod catalog;
mod engine;
mod evolution;
mod solution;

pub use catalog::{CATALOG, CreativePattern, find_pattern, patterns, rank_patterns, score_pattern};
pub use engine::{CreativeEngine, CreativeStats};
pub use evolution::{EvolutionOutcome, EvolutionParams, Genome, evolve_solution_genetic};
pub use solution::{CodeSnippet, CreativeRequest, InnovationLevel, Solution};
