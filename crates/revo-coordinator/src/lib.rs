//! Engine coordinator: routes a request to Perfect Recall, Parallel Mind and
//! the creative engine with a sequential, parallel or adaptive strategy, then
//! merges what they return.

mod coordinator;
mod request;

pub use coordinator::{COORDINATION_CONTENT_TYPE, EngineCoordinator, EngineStatus, adaptive_route};
pub use request::{
    CoordinatedRequest, CoordinatedResponse, EngineOutcome, overall_confidence, synthesize,
};
