//! Specialised agents on top of a pluggable model manager, with Perfect
//! Recall as their long-term knowledge store.

pub mod agent;
pub mod api_client;
pub mod code_analysis;
pub mod debugging;
pub mod knowledge;
pub mod model;
pub mod workflow;

pub use agent::{Agent, AgentContext, AgentRequest, AgentResponse};
pub use api_client::{ApiModelManager, ModelRotator};
pub use code_analysis::{CodeAnalysisAgent, code_metrics};
pub use debugging::{DebuggingAgent, ErrorKind, classify_error};
pub use knowledge::{AGENT_CONTENT_TYPE, KnowledgeHit, KnowledgeMemory, NoopKnowledge, RecallKnowledge};
pub use model::{GenerationRequest, MockModelManager, ModelManager, build_model_manager};
pub use workflow::WorkflowAgent;
