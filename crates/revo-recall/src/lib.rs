//! Perfect Recall: a JSON-file-backed memory store with brute-force cosine
//! similarity recall.

mod embedding;
mod engine;
mod entry;
pub mod similarity;
mod store;

pub use embedding::{ApiEmbedder, Embedder, FallbackEmbedder, HashEmbedder, build_embedder};
pub use engine::{PerfectRecallEngine, RecallQuery, RecallStats, RecalledMemory};
pub use entry::{MemoryEntry, MemoryFilter};
pub use revo_config::EmbeddingBackendKind as EmbeddingBackend;
pub use store::MemoryStore;
