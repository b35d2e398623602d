use anyhow::Result;
use async_trait::async_trait;
use revo_recall::{PerfectRecallEngine, RecallQuery};
use serde::Serialize;
use serde_json::Map;

pub const AGENT_CONTENT_TYPE: &str = "agent_interaction";

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeHit {
    pub content: String,
    pub similarity: f32,
}

/// Long-term memory agents read context from and write interactions to.
#[async_trait]
pub trait KnowledgeMemory: Send + Sync {
    async fn remember(&self, text: &str, tags: &[String]) -> Result<()>;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>>;
}

/// Accepts writes and never returns anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopKnowledge;

#[async_trait]
impl KnowledgeMemory for NoopKnowledge {
    async fn remember(&self, _text: &str, _tags: &[String]) -> Result<()> {
        Ok(())
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<KnowledgeHit>> {
        Ok(Vec::new())
    }
}

/// Knowledge stored as Perfect Recall memories.
#[derive(Clone)]
pub struct RecallKnowledge {
    engine: PerfectRecallEngine,
}

impl RecallKnowledge {
    pub fn new(engine: PerfectRecallEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl KnowledgeMemory for RecallKnowledge {
    async fn remember(&self, text: &str, tags: &[String]) -> Result<()> {
        self.engine
            .store_memory(text, AGENT_CONTENT_TYPE, tags.to_vec(), Map::new(), 0.5)
            .await?;
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>> {
        let recalled = self
            .engine
            .recall_memories(&RecallQuery::new(query).with_limit(limit))
            .await?;
        Ok(recalled
            .into_iter()
            .map(|memory| KnowledgeHit {
                content: memory.entry.content,
                similarity: memory.similarity,
            })
            .collect())
    }
}
