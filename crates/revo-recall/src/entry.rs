use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ulid::Ulid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Ulid,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub content_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub success_score: f32,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    /// Days since the entry was last touched (recalled or created).
    pub fn age_days(&self, now: DateTime<Utc>) -> f32 {
        let reference = self.last_accessed.unwrap_or(self.timestamp);
        ((now - reference).num_seconds().max(0) as f32) / 86_400.0
    }

    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.tags.iter().any(|own| own == tag))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub content_type: Option<String>,
    pub tag: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// Case-insensitive regex matched against content.
    pub pattern: Option<String>,
}
