use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use revo_config::{EmbeddingBackendKind, RecallConfig, RevoConfig};
use revo_core::AppError;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};
use ulid::Ulid;

use crate::embedding::{Embedder, build_embedder};
use crate::entry::{MemoryEntry, MemoryFilter};
use crate::similarity::cosine_similarity;
use crate::store::MemoryStore;

const DEFAULT_RECALL_LIMIT: usize = 10;
/// Usage count at which the usage component of a score saturates.
const USAGE_SATURATION: f32 = 10.0;

/// Parameters for [`PerfectRecallEngine::recall_memories`].
#[derive(Debug, Clone)]
pub struct RecallQuery {
    pub text: String,
    pub content_types: Option<Vec<String>>,
    /// Entry must carry at least one of these tags.
    pub tags: Option<Vec<String>>,
    pub limit: usize,
    /// Overrides the engine's similarity threshold.
    pub min_similarity: Option<f32>,
}

impl RecallQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            content_types: None,
            tags: None,
            limit: DEFAULT_RECALL_LIMIT,
            min_similarity: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_content_types(mut self, types: Vec<String>) -> Self {
        self.content_types = Some(types);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_min_similarity(mut self, threshold: f32) -> Self {
        self.min_similarity = Some(threshold);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecalledMemory {
    pub entry: MemoryEntry,
    pub similarity: f32,
    /// Ranking score: similarity, success and usage blended.
    pub relevance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallStats {
    pub total_memories: usize,
    pub by_content_type: BTreeMap<String, usize>,
    pub average_success_score: f32,
    pub total_usage: u64,
    pub embedding_backend: EmbeddingBackendKind,
    pub file_path: PathBuf,
}

struct RecallInner {
    store: MemoryStore,
    cache: Mutex<BTreeMap<Ulid, MemoryEntry>>,
    max_memories: usize,
    similarity_threshold: f32,
}

/// JSON-backed memory with cosine-similarity recall.
///
/// Reads are served from an in-memory mirror of `memories.json`; every
/// mutation is a locked read-modify-write of the file that also refreshes
/// the mirror. File work runs on the blocking pool.
#[derive(Clone)]
pub struct PerfectRecallEngine {
    inner: Arc<RecallInner>,
    embedder: Arc<dyn Embedder>,
}

impl PerfectRecallEngine {
    pub fn open(config: &RecallConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let store = MemoryStore::new(
            config.resolved_data_dir(),
            Duration::from_millis(config.lock_timeout_ms),
        );
        let entries = store.load_all()?;
        info!(
            path = %store.file_path().display(),
            count = entries.len(),
            backend = ?embedder.backend(),
            "perfect recall opened"
        );

        Ok(Self {
            inner: Arc::new(RecallInner {
                store,
                cache: Mutex::new(entries.into_iter().map(|e| (e.id, e)).collect()),
                max_memories: config.max_memories,
                similarity_threshold: config.similarity_threshold,
            }),
            embedder,
        })
    }

    pub fn from_config(config: &RevoConfig) -> Result<Self> {
        Self::open(&config.recall, build_embedder(config))
    }

    /// Embed and persist a new memory, evicting low-value entries when the
    /// store is over capacity. Returns the new entry id.
    pub async fn store_memory(
        &self,
        content: impl Into<String>,
        content_type: &str,
        tags: Vec<String>,
        context: Map<String, Value>,
        success_score: f32,
    ) -> Result<Ulid> {
        let content = content.into();
        let embedding = self.embedder.embed(&content).await?;
        let entry = MemoryEntry {
            id: Ulid::new(),
            timestamp: Utc::now(),
            content,
            content_type: content_type.to_string(),
            tags,
            context,
            embedding,
            success_score: clamp_score(success_score),
            usage_count: 0,
            last_accessed: None,
        };
        let id = entry.id;

        let evicted = self
            .blocking(move |inner| {
                inner.update("store_memory", move |entries, max| {
                    entries.push(entry);
                    Ok(evict_to_capacity(entries, max, Some(id), Utc::now()))
                })
            })
            .await?;

        if !evicted.is_empty() {
            info!(count = evicted.len(), "evicted memories over capacity");
        }
        debug!(entry_id = %id, "stored memory");
        Ok(id)
    }

    /// Rank stored entries against `query`.
    ///
    /// Entries below the similarity threshold are never returned. Returned
    /// entries have their usage count and last-access time bumped.
    pub async fn recall_memories(&self, query: &RecallQuery) -> Result<Vec<RecalledMemory>> {
        if query.limit == 0 || query.text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(&query.text).await?;
        let threshold = query
            .min_similarity
            .unwrap_or(self.inner.similarity_threshold);
        let query = query.clone();

        self.blocking(move |inner| {
            inner.update("recall_memories", move |entries, _| {
                let now = Utc::now();
                let mut ranked: Vec<(usize, f32, f32)> = entries
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| matches_query(entry, &query))
                    .filter_map(|(index, entry)| {
                        let similarity = cosine_similarity(&query_embedding, &entry.embedding);
                        (similarity >= threshold)
                            .then(|| (index, similarity, relevance(entry, similarity)))
                    })
                    .collect();

                ranked.sort_by(|a, b| b.2.total_cmp(&a.2));
                ranked.truncate(query.limit);

                let mut recalled = Vec::with_capacity(ranked.len());
                for (index, similarity, relevance) in ranked {
                    let entry = &mut entries[index];
                    entry.usage_count = entry.usage_count.saturating_add(1);
                    entry.last_accessed = Some(now);
                    recalled.push(RecalledMemory {
                        entry: entry.clone(),
                        similarity,
                        relevance,
                    });
                }
                Ok(recalled)
            })
        })
        .await
    }

    /// Look up by full id or unique id prefix (case-insensitive).
    pub fn get_memory(&self, id: &str) -> Result<MemoryEntry> {
        let cache = self.inner.lock_cache()?;
        let id = resolve_id(&cache, id)?;
        cache
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::MemoryNotFound(id.to_string()).into())
    }

    pub async fn delete_memory(&self, id: &str) -> Result<MemoryEntry> {
        let id = {
            let cache = self.inner.lock_cache()?;
            resolve_id(&cache, id)?
        };
        self.blocking(move |inner| {
            inner.update("delete_memory", move |entries, _| {
                let position = entries
                    .iter()
                    .position(|entry| entry.id == id)
                    .ok_or_else(|| AppError::MemoryNotFound(id.to_string()))?;
                Ok(entries.remove(position))
            })
        })
        .await
    }

    /// Record feedback on how useful a memory turned out to be.
    pub async fn update_success_score(&self, id: &str, score: f32) -> Result<()> {
        let id = {
            let cache = self.inner.lock_cache()?;
            resolve_id(&cache, id)?
        };
        let score = clamp_score(score);
        self.blocking(move |inner| {
            inner.update("update_success_score", move |entries, _| {
                let entry = entries
                    .iter_mut()
                    .find(|entry| entry.id == id)
                    .ok_or_else(|| AppError::MemoryNotFound(id.to_string()))?;
                entry.success_score = score;
                Ok(())
            })
        })
        .await
    }

    /// Entries matching `filter`, newest first.
    pub fn list_memories(&self, filter: &MemoryFilter) -> Result<Vec<MemoryEntry>> {
        let pattern = match &filter.pattern {
            Some(pattern) => Some(
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("invalid regex pattern: {pattern}"))?,
            ),
            None => None,
        };

        let cache = self.inner.lock_cache()?;
        let mut entries: Vec<MemoryEntry> = cache
            .values()
            .filter(|entry| match &filter.content_type {
                Some(content_type) => &entry.content_type == content_type,
                None => true,
            })
            .filter(|entry| match &filter.tag {
                Some(tag) => entry.tags.iter().any(|own| own == tag),
                None => true,
            })
            .filter(|entry| match filter.since {
                Some(since) => entry.timestamp >= since,
                None => true,
            })
            .filter(|entry| match &pattern {
                Some(regex) => regex.is_match(&entry.content),
                None => true,
            })
            .cloned()
            .collect();

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    pub fn stats(&self) -> Result<RecallStats> {
        let cache = self.inner.lock_cache()?;
        let mut by_content_type = BTreeMap::new();
        let mut success_total = 0.0f32;
        let mut total_usage = 0u64;
        for entry in cache.values() {
            *by_content_type
                .entry(entry.content_type.clone())
                .or_insert(0usize) += 1;
            success_total += entry.success_score;
            total_usage += u64::from(entry.usage_count);
        }

        let total_memories = cache.len();
        Ok(RecallStats {
            total_memories,
            by_content_type,
            average_success_score: if total_memories == 0 {
                0.0
            } else {
                success_total / total_memories as f32
            },
            total_usage,
            embedding_backend: self.embedder.backend(),
            file_path: self.inner.store.file_path().to_path_buf(),
        })
    }

    /// Remove every memory. Returns how many were dropped.
    pub async fn clear(&self) -> Result<usize> {
        self.blocking(|inner| {
            inner.update("clear", |entries, _| {
                let count = entries.len();
                entries.clear();
                Ok(count)
            })
        })
        .await
    }

    pub fn len(&self) -> usize {
        self.inner.lock_cache().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&RecallInner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || work(&inner))
            .await
            .context("perfect recall worker panicked")?
    }
}

impl RecallInner {
    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<Ulid, MemoryEntry>>> {
        self.cache
            .lock()
            .map_err(|_| anyhow!("perfect recall cache poisoned"))
    }

    /// Locked read-modify-write of the file; refreshes the mirror on success.
    fn update<T>(
        &self,
        reason: &str,
        apply: impl FnOnce(&mut Vec<MemoryEntry>, usize) -> Result<T>,
    ) -> Result<T> {
        let mut cache = self.lock_cache()?;
        let max = self.max_memories;
        let (entries, output) = self.store.update(reason, |entries| apply(entries, max))?;
        *cache = entries.into_iter().map(|entry| (entry.id, entry)).collect();
        Ok(output)
    }
}

fn matches_query(entry: &MemoryEntry, query: &RecallQuery) -> bool {
    if let Some(types) = &query.content_types {
        if !types.iter().any(|t| t == &entry.content_type) {
            return false;
        }
    }
    if let Some(tags) = &query.tags {
        if !entry.has_any_tag(tags) {
            return false;
        }
    }
    true
}

fn usage_component(usage_count: u32) -> f32 {
    (usage_count as f32 / USAGE_SATURATION).min(1.0)
}

/// `similarity*0.7 + success*0.2 + usage*0.1`
fn relevance(entry: &MemoryEntry, similarity: f32) -> f32 {
    similarity * 0.7 + entry.success_score * 0.2 + usage_component(entry.usage_count) * 0.1
}

/// `usage*0.4 + success*0.4 + recency*0.2`; lowest is evicted first.
fn retention_score(entry: &MemoryEntry, now: DateTime<Utc>) -> f32 {
    let recency = 1.0 / (1.0 + entry.age_days(now));
    usage_component(entry.usage_count) * 0.4 + entry.success_score * 0.4 + recency * 0.2
}

/// Drop lowest-retention entries until `entries.len() <= max`.
fn evict_to_capacity(
    entries: &mut Vec<MemoryEntry>,
    max: usize,
    protect: Option<Ulid>,
    now: DateTime<Utc>,
) -> Vec<Ulid> {
    if entries.len() <= max {
        return Vec::new();
    }

    let mut candidates: Vec<(f32, DateTime<Utc>, Ulid)> = entries
        .iter()
        .filter(|entry| Some(entry.id) != protect)
        .map(|entry| (retention_score(entry, now), entry.timestamp, entry.id))
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let excess = entries.len() - max;
    let doomed: HashSet<Ulid> = candidates
        .into_iter()
        .take(excess)
        .map(|(_, _, id)| id)
        .collect();
    entries.retain(|entry| !doomed.contains(&entry.id));
    doomed.into_iter().collect()
}

fn resolve_id(cache: &BTreeMap<Ulid, MemoryEntry>, id: &str) -> Result<Ulid> {
    if let Ok(exact) = id.parse::<Ulid>() {
        if cache.contains_key(&exact) {
            return Ok(exact);
        }
    }

    let prefix = id.trim().to_ascii_uppercase();
    if prefix.is_empty() {
        return Err(AppError::MemoryNotFound(id.to_string()).into());
    }
    let mut matches = cache
        .keys()
        .filter(|key| key.to_string().starts_with(&prefix));
    match (matches.next(), matches.next()) {
        (Some(found), None) => Ok(*found),
        (Some(_), Some(_)) => Err(anyhow!("ambiguous memory id prefix '{id}'")),
        _ => Err(AppError::MemoryNotFound(id.to_string()).into()),
    }
}

fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use chrono::Duration as ChronoDuration;

    fn engine_in(dir: &std::path::Path) -> PerfectRecallEngine {
        let config = RecallConfig {
            data_dir: Some(dir.to_path_buf()),
            ..RecallConfig::default()
        };
        PerfectRecallEngine::open(&config, Arc::new(HashEmbedder::new(config.embedding_dimensions)))
            .unwrap()
    }

    fn entry(score: f32, usage: u32, age_days: i64) -> MemoryEntry {
        let timestamp = Utc::now() - ChronoDuration::days(age_days);
        MemoryEntry {
            id: Ulid::new(),
            timestamp,
            content: "x".into(),
            content_type: "note".into(),
            tags: Vec::new(),
            context: Map::new(),
            embedding: Vec::new(),
            success_score: score,
            usage_count: usage,
            last_accessed: None,
        }
    }

    #[tokio::test]
    async fn test_store_then_recall_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());

        let id = engine
            .store_memory("def foo(): pass", "code", vec![], Map::new(), 0.9)
            .await
            .unwrap();

        let results = engine
            .recall_memories(&RecallQuery::new("def foo"))
            .await
            .unwrap();
        let hit = results
            .iter()
            .find(|r| r.entry.id == id)
            .expect("stored entry recalled");
        assert!(hit.similarity > 0.0);
        assert!(hit.similarity >= 0.3);
    }

    #[tokio::test]
    async fn test_recall_with_exact_content_returns_entry() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        let content = "retry failed deployments with exponential backoff";
        let id = engine
            .store_memory(content, "solution", vec![], Map::new(), 0.5)
            .await
            .unwrap();

        let results = engine
            .recall_memories(&RecallQuery::new(content))
            .await
            .unwrap();
        assert_eq!(results[0].entry.id, id);
        assert!((results[0].similarity - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_recall_never_returns_below_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        for content in [
            "def foo(): pass",
            "SELECT name FROM users WHERE active",
            "kubernetes rollout restart deployment",
            "def bar(x): return x * 2",
        ] {
            engine
                .store_memory(content, "code", vec![], Map::new(), 0.5)
                .await
                .unwrap();
        }

        for threshold in [0.0f32, 0.2, 0.5, 0.9] {
            let results = engine
                .recall_memories(&RecallQuery::new("def foo").with_min_similarity(threshold))
                .await
                .unwrap();
            assert!(results.iter().all(|r| r.similarity >= threshold));
        }
    }

    #[tokio::test]
    async fn test_recall_increments_usage_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        let id = engine
            .store_memory("cache invalidation strategy", "note", vec![], Map::new(), 0.5)
            .await
            .unwrap();

        engine
            .recall_memories(&RecallQuery::new("cache invalidation strategy"))
            .await
            .unwrap();
        let results = engine
            .recall_memories(&RecallQuery::new("cache invalidation strategy"))
            .await
            .unwrap();
        assert_eq!(results[0].entry.usage_count, 2);

        let reopened = engine_in(dir.path());
        let stored = reopened.get_memory(&id.to_string()).unwrap();
        assert_eq!(stored.usage_count, 2);
        assert!(stored.last_accessed.is_some());
    }

    #[tokio::test]
    async fn test_recall_filters_by_type_and_tag() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine
            .store_memory("parse json config", "code", vec!["rust".into()], Map::new(), 0.5)
            .await
            .unwrap();
        engine
            .store_memory("parse json config", "conversation", vec!["python".into()], Map::new(), 0.5)
            .await
            .unwrap();

        let code_only = engine
            .recall_memories(
                &RecallQuery::new("parse json config").with_content_types(vec!["code".into()]),
            )
            .await
            .unwrap();
        assert_eq!(code_only.len(), 1);
        assert_eq!(code_only[0].entry.content_type, "code");

        let python_only = engine
            .recall_memories(&RecallQuery::new("parse json config").with_tags(vec!["python".into()]))
            .await
            .unwrap();
        assert_eq!(python_only.len(), 1);
        assert_eq!(python_only[0].entry.content_type, "conversation");
    }

    #[tokio::test]
    async fn test_recall_ranks_success_when_similarity_ties() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine
            .store_memory("flaky integration test", "note", vec![], Map::new(), 0.1)
            .await
            .unwrap();
        let good = engine
            .store_memory("flaky integration test", "note", vec![], Map::new(), 0.9)
            .await
            .unwrap();

        let results = engine
            .recall_memories(&RecallQuery::new("flaky integration test").with_limit(1))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.id, good);
    }

    #[tokio::test]
    async fn test_empty_query_or_zero_limit_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine
            .store_memory("anything", "note", vec![], Map::new(), 0.5)
            .await
            .unwrap();
        assert!(engine.recall_memories(&RecallQuery::new("  ")).await.unwrap().is_empty());
        assert!(
            engine
                .recall_memories(&RecallQuery::new("anything").with_limit(0))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_capacity_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecallConfig {
            data_dir: Some(dir.path().to_path_buf()),
            max_memories: 3,
            ..RecallConfig::default()
        };
        let engine =
            PerfectRecallEngine::open(&config, Arc::new(HashEmbedder::new(32))).unwrap();

        let weak = engine
            .store_memory("weak", "note", vec![], Map::new(), 0.0)
            .await
            .unwrap();
        for content in ["a", "b", "c"] {
            engine
                .store_memory(content, "note", vec![], Map::new(), 0.9)
                .await
                .unwrap();
        }

        assert_eq!(engine.len(), 3);
        assert!(engine.get_memory(&weak.to_string()).is_err());
    }

    #[test]
    fn test_evict_prefers_low_value_entries() {
        let now = Utc::now();
        let keep_used = entry(0.2, 10, 30);
        let keep_good = entry(0.9, 0, 30);
        let drop_me = entry(0.1, 0, 30);
        let drop_id = drop_me.id;
        let mut entries = vec![keep_used, drop_me, keep_good];

        let evicted = evict_to_capacity(&mut entries, 2, None, now);
        assert_eq!(evicted, vec![drop_id]);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_evict_respects_protected_entry() {
        let now = Utc::now();
        let protected = entry(0.0, 0, 100);
        let protected_id = protected.id;
        let mut entries = vec![protected, entry(0.5, 0, 0)];
        evict_to_capacity(&mut entries, 1, Some(protected_id), now);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, protected_id);
    }

    #[tokio::test]
    async fn test_get_by_prefix_delete_and_feedback() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        let id = engine
            .store_memory("note one", "note", vec![], Map::new(), 0.5)
            .await
            .unwrap();
        let full = id.to_string();

        let by_prefix = engine.get_memory(&full[..20].to_ascii_lowercase()).unwrap();
        assert_eq!(by_prefix.id, id);

        engine.update_success_score(&full, 1.7).await.unwrap();
        assert!((engine.get_memory(&full).unwrap().success_score - 1.0).abs() < f32::EPSILON);

        let removed = engine.delete_memory(&full).await.unwrap();
        assert_eq!(removed.id, id);
        let err = engine.get_memory(&full).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::MemoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine
            .store_memory("Rust ownership issue", "code", vec!["rust".into()], Map::new(), 0.8)
            .await
            .unwrap();
        engine
            .store_memory("standup notes", "conversation", vec![], Map::new(), 0.4)
            .await
            .unwrap();

        let rust = engine
            .list_memories(&MemoryFilter {
                pattern: Some("RUST".into()),
                ..MemoryFilter::default()
            })
            .unwrap();
        assert_eq!(rust.len(), 1);

        let tagged = engine
            .list_memories(&MemoryFilter {
                tag: Some("rust".into()),
                ..MemoryFilter::default()
            })
            .unwrap();
        assert_eq!(tagged.len(), 1);

        assert!(
            engine
                .list_memories(&MemoryFilter {
                    pattern: Some("(".into()),
                    ..MemoryFilter::default()
                })
                .is_err()
        );

        let stats = engine.stats().unwrap();
        assert_eq!(stats.total_memories, 2);
        assert_eq!(stats.by_content_type.get("code"), Some(&1));
        assert!((stats.average_success_score - 0.6).abs() < 1e-5);
        assert_eq!(stats.embedding_backend, EmbeddingBackendKind::Hash);

        assert_eq!(engine.clear().await.unwrap(), 2);
        assert!(engine.is_empty());
    }

    #[tokio::test]
    async fn test_two_engines_on_same_dir_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let first = engine_in(dir.path());
        let second = engine_in(dir.path());

        first
            .store_memory("from first", "note", vec![], Map::new(), 0.5)
            .await
            .unwrap();
        second
            .store_memory("from second", "note", vec![], Map::new(), 0.5)
            .await
            .unwrap();

        assert_eq!(second.len(), 2);
        assert_eq!(engine_in(dir.path()).len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_stores_all_persist() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());

        let mut handles = Vec::new();
        for index in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .store_memory(format!("memory {index}"), "note", vec![], Map::new(), 0.5)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(engine_in(dir.path()).len(), 8);
    }
}
