use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, Utc};
use revo_config::RevoConfig;
use revo_core::OutputFormat;
use revo_recall::{MemoryEntry, MemoryFilter, PerfectRecallEngine, RecallQuery};
use serde_json::{Map, json};

use crate::cli::MemoryCommands;
use crate::output::{format_timestamp, one_line, print_json, short_id};

pub(crate) async fn handle_memory_command(
    command: MemoryCommands,
    config: &RevoConfig,
    format: OutputFormat,
) -> Result<()> {
    let engine = PerfectRecallEngine::from_config(config)?;
    match command {
        MemoryCommands::Store {
            content,
            content_type,
            tags,
            score,
        } => handle_store(&engine, content, &content_type, tags, score, format).await,
        MemoryCommands::Recall {
            query,
            limit,
            min_similarity,
            content_types,
            tags,
        } => {
            let mut recall = RecallQuery::new(query).with_limit(limit);
            if let Some(threshold) = min_similarity {
                recall = recall.with_min_similarity(threshold);
            }
            if !content_types.is_empty() {
                recall = recall.with_content_types(content_types);
            }
            if !tags.is_empty() {
                recall = recall.with_tags(tags);
            }
            handle_recall(&engine, &recall, format).await
        }
        MemoryCommands::List {
            content_type,
            tag,
            since,
            pattern,
        } => {
            let filter = MemoryFilter {
                content_type,
                tag,
                since: parse_since_date(since)?,
                pattern,
            };
            handle_list(&engine, &filter, format)
        }
        MemoryCommands::Show { id } => handle_show(&engine, &id, format),
        MemoryCommands::Delete { id } => {
            let removed = engine.delete_memory(&id).await?;
            match format {
                OutputFormat::Json => print_json(&json!({"deleted": removed.id.to_string()})),
                OutputFormat::Text => {
                    println!("Deleted memory {}", removed.id);
                    Ok(())
                }
            }
        }
        MemoryCommands::Rate { id, score } => {
            if !(0.0..=1.0).contains(&score) {
                bail!("score must be within [0, 1], got {score}");
            }
            engine.update_success_score(&id, score).await?;
            let entry = engine.get_memory(&id)?;
            match format {
                OutputFormat::Json => print_json(&entry_view(&entry)),
                OutputFormat::Text => {
                    println!("Memory {} success score: {:.2}", entry.id, entry.success_score);
                    Ok(())
                }
            }
        }
        MemoryCommands::Stats => {
            let stats = engine.stats()?;
            match format {
                OutputFormat::Json => print_json(&stats),
                OutputFormat::Text => {
                    println!("Memories:      {}", stats.total_memories);
                    println!("Avg success:   {:.2}", stats.average_success_score);
                    println!("Total recalls: {}", stats.total_usage);
                    println!("Embedding:     {:?}", stats.embedding_backend);
                    println!("File:          {}", stats.file_path.display());
                    for (content_type, count) in &stats.by_content_type {
                        println!("  {content_type}: {count}");
                    }
                    Ok(())
                }
            }
        }
    }
}

async fn handle_store(
    engine: &PerfectRecallEngine,
    content: String,
    content_type: &str,
    tags: Option<String>,
    score: f32,
    format: OutputFormat,
) -> Result<()> {
    if content.trim().is_empty() {
        bail!("memory content must not be empty");
    }
    if !(0.0..=1.0).contains(&score) {
        bail!("score must be within [0, 1], got {score}");
    }

    let id = engine
        .store_memory(content, content_type, parse_tags(tags), Map::new(), score)
        .await?;
    match format {
        OutputFormat::Json => print_json(&json!({"id": id.to_string()})),
        OutputFormat::Text => {
            println!("Stored memory {id}");
            Ok(())
        }
    }
}

async fn handle_recall(
    engine: &PerfectRecallEngine,
    query: &RecallQuery,
    format: OutputFormat,
) -> Result<()> {
    let recalled = engine.recall_memories(query).await?;

    if let OutputFormat::Json = format {
        let rows: Vec<_> = recalled
            .iter()
            .map(|memory| {
                let mut row = entry_view(&memory.entry);
                row["similarity"] = json!(memory.similarity);
                row["relevance"] = json!(memory.relevance);
                row
            })
            .collect();
        return print_json(&rows);
    }

    println!("Recalled {} memories:", recalled.len());
    for (index, memory) in recalled.iter().enumerate() {
        println!(
            "#{} [{:.2}] {}  {}  [{}]",
            index + 1,
            memory.similarity,
            short_id(&memory.entry.id.to_string(), 8),
            format_timestamp(memory.entry.timestamp),
            memory.entry.content_type,
        );
        println!("   {}", one_line(&memory.entry.content, 80));
    }
    Ok(())
}

fn handle_list(engine: &PerfectRecallEngine, filter: &MemoryFilter, format: OutputFormat) -> Result<()> {
    let entries = engine.list_memories(filter)?;
    if let OutputFormat::Json = format {
        let rows: Vec<_> = entries.iter().map(entry_view).collect();
        return print_json(&rows);
    }

    if entries.is_empty() {
        println!("No memories found.");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{}  {}  [{}] {}",
            short_id(&entry.id.to_string(), 8),
            format_timestamp(entry.timestamp),
            entry.content_type,
            one_line(&entry.content, 80)
        );
    }
    Ok(())
}

fn handle_show(engine: &PerfectRecallEngine, id: &str, format: OutputFormat) -> Result<()> {
    let entry = engine.get_memory(id)?;
    match format {
        OutputFormat::Json => print_json(&entry_view(&entry)),
        OutputFormat::Text => {
            println!("ID:        {}", entry.id);
            println!("Timestamp: {}", format_timestamp(entry.timestamp));
            println!("Type:      {}", entry.content_type);
            println!(
                "Tags:      {}",
                if entry.tags.is_empty() {
                    "-".to_string()
                } else {
                    entry.tags.join(", ")
                }
            );
            println!("Success:   {:.2}", entry.success_score);
            println!("Recalled:  {} times", entry.usage_count);
            println!();
            println!("{}", entry.content);
            Ok(())
        }
    }
}

/// Entry as JSON without the embedding vector.
fn entry_view(entry: &MemoryEntry) -> serde_json::Value {
    json!({
        "id": entry.id.to_string(),
        "timestamp": entry.timestamp,
        "content": entry.content,
        "content_type": entry.content_type,
        "tags": entry.tags,
        "context": entry.context,
        "success_score": entry.success_score,
        "usage_count": entry.usage_count,
        "last_accessed": entry.last_accessed,
    })
}

fn parse_since_date(since: Option<String>) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = since else {
        return Ok(None);
    };

    let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .with_context(|| format!("invalid --since date '{raw}' (expected YYYY-MM-DD)"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("failed to build midnight datetime for '{raw}'"))?;
    Ok(Some(DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc)))
}

fn parse_tags(tags: Option<String>) -> Vec<String> {
    tags.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags_trims_and_drops_empty() {
        assert_eq!(parse_tags(Some(" rust, ,cli ".into())), vec!["rust", "cli"]);
        assert!(parse_tags(None).is_empty());
    }

    #[test]
    fn test_parse_since_date() {
        let parsed = parse_since_date(Some("2026-03-01".into())).unwrap().unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T00:00:00+00:00");
        assert!(parse_since_date(None).unwrap().is_none());
        assert!(parse_since_date(Some("03/01/2026".into())).is_err());
    }
}
