use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn short_id(id: &str, len: usize) -> String {
    id.chars().take(len).collect()
}

pub(crate) fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

/// First line only, truncated; for one-row listings.
pub(crate) fn one_line(value: &str, max_chars: usize) -> String {
    truncate_chars(value.lines().next().unwrap_or(""), max_chars)
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_counts_chars() {
        assert_eq!(truncate_chars("héllo", 5), "héllo");
        assert_eq!(truncate_chars("héllo world", 5), "héllo...");
    }

    #[test]
    fn test_one_line() {
        assert_eq!(one_line("first\nsecond", 80), "first");
        assert_eq!(one_line("", 80), "");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("01J0ABCDEFGH", 8), "01J0ABCD");
        assert_eq!(short_id("abc", 8), "abc");
    }
}
