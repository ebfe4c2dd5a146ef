// src/search.rs
//! In-memory query over the aggregation window. Every whitespace-separated
//! query token must appear somewhere in the item's haystack.

use crate::scorer::ScoredItem;

pub const DEFAULT_SINCE_HOURS: f64 = 48.0;
pub const DEFAULT_LIMIT: usize = 60;
/// Items pulled from the aggregator before filtering.
pub const WINDOW_LIMIT: usize = 240;

fn haystack(item: &ScoredItem) -> String {
    format!(
        "{} {} {} {}",
        item.title,
        item.description,
        item.tags.join(" "),
        item.geos.join(" ")
    )
    .to_lowercase()
}

pub fn matches(item: &ScoredItem, query: &str) -> bool {
    let hay = haystack(item);
    query
        .to_lowercase()
        .split_whitespace()
        .all(|tok| hay.contains(tok))
}

pub fn filter_items(items: &[ScoredItem], query: &str, limit: usize) -> Vec<ScoredItem> {
    items
        .iter()
        .filter(|i| matches(i, query))
        .take(limit)
        .cloned()
        .collect()
}
