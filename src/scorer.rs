// src/scorer.rs
//! Turns raw feed entries into scored items: topic/geo labelling, recency
//! urgency, source confidence and the canonical story key used as the
//! clustering seed.

use serde::{Deserialize, Serialize};

use crate::parser::{parse_date_ms, RawItem};
use crate::taxonomy::{self, GEOS, TOPICS};

/// Function words longer than three characters that carry no story identity.
/// Shorter words are dropped wholesale by the tokenizer.
const STOPWORDS: &[&str] = &[
    "that", "this", "with", "from", "will", "have", "been", "after", "over", "into",
    "amid", "says", "said", "their", "they", "them", "about", "more", "than", "when",
    "where", "which", "while", "would", "could", "should", "against", "among", "also",
    "were", "being", "because",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoredItem {
    pub src: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_text: String,
    pub weight: f64,
    pub region: String,
    pub tags: Vec<String>,
    pub geos: Vec<String>,
    /// Publication time, epoch milliseconds.
    pub ts: i64,
    pub age_h: f64,
    pub score: f64,
    pub key: String,
}

pub fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Lowercased alphanumeric tokens with stopwords and short words removed.
pub fn story_tokens(title: &str) -> Vec<String> {
    let lowered: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered
        .split_whitespace()
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Canonical cluster seed: first eight story tokens joined with `-`.
pub fn story_key(title: &str) -> String {
    story_tokens(title)
        .into_iter()
        .take(8)
        .collect::<Vec<_>>()
        .join("-")
}

pub fn score_item(raw: RawItem, now_ms: i64) -> ScoredItem {
    let ts = parse_date_ms(&raw.pub_text).unwrap_or(now_ms);
    let age_h = ((now_ms - ts) as f64 / 3_600_000.0).max(0.0);

    let topic_hay = format!("{} {}", raw.title, raw.description);
    let tags = taxonomy::match_labels(TOPICS, &topic_hay);
    let geo_hay = format!("{} {}", topic_hay, raw.region);
    let geos = taxonomy::match_labels(GEOS, &geo_hay);

    let urgency = (1.0 - (age_h.min(36.0) / 36.0)).max(0.0);
    let impact = (tags.len() as f64 / 3.0).min(1.0);
    let confidence = raw.weight;
    let score = round3(0.5 * impact + 0.3 * confidence + 0.2 * urgency);

    let key = story_key(&raw.title);

    ScoredItem {
        src: raw.src,
        title: raw.title,
        link: raw.link,
        description: raw.description,
        pub_text: raw.pub_text,
        weight: raw.weight,
        region: raw.region,
        tags,
        geos,
        ts,
        age_h,
        score,
        key,
    }
}
