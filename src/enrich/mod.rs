// src/enrich/mod.rs
//! Per-item AI enrichment. Items at the head of the window flow through
//! language detect → translate → zero-shot → summary → sentiment → NER, each
//! task individually guarded: a failure leaves its field empty and the chain
//! continues. Rejected credentials stop the chain for that item. Results are
//! cached in KV under a content hash so repeat requests are deterministic.

pub mod hf;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cluster::Clusterable;
use crate::config::AppConfig;
use crate::kv::{KvStore, ENRICH_PREFIX};
use crate::scorer::ScoredItem;
use crate::signing::content_hash;
use crate::taxonomy;

use hf::{HfClient, HfError};

/// Hard per-task deadline; a slow model must not stall the whole item.
const TASK_TIMEOUT: Duration = Duration::from_secs(8);
/// Request-level budget for a whole enrichment batch. Once spent, remaining
/// items pass through untouched; partial results beat no results.
const REQUEST_BUDGET: Duration = Duration::from_secs(30);
/// English normalized text is capped at this many characters.
const NORMALIZED_TEXT_MAX_CHARS: usize = 2000;

/// The cached, deterministic part of an enriched item. Base item fields
/// (score, age) are recomputed per request and never cached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    pub lang: String,
    pub translated: bool,
    pub normalized_text: String,
    pub summary: String,
    pub zs_labels: Vec<String>,
    pub sentiment: Value,
    pub entities: Value,
}

impl Enrichment {
    fn empty(normalized_text: String) -> Self {
        Self {
            lang: "en".to_string(),
            translated: false,
            normalized_text,
            summary: String::new(),
            zs_labels: Vec::new(),
            sentiment: Value::Null,
            entities: Value::Null,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedItem {
    #[serde(flatten)]
    pub base: ScoredItem,
    pub lang: String,
    pub translated: bool,
    pub normalized_text: String,
    pub summary: String,
    pub zs_labels: Vec<String>,
    pub sentiment: Value,
    pub entities: Value,
}

impl Clusterable for EnrichedItem {
    fn key(&self) -> &str {
        &self.base.key
    }
    fn title(&self) -> &str {
        &self.base.title
    }
    fn src(&self) -> &str {
        &self.base.src
    }
    fn ts(&self) -> i64 {
        self.base.ts
    }
    fn score(&self) -> f64 {
        self.base.score
    }
    fn tags(&self) -> &[String] {
        &self.base.tags
    }
    fn geos(&self) -> &[String] {
        &self.base.geos
    }
}

/// Merged tags land on the base item, so enrichment only ever widens them.
fn apply(mut base: ScoredItem, e: Enrichment) -> EnrichedItem {
    for label in &e.zs_labels {
        if !base.tags.contains(label) {
            base.tags.push(label.clone());
        }
    }
    EnrichedItem {
        base,
        lang: e.lang,
        translated: e.translated,
        normalized_text: e.normalized_text,
        summary: e.summary,
        zs_labels: e.zs_labels,
        sentiment: e.sentiment,
        entities: e.entities,
    }
}

enum TaskOutcome<T> {
    Value(T),
    Skip,
    Auth,
}

pub struct Enricher {
    client: HfClient,
    kv: Arc<dyn KvStore>,
    cap: usize,
    ttl_secs: u64,
}

impl Enricher {
    pub fn new(cfg: &AppConfig, kv: Arc<dyn KvStore>) -> Self {
        Self::with_client(HfClient::from_config(cfg), kv, cfg.max_enrich, cfg.enrich_ttl_secs)
    }

    pub fn with_client(
        client: HfClient,
        kv: Arc<dyn KvStore>,
        cap: usize,
        ttl_secs: u64,
    ) -> Self {
        Self {
            client,
            kv,
            cap,
            ttl_secs,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.client.pool_size()
    }

    /// Enrich the head of the list up to the cap; the tail passes through
    /// untouched. Input order is preserved.
    pub async fn enrich_items(&self, items: Vec<ScoredItem>) -> Vec<EnrichedItem> {
        let started = std::time::Instant::now();
        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            if idx < self.cap && started.elapsed() < REQUEST_BUDGET {
                out.push(self.enrich_one(item).await);
            } else {
                let text = normalized_input(&item);
                out.push(apply(item, Enrichment::empty(text)));
            }
        }
        out
    }

    async fn enrich_one(&self, item: ScoredItem) -> EnrichedItem {
        let id = item_identity(&item);
        let cache_key = format!("{ENRICH_PREFIX}{}", content_hash(id));

        if let Some(cached) = self.kv.get(&cache_key).await {
            if let Ok(e) = serde_json::from_value::<Enrichment>(cached) {
                metrics::counter!("enrich_cache_hits_total").increment(1);
                return apply(item, e);
            }
        }
        metrics::counter!("enrich_cache_misses_total").increment(1);

        let text = normalized_input(&item);
        let mut e = Enrichment::empty(text.clone());
        let mut auth_failed = false;

        match self.run_task("language", self.client.detect_language(&text)).await {
            TaskOutcome::Value(code) => e.lang = code,
            TaskOutcome::Auth => auth_failed = true,
            TaskOutcome::Skip => {}
        }

        if !auth_failed && e.lang != "en" {
            match self.run_task("translate", self.client.translate(&text)).await {
                TaskOutcome::Value(t) => {
                    e.normalized_text = truncate_chars(&t, NORMALIZED_TEXT_MAX_CHARS);
                    e.translated = true;
                }
                TaskOutcome::Auth => auth_failed = true,
                TaskOutcome::Skip => {}
            }
        }

        if !auth_failed {
            let labels = taxonomy::topic_labels();
            match self
                .run_task("zero-shot", self.client.zero_shot(&e.normalized_text, &labels))
                .await
            {
                TaskOutcome::Value(l) => e.zs_labels = l,
                TaskOutcome::Auth => auth_failed = true,
                TaskOutcome::Skip => {}
            }
        }

        if !auth_failed {
            match self
                .run_task("summary", self.client.summarize(&e.normalized_text))
                .await
            {
                TaskOutcome::Value(s) => e.summary = s,
                TaskOutcome::Auth => auth_failed = true,
                TaskOutcome::Skip => {}
            }
        }

        if !auth_failed {
            match self
                .run_task("sentiment", self.client.sentiment(&e.normalized_text))
                .await
            {
                TaskOutcome::Value(v) => e.sentiment = v,
                TaskOutcome::Auth => auth_failed = true,
                TaskOutcome::Skip => {}
            }
        }

        if !auth_failed {
            match self.run_task("ner", self.client.ner(&e.normalized_text)).await {
                TaskOutcome::Value(v) => e.entities = v,
                TaskOutcome::Auth => auth_failed = true,
                TaskOutcome::Skip => {}
            }
        }

        if auth_failed {
            // Rejected credentials: return the item un-enriched and do not
            // poison the cache for an hour.
            return apply(item, e);
        }

        if let Err(err) = self
            .kv
            .put(&cache_key, serde_json::to_value(&e).unwrap_or(Value::Null), self.ttl_secs)
            .await
        {
            warn!(target: "enrich", error = %err, "enrichment cache write failed");
        }
        apply(item, e)
    }

    async fn run_task<T>(
        &self,
        name: &str,
        fut: impl std::future::Future<Output = Result<T, HfError>>,
    ) -> TaskOutcome<T> {
        match tokio::time::timeout(TASK_TIMEOUT, fut).await {
            Ok(Ok(v)) => TaskOutcome::Value(v),
            Ok(Err(HfError::Auth { status })) => {
                warn!(target: "enrich", task = name, status, "credentials rejected");
                TaskOutcome::Auth
            }
            Ok(Err(e)) => {
                debug!(target: "enrich", task = name, error = %e, "task failed");
                TaskOutcome::Skip
            }
            Err(_) => {
                debug!(target: "enrich", task = name, "task timed out");
                TaskOutcome::Skip
            }
        }
    }
}

/// Identity used for the cache key: link, else story key, else title.
fn item_identity(item: &ScoredItem) -> &str {
    [&item.link, &item.key, &item.title]
        .into_iter()
        .map(String::as_str)
        .find(|s| !s.trim().is_empty())
        .unwrap_or("")
}

fn normalized_input(item: &ScoredItem) -> String {
    let joined = if item.description.is_empty() {
        item.title.clone()
    } else {
        format!("{}. {}", item.title, item.description)
    };
    truncate_chars(&joined, NORMALIZED_TEXT_MAX_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
