// src/aggregator.rs
//! Pipeline orchestration: fan out to every feed concurrently, settle each
//! feed independently, score and window the results, and keep the first-seen
//! and cluster KV memories fresh. One feed's failure never costs the batch.

use std::sync::Arc;

use futures::future::join_all;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use serde_json::json;
use tracing::warn;

use crate::cluster::{cluster_items, Cluster, Clusterable};
use crate::fetcher::FeedFetch;
use crate::kv::{self, KvStore, CLUSTER_PREFIX, FIRST_SEEN_TTL_SECS, ITEM_PREFIX};
use crate::parser::parse_feed;
use crate::registry::FeedRegistry;
use crate::scorer::{score_item, ScoredItem};
use crate::signing::content_hash;

pub struct Aggregator {
    registry: Arc<FeedRegistry>,
    fetcher: Arc<dyn FeedFetch>,
    kv: Arc<dyn KvStore>,
}

impl Aggregator {
    pub fn new(
        registry: Arc<FeedRegistry>,
        fetcher: Arc<dyn FeedFetch>,
        kv: Arc<dyn KvStore>,
    ) -> Self {
        // re-describing on repeat construction is harmless, so no once-guard
        describe_counter!("aggregate_items_total", "Scored items produced by aggregation runs.");
        describe_counter!("aggregate_feed_errors_total", "Feeds contributing nothing to a run.");
        describe_gauge!("aggregate_last_run_ts", "Unix ms of the last aggregation run.");
        Self {
            registry,
            fetcher,
            kv,
        }
    }

    /// Scored items for the window: score-descending, `ageH ≤ since_hours`,
    /// at most `limit`.
    pub async fn aggregate(&self, since_hours: f64, limit: usize) -> Vec<ScoredItem> {
        let now_ms = kv::now_ms();

        let fetches = self.registry.list().iter().map(|source| {
            let fetcher = Arc::clone(&self.fetcher);
            let source = source.clone();
            async move {
                match fetcher.fetch(&source).await {
                    Ok(body) => Some(parse_feed(&source, &body)),
                    Err(e) => {
                        warn!(target: "ingest", src = %source.src, error = %e, "feed skipped");
                        counter!("aggregate_feed_errors_total").increment(1);
                        None
                    }
                }
            }
        });

        // All-settled join: siblings keep going whatever one feed does.
        let mut items: Vec<ScoredItem> = join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .flatten()
            .map(|raw| score_item(raw, now_ms))
            .collect();

        items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        items.retain(|i| i.age_h <= since_hours);
        items.truncate(limit);

        self.remember_first_seen(&items, now_ms).await;

        counter!("aggregate_items_total").increment(items.len() as u64);
        gauge!("aggregate_last_run_ts").set(now_ms as f64);
        items
    }

    /// Clusters over a `2·limit` item window, keeping those with at least
    /// `min_sources` distinct sources.
    pub async fn aggregate_clusters(
        &self,
        since_hours: f64,
        limit: usize,
        min_sources: usize,
    ) -> Vec<Cluster<ScoredItem>> {
        let window = self.aggregate(since_hours, limit * 2).await;
        let mut clusters = cluster_items(window);
        clusters.retain(|c| c.sources.len() >= min_sources);
        clusters.truncate(limit);
        self.remember_clusters(&clusters).await;
        clusters
    }

    /// First-seen memory, written once per item. The key hashes the link (or
    /// key/title fallback) so arbitrarily long URLs cannot collide.
    async fn remember_first_seen(&self, items: &[ScoredItem], now_ms: i64) {
        for item in items {
            let id = first_non_empty(&[&item.link, &item.key, &item.title]);
            if id.is_empty() {
                continue;
            }
            let key = format!("{ITEM_PREFIX}{}", content_hash(id));
            if self.kv.get(&key).await.is_some() {
                continue;
            }
            let record = json!({
                "firstSeenTs": now_ms,
                "link": item.link,
                "title": item.title,
            });
            if let Err(e) = self.kv.put(&key, record, FIRST_SEEN_TTL_SECS).await {
                warn!(target: "ingest", error = %e, "first-seen write failed");
            }
        }
    }

    async fn remember_clusters<T: Clusterable>(&self, clusters: &[Cluster<T>]) {
        for cluster in clusters {
            if cluster.key.is_empty() {
                continue;
            }
            let key = format!("{CLUSTER_PREFIX}{}", cluster.key);
            let record = json!({
                "key": cluster.key,
                "lastSeenTs": cluster.last_seen_ts,
                "sources": cluster.sources,
                "tags": cluster.tags,
            });
            if let Err(e) = self.kv.put(&key, record, FIRST_SEEN_TTL_SECS).await {
                warn!(target: "ingest", error = %e, "cluster memory write failed");
            }
        }
    }
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> &'a str {
    candidates
        .iter()
        .copied()
        .find(|s| !s.trim().is_empty())
        .unwrap_or("")
}
