// src/cluster.rs
//! Two-pass story clustering: exact story-key buckets, then a greedy
//! left-to-right Jaccard merge over title tokens. Works for plain and
//! enriched items through the `Clusterable` seam.

use std::collections::HashSet;

use serde::Serialize;

use crate::scorer::{round3, story_tokens, ScoredItem};
use crate::taxonomy::GEO_TOKEN_SET;

/// Buckets merge when their title token sets overlap at least this much.
pub const MERGE_THRESHOLD: f64 = 0.6;

/// Corroboration saturates at five distinct sources.
const CORROBORATION_CAP_SOURCES: f64 = 4.0;

pub trait Clusterable {
    fn key(&self) -> &str;
    fn title(&self) -> &str;
    fn src(&self) -> &str;
    fn ts(&self) -> i64;
    fn score(&self) -> f64;
    fn tags(&self) -> &[String];
    fn geos(&self) -> &[String];
}

impl Clusterable for ScoredItem {
    fn key(&self) -> &str {
        &self.key
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn src(&self) -> &str {
        &self.src
    }
    fn ts(&self) -> i64 {
        self.ts
    }
    fn score(&self) -> f64 {
        self.score
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
    fn geos(&self) -> &[String] {
        &self.geos
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster<T> {
    pub key: String,
    pub items: Vec<T>,
    pub tags: Vec<String>,
    pub geos: Vec<String>,
    pub sources: Vec<String>,
    pub first_seen_ts: i64,
    pub last_seen_ts: i64,
    pub score: f64,
}

/// `|A ∩ B| / |A ∪ B|`; empty union counts as no similarity.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    inter as f64 / union as f64
}

/// Title tokens used for the merge pass. Geo keywords are dropped: place
/// names dominate rewritten headlines without distinguishing the story.
pub fn merge_tokens(title: &str) -> HashSet<String> {
    story_tokens(title)
        .into_iter()
        .filter(|t| !GEO_TOKEN_SET.contains(t.as_str()))
        .collect()
}

pub fn cluster_items<T: Clusterable>(items: Vec<T>) -> Vec<Cluster<T>> {
    // Pass 1: exact key buckets, first-appearance order.
    let mut order: Vec<String> = Vec::new();
    let mut buckets: std::collections::HashMap<String, Vec<T>> = std::collections::HashMap::new();
    for item in items {
        let key = item.key().to_string();
        if !buckets.contains_key(&key) {
            order.push(key.clone());
        }
        buckets.entry(key).or_default().push(item);
    }

    let mut groups: Vec<Vec<T>> = order
        .iter()
        .map(|k| buckets.remove(k).unwrap_or_default())
        .collect();

    // Pass 2: greedy merge. A bucket absorbed into an earlier one is done;
    // it is never re-examined as a merge seed.
    let mut absorbed = vec![false; groups.len()];
    for i in 0..groups.len() {
        if absorbed[i] {
            continue;
        }
        let tokens_i = merge_tokens(groups[i][0].title());
        for j in (i + 1)..groups.len() {
            if absorbed[j] {
                continue;
            }
            let tokens_j = merge_tokens(groups[j][0].title());
            if jaccard(&tokens_i, &tokens_j) >= MERGE_THRESHOLD {
                let moved = std::mem::take(&mut groups[j]);
                groups[i].extend(moved);
                absorbed[j] = true;
            }
        }
    }

    let mut clusters: Vec<Cluster<T>> = groups
        .into_iter()
        .zip(absorbed)
        .filter(|(g, gone)| !gone && !g.is_empty())
        .map(|(g, _)| build_cluster(g))
        .collect();

    // Corroboration first, then score, then freshness.
    clusters.sort_by(|a, b| {
        b.sources
            .len()
            .cmp(&a.sources.len())
            .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| b.last_seen_ts.cmp(&a.last_seen_ts))
    });
    clusters
}

fn build_cluster<T: Clusterable>(mut items: Vec<T>) -> Cluster<T> {
    // seed key comes from the bucket that opened the cluster, before the
    // newest-first reorder below
    let key = items
        .iter()
        .map(|i| i.key())
        .find(|k| !k.is_empty())
        .unwrap_or_default()
        .to_string();

    items.sort_by(|a, b| b.ts().cmp(&a.ts()));

    let mut tags = Vec::new();
    let mut geos = Vec::new();
    let mut sources = Vec::new();
    let mut seen_tags = HashSet::new();
    let mut seen_geos = HashSet::new();
    let mut seen_sources = HashSet::new();
    let mut first_seen_ts = i64::MAX;
    let mut last_seen_ts = i64::MIN;
    let mut best_score = 0.0f64;

    for item in &items {
        for t in item.tags() {
            if seen_tags.insert(t.clone()) {
                tags.push(t.clone());
            }
        }
        for g in item.geos() {
            if seen_geos.insert(g.clone()) {
                geos.push(g.clone());
            }
        }
        if seen_sources.insert(item.src().to_string()) {
            sources.push(item.src().to_string());
        }
        first_seen_ts = first_seen_ts.min(item.ts());
        last_seen_ts = last_seen_ts.max(item.ts());
        best_score = best_score.max(item.score());
    }

    let corroboration = (((sources.len() as f64) - 1.0) / CORROBORATION_CAP_SOURCES).min(1.0);
    let score = round3(0.8 * best_score + 0.2 * corroboration);

    Cluster {
        key,
        items,
        tags,
        geos,
        sources,
        first_seen_ts,
        last_seen_ts,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::story_key;

    fn item(src: &str, title: &str, ts: i64, score: f64) -> ScoredItem {
        ScoredItem {
            src: src.into(),
            title: title.into(),
            link: format!("https://{src}.test/{ts}"),
            description: String::new(),
            pub_text: String::new(),
            weight: 0.8,
            region: "Europe".into(),
            tags: vec![],
            geos: vec![],
            ts,
            age_h: 0.0,
            score,
            key: story_key(title),
        }
    }

    #[test]
    fn same_key_items_form_one_cluster() {
        let items = vec![
            item("a", "Parliament approves defense budget increase", 100, 0.5),
            item("b", "Parliament Approves Defense Budget Increase", 200, 0.6),
            item("c", "parliament approves defense budget increase!", 300, 0.4),
        ];
        let clusters = cluster_items(items);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].sources.len(), 3);
    }

    #[test]
    fn rewritten_headline_with_geo_swap_merges() {
        let items = vec![
            item("feed-a", "China launches new satellite", 1_000, 0.7),
            item(
                "feed-b",
                "Beijing Launches New Satellite for Observation",
                2_000,
                0.6,
            ),
        ];
        let clusters = cluster_items(items);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].sources.len(), 2);
        assert_eq!(clusters[0].first_seen_ts, 1_000);
        assert_eq!(clusters[0].last_seen_ts, 2_000);
        // newest first inside the cluster
        assert_eq!(clusters[0].items[0].src, "feed-b");
    }

    #[test]
    fn jaccard_threshold_is_inclusive_at_0_6() {
        // 3 shared of 5 union → exactly 0.6 → merge
        let a = vec![item("a", "quantum reactor prototype unveiled", 10, 0.5)];
        let b = vec![item("b", "quantum reactor prototype shipped", 20, 0.5)];
        let ta = merge_tokens(&a[0].title);
        let tb = merge_tokens(&b[0].title);
        assert!((jaccard(&ta, &tb) - 0.6).abs() < 1e-9);
        let clusters = cluster_items([a, b].concat());
        assert_eq!(clusters.len(), 1);

        // 2 shared of 6 union → 0.33 → stays apart
        let c = item("c", "quantum reactor meltdown feared widely", 30, 0.5);
        let d = item("d", "quantum reactor tourism booms quietly", 40, 0.5);
        let tc = merge_tokens(&c.title);
        let td = merge_tokens(&d.title);
        assert!(jaccard(&tc, &td) < MERGE_THRESHOLD);
        let clusters = cluster_items(vec![c, d]);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn sources_are_distinct_and_unions_hold() {
        let mut a = item("a", "Cyber attack disrupts port operations", 100, 0.5);
        a.tags = vec!["Cyber/Security".into()];
        a.geos = vec!["Europe".into()];
        let mut b = item("a", "Cyber attack disrupts port operations", 200, 0.7);
        b.tags = vec!["Cyber/Security".into(), "Maritime".into()];
        b.geos = vec!["Asia".into()];

        let clusters = cluster_items(vec![a, b]);
        assert_eq!(clusters.len(), 1);
        let c = &clusters[0];
        assert_eq!(c.sources, vec!["a".to_string()]);
        assert_eq!(
            c.tags,
            vec!["Cyber/Security".to_string(), "Maritime".to_string()]
        );
        assert_eq!(c.geos, vec!["Europe".to_string(), "Asia".to_string()]);
        assert!(c.first_seen_ts <= c.last_seen_ts);
    }

    #[test]
    fn cluster_score_blends_best_item_and_corroboration() {
        let items = vec![
            item("a", "Pipeline rupture forces evacuation order", 100, 0.5),
            item("b", "Pipeline rupture forces evacuation order", 200, 0.9),
        ];
        let clusters = cluster_items(items);
        // 0.8 * 0.9 + 0.2 * (1/4)
        assert_eq!(clusters[0].score, round3(0.8 * 0.9 + 0.2 * 0.25));
    }

    #[test]
    fn ordering_prefers_sources_then_score_then_recency() {
        let many = vec![
            item("a", "Volcanic eruption grounds regional flights", 100, 0.2),
            item("b", "Volcanic eruption grounds regional flights", 150, 0.2),
            item("c", "Volcanic eruption grounds regional flights", 120, 0.2),
        ];
        let single_hot = vec![item("d", "Submarine cable severed near terminal", 900, 0.95)];
        let clusters = cluster_items([many, single_hot].concat());
        assert_eq!(clusters.len(), 2);
        // three sources beat one despite the lower score
        assert_eq!(clusters[0].sources.len(), 3);
        assert_eq!(clusters[1].sources.len(), 1);
    }

    #[test]
    fn corroboration_caps_at_five_sources() {
        let items: Vec<ScoredItem> = (0..7)
            .map(|i| {
                item(
                    &format!("s{i}"),
                    "Grid blackout spreads across provinces",
                    100 + i,
                    0.5,
                )
            })
            .collect();
        let clusters = cluster_items(items);
        assert_eq!(clusters[0].score, round3(0.8 * 0.5 + 0.2 * 1.0));
    }
}
