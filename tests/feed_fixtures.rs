// tests/feed_fixtures.rs
//
// Realistic feed payloads exercised end to end: one RSS 2.0 feed with CDATA
// and embedded markup, one Atom feed with typed links, one RDF feed with
// dc:date stamps. Fixtures are embedded so the tests never touch the network.

use std::sync::Arc;

use intel_aggregator::aggregator::Aggregator;
use intel_aggregator::fetcher::FixtureFetcher;
use intel_aggregator::kv::MemoryKv;
use intel_aggregator::parser::parse_feed;
use intel_aggregator::registry::{FeedRegistry, FeedSource};
use intel_aggregator::search;

const WORLD_RSS: &str = include_str!("fixtures/world_rss.xml");
const PACIFIC_ATOM: &str = include_str!("fixtures/pacific_atom.xml");
const CONTINENTAL_RDF: &str = include_str!("fixtures/continental_rdf.xml");

/// The fixtures carry fixed publication dates; a wide window keeps them all
/// visible regardless of when the suite runs.
const WIDE_WINDOW_HOURS: f64 = 24.0 * 366.0 * 4.0;

fn source(src: &str, weight: f64, region: &str) -> FeedSource {
    FeedSource {
        src: src.into(),
        url: format!("https://{src}.test/feed"),
        weight,
        region: region.into(),
    }
}

#[test]
fn rss_fixture_parses_with_cdata_markup_and_guid_fallback() {
    let items = parse_feed(&source("world", 0.9, "Europe"), WORLD_RSS);
    assert_eq!(items.len(), 4);

    let un = &items[0];
    assert_eq!(
        un.title,
        "UN Security Council meets over missile test & sanctions push"
    );
    assert_eq!(un.link, "https://worldservice.test/news/un-council-missile");
    assert_eq!(
        un.description,
        "The Security Council convened an emergency session after the latest ballistic missile test."
    );
    assert_eq!(un.pub_text, "Fri, 12 Sep 2025 06:15:00 GMT");

    // no <link>, but the guid is a URL
    let markets = &items[3];
    assert_eq!(markets.link, "https://worldservice.test/news/markets-hold");
}

#[test]
fn atom_fixture_prefers_alternate_links_and_cleans_html_content() {
    let items = parse_feed(&source("pacific", 0.8, "Oceania"), PACIFIC_ATOM);
    assert_eq!(items.len(), 2);

    let drills = &items[0];
    assert!(drills.title.starts_with("Navy drills expand"));
    assert!(drills.title.ends_with("carriers deployed"));
    // the audio enclosure comes first in the document; alternate still wins
    assert_eq!(
        drills.link,
        "https://pacificmonitor.test/stories/navy-drills-strait"
    );
    assert!(drills.description.starts_with("Two carrier groups"));
    assert_eq!(drills.pub_text, "2025-09-12T06:45:00Z");

    let cable = &items[1];
    assert_eq!(cable.link, "https://pacificmonitor.test/stories/cable-fault");
    assert_eq!(
        cable.description,
        "Repair ships are en route after a submarine cable fault cut connectivity to several Pacific islands."
    );
}

#[test]
fn rdf_fixture_parses_dc_dates() {
    let items = parse_feed(&source("continental", 0.7, "Africa"), CONTINENTAL_RDF);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].pub_text, "2025-09-12T05:10:00+00:00");
    assert!(items[0].title.starts_with("Power grid failure"));
    assert_eq!(items[1].pub_text, "2025-09-11T20:45:00+00:00");
}

fn fixture_aggregator() -> Aggregator {
    Aggregator::new(
        Arc::new(FeedRegistry::from_sources(vec![
            source("world", 0.9, "Europe"),
            source("pacific", 0.8, "Oceania"),
            source("continental", 0.7, "Africa"),
        ])),
        Arc::new(FixtureFetcher::from_fixtures([
            ("world", WORLD_RSS),
            ("pacific", PACIFIC_ATOM),
            ("continental", CONTINENTAL_RDF),
        ])),
        Arc::new(MemoryKv::new()),
    )
}

#[tokio::test]
async fn aggregation_over_all_three_formats() {
    let items = fixture_aggregator().aggregate(WIDE_WINDOW_HOURS, 80).await;
    assert_eq!(items.len(), 8);

    for pair in items.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for item in &items {
        assert!((0.0..=1.0).contains(&item.score));
        assert!(item.age_h >= 0.0);
        assert!(!item.key.is_empty());
    }

    let un = items
        .iter()
        .find(|i| i.title.starts_with("UN Security Council"))
        .expect("UN item present");
    assert!(un.tags.contains(&"Conflict/Military".to_string()));
    assert!(un.tags.contains(&"Diplomacy".to_string()));
    assert!(un.tags.contains(&"Economy/Sanctions".to_string()));

    let drills = items
        .iter()
        .find(|i| i.title.starts_with("Navy drills"))
        .expect("drills item present");
    assert!(drills.tags.contains(&"Maritime".to_string()));
    assert!(drills.geos.contains(&"Oceania".to_string()));
}

#[tokio::test]
async fn distinct_stories_stay_in_distinct_clusters() {
    let clusters = fixture_aggregator()
        .aggregate_clusters(WIDE_WINDOW_HOURS, 40, 1)
        .await;
    assert_eq!(clusters.len(), 8);
    for c in &clusters {
        assert_eq!(c.sources.len(), 1);
        assert_eq!(c.items.len(), 1);
        assert!(c.first_seen_ts <= c.last_seen_ts);
    }
}

#[tokio::test]
async fn search_spans_all_fixture_feeds() {
    let window = fixture_aggregator().aggregate(WIDE_WINDOW_HOURS, 240).await;

    let hits = search::filter_items(&window, "ransomware port", 60);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].src, "world");

    let cable = search::filter_items(&window, "cable fault", 60);
    assert_eq!(cable.len(), 1);
    assert_eq!(cable[0].src, "pacific");

    // AND semantics across feeds: no single story mentions both
    assert!(search::filter_items(&window, "ransomware blackout", 60).is_empty());
}
