//! # Worldwide Intel Aggregation Service — Binary Entrypoint
//! Boots the Axum HTTP server, wiring routes, shared state, and middleware.
//!
//! ## Endpoints
//! - `GET /api/health` — liveness + source count
//! - `GET /api/sources` — feed registry
//! - `GET /api/feeds` — scored item window
//! - `GET /api/clusters` — corroboration clusters
//! - `GET /api/enrich`, `/api/clusters/enriched` — AI-enriched views
//! - `GET /api/search` — substring query over the window
//! - `GET /api/topics` — topic/geo dictionaries
//! - `GET /api/stream` — live SSE feed
//! - `GET /metrics` — Prometheus exposition

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use intel_aggregator::aggregator::Aggregator;
use intel_aggregator::api::{self, ApiState};
use intel_aggregator::config::AppConfig;
use intel_aggregator::enrich::Enricher;
use intel_aggregator::fetcher::HttpFetcher;
use intel_aggregator::kv::{KvStore, MemoryKv};
use intel_aggregator::metrics::Metrics;
use intel_aggregator::registry::FeedRegistry;

/// Warm-cache cadence and window, matching the scheduled trigger cadence of
/// the edge deployment.
const WARM_INTERVAL_SECS: u64 = 600;
const WARM_SINCE_HOURS: f64 = 12.0;
const WARM_LIMIT: usize = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    let registry = Arc::new(FeedRegistry::load_default());
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());

    let prom = Metrics::install(&[
        ("enrich_cache_ttl_secs", config.enrich_ttl_secs as f64),
        ("feed_sources", registry.len() as f64),
    ])?;

    let aggregator = Arc::new(Aggregator::new(
        Arc::clone(&registry),
        Arc::new(HttpFetcher::new(Arc::clone(&kv))),
        Arc::clone(&kv),
    ));
    let enricher = Arc::new(Enricher::new(&config, Arc::clone(&kv)));

    // Startup probe: safe diagnostics only (counts, not secrets).
    info!(
        sources = registry.len(),
        hf_tokens = enricher.pool_size(),
        signing = config.api_secret.is_some(),
        "intel aggregator starting"
    );

    spawn_warm_cache(Arc::clone(&aggregator));

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(ApiState {
        config,
        registry,
        aggregator,
        enricher,
    });

    let app = api::create_router(state).merge(prom.router());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodic warm-cache run. Failures are logged and ignored; the next tick
/// tries again.
fn spawn_warm_cache(aggregator: Arc<Aggregator>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(WARM_INTERVAL_SECS));
        ticker.tick().await; // skip the immediate fire; the first requests warm us
        loop {
            ticker.tick().await;
            let items = aggregator.aggregate(WARM_SINCE_HOURS, WARM_LIMIT).await;
            if items.is_empty() {
                warn!(target: "ingest", "warm-cache run produced no items");
            } else {
                info!(target: "ingest", items = items.len(), "warm-cache run complete");
            }
        }
    })
}
