// src/stream.rs
//! Server-sent events. Each connection owns one emitter task: an `init` frame
//! after a first aggregation, then `tick` frames on a clamped interval, until
//! the 90 s edge ceiling or the client hangs up. Dropping the response drops
//! the channel, the emitter sees it and stops before starting any more
//! upstream work.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::aggregator::Aggregator;
use crate::kv::now_ms;
use crate::scorer::ScoredItem;

pub const DEFAULT_SINCE_HOURS: f64 = 6.0;
pub const DEFAULT_INTERVAL_MS: u64 = 4000;
pub const MIN_INTERVAL_MS: u64 = 2500;
pub const MAX_INTERVAL_MS: u64 = 15_000;
/// Edge-imposed connection ceiling; clients reconnect.
pub const STREAM_DEADLINE_SECS: u64 = 90;

const INIT_WINDOW_LIMIT: usize = 40;
const TICK_WINDOW_HOURS: f64 = 2.0;
const TICK_ITEM_COUNT: usize = 8;

pub fn clamp_interval(interval_ms: u64) -> u64 {
    interval_ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS)
}

pub fn sse_stream(
    aggregator: Arc<Aggregator>,
    since_hours: f64,
    interval_ms: u64,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Event>(16);
    tokio::spawn(run_emitter(
        aggregator,
        tx,
        since_hours,
        clamp_interval(interval_ms),
        Duration::from_secs(STREAM_DEADLINE_SECS),
    ));
    Sse::new(ReceiverStream::new(rx).map(Ok))
}

async fn run_emitter(
    aggregator: Arc<Aggregator>,
    tx: mpsc::Sender<Event>,
    since_hours: f64,
    interval_ms: u64,
    deadline: Duration,
) {
    metrics::counter!("sse_connections_total").increment(1);
    let deadline = tokio::time::sleep(deadline);
    tokio::pin!(deadline);

    // init carries the size of the opening window and always precedes ticks
    let items = aggregator.aggregate(since_hours, INIT_WINDOW_LIMIT).await;
    let init = json!({ "ts": now_ms(), "count": items.len() });
    if tx
        .send(Event::default().event("init").data(init.to_string()))
        .await
        .is_err()
    {
        return;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // consume the immediate first fire

    loop {
        tokio::select! {
            // a dropped receiver ends the connection right away; waiting for
            // the next tick could be up to 15 s with a client-chosen interval
            _ = tx.closed() => {
                debug!(target: "stream", "client disconnected");
                break;
            }
            _ = &mut deadline => {
                debug!(target: "stream", "connection deadline reached");
                break;
            }
            _ = ticker.tick() => {
                // guards the race where the tick and the hang-up are ready
                // in the same poll
                if tx.is_closed() {
                    break;
                }
                let event = match tick_items(&aggregator).await {
                    Ok(items) => {
                        let payload = json!({ "ts": now_ms(), "items": items });
                        Event::default().event("tick").data(payload.to_string())
                    }
                    Err(e) => {
                        let payload = json!({ "error": e.to_string() });
                        Event::default().event("error").data(payload.to_string())
                    }
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Freshest items for a tick frame. Aggregation swallows feed failures, so
/// the error arm only fires on internal trouble; it still must not kill the
/// connection.
async fn tick_items(aggregator: &Aggregator) -> anyhow::Result<Vec<ScoredItem>> {
    Ok(aggregator
        .aggregate(TICK_WINDOW_HOURS, TICK_ITEM_COUNT)
        .await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FixtureFetcher;
    use crate::kv::MemoryKv;
    use crate::registry::{FeedRegistry, FeedSource};

    fn aggregator() -> Arc<Aggregator> {
        let date = chrono::Utc::now().to_rfc2822();
        let xml = format!(
            "<rss><channel><item><title>Live story about sanctions</title>\
             <link>https://a.test/1</link><pubDate>{date}</pubDate></item></channel></rss>"
        );
        Arc::new(Aggregator::new(
            Arc::new(FeedRegistry::from_sources(vec![FeedSource {
                src: "a".into(),
                url: "https://a.test/rss".into(),
                weight: 0.8,
                region: "Europe".into(),
            }])),
            Arc::new(FixtureFetcher::from_fixtures([("a", xml)])),
            Arc::new(MemoryKv::new()),
        ))
    }

    #[test]
    fn interval_clamps_to_the_allowed_band() {
        assert_eq!(clamp_interval(100), MIN_INTERVAL_MS);
        assert_eq!(clamp_interval(4000), 4000);
        assert_eq!(clamp_interval(60_000), MAX_INTERVAL_MS);
    }

    #[tokio::test(start_paused = true)]
    async fn init_precedes_ticks_and_deadline_closes_the_stream() {
        let (tx, mut rx) = mpsc::channel::<Event>(16);
        let handle = tokio::spawn(run_emitter(
            aggregator(),
            tx,
            6.0,
            MIN_INTERVAL_MS,
            Duration::from_secs(9),
        ));

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(format!("{ev:?}"));
        }
        handle.await.unwrap();

        // one init, then only ticks until the deadline
        assert!(events[0].contains("init"));
        assert!(events.len() >= 2);
        for ev in &events[1..] {
            assert!(ev.contains("tick"), "unexpected frame: {ev}");
        }
        // 9s deadline at 2.5s cadence → 3 ticks
        assert_eq!(events.len(), 1 + 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_receiver_stops_the_emitter_within_a_second() {
        let (tx, mut rx) = mpsc::channel::<Event>(16);
        let handle = tokio::spawn(run_emitter(
            aggregator(),
            tx,
            6.0,
            MAX_INTERVAL_MS,
            Duration::from_secs(90),
        ));

        // consume init so the emitter is parked in its select loop
        let first = rx.recv().await.expect("init frame");
        assert!(format!("{first:?}").contains("init"));

        let hung_up = tokio::time::Instant::now();
        drop(rx);
        handle.await.unwrap();

        // the emitter must notice the hang-up immediately; if it waited for
        // the next tick, virtual time would have jumped 15 s forward
        assert!(hung_up.elapsed() < Duration::from_secs(1));
    }
}
