use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use estuary::app::Result;
use estuary::config::{Config, UpdateConfig};
use estuary::daemon::Daemon;
use estuary::domain::NewFeed;
use estuary::engine::{Engine, EngineEvent};
use estuary::fetcher::{FetchResult, Fetcher};
use estuary::store::{SqliteStore, Store};

const FEED: &str = "https://a.example/feed.xml";

struct FixedFetcher;

#[async_trait]
impl Fetcher for FixedFetcher {
    async fn fetch(&self, _url: &str, _since: Option<DateTime<Utc>>) -> Result<FetchResult> {
        Ok(FetchResult::Content {
            body: br#"<?xml version="1.0"?><rss version="2.0"><channel><title>A</title><link>https://a.example/</link><description>d</description><item><guid>a-1</guid><title>One</title></item><item><guid>a-2</guid><title>Two</title></item></channel></rss>"#.to_vec(),
            build_time: None,
        })
    }
}

#[tokio::test]
async fn test_daemon_updates_on_timer_and_flushes_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("estuary.db");
    let durable = SqliteStore::new(&db_path).unwrap();
    durable.add_feed(&NewFeed::new(FEED)).unwrap();

    let mut config = Config::default();
    config.storage.shutdown_flush_timeout_secs = 10;
    let engine = Engine::start_with(&config, durable, Arc::new(FixedFetcher))
        .await
        .unwrap();
    let mut events = engine.subscribe();

    let update = UpdateConfig {
        on_startup: true,
        auto_update: true,
        interval: "1s".to_string(),
    };
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let daemon = tokio::spawn(Daemon::new(engine, update).run_until(async {
        let _ = stop_rx.await;
    }));

    // One cycle from startup, one from the timer
    let mut cycles = 0;
    tokio::time::timeout(Duration::from_secs(10), async {
        while cycles < 2 {
            if events.recv().await.unwrap() == EngineEvent::UpdateDone {
                cycles += 1;
            }
        }
    })
    .await
    .expect("daemon did not run two update cycles");

    stop_tx.send(()).unwrap();
    let report = daemon.await.unwrap().unwrap().expect("no final flush");
    assert_eq!(report.feeds, 1);

    let mut flushed = false;
    while let Ok(event) = events.try_recv() {
        flushed |= matches!(event, EngineEvent::Flushed(_));
    }
    assert!(flushed);

    let durable = SqliteStore::new(&db_path).unwrap();
    let feed = durable.get_feed_by_url(FEED).unwrap().unwrap();
    assert_eq!(durable.get_news_by_feed(feed.id).unwrap().len(), 2);
}
