//! Coordinator wiring the fetch, parse and mirror workers together.
//!
//! ```text
//! FetchScheduler ──documents──▶ ParseWorker ──▶ working store
//!       │                           ▲
//!       └──progress──▶ coordinator ─┘ (cycle boundaries)
//!                           │
//!                           └──▶ EngineEvent broadcast
//! ```
//!
//! All presentation operations act on the in-memory working store; the
//! durable store is touched only by the mirror worker.

pub mod events;
pub mod parse_worker;

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::{EstuaryError, Result};
use crate::config::{Config, FetchConfig, ProxyConfig};
use crate::domain::{DeletedState, Feed, FeedCounts, NewFeed, NewsItem, ReadState};
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::scheduler::{
    spawn_fetch_scheduler, FetchProgress, FetchSchedulerHandle, SharedFetcher,
};
use crate::mirror::{self, spawn_mirror_worker, FlushReport, Mirror, MirrorHandle};
use crate::retention::RetentionPolicy;
use crate::store::{SqliteStore, Store};

pub use events::EngineEvent;
use events::EVENT_CAPACITY;
use parse_worker::{spawn_parse_worker, ParseControl};

const DOCUMENT_QUEUE: usize = 64;

/// State shared between the engine and its workers.
pub(crate) struct Shared {
    pub(crate) working: Arc<SqliteStore>,
    events: broadcast::Sender<EngineEvent>,
    current_feed: Mutex<Option<i64>>,
}

impl Shared {
    pub(crate) fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn current_feed(&self) -> Option<i64> {
        *self
            .current_feed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_current_feed(&self, feed_id: Option<i64>) {
        *self
            .current_feed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = feed_id;
    }

    pub(crate) fn totals(&self) -> Result<FeedCounts> {
        let feeds = self.working.get_all_feeds()?;
        Ok(feeds.iter().fold(FeedCounts::default(), |acc, f| FeedCounts {
            unread: acc.unread + f.unread,
            new_count: acc.new_count + f.new_count,
        }))
    }

    pub(crate) fn emit_totals(&self) -> Result<FeedCounts> {
        let totals = self.totals()?;
        self.emit(EngineEvent::Totals {
            new: totals.new_count,
            unread: totals.unread,
        });
        Ok(totals)
    }

    /// Recompute a feed's aggregates and notify.
    fn publish_counts(&self, feed_id: i64) -> Result<FeedCounts> {
        let counts = self.working.refresh_counts(feed_id)?;
        self.emit(EngineEvent::FeedChanged { feed_id, counts });
        self.emit_totals()?;
        Ok(counts)
    }
}

/// Forward scheduler progress to subscribers and mark cycle boundaries for
/// the parse worker.
async fn run_coordinator(
    shared: Arc<Shared>,
    mut progress: mpsc::UnboundedReceiver<FetchProgress>,
    control: mpsc::UnboundedSender<ParseControl>,
) {
    while let Some(report) = progress.recv().await {
        debug!(
            url = %report.url,
            remaining = report.remaining,
            failed = report.failed,
            "fetch completed"
        );
        shared.emit(EngineEvent::Progress {
            outstanding: report.remaining,
            total: report.total,
        });
        if report.remaining == 0 {
            let _ = control.send(ParseControl::CycleDone);
        }
    }
}

struct Workers {
    scheduler: JoinHandle<()>,
    parser: JoinHandle<()>,
    coordinator: JoinHandle<()>,
    mirror: JoinHandle<()>,
}

/// Feed synchronization engine.
pub struct Engine {
    shared: Arc<Shared>,
    scheduler: FetchSchedulerHandle,
    mirror: MirrorHandle,
    policy: Arc<RwLock<RetentionPolicy>>,
    fetch_config: FetchConfig,
    flush_timeout: Duration,
    workers: Workers,
}

impl Engine {
    /// Open the durable store at the configured path and start the engine
    /// with an HTTP transport.
    pub async fn start(config: &Config) -> Result<Self> {
        let db_path = config.db_path()?;
        let durable = SqliteStore::new(&db_path)?;
        info!(path = %db_path.display(), "durable store opened");

        let fetcher = Arc::new(HttpFetcher::new(&config.fetch, &config.proxy)?);
        Self::start_with(config, durable, fetcher).await
    }

    /// Start the engine on an already opened durable store.
    pub async fn start_with(
        config: &Config,
        durable: SqliteStore,
        fetcher: SharedFetcher,
    ) -> Result<Self> {
        let durable = Arc::new(durable);
        let working = Arc::new(SqliteStore::in_memory()?);
        mirror::load_from_durable(&durable, &working)?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            working: working.clone(),
            events,
            current_feed: Mutex::new(None),
        });

        let policy = Arc::new(RwLock::new(config.retention.clone()));
        let (mirror, mirror_join) =
            spawn_mirror_worker(Mirror::new(working, durable, policy.clone()));

        let (documents_tx, documents_rx) = mpsc::channel(DOCUMENT_QUEUE);
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let (scheduler, scheduler_join) =
            spawn_fetch_scheduler(fetcher, config.fetch.workers, documents_tx, progress_tx);
        let parser = spawn_parse_worker(shared.clone(), documents_rx, control_rx);
        let coordinator = tokio::spawn(run_coordinator(shared.clone(), progress_rx, control_tx));

        info!("Engine started");
        Ok(Self {
            shared,
            scheduler,
            mirror,
            policy,
            fetch_config: config.fetch.clone(),
            flush_timeout: config.storage.shutdown_flush_timeout(),
            workers: Workers {
                scheduler: scheduler_join,
                parser,
                coordinator,
                mirror: mirror_join,
            },
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    /// The working store, for read access.
    pub fn store(&self) -> &SqliteStore {
        &self.shared.working
    }

    pub fn feeds(&self) -> Result<Vec<Feed>> {
        self.shared.working.get_all_feeds()
    }

    /// Live items of a feed, newest first.
    pub fn news(&self, feed_id: i64) -> Result<Vec<NewsItem>> {
        let mut items: Vec<_> = self
            .shared
            .working
            .get_news_by_feed(feed_id)?
            .into_iter()
            .filter(|n| n.deleted.is_live())
            .collect();
        items.reverse();
        Ok(items)
    }

    // Updates

    /// Queue a conditional fetch of one feed. Returns `false` when refused
    /// because a bulk update is draining.
    pub fn request_feed_update(&self, feed_id: i64) -> Result<bool> {
        let feed = self.feed(feed_id)?;
        self.request_url_update(&feed.xml_url)
    }

    /// Queue a fetch of `url`, conditional on the build time of the feed
    /// registered under it, if any.
    pub fn request_url_update(&self, url: &str) -> Result<bool> {
        let last_build = self
            .shared
            .working
            .get_feed_by_url(url)?
            .and_then(|f| f.last_build_date);
        let accepted = self.scheduler.request_update(url, last_build)?;
        self.emit_progress();
        Ok(accepted)
    }

    /// Queue every feed. Returns the number enqueued.
    pub fn request_all_feeds_update(&self) -> Result<usize> {
        let count = self
            .scheduler
            .request_update_all(self.shared.working.as_ref())?;
        self.emit_progress();
        Ok(count)
    }

    /// `(outstanding, total enqueued)`
    pub fn progress(&self) -> (usize, usize) {
        self.scheduler.progress()
    }

    fn emit_progress(&self) {
        let (outstanding, total) = self.scheduler.progress();
        self.shared.emit(EngineEvent::Progress { outstanding, total });
    }

    // Item state

    /// Marking read clears `new` and stages the item as read-pending-ack;
    /// marking unread resets it to unread.
    pub fn mark_read(&self, news_id: i64, read: bool) -> Result<()> {
        let item = self.item(news_id)?;
        let store = &self.shared.working;
        if read {
            if item.read == ReadState::Unread {
                store.set_read(news_id, ReadState::ReadPendingAck)?;
            }
            store.set_new(news_id, false)?;
        } else {
            store.set_read(news_id, ReadState::Unread)?;
        }
        self.news_changed(&item)
    }

    pub fn mark_starred(&self, news_id: i64, starred: bool) -> Result<()> {
        let item = self.item(news_id)?;
        self.shared.working.set_starred(news_id, starred)?;
        self.shared.emit(EngineEvent::NewsChanged {
            feed_id: item.feed_id,
            news_id,
        });
        Ok(())
    }

    /// Soft-delete an item; the next flush scrubs it.
    pub fn delete_item(&self, news_id: i64) -> Result<()> {
        let item = self.item(news_id)?;
        let store = &self.shared.working;
        if item.read == ReadState::Unread {
            store.set_read(news_id, ReadState::ReadPendingAck)?;
        }
        store.set_new(news_id, false)?;
        store.set_deleted(news_id, DeletedState::PendingScrub)?;
        self.news_changed(&item)
    }

    fn news_changed(&self, item: &NewsItem) -> Result<()> {
        self.shared.emit(EngineEvent::NewsChanged {
            feed_id: item.feed_id,
            news_id: item.id,
        });
        self.shared.publish_counts(item.feed_id)?;
        Ok(())
    }

    // Feeds

    /// Register a feed and request its first update. An already registered
    /// URL returns the existing id.
    pub fn add_feed(&self, url: &str, text: Option<&str>) -> Result<i64> {
        let url = url.trim();
        Url::parse(url)?;
        if let Some(existing) = self.shared.working.get_feed_by_url(&url)? {
            debug!(url = %url, id = existing.id, "feed already registered");
            return Ok(existing.id);
        }

        let mut feed = NewFeed::new(url);
        if let Some(text) = text {
            feed = feed.with_text(text);
        }
        let id = self.shared.working.add_feed(&feed)?;
        info!(url = %url, id, "feed added");

        self.shared.publish_counts(id)?;
        self.request_url_update(url)?;
        Ok(id)
    }

    pub fn delete_feed(&self, feed_id: i64) -> Result<()> {
        self.shared.working.delete_feed(feed_id)?;
        if self.shared.current_feed() == Some(feed_id) {
            self.shared.set_current_feed(None);
        }
        info!(id = feed_id, "feed deleted");
        self.shared.emit(EngineEvent::FeedDeleted { feed_id });
        self.shared.emit_totals()?;
        Ok(())
    }

    /// Mark every item of a feed read and clear `new`.
    pub fn mark_feed_read(&self, feed_id: i64) -> Result<FeedCounts> {
        self.feed(feed_id)?;
        self.shared.working.mark_feed_read(feed_id)?;
        self.shared.publish_counts(feed_id)
    }

    /// Promote read-pending-ack items to acknowledged and clear `new`,
    /// as when the user leaves a feed view.
    pub fn acknowledge_feed(&self, feed_id: i64) -> Result<FeedCounts> {
        self.feed(feed_id)?;
        self.shared.working.acknowledge_read(Some(feed_id))?;
        self.shared.working.clear_new(Some(feed_id))?;
        self.shared.publish_counts(feed_id)
    }

    /// Clear `new` everywhere; with `read_on` also mark everything read.
    pub fn mark_all_feeds_read(&self, read_on: bool) -> Result<FeedCounts> {
        let store = &self.shared.working;
        store.clear_new(None)?;
        if read_on {
            store.set_all_read()?;
        }
        for feed in store.get_all_feeds()? {
            let counts = store.refresh_counts(feed.id)?;
            self.shared.emit(EngineEvent::FeedChanged {
                feed_id: feed.id,
                counts,
            });
        }
        self.shared.emit_totals()
    }

    /// Record the feed open in the interactive view.
    pub fn set_current_feed(&self, feed_id: Option<i64>) {
        self.shared.set_current_feed(feed_id);
    }

    pub fn set_current_news(&self, feed_id: i64, news_id: Option<i64>) -> Result<()> {
        self.shared.working.set_current_news(feed_id, news_id)
    }

    /// Sums of `new_count` and `unread` over all feeds.
    pub fn totals(&self) -> Result<FeedCounts> {
        self.shared.totals()
    }

    // Configuration

    /// Replace the retention policy used by subsequent flushes.
    pub fn set_retention_policy(&self, policy: RetentionPolicy) {
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy;
        info!("retention policy updated");
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap the transport proxy; in-flight requests are not affected.
    pub fn set_proxy(&self, proxy: &ProxyConfig) -> Result<()> {
        self.scheduler.set_proxy(&self.fetch_config, proxy)
    }

    /// Replace the transport directly.
    pub fn set_fetcher(&self, fetcher: SharedFetcher) {
        self.scheduler.set_fetcher(fetcher);
    }

    // Mirroring

    /// Flush in the background. Returns `false` if a flush is already
    /// running.
    pub fn suspend(&self) -> Result<bool> {
        self.mirror.try_flush()
    }

    /// Flush and wait. `None` when a flush was already running.
    pub async fn flush(&self) -> Result<Option<FlushReport>> {
        let report = self.mirror.flush().await?;
        if let Some(report) = report {
            self.after_flush(report)?;
        }
        Ok(report)
    }

    fn after_flush(&self, report: FlushReport) -> Result<()> {
        self.shared.emit(EngineEvent::Flushed(report));
        for feed in self.shared.working.get_all_feeds()? {
            self.shared.emit(EngineEvent::FeedChanged {
                feed_id: feed.id,
                counts: FeedCounts {
                    unread: feed.unread,
                    new_count: feed.new_count,
                },
            });
        }
        self.shared.emit_totals()?;
        Ok(())
    }

    /// Stop fetching, let queued documents merge, then perform the final
    /// flush. Each stage waits at most the configured flush timeout.
    pub async fn shutdown(self) -> Result<Option<FlushReport>> {
        info!("Engine shutting down");
        self.scheduler.shutdown();

        let Workers {
            scheduler,
            parser,
            coordinator,
            mirror,
        } = self.workers;

        let drain = async {
            let _ = scheduler.await;
            let _ = parser.await;
            let _ = coordinator.await;
        };
        if tokio::time::timeout(self.flush_timeout, drain).await.is_err() {
            warn!("workers did not stop in time, flushing anyway");
        }

        let report = match tokio::time::timeout(self.flush_timeout, self.mirror.shutdown()).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!("final flush timed out");
                None
            }
        };
        if let Some(report) = report {
            self.shared.emit(EngineEvent::Flushed(report));
            let _ = mirror.await;
        }

        info!("Engine stopped");
        Ok(report)
    }

    fn feed(&self, feed_id: i64) -> Result<Feed> {
        self.shared
            .working
            .get_feed(feed_id)?
            .ok_or_else(|| EstuaryError::FeedNotFound(feed_id.to_string()))
    }

    fn item(&self, news_id: i64) -> Result<NewsItem> {
        self.shared
            .working
            .get_news(news_id)?
            .ok_or(EstuaryError::NewsNotFound(news_id))
    }
}
