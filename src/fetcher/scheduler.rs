//! Queued, bounded-concurrency feed retrieval.
//!
//! Requests are queued through a [`FetchSchedulerHandle`] and served by a
//! single scheduler task that hands each one to a worker behind a
//! semaphore. Every completion, successful or not, decrements the
//! outstanding counter and is reported as a [`FetchProgress`]; successful
//! downloads are forwarded as [`FetchedDocument`]s for parsing.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::app::{EstuaryError, Result};
use crate::config::{FetchConfig, ProxyConfig};
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::{FetchResult, Fetcher};
use crate::store::Store;

pub const DEFAULT_WORKERS: usize = 10;

pub type SharedFetcher = Arc<dyn Fetcher + Send + Sync>;

/// A conditional retrieval request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub last_build: Option<DateTime<Utc>>,
}

/// Raw bytes of a completed retrieval, on their way to the parser.
#[derive(Debug)]
pub struct FetchedDocument {
    pub url: String,
    pub body: Vec<u8>,
    pub build_time: Option<DateTime<Utc>>,
}

/// Completion report for one request.
///
/// `remaining == 0` means the queue is empty. It can be reported more than
/// once at quiescence; receivers must treat it as an idempotent "done".
#[derive(Debug, Clone)]
pub struct FetchProgress {
    pub url: String,
    pub remaining: usize,
    /// Requests enqueued since the queue was last empty.
    pub total: usize,
    pub build_time: Option<DateTime<Utc>>,
    pub failed: bool,
}

enum SchedulerMessage {
    Fetch(FetchRequest),
    Shutdown,
}

#[derive(Debug, Default)]
struct Counters {
    outstanding: usize,
    total: usize,
    draining: bool,
}

struct SchedulerState {
    counters: Mutex<Counters>,
    fetcher: RwLock<SharedFetcher>,
}

impl SchedulerState {
    fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_fetcher(&self) -> SharedFetcher {
        self.fetcher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record a completion; returns `(remaining, total)` after it.
    fn complete(&self) -> (usize, usize) {
        let mut counters = self.counters();
        counters.outstanding = counters.outstanding.saturating_sub(1);
        let total = counters.total;
        if counters.outstanding == 0 {
            counters.total = 0;
            counters.draining = false;
        }
        (counters.outstanding, total)
    }
}

/// Cloneable front end of the scheduler.
#[derive(Clone)]
pub struct FetchSchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerMessage>,
    state: Arc<SchedulerState>,
}

impl FetchSchedulerHandle {
    /// Queue a conditional fetch. Returns `false` when the request was
    /// refused because a bulk update is still draining.
    pub fn request_update(&self, url: &str, last_build: Option<DateTime<Utc>>) -> Result<bool> {
        let mut counters = self.state.counters();
        if counters.draining {
            debug!(url, "update refused while bulk update drains");
            return Ok(false);
        }
        self.enqueue(&mut counters, url, last_build)?;
        Ok(true)
    }

    /// Queue every feed with a non-empty URL. Returns the number enqueued,
    /// `0` when a bulk update is already draining.
    pub fn request_update_all<S: Store + ?Sized>(&self, store: &S) -> Result<usize> {
        let feeds = store.get_all_feeds()?;

        let mut counters = self.state.counters();
        if counters.draining {
            debug!("update-all refused while bulk update drains");
            return Ok(0);
        }

        let mut count = 0;
        for feed in feeds.iter().filter(|f| !f.xml_url.trim().is_empty()) {
            self.enqueue(&mut counters, &feed.xml_url, feed.last_build_date)?;
            count += 1;
        }
        if count > 0 {
            counters.draining = true;
        }

        info!(count, "update-all requested");
        Ok(count)
    }

    fn enqueue(
        &self,
        counters: &mut Counters,
        url: &str,
        last_build: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.tx
            .send(SchedulerMessage::Fetch(FetchRequest {
                url: url.to_string(),
                last_build,
            }))
            .map_err(|_| EstuaryError::WorkerStopped("fetch scheduler"))?;
        counters.outstanding += 1;
        counters.total += 1;
        Ok(())
    }

    /// Rebuild the HTTP transport with a new proxy. Requests already in
    /// flight keep the old transport.
    pub fn set_proxy(&self, fetch: &FetchConfig, proxy: &ProxyConfig) -> Result<()> {
        let fetcher = HttpFetcher::new(fetch, proxy)?;
        self.set_fetcher(Arc::new(fetcher));
        info!(kind = ?proxy.kind, "proxy updated");
        Ok(())
    }

    pub fn set_fetcher(&self, fetcher: SharedFetcher) {
        *self
            .state
            .fetcher
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fetcher;
    }

    /// `(outstanding, total enqueued since the queue was last empty)`
    pub fn progress(&self) -> (usize, usize) {
        let counters = self.state.counters();
        (counters.outstanding, counters.total)
    }

    pub fn is_draining(&self) -> bool {
        self.state.counters().draining
    }

    /// Stop dequeuing. Requests still queued are reported as failed;
    /// requests in flight run to completion.
    pub fn shutdown(&self) {
        let _ = self.tx.send(SchedulerMessage::Shutdown);
    }
}

pub struct FetchScheduler {
    rx: mpsc::UnboundedReceiver<SchedulerMessage>,
    state: Arc<SchedulerState>,
    semaphore: Arc<Semaphore>,
    documents: mpsc::Sender<FetchedDocument>,
    progress: mpsc::UnboundedSender<FetchProgress>,
}

impl FetchScheduler {
    pub fn new(
        fetcher: SharedFetcher,
        workers: usize,
        documents: mpsc::Sender<FetchedDocument>,
        progress: mpsc::UnboundedSender<FetchProgress>,
    ) -> (Self, FetchSchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(SchedulerState {
            counters: Mutex::new(Counters::default()),
            fetcher: RwLock::new(fetcher),
        });
        let handle = FetchSchedulerHandle {
            tx,
            state: state.clone(),
        };
        let scheduler = Self {
            rx,
            state,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            documents,
            progress,
        };
        (scheduler, handle)
    }

    pub async fn run(mut self) {
        info!("Fetch scheduler started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(SchedulerMessage::Fetch(request)) => {
                        let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                            break;
                        };
                        // Picked at dequeue so proxy changes apply to the next request
                        let fetcher = self.state.current_fetcher();
                        let state = self.state.clone();
                        let documents = self.documents.clone();
                        let progress = self.progress.clone();
                        in_flight.spawn(async move {
                            let _permit = permit;
                            fetch_one(fetcher, request, &state, &documents, &progress).await;
                        });
                    }
                    Some(SchedulerMessage::Shutdown) | None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Fetch task join error: {}", e);
                    }
                }
            }
        }

        self.rx.close();
        while let Ok(msg) = self.rx.try_recv() {
            if let SchedulerMessage::Fetch(request) = msg {
                report(&self.state, &self.progress, request.url, None, true);
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Fetch task join error: {}", e);
            }
        }
        info!("Fetch scheduler stopped");
    }
}

async fn fetch_one(
    fetcher: SharedFetcher,
    request: FetchRequest,
    state: &SchedulerState,
    documents: &mpsc::Sender<FetchedDocument>,
    progress: &mpsc::UnboundedSender<FetchProgress>,
) {
    match fetcher.fetch(&request.url, request.last_build).await {
        Ok(FetchResult::Content { body, build_time }) => {
            debug!(url = %request.url, bytes = body.len(), "fetched");
            let document = FetchedDocument {
                url: request.url.clone(),
                body,
                build_time,
            };
            if documents.send(document).await.is_err() {
                warn!(url = %request.url, "parse worker gone, dropping document");
            }
            report(state, progress, request.url, build_time, false);
        }
        Ok(FetchResult::NotModified) => {
            debug!(url = %request.url, "not modified");
            report(state, progress, request.url, None, false);
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "fetch failed");
            report(state, progress, request.url, None, true);
        }
    }
}

fn report(
    state: &SchedulerState,
    progress: &mpsc::UnboundedSender<FetchProgress>,
    url: String,
    build_time: Option<DateTime<Utc>>,
    failed: bool,
) {
    let (remaining, total) = state.complete();
    let _ = progress.send(FetchProgress {
        url,
        remaining,
        total,
        build_time,
        failed,
    });
}

/// Spawn the scheduler as a tokio task
pub fn spawn_fetch_scheduler(
    fetcher: SharedFetcher,
    workers: usize,
    documents: mpsc::Sender<FetchedDocument>,
    progress: mpsc::UnboundedSender<FetchProgress>,
) -> (FetchSchedulerHandle, JoinHandle<()>) {
    let (scheduler, handle) = FetchScheduler::new(fetcher, workers, documents, progress);
    let join = tokio::spawn(scheduler.run());
    (handle, join)
}
