//! Working/durable store mirroring.
//!
//! The working store is an in-memory copy of the durable database. It is
//! filled once at startup by [`load_from_durable`] and written back by the
//! flush worker, which also runs the per-feed retention pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::{EstuaryError, Result};
use crate::retention::{self, RetentionPolicy};
use crate::store::{SqliteStore, Store};

/// Copy the durable database into the working store.
///
/// Blocking; must complete before the working store serves any traffic.
pub fn load_from_durable(durable: &SqliteStore, working: &SqliteStore) -> Result<()> {
    durable.copy_into(working)?;
    info!("working store loaded from durable store");
    Ok(())
}

/// Summary of one completed flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub feeds: usize,
    pub pruned: usize,
    pub scrubbed: usize,
}

/// Owns both stores and performs flushes synchronously.
pub struct Mirror {
    working: Arc<SqliteStore>,
    durable: Arc<SqliteStore>,
    policy: Arc<RwLock<RetentionPolicy>>,
}

impl Mirror {
    pub fn new(
        working: Arc<SqliteStore>,
        durable: Arc<SqliteStore>,
        policy: Arc<RwLock<RetentionPolicy>>,
    ) -> Self {
        Self {
            working,
            durable,
            policy,
        }
    }

    /// Prepare every feed of the working store and copy it to the durable
    /// store. On error the working store stays authoritative.
    pub fn flush(&self) -> Result<FlushReport> {
        let policy = self
            .policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let now = Utc::now();
        let mut report = FlushReport::default();

        for feed in self.working.get_all_feeds()? {
            self.working.clear_new(Some(feed.id))?;
            self.working.acknowledge_read(Some(feed.id))?;
            // Prune before scrub: rows reach deleted=1 before they can become 2
            report.pruned += retention::apply(self.working.as_ref(), feed.id, &policy, now)?;
            report.scrubbed += self.working.scrub_deleted(feed.id)?;
            self.working.refresh_counts(feed.id)?;
            report.feeds += 1;
        }

        self.working.reset_new_counts()?;
        self.working.vacuum()?;
        self.working.copy_into(&self.durable)?;

        info!(
            feeds = report.feeds,
            pruned = report.pruned,
            scrubbed = report.scrubbed,
            "flushed working store to durable store"
        );
        Ok(report)
    }
}

enum MirrorMessage {
    Flush(Option<oneshot::Sender<Result<FlushReport>>>),
    Shutdown(oneshot::Sender<Result<FlushReport>>),
}

/// Cloneable front end of the flush worker.
#[derive(Clone)]
pub struct MirrorHandle {
    tx: mpsc::UnboundedSender<MirrorMessage>,
    in_progress: Arc<AtomicBool>,
}

impl MirrorHandle {
    /// Flush and wait for the result. Returns `None` when a flush was
    /// already in progress and this trigger was ignored.
    pub async fn flush(&self) -> Result<Option<FlushReport>> {
        if !self.claim() {
            debug!("flush already in progress, ignoring trigger");
            return Ok(None);
        }
        let (reply, rx) = oneshot::channel();
        self.send(MirrorMessage::Flush(Some(reply)))?;
        let report = rx
            .await
            .map_err(|_| EstuaryError::WorkerStopped("mirror"))??;
        Ok(Some(report))
    }

    /// Start a flush without waiting. Returns `false` when ignored.
    pub fn try_flush(&self) -> Result<bool> {
        if !self.claim() {
            debug!("flush already in progress, ignoring trigger");
            return Ok(false);
        }
        self.send(MirrorMessage::Flush(None))?;
        Ok(true)
    }

    /// Final flush, queued behind any flush still running, then stop the
    /// worker.
    pub async fn shutdown(&self) -> Result<FlushReport> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MirrorMessage::Shutdown(reply))
            .map_err(|_| EstuaryError::WorkerStopped("mirror"))?;
        rx.await.map_err(|_| EstuaryError::WorkerStopped("mirror"))?
    }

    pub fn is_flushing(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    fn claim(&self) -> bool {
        self.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn send(&self, msg: MirrorMessage) -> Result<()> {
        self.tx.send(msg).map_err(|_| {
            self.in_progress.store(false, Ordering::SeqCst);
            EstuaryError::WorkerStopped("mirror")
        })
    }
}

async fn run_flush(mirror: &Arc<Mirror>) -> Result<FlushReport> {
    let mirror = mirror.clone();
    tokio::task::spawn_blocking(move || mirror.flush())
        .await
        .map_err(|e| EstuaryError::Other(format!("flush task failed: {}", e)))?
}

/// Spawn the flush worker as a tokio task
pub fn spawn_mirror_worker(mirror: Mirror) -> (MirrorHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let in_progress = Arc::new(AtomicBool::new(false));
    let handle = MirrorHandle {
        tx,
        in_progress: in_progress.clone(),
    };
    let mirror = Arc::new(mirror);

    let join = tokio::spawn(async move {
        info!("Mirror worker started");
        while let Some(msg) = rx.recv().await {
            match msg {
                MirrorMessage::Flush(reply) => {
                    let result = run_flush(&mirror).await;
                    in_progress.store(false, Ordering::SeqCst);
                    if let Err(ref e) = result {
                        warn!(error = %e, "flush failed, will retry on next trigger");
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                MirrorMessage::Shutdown(reply) => {
                    let result = run_flush(&mirror).await;
                    if let Err(ref e) = result {
                        error!(error = %e, "final flush failed");
                    }
                    let _ = reply.send(result);
                    break;
                }
            }
        }
        info!("Mirror worker stopped");
    });

    (handle, join)
}
