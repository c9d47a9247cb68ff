//! Sequential parse/merge of fetched documents into the working store.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::{EstuaryError, Result};
use crate::domain::Feed;
use crate::engine::events::EngineEvent;
use crate::engine::Shared;
use crate::fetcher::scheduler::FetchedDocument;
use crate::merger::{MergeOutcome, Merger};
use crate::normalizer::{FeedMeta, Normalizer};
use crate::store::{SqliteStore, Store};

/// Signals from the coordinator, ordered after the documents they follow.
#[derive(Debug)]
pub enum ParseControl {
    /// The fetch queue reported empty.
    CycleDone,
}

pub struct ParseWorker {
    shared: Arc<Shared>,
    normalizer: Normalizer,
    merger: Merger,
    documents: mpsc::Receiver<FetchedDocument>,
    control: mpsc::UnboundedReceiver<ParseControl>,
    /// New items merged since the last `CycleDone`.
    cycle_delta: i64,
}

impl ParseWorker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        documents: mpsc::Receiver<FetchedDocument>,
        control: mpsc::UnboundedReceiver<ParseControl>,
    ) -> Self {
        Self {
            shared,
            normalizer: Normalizer::new(),
            merger: Merger::new(),
            documents,
            control,
            cycle_delta: 0,
        }
    }

    pub async fn run(mut self) {
        info!("Parse worker started");
        let mut control_open = true;

        loop {
            tokio::select! {
                // A document is always queued before the progress report
                // that leads to `CycleDone`, so draining documents first
                // keeps the cycle boundary after its last merge.
                biased;

                doc = self.documents.recv() => match doc {
                    Some(doc) => self.handle_document(doc).await,
                    None => break,
                },
                ctl = self.control.recv(), if control_open => match ctl {
                    Some(ParseControl::CycleDone) => self.finish_cycle(),
                    None => control_open = false,
                },
            }
        }

        if self.cycle_delta > 0 {
            self.finish_cycle();
        }
        info!("Parse worker stopped");
    }

    async fn handle_document(&mut self, doc: FetchedDocument) {
        let store = self.shared.working.clone();
        let normalizer = self.normalizer.clone();
        let merger = self.merger.clone();
        let url = doc.url.clone();

        let merged = tokio::task::spawn_blocking(move || {
            process_document(&store, &normalizer, &merger, doc)
        })
        .await
        .map_err(|e| EstuaryError::Other(format!("parse task failed: {}", e)))
        .and_then(|r| r);

        match merged {
            Ok(Some((feed, outcome))) => {
                self.cycle_delta += outcome.new_delta();
                self.shared.emit(EngineEvent::FeedChanged {
                    feed_id: feed.id,
                    counts: outcome.counts,
                });
                if self.shared.current_feed() == Some(feed.id) {
                    self.shared.emit(EngineEvent::Redisplay { feed_id: feed.id });
                }
                if let Err(e) = self.shared.emit_totals() {
                    warn!(error = %e, "failed to compute totals");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(url = %url, error = %e, "merge failed"),
        }
    }

    fn finish_cycle(&mut self) {
        if self.cycle_delta > 0 {
            self.shared.emit(EngineEvent::NewContent {
                delta: self.cycle_delta,
            });
            self.cycle_delta = 0;
        }
        self.shared.emit(EngineEvent::UpdateDone);
    }
}

/// Parse `doc` and merge it into the feed registered under its URL.
///
/// Returns `None` when no feed has that URL. A document that fails to parse
/// is merged as an empty item list.
pub fn process_document(
    store: &SqliteStore,
    normalizer: &Normalizer,
    merger: &Merger,
    doc: FetchedDocument,
) -> Result<Option<(Feed, MergeOutcome)>> {
    let Some(feed) = store.get_feed_by_url(&doc.url)? else {
        debug!(url = %doc.url, "document for unknown feed discarded");
        return Ok(None);
    };

    let (meta, items) = match normalizer.normalize(&doc.body) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(url = %doc.url, error = %e, "malformed document, treating as empty");
            (FeedMeta::default(), Vec::new())
        }
    };

    let outcome = merger.merge(store, &feed, &meta, &items, doc.build_time, Utc::now())?;
    Ok(Some((feed, outcome)))
}

/// Spawn the parse worker as a tokio task
pub(crate) fn spawn_parse_worker(
    shared: Arc<Shared>,
    documents: mpsc::Receiver<FetchedDocument>,
    control: mpsc::UnboundedReceiver<ParseControl>,
) -> JoinHandle<()> {
    tokio::spawn(ParseWorker::new(shared, documents, control).run())
}
