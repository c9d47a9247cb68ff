//! Foreground update loop.
//!
//! Keeps the engine running, requests an update of all feeds on the
//! configured interval and performs the final flush when interrupted.

use std::future::Future;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::app::Result;
use crate::config::UpdateConfig;
use crate::engine::{Engine, EngineEvent};
use crate::mirror::FlushReport;

/// Format interval for display
pub fn format_interval(secs: u64) -> String {
    if secs >= 86400 && secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Daemon runner
pub struct Daemon {
    engine: Engine,
    config: UpdateConfig,
}

impl Daemon {
    pub fn new(engine: Engine, config: UpdateConfig) -> Self {
        Self { engine, config }
    }

    /// Run until SIGINT/SIGTERM, then shut the engine down.
    pub async fn run(self) -> Result<Option<FlushReport>> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` completes, then shut the engine down.
    pub async fn run_until<F>(self, shutdown: F) -> Result<Option<FlushReport>>
    where
        F: Future<Output = ()>,
    {
        let period = self.config.interval()?;
        info!(
            interval = %format_interval(period.as_secs()),
            auto_update = self.config.auto_update,
            pid = std::process::id(),
            "Estuary daemon started"
        );

        let logger = tokio::spawn(log_events(self.engine.subscribe()));

        if self.config.on_startup {
            self.update_all();
        }

        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.tick().await; // Skip the first immediate tick

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = timer.tick(), if self.config.auto_update => self.update_all(),
            }
        }

        info!("Daemon shutting down...");
        let report = self.engine.shutdown().await;
        logger.abort();
        report
    }

    fn update_all(&self) {
        match self.engine.request_all_feeds_update() {
            Ok(0) => info!("No feeds to update"),
            Ok(count) => info!(count, "Running scheduled update"),
            Err(e) => warn!(error = %e, "Failed to request update"),
        }
    }
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::NewContent { delta }) => info!(delta, "new items arrived"),
            Ok(EngineEvent::UpdateDone) => info!("Update complete"),
            Ok(EngineEvent::Flushed(report)) => info!(
                pruned = report.pruned,
                scrubbed = report.scrubbed,
                "flushed"
            ),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C elsewhere).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
                return;
            }
            _ => warn!("Failed to set up signal handlers, falling back to Ctrl-C"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
