//! Outcome feed
//!
//! Pulls recent rounds from an [`EventSource`] and hands them to the engine
//! one at a time. The poller also drives [`SharedEngine::tick`] so signals
//! time out on wall-clock time when the feed is quiet.

mod http;

pub use http::{parse_payload, HttpFeed};

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::engine::{IngestOutcome, SharedEngine};
use crate::types::RawEvent;

/// Trait for outcome feed clients
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Latest rounds, oldest first
    async fn fetch(&self) -> Result<Vec<RawEvent>>;
}

/// Per-cycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub accepted: usize,
    pub duplicates: usize,
    pub out_of_order: usize,
    pub dropped: usize,
    /// Rounds matching the last id handed to the engine
    pub skipped: usize,
}

pub struct FeedPoller<S> {
    source: S,
    engine: SharedEngine,
    poll_interval: Duration,
    error_backoff: Duration,
    last_id: Option<String>,
}

impl<S: EventSource> FeedPoller<S> {
    pub fn new(source: S, engine: SharedEngine, config: &FeedConfig) -> Self {
        Self::with_intervals(
            source,
            engine,
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_millis(config.error_backoff_ms),
        )
    }

    pub fn with_intervals(
        source: S,
        engine: SharedEngine,
        poll_interval: Duration,
        error_backoff: Duration,
    ) -> Self {
        Self {
            source,
            engine,
            poll_interval,
            error_backoff,
            last_id: None,
        }
    }

    pub fn last_id(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    /// Fetch once, ingest anything new, then tick the engine
    pub async fn poll_once(&mut self) -> Result<PollReport> {
        let events = self.source.fetch().await?;
        let mut report = PollReport::default();

        for raw in events {
            if raw.id.is_some() && raw.id == self.last_id {
                report.skipped += 1;
                continue;
            }
            let id = raw.id.clone();
            match self.engine.ingest(raw) {
                IngestOutcome::Accepted => report.accepted += 1,
                IngestOutcome::Duplicate => report.duplicates += 1,
                IngestOutcome::OutOfOrder => report.out_of_order += 1,
                IngestOutcome::Dropped(_) => report.dropped += 1,
            }
            if id.is_some() {
                self.last_id = id;
            }
        }

        self.engine.tick();
        Ok(report)
    }

    /// Poll until `shutdown` flips to true or its sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            source = self.source.name(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "📡 Feed poller started"
        );

        loop {
            let delay = match self.poll_once().await {
                Ok(report) => {
                    if report.accepted > 0 || report.dropped > 0 {
                        debug!(
                            accepted = report.accepted,
                            duplicates = report.duplicates,
                            dropped = report.dropped,
                            "Feed cycle complete"
                        );
                    }
                    self.poll_interval
                }
                Err(e) => {
                    warn!(source = self.source.name(), error = %e, "Feed poll failed");
                    self.engine.tick();
                    self.error_backoff
                }
            };

            let closed = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                changed = shutdown.changed() => changed.is_err(),
            };
            if closed || *shutdown.borrow() {
                break;
            }
        }

        info!(source = self.source.name(), "Feed poller stopped");
    }
}
