//! Stale-stream sweeper.
//!
//! A stream stays `streaming` forever if its driver process dies mid-drive.
//! The sweeper periodically finalizes such streams to `timeout` once they have
//! gone `stale_after` without a status change or chunk commit. `pending`
//! streams are never touched.
//!
//! `stale_after` should exceed the drive timeout, otherwise a live but quiet
//! drive can be swept out from under its driver (its next commit then fails).

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use inkstream_store::{StreamId, StreamStatus};

use crate::error::LifecycleResult;
use crate::lifecycle::StreamLifecycle;

/// Configuration for the sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to scan.
    pub interval: Duration,
    /// Minimum idle time before a `streaming` stream is considered abandoned.
    pub stale_after: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(600),
        }
    }
}

impl SweeperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Stale streams found.
    pub checked: usize,
    /// Streams this sweep moved to `timeout`.
    pub finalized: Vec<StreamId>,
}

pub struct Sweeper {
    lifecycle: StreamLifecycle,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(lifecycle: StreamLifecycle, config: SweeperConfig) -> Self {
        Self { lifecycle, config }
    }

    /// Finalize every stale `streaming` stream once.
    pub async fn sweep_once(&self) -> LifecycleResult<SweepReport> {
        let stale_after = chrono::Duration::from_std(self.config.stale_after)
            .unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(stale_after)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let stale = self
            .lifecycle
            .store()
            .list_stale(StreamStatus::Streaming, cutoff)
            .await?;

        let mut report = SweepReport {
            checked: stale.len(),
            finalized: Vec::new(),
        };

        for record in stale {
            match self
                .lifecycle
                .finalize(&record.id, StreamStatus::Timeout)
                .await
            {
                Ok(StreamStatus::Timeout) => {
                    info!(
                        stream_id = %record.id,
                        last_update = %record.updated_at,
                        "Swept abandoned stream"
                    );
                    report.finalized.push(record.id);
                }
                // Its driver finished it between the scan and the transition
                Ok(status) => {
                    debug!(stream_id = %record.id, status = %status, "Stale stream already finalized");
                }
                Err(e) => {
                    warn!(stream_id = %record.id, error = %e, "Failed to sweep stream");
                }
            }
        }

        Ok(report)
    }

    /// Run sweeps every `interval` until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.sweep_once().await {
                            Ok(report) if !report.finalized.is_empty() => {
                                info!(swept = report.finalized.len(), "Sweep complete");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Sweep failed"),
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use inkstream_store::MemoryStreamStore;

    use super::*;

    fn setup(stale_after: Duration) -> (StreamLifecycle, Sweeper) {
        let lifecycle = StreamLifecycle::new(Arc::new(MemoryStreamStore::new()));
        let sweeper = Sweeper::new(
            lifecycle.clone(),
            SweeperConfig::default().with_stale_after(stale_after),
        );
        (lifecycle, sweeper)
    }

    #[tokio::test]
    async fn test_sweep_finalizes_abandoned_streams() {
        let (lc, sweeper) = setup(Duration::ZERO);
        let abandoned = lc.create().await.unwrap();
        lc.begin_drive(&abandoned).await.unwrap();
        let pending = lc.create().await.unwrap();
        let finished = lc.create().await.unwrap();
        lc.begin_drive(&finished).await.unwrap();
        lc.finalize(&finished, StreamStatus::Done).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = sweeper.sweep_once().await.unwrap();

        assert_eq!(report.finalized, vec![abandoned.clone()]);
        assert_eq!(lc.status(&abandoned).await.unwrap(), StreamStatus::Timeout);
        assert_eq!(lc.status(&pending).await.unwrap(), StreamStatus::Pending);
        assert_eq!(lc.status(&finished).await.unwrap(), StreamStatus::Done);
    }

    #[tokio::test]
    async fn test_sweep_leaves_recent_streams() {
        let (lc, sweeper) = setup(Duration::from_secs(3600));
        let id = lc.create().await.unwrap();
        lc.begin_drive(&id).await.unwrap();

        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report.checked, 0);
        assert_eq!(lc.status(&id).await.unwrap(), StreamStatus::Streaming);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_stops_on_shutdown() {
        let (_lc, sweeper) = setup(Duration::from_secs(3600));
        let shutdown = CancellationToken::new();
        let handle = Sweeper {
            config: sweeper.config.clone().with_interval(Duration::from_millis(10)),
            ..sweeper
        }
        .spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();
        handle.await.unwrap();
    }
}
