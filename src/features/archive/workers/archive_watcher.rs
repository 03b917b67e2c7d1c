use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::core::error::Result;
use crate::core::supervisor::ShutdownSignal;
use crate::features::archive::services::ArchiveService;
use crate::shared::clock::Clock;

/// Newest record older than this means the station stopped archiving
const STALE_AFTER_SECS: i64 = 15 * 60;

/// What one watcher tick saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchReport {
    pub record_count: i64,
    /// Records added since the previous tick (None on the first tick)
    pub new_records: Option<i64>,
    /// Seconds since the newest record
    pub lag_secs: Option<i64>,
    pub stale: bool,
}

/// Always-running host workload that follows archive growth.
///
/// Runs on the host runtime and never touches the serving context, so it keeps
/// ticking whatever happens to query serving.
pub struct ArchiveWatcher {
    service: Arc<ArchiveService>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    last_count: Option<i64>,
}

impl ArchiveWatcher {
    pub fn new(service: Arc<ArchiveService>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            service,
            clock,
            interval,
            last_count: None,
        }
    }

    /// Run until shutdown is signalled
    pub async fn run(mut self, shutdown: ShutdownSignal) {
        tracing::info!(
            "Starting archive watcher (interval={:?}, archive={})",
            self.interval,
            self.service.db_path()
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.observe().await {
                        tracing::warn!("Archive watcher could not read archive: {}", e);
                    }
                }
                _ = shutdown.wait() => {
                    tracing::info!("Archive watcher stopping");
                    break;
                }
            }
        }
    }

    /// Take one reading of archive size and freshness
    pub async fn observe(&mut self) -> Result<WatchReport> {
        let snapshot = self.service.snapshot().await?;
        let now = self.clock.now().timestamp();

        let new_records = self
            .last_count
            .map(|previous| snapshot.record_count - previous);
        self.last_count = Some(snapshot.record_count);

        let lag_secs = snapshot.latest.map(|latest| (now - latest).max(0));
        let stale = lag_secs.map_or(true, |lag| lag > STALE_AFTER_SECS);

        if stale {
            tracing::warn!(
                record_count = snapshot.record_count,
                lag_secs = ?lag_secs,
                "Archive looks stale"
            );
        } else {
            tracing::debug!(
                record_count = snapshot.record_count,
                new_records = ?new_records,
                lag_secs = ?lag_secs,
                "Archive watcher tick"
            );
        }

        Ok(WatchReport {
            record_count: snapshot.record_count,
            new_records,
            lag_secs,
            stale,
        })
    }
}
