//! Periodic eviction of idle, empty rooms.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::{ROOMS_ACTIVE, ROOMS_EVICTED_TOTAL};
use crate::registry::{RoomRegistry, SweepSummary};

/// Sweeps the registry on a fixed interval.
#[derive(Debug, Clone)]
pub struct Reaper {
    registry: Arc<RoomRegistry>,
    ttl: Duration,
    interval: Duration,
}

impl Reaper {
    /// Create a reaper evicting rooms idle for longer than `ttl`, checked
    /// every `interval`.
    pub fn new(registry: Arc<RoomRegistry>, ttl: Duration, interval: Duration) -> Self {
        Self {
            registry,
            ttl,
            interval,
        }
    }

    /// Run one pass now.
    pub fn sweep(&self) -> SweepSummary {
        let summary = self.registry.evict_expired(Instant::now(), self.ttl);
        counter!(ROOMS_EVICTED_TOTAL).increment(summary.evicted as u64);
        #[allow(clippy::cast_precision_loss)]
        gauge!(ROOMS_ACTIVE).set(summary.total_rooms as f64);

        if summary.evicted > 0 {
            info!(
                total_rooms = summary.total_rooms,
                evicted = summary.evicted,
                total_users = summary.total_users,
                "reaper pass"
            );
        } else {
            debug!(
                total_rooms = summary.total_rooms,
                total_users = summary.total_users,
                "reaper pass"
            );
        }
        summary
    }

    /// Sweep every interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let _ = self.sweep();
                }
            }
        }
        debug!("reaper stopped");
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
