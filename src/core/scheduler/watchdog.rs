//! Periodic safety net for the admission queue.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::admission::AdmissionQueue;

/// Outcome of one watchdog tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogTick {
    /// Dead windows finalized by the heal scan.
    pub healed: usize,
    /// Whether a drain had to be forced.
    pub forced_drain: bool,
}

/// Heals dead windows and forces a drain when entries wait behind free capacity.
#[derive(Clone)]
pub struct Watchdog {
    admission: AdmissionQueue,
    tick: Duration,
    cancel: CancellationToken,
}

impl Watchdog {
    /// Create a watchdog ticking every `tick`.
    #[must_use]
    pub const fn new(admission: AdmissionQueue, tick: Duration, cancel: CancellationToken) -> Self {
        Self {
            admission,
            tick,
            cancel,
        }
    }

    /// Tick period.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        self.tick
    }

    /// One check.
    pub async fn tick_once(&self) -> WatchdogTick {
        let healed = self.admission.heal().await;
        let forced_drain = self.admission.can_admit();
        if forced_drain {
            warn!(
                queued = self.admission.queued_len(),
                active = self.admission.active_len(),
                "admission queue stalled with free capacity, forcing drain"
            );
            self.admission.drain().await;
        }
        WatchdogTick {
            healed,
            forced_drain,
        }
    }

    /// Tick until cancelled.
    pub async fn run(self) {
        info!(tick_secs = self.tick.as_secs(), "admission watchdog started");
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    let tick = self.tick_once().await;
                    debug!(healed = tick.healed, forced = tick.forced_drain, "watchdog tick");
                }
            }
        }
        info!("admission watchdog stopped");
    }
}
