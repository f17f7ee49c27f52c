//! # Graceful shutdown of the hub.
//!
//! ```text
//! shutdown()
//!   ├─► Bus.publish(ShutdownRequested)
//!   ├─► stop.cancel() ──► hub loop refuses queued registrations,
//!   │                     drops queued broadcasts, unregisters every client
//!   ├─► wait for the loop to exit
//!   └─► wait_all_with_grace(cfg.grace) on the pump tracker:
//!          ├─ all pumps exited  → Bus.publish(AllClosedWithin)
//!          └─ grace exceeded    → Bus.publish(GraceExceeded), force-close
//!                                  remaining connections
//! ```
//!
//! Exceeding the grace period is reported in [`ShutdownReport::forced`], not
//! returned as an error: by the time `shutdown` returns the registry is empty
//! either way.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tokio::time;

use crate::core::Hub;
use crate::core::shutdown;
use crate::events::{HubEvent, HubEventKind};

/// How long force-closed pumps get to publish their final events.
const FORCE_WAIT: Duration = Duration::from_secs(1);

/// Outcome of [`Hub::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Clients that were registered when the hub stopped.
    pub closed: usize,
    /// Pump tasks still running when the grace period ran out (0 when graceful).
    pub forced: usize,
    /// Time from the request to the last pump exit.
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// True when every connection closed within the grace period.
    pub fn is_graceful(&self) -> bool {
        self.forced == 0
    }
}

impl Hub {
    /// Stops the hub and closes every connection, waiting up to `cfg.grace`.
    ///
    /// Idempotent: concurrent and later calls wait for the first one and
    /// return the same report. New registrations fail with
    /// `RegisterError::ShuttingDown` as soon as this is called.
    pub async fn shutdown(&self) -> ShutdownReport {
        *self.report.get_or_init(|| self.stop_and_wait()).await
    }

    /// Waits for SIGINT/SIGTERM (Ctrl-C elsewhere), then shuts down.
    pub async fn run_until_signal(&self) -> std::io::Result<ShutdownReport> {
        shutdown::wait_for_shutdown_signal().await?;
        Ok(self.shutdown().await)
    }

    async fn stop_and_wait(&self) -> ShutdownReport {
        let started = Instant::now();
        self.bus.publish(HubEvent::new(HubEventKind::ShutdownRequested));

        self.stop.cancel();
        self.loop_done.cancelled().await;
        let closed = self.closed_on_stop.load(Ordering::Acquire);

        let forced = self.wait_all_with_grace(closed).await;

        // Let subscribers see the final events before the listener exits.
        self.listener_stop.cancel();
        self.listener_done.cancelled().await;

        ShutdownReport {
            closed,
            forced,
            elapsed: started.elapsed(),
        }
    }

    /// Returns how many pumps had to be forced.
    async fn wait_all_with_grace(&self, closed: usize) -> usize {
        self.tracker.close();
        let grace = self.cfg.grace;

        match time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                self.bus
                    .publish(HubEvent::new(HubEventKind::AllClosedWithin).with_count(closed));
                0
            }
            Err(_) => {
                let stuck = self.tracker.len();
                self.bus.publish(
                    HubEvent::new(HubEventKind::GraceExceeded)
                        .with_count(stuck)
                        .with_reason(format!("{grace:?}")),
                );
                self.force().cancel();
                let _ = time::timeout(FORCE_WAIT, self.tracker.wait()).await;
                stuck
            }
        }
    }
}
