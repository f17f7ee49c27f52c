//! # Tracing subscriber for hub lifecycle events.
//!
//! [`LogWriter`] turns lifecycle events into structured `tracing` records.
//! Routine traffic (fan-out) goes to `debug`, client churn to `info`,
//! anything that loses data or exceeds a deadline to `warn`.
//!
//! ## Output (with the default `fmt` layer)
//! ```text
//! INFO  ctfhub::subscribers::log: client registered client=client-4 clients=12
//! WARN  ctfhub::subscribers::log: client unregistered client=client-9 reason=overflow clients=11
//! WARN  ctfhub::subscribers::log: broadcast dropped reason=publish_full
//! WARN  ctfhub::subscribers::log: shutdown grace exceeded stuck=2
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::Subscribe;
use crate::events::{CloseReason, HubEvent, HubEventKind};

/// Logging subscriber backed by `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &HubEvent) {
        let client = e.client.map(|c| c.to_string()).unwrap_or_default();
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            HubEventKind::ClientRegistered => {
                info!(client = %client, clients = e.count, "client registered");
            }
            HubEventKind::ClientRejected => {
                info!(client = %client, reason, "client rejected");
            }
            HubEventKind::ClientUnregistered => match e.close {
                Some(CloseReason::Overflow | CloseReason::WriteFailed) => {
                    warn!(
                        client = %client,
                        reason = e.close.map(|r| r.as_label()),
                        clients = e.count,
                        "client unregistered"
                    );
                }
                _ => {
                    info!(
                        client = %client,
                        reason = e.close.map(|r| r.as_label()),
                        clients = e.count,
                        "client unregistered"
                    );
                }
            },
            HubEventKind::ConnectionClosed => {
                debug!(client = %client, error = reason, "connection closed");
            }
            HubEventKind::BroadcastFanout => {
                debug!(clients = e.count, "broadcast fanned out");
            }
            HubEventKind::BroadcastDropped => {
                warn!(reason, "broadcast dropped");
            }
            HubEventKind::ShutdownRequested => {
                info!("shutdown requested");
            }
            HubEventKind::AllClosedWithin => {
                info!(closed = e.count, "all clients closed within grace");
            }
            HubEventKind::GraceExceeded => {
                warn!(stuck = e.count, "shutdown grace exceeded");
            }
            HubEventKind::SubscriberOverflow => {
                warn!(subscriber = e.subscriber, reason, "subscriber dropped event");
            }
            HubEventKind::SubscriberPanicked => {
                warn!(subscriber = e.subscriber, panic = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
