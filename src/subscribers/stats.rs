//! # Counters for hub lifecycle events.
//!
//! [`HubStats`] keeps lock-free counters fed from the event bus. It is the
//! place where dropped broadcasts, overflow disconnects and forced closes are
//! *counted* rather than escalated.
//!
//! Counters are eventually consistent: they lag the hub by however long the
//! subscriber queue takes to drain.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::Subscribe;
use crate::events::{CloseReason, HubEvent, HubEventKind};

/// Lifecycle counters. Share it as `Arc<HubStats>`: one clone goes into the
/// subscriber list, the other stays with whoever reads [`HubStats::snapshot`].
#[derive(Debug, Default)]
pub struct HubStats {
    registered: AtomicU64,
    rejected: AtomicU64,
    unregistered: AtomicU64,
    overflow_disconnects: AtomicU64,
    connections_closed: AtomicU64,
    broadcasts: AtomicU64,
    dropped_broadcasts: AtomicU64,
    forced_closes: AtomicU64,
    subscriber_drops: AtomicU64,
}

/// Point-in-time copy of [`HubStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub registered: u64,
    pub rejected: u64,
    pub unregistered: u64,
    pub overflow_disconnects: u64,
    pub connections_closed: u64,
    pub broadcasts: u64,
    pub dropped_broadcasts: u64,
    pub forced_closes: u64,
    pub subscriber_drops: u64,
}

impl HubStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            overflow_disconnects: self.overflow_disconnects.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            dropped_broadcasts: self.dropped_broadcasts.load(Ordering::Relaxed),
            forced_closes: self.forced_closes.load(Ordering::Relaxed),
            subscriber_drops: self.subscriber_drops.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

#[async_trait]
impl Subscribe for HubStats {
    async fn on_event(&self, e: &HubEvent) {
        match e.kind {
            HubEventKind::ClientRegistered => Self::bump(&self.registered, 1),
            HubEventKind::ClientRejected => Self::bump(&self.rejected, 1),
            HubEventKind::ClientUnregistered => {
                Self::bump(&self.unregistered, 1);
                if e.close == Some(CloseReason::Overflow) {
                    Self::bump(&self.overflow_disconnects, 1);
                }
            }
            HubEventKind::ConnectionClosed => Self::bump(&self.connections_closed, 1),
            HubEventKind::BroadcastFanout => Self::bump(&self.broadcasts, 1),
            HubEventKind::BroadcastDropped => Self::bump(&self.dropped_broadcasts, 1),
            HubEventKind::GraceExceeded => {
                Self::bump(&self.forced_closes, e.count.unwrap_or(0));
            }
            HubEventKind::SubscriberOverflow => Self::bump(&self.subscriber_drops, 1),
            HubEventKind::ShutdownRequested
            | HubEventKind::AllClosedWithin
            | HubEventKind::SubscriberPanicked => {}
        }
    }

    fn name(&self) -> &'static str {
        "stats"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}
