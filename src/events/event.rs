//! # Lifecycle events emitted by the hub and its clients.
//!
//! The [`HubEventKind`] enum classifies event types across four categories:
//! - **Client events**: registration, rejection, unregistration, physical close
//! - **Broadcast events**: fan-out confirmation and dropped broadcasts
//! - **Shutdown events**: shutdown requested, finished within grace, grace exceeded
//! - **Subscriber events**: subscriber queue overflow and panics
//!
//! The [`HubEvent`] struct carries additional metadata such as timestamps,
//! client id, close reason and counters.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore order when events are observed out of order.
//!
//! ## Example
//! ```rust
//! use ctfhub::{ClientId, CloseReason, HubEvent, HubEventKind};
//!
//! let ev = HubEvent::new(HubEventKind::ClientUnregistered)
//!     .with_client(ClientId::from_raw(3))
//!     .with_close(CloseReason::Overflow);
//!
//! assert_eq!(ev.kind, HubEventKind::ClientUnregistered);
//! assert_eq!(ev.close, Some(CloseReason::Overflow));
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::core::ClientId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubEventKind {
    // === Client events ===
    /// Client entered the registry.
    ///
    /// Sets: `client`, `count` (registry size after insert)
    ClientRegistered,

    /// Registration was refused (duplicate id, closed client, shutdown).
    ///
    /// Sets: `client`, `reason` (error label)
    ClientRejected,

    /// Client left the registry. Published exactly once per registered client.
    ///
    /// Sets: `client`, `close`, `count` (registry size after removal)
    ClientUnregistered,

    /// The client's connection was physically closed. Published exactly once
    /// per connection handed to the hub.
    ///
    /// Sets: `client`, `reason` (close error, if any)
    ConnectionClosed,

    // === Broadcast events ===
    /// A broadcast frame was fanned out by the hub loop.
    ///
    /// Sets: `count` (number of outboxes reached)
    BroadcastFanout,

    /// A broadcast never reached the hub loop (queue saturated, hub closed,
    /// encode failure, timeout).
    ///
    /// Sets: `reason` (error label)
    BroadcastDropped,

    // === Shutdown events ===
    /// Shutdown requested (OS signal or explicit call).
    ShutdownRequested,

    /// All client pumps exited within the grace period.
    ///
    /// Sets: `count` (clients closed by shutdown)
    AllClosedWithin,

    /// Grace period exceeded; remaining pumps were force-closed.
    ///
    /// Sets: `count` (tasks still running at the deadline)
    GraceExceeded,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `subscriber`, `reason`
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `subscriber`, `reason` (panic message)
    SubscriberPanicked,
}

/// Why a client left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Explicit `Hub::unregister` call.
    Requested,
    /// Peer sent a close frame or ended the stream.
    PeerClosed,
    /// Reading from the connection failed or the read deadline passed.
    ReadFailed,
    /// Writing to the connection failed or the write deadline passed.
    WriteFailed,
    /// The client's outbox was full when the hub tried to enqueue.
    Overflow,
    /// The client's outbox was already closed (outbound pump gone).
    OutboxClosed,
    /// Hub shutdown.
    Shutdown,
}

impl CloseReason {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CloseReason::Requested => "requested",
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::ReadFailed => "read_failed",
            CloseReason::WriteFailed => "write_failed",
            CloseReason::Overflow => "overflow",
            CloseReason::OutboxClosed => "outbox_closed",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Lifecycle event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`HubEventKind`]
#[derive(Clone, Debug)]
pub struct HubEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: HubEventKind,
    /// Client concerned, if any.
    pub client: Option<ClientId>,
    /// Why the client left, for `ClientUnregistered`.
    pub close: Option<CloseReason>,
    /// Human-readable reason (error labels, panic messages).
    pub reason: Option<Arc<str>>,
    /// Kind-specific counter (registry size, fan-out width, stuck tasks).
    pub count: Option<u64>,
    /// Subscriber name, for subscriber events.
    pub subscriber: Option<&'static str>,
}

impl HubEvent {
    /// Creates a new event with current timestamp and next sequence number.
    pub fn new(kind: HubEventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            client: None,
            close: None,
            reason: None,
            count: None,
            subscriber: None,
        }
    }

    #[inline]
    pub fn with_client(mut self, id: ClientId) -> Self {
        self.client = Some(id);
        self
    }

    #[inline]
    pub fn with_close(mut self, reason: CloseReason) -> Self {
        self.close = Some(reason);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n as u64);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = HubEvent::new(HubEventKind::SubscriberOverflow).with_reason(reason);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = HubEvent::new(HubEventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, HubEventKind::SubscriberOverflow)
    }
}
