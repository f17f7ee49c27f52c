//! # Client: one viewer, two pumps.
//!
//! A [`Client`] bridges one [`Connection`] to the hub. It owns the bounded
//! outbox the hub writes into and runs two independent tasks:
//!
//! ```text
//!                hub loop
//!                   │ try_send(Frame)
//!                   ▼
//!             [ outbox (bounded) ]
//!                   │
//!            outbound pump ──► FrameSink::send  (write deadline, pings)
//!                   │
//!                   └─ on exit ──► FrameSink::close  (exactly once)
//!
//!            inbound pump  ◄── FrameStream::recv (read deadline)
//! ```
//!
//! ## Teardown
//! Whichever side notices a failure first fires the client's close guard (a
//! [`CancellationToken`]): the inbound pump on read error/close frame, the
//! outbound pump on write error/timeout, the hub on overflow/unregister/
//! shutdown. Every blocking point in both pumps also waits on that token, so
//! the other pump unblocks at once.
//!
//! ## Rules
//! - At most one unregister request per client leaves the pumps
//!   (`claim_unregister` is an atomic swap shared with the hub).
//! - The physical `close()` is issued only by the outbound pump, after its
//!   loop ends, so it happens exactly once.
//! - Clients never talk to each other; only the hub writes into an outbox.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::core::hub::HubLink;
use crate::error::TransportError;
use crate::events::{CloseReason, HubEvent, HubEventKind};
use crate::message::Frame;
use crate::transport::{Connection, FrameSink, FrameStream, Inbound, Outbound};

/// Process-wide id counter.
static CLIENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Opaque unique client identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Allocates a fresh id.
    pub fn next() -> Self {
        ClientId(CLIENT_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a caller-chosen value. Ids are not checked for uniqueness here;
    /// the hub rejects duplicates at registration.
    pub const fn from_raw(raw: u64) -> Self {
        ClientId(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// State shared by a client's pumps and its registry entry.
#[derive(Debug)]
pub(crate) struct ClientShared {
    pub(crate) id: ClientId,
    /// One-shot close guard.
    pub(crate) closed: CancellationToken,
    unregistered: AtomicBool,
}

impl ClientShared {
    fn new(id: ClientId) -> Self {
        Self {
            id,
            closed: CancellationToken::new(),
            unregistered: AtomicBool::new(false),
        }
    }

    /// Returns true for the first caller only.
    pub(crate) fn claim_unregister(&self) -> bool {
        !self.unregistered.swap(true, Ordering::AcqRel)
    }

    /// Fires the close guard and, unless someone already did, asks the hub to
    /// drop this client.
    async fn teardown(&self, link: &HubLink, reason: CloseReason) {
        self.closed.cancel();
        if self.claim_unregister() {
            link.request_unregister(self.id, reason).await;
        }
    }
}

/// What the hub keeps for a registered client: the outbox sender and the
/// close guard. Never the connection.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub(crate) shared: Arc<ClientShared>,
    pub(crate) outbox: mpsc::Sender<Frame>,
}

impl ClientHandle {
    pub fn id(&self) -> ClientId {
        self.shared.id
    }

    /// True once the client started tearing down.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }
}

/// Deadlines applied by the pumps.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PumpConfig {
    pub(crate) write_deadline: Option<Duration>,
    pub(crate) read_deadline: Option<Duration>,
    pub(crate) ping_every: Option<Duration>,
}

/// A viewer connection that has not started pumping yet.
pub struct Client {
    shared: Arc<ClientShared>,
    outbox_tx: mpsc::Sender<Frame>,
    outbox_rx: mpsc::Receiver<Frame>,
    sink: Box<dyn FrameSink>,
    stream: Box<dyn FrameStream>,
}

impl Client {
    /// Wraps a connection under a fresh id with an outbox of `outbox_capacity` (min 1).
    pub fn new<C: Connection>(conn: C, outbox_capacity: usize) -> Self {
        Self::with_id(ClientId::next(), conn, outbox_capacity)
    }

    /// Same as [`Client::new`] with a caller-chosen id.
    pub fn with_id<C: Connection>(id: ClientId, conn: C, outbox_capacity: usize) -> Self {
        let (sink, stream) = conn.split();
        let (outbox_tx, outbox_rx) = mpsc::channel(outbox_capacity.max(1));
        Self {
            shared: Arc::new(ClientShared::new(id)),
            outbox_tx,
            outbox_rx,
            sink,
            stream,
        }
    }

    pub fn id(&self) -> ClientId {
        self.shared.id
    }

    /// Registry-side handle for this client.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            shared: self.shared.clone(),
            outbox: self.outbox_tx.clone(),
        }
    }

    /// Starts both pumps on `tracker`.
    pub(crate) fn spawn(self, link: HubLink, tracker: &TaskTracker, cfg: PumpConfig) {
        let Client {
            shared,
            outbox_tx,
            outbox_rx,
            sink,
            stream,
        } = self;
        // Only registry handles may keep the outbox open.
        drop(outbox_tx);

        tracker.spawn(read_pump(stream, shared.clone(), link.clone(), cfg));
        tracker.spawn(write_pump(sink, outbox_rx, shared, link, cfg));
    }

    /// Closes the connection of a client that never started (registration refused).
    pub(crate) async fn discard(self, link: &HubLink, cfg: PumpConfig) {
        let Client {
            shared, mut sink, ..
        } = self;
        shared.closed.cancel();
        close_once(sink.as_mut(), &shared, link, cfg).await;
    }
}

/// Drains the outbox into the sink until the client is torn down.
async fn write_pump(
    mut sink: Box<dyn FrameSink>,
    mut outbox: mpsc::Receiver<Frame>,
    shared: Arc<ClientShared>,
    link: HubLink,
    cfg: PumpConfig,
) {
    let mut ping = cfg.ping_every.map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let failure = loop {
        let item = tokio::select! {
            biased;
            _ = shared.closed.cancelled() => break None,
            frame = outbox.recv() => match frame {
                Some(frame) => Outbound::Frame(frame),
                None => break None,
            },
            _ = next_tick(&mut ping) => Outbound::Ping,
        };

        let res = tokio::select! {
            biased;
            _ = shared.closed.cancelled() => break None,
            res = deadline(cfg.write_deadline, sink.send(item)) => res.and_then(|r| r),
        };
        if let Err(e) = res {
            break Some(e);
        }
    };

    if let Some(err) = failure {
        debug!(client = %shared.id, error = %err, "write failed");
        shared.teardown(&link, CloseReason::WriteFailed).await;
    }
    close_once(sink.as_mut(), &shared, &link, cfg).await;
}

/// Reads until close, error or teardown. Inbound payloads are ignored; the
/// hub is push-only and reads exist to detect liveness.
async fn read_pump(
    mut stream: Box<dyn FrameStream>,
    shared: Arc<ClientShared>,
    link: HubLink,
    cfg: PumpConfig,
) {
    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = shared.closed.cancelled() => break None,
            next = deadline(cfg.read_deadline, stream.recv()) => next,
        };
        match next {
            Ok(None) | Ok(Some(Ok(Inbound::Close))) => break Some(CloseReason::PeerClosed),
            Ok(Some(Ok(Inbound::Text(text)))) => {
                debug!(client = %shared.id, len = text.len(), "ignoring inbound text");
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(err))) | Err(err) => {
                debug!(client = %shared.id, error = %err, "read failed");
                break Some(CloseReason::ReadFailed);
            }
        }
    };

    if let Some(reason) = reason {
        shared.teardown(&link, reason).await;
    }
}

/// The single physical close of a connection.
async fn close_once(
    sink: &mut dyn FrameSink,
    shared: &ClientShared,
    link: &HubLink,
    cfg: PumpConfig,
) {
    let res = tokio::select! {
        biased;
        _ = link.force.cancelled() => Err(TransportError::io("force-closed after shutdown grace")),
        res = deadline(cfg.write_deadline, sink.close()) => res.and_then(|r| r),
    };

    let mut ev = HubEvent::new(HubEventKind::ConnectionClosed).with_client(shared.id);
    if let Err(err) = res {
        ev = ev.with_reason(err.to_string());
    }
    link.bus.publish(ev);
}

/// Applies an optional deadline to `fut`.
async fn deadline<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output, TransportError> {
    match limit {
        Some(timeout) => time::timeout(timeout, fut)
            .await
            .map_err(|_| TransportError::Timeout { timeout }),
        None => Ok(fut.await),
    }
}

async fn next_tick(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
