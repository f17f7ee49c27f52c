//! # Hub: the single authority over live clients.
//!
//! The [`Hub`] is a handle to one serialization loop (an actor). The loop owns
//! the [`Registry`]; everything else talks to it through bounded queues:
//!
//! ```text
//!   connect()/register() ──► [control queue]    ─┐
//!   pumps / unregister() ──► [unregister queue] ─┼──► hub loop ──► Registry
//!   broadcast*()         ──► [broadcast queue]  ─┤        │
//!   shutdown()           ──► stop token         ─┘        ├──► outbox 1 (try_send)
//!                                                         ├──► outbox 2
//!                                                         └──► outbox N
//! ```
//!
//! ## Ordering
//! The loop polls with `biased` priority: stop, control, unregister, broadcast.
//! A caller whose `register`/`unregister` returned before it called
//! `broadcast` therefore always has that change applied before the broadcast
//! is fanned out. Broadcasts leave the loop in the order they were queued, so
//! every client still registered sees them in that order.
//!
//! ## Backpressure
//! Fan-out never waits on a client. A full outbox gets its client
//! unregistered (`CloseReason::Overflow`); the other clients are unaffected.
//!
//! ## Shutdown race
//! On stop, the loop closes its control queue and answers every registration
//! still queued with [`RegisterError::ShuttingDown`]; then it unregisters all
//! clients. A registration thus either completes (and is then unregistered by
//! the same shutdown) or is refused; it is never left dangling.
//!
//! ## Cancellation
//! `connect` runs registration and pump startup as one task on the pump
//! tracker, so dropping the caller's future does not strand a client. A
//! registration whose ack nobody receives (a dropped `register` future) is
//! removed again by the loop with `CloseReason::Requested`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{OnceCell, mpsc, oneshot};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::config::HubConfig;
use crate::core::client::{Client, ClientHandle, ClientId, PumpConfig};
use crate::core::lifecycle::ShutdownReport;
use crate::core::registry::Registry;
use crate::error::{PublishError, RegisterError};
use crate::events::{Bus, CloseReason, HubEvent, HubEventKind};
use crate::message::{Frame, Message};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::transport::Connection;

/// Requests on the control queue.
enum Control {
    Register {
        handle: ClientHandle,
        reply: oneshot::Sender<Result<(), RegisterError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<ClientId>>,
    },
}

struct Unregister {
    id: ClientId,
    reason: CloseReason,
}

struct Broadcast {
    frame: Frame,
    done: Option<oneshot::Sender<usize>>,
}

/// What client pumps need from the hub: a way back into the loop, the bus and
/// the shutdown force signal. Holds no reference to the hub itself.
#[derive(Clone)]
pub(crate) struct HubLink {
    unregister_tx: mpsc::Sender<Unregister>,
    pub(crate) bus: Bus,
    pub(crate) force: CancellationToken,
}

impl HubLink {
    pub(crate) async fn request_unregister(&self, id: ClientId, reason: CloseReason) {
        // A closed queue means the loop is gone and already released everyone.
        let _ = self.unregister_tx.send(Unregister { id, reason }).await;
    }
}

/// Registers one connection and starts (or discards) its pumps.
struct Admission {
    control_tx: mpsc::Sender<Control>,
    stop: CancellationToken,
    link: HubLink,
    tracker: TaskTracker,
    pumps: PumpConfig,
}

impl Admission {
    async fn run(self, client: Client) -> Result<(), RegisterError> {
        match request_register(&self.control_tx, &self.stop, client.handle()).await {
            Ok(()) => {
                client.spawn(self.link, &self.tracker, self.pumps);
                Ok(())
            }
            Err(err) => {
                client.discard(&self.link, self.pumps).await;
                Err(err)
            }
        }
    }
}

async fn request_register(
    control_tx: &mpsc::Sender<Control>,
    stop: &CancellationToken,
    handle: ClientHandle,
) -> Result<(), RegisterError> {
    if stop.is_cancelled() {
        return Err(RegisterError::ShuttingDown);
    }
    let (reply, rx) = oneshot::channel();
    control_tx
        .send(Control::Register { handle, reply })
        .await
        .map_err(|_| RegisterError::ShuttingDown)?;
    rx.await.unwrap_or(Err(RegisterError::ShuttingDown))
}

/// Handle to the hub loop. Share it as `Arc<Hub>`.
pub struct Hub {
    pub(crate) cfg: HubConfig,
    pub(crate) bus: Bus,
    control_tx: mpsc::Sender<Control>,
    broadcast_tx: mpsc::Sender<Broadcast>,
    link: HubLink,
    /// Stop signal multiplexed into the loop.
    pub(crate) stop: CancellationToken,
    /// Fired when the loop has exited.
    pub(crate) loop_done: CancellationToken,
    /// Stops the subscriber listener (after the final shutdown events).
    pub(crate) listener_stop: CancellationToken,
    pub(crate) listener_done: CancellationToken,
    /// Tracks every client pump.
    pub(crate) tracker: TaskTracker,
    clients: Arc<AtomicUsize>,
    /// Clients released by the loop when it stopped.
    pub(crate) closed_on_stop: Arc<AtomicUsize>,
    /// Set by the first `shutdown` call; later calls return it.
    pub(crate) report: OnceCell<ShutdownReport>,
}

impl Hub {
    /// Starts building a hub.
    pub fn builder(cfg: HubConfig) -> HubBuilder {
        HubBuilder::new(cfg)
    }

    pub fn config(&self) -> &HubConfig {
        &self.cfg
    }

    /// Lifecycle event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Number of registered clients, readable from any task.
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Acquire)
    }

    /// True once shutdown started.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Hands a freshly accepted connection to the hub.
    ///
    /// On success both pumps are running and the client is registered. On
    /// refusal the connection is closed before returning.
    ///
    /// Cancel-safe: registration runs on the hub's own task tracker, so a
    /// caller that stops waiting neither leaks a registered client nor skips
    /// the connection's close.
    pub async fn connect<C: Connection>(&self, conn: C) -> Result<ClientId, RegisterError> {
        let client = Client::new(conn, self.cfg.outbox_capacity_clamped());
        let id = client.id();
        let admission = Admission {
            control_tx: self.control_tx.clone(),
            stop: self.stop.clone(),
            link: self.link.clone(),
            tracker: self.tracker.clone(),
            pumps: self.pump_config(),
        };
        match self.tracker.spawn(admission.run(client)).await {
            Ok(res) => res.map(|()| id),
            Err(_) => Err(RegisterError::ShuttingDown),
        }
    }

    /// Adds a client to the registry. Resolves once the loop accepted or refused it.
    ///
    /// If this future is dropped after the request was queued, the loop
    /// removes the client again instead of keeping an unacknowledged entry.
    pub async fn register(&self, handle: ClientHandle) -> Result<(), RegisterError> {
        request_register(&self.control_tx, &self.stop, handle).await
    }

    /// Queues removal of a client. Unknown or already removed ids are ignored.
    pub async fn unregister(&self, id: ClientId) {
        self.link.request_unregister(id, CloseReason::Requested).await;
    }

    /// Sorted ids of registered clients, as seen by the loop.
    /// Empty once the hub stopped.
    pub async fn clients(&self) -> Vec<ClientId> {
        let (reply, rx) = oneshot::channel();
        if self.control_tx.send(Control::Snapshot { reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Queues a frame without waiting. Fails with `Full` when the hub is overloaded.
    pub fn try_broadcast(&self, frame: impl Into<Frame>) -> Result<(), PublishError> {
        let item = Broadcast {
            frame: frame.into(),
            done: None,
        };
        self.broadcast_tx
            .try_send(item)
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => PublishError::Full,
                mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
            })
            .inspect_err(|e| self.report_drop(e))
    }

    /// Queues a frame, waiting up to `enqueue_timeout` for room.
    pub async fn broadcast(&self, frame: impl Into<Frame>) -> Result<(), PublishError> {
        let item = Broadcast {
            frame: frame.into(),
            done: None,
        };
        self.enqueue(item).await.inspect_err(|e| self.report_drop(e))
    }

    /// Queues a frame and waits until the loop fanned it out.
    ///
    /// Returns how many outboxes accepted it. Waits up to `enqueue_timeout`
    /// for room and up to `delivery_timeout` for the fan-out.
    pub async fn broadcast_confirmed(&self, frame: impl Into<Frame>) -> Result<usize, PublishError> {
        let (done, rx) = oneshot::channel();
        let item = Broadcast {
            frame: frame.into(),
            done: Some(done),
        };
        self.enqueue(item).await.inspect_err(|e| self.report_drop(e))?;

        let timeout = self.cfg.delivery_timeout;
        match time::timeout(timeout, rx).await {
            Ok(Ok(reached)) => Ok(reached),
            // Discarded by a stopping loop.
            Ok(Err(_)) => Err(PublishError::Closed),
            Err(_) => Err(PublishError::Timeout { timeout }),
        }
    }

    /// Encodes `message` once and broadcasts the frame.
    pub async fn publish(&self, message: &Message) -> Result<(), PublishError> {
        let frame = message.encode().inspect_err(|e| self.report_drop(e))?;
        self.broadcast(frame).await
    }

    async fn enqueue(&self, item: Broadcast) -> Result<(), PublishError> {
        if self.stop.is_cancelled() {
            return Err(PublishError::Closed);
        }
        let timeout = self.cfg.enqueue_timeout;
        let send = self.broadcast_tx.send(item);
        let res = if timeout == Duration::ZERO {
            send.await
        } else {
            match time::timeout(timeout, send).await {
                Ok(res) => res,
                Err(_) => return Err(PublishError::Timeout { timeout }),
            }
        };
        res.map_err(|_| PublishError::Closed)
    }

    fn report_drop(&self, err: &PublishError) {
        self.bus
            .publish(HubEvent::new(HubEventKind::BroadcastDropped).with_reason(err.as_label()));
    }

    pub(crate) fn pump_config(&self) -> PumpConfig {
        PumpConfig {
            write_deadline: self.cfg.write_deadline(),
            read_deadline: self.cfg.read_deadline(),
            ping_every: self.cfg.ping_every(),
        }
    }

    pub(crate) fn force(&self) -> &CancellationToken {
        &self.link.force
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        // Last handle gone: let the loop release its clients.
        self.stop.cancel();
        self.listener_stop.cancel();
    }
}

/// Builder for a [`Hub`].
pub struct HubBuilder {
    cfg: HubConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl HubBuilder {
    pub fn new(cfg: HubConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets lifecycle event subscribers (logging, counters, custom).
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Spawns the hub loop and the subscriber listener. Must be called inside
    /// a tokio runtime.
    pub fn build(self) -> Arc<Hub> {
        let cfg = self.cfg;
        let bus = Bus::new(cfg.bus_capacity_clamped());

        let (control_tx, control_rx) = mpsc::channel(cfg.control_capacity_clamped());
        let (unregister_tx, unregister_rx) = mpsc::channel(cfg.control_capacity_clamped());
        let (broadcast_tx, broadcast_rx) = mpsc::channel(cfg.broadcast_capacity_clamped());

        let stop = CancellationToken::new();
        let loop_done = CancellationToken::new();
        let listener_stop = CancellationToken::new();
        let listener_done = CancellationToken::new();
        let clients = Arc::new(AtomicUsize::new(0));
        let closed_on_stop = Arc::new(AtomicUsize::new(0));

        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        spawn_listener(subs, &bus, listener_stop.clone(), listener_done.clone());

        let greeting = cfg.greet_on_register;
        let hub_loop = HubLoop {
            registry: Registry::new(),
            control_rx,
            unregister_rx,
            broadcast_rx,
            stop: stop.clone(),
            bus: bus.clone(),
            clients: clients.clone(),
            closed_on_stop: closed_on_stop.clone(),
            greeting,
        };
        let done = loop_done.clone();
        tokio::spawn(async move {
            let _done = done.drop_guard();
            hub_loop.run().await;
        });

        Arc::new(Hub {
            cfg,
            link: HubLink {
                unregister_tx,
                bus: bus.clone(),
                force: CancellationToken::new(),
            },
            bus,
            control_tx,
            broadcast_tx,
            stop,
            loop_done,
            listener_stop,
            listener_done,
            tracker: TaskTracker::new(),
            clients,
            closed_on_stop,
            report: OnceCell::new(),
        })
    }
}

/// Forwards bus events to the subscriber set until stopped, then flushes.
fn spawn_listener(
    subs: SubscriberSet,
    bus: &Bus,
    stop: CancellationToken,
    done: CancellationToken,
) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        let _done = done.drop_guard();
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(ev),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                _ = stop.cancelled() => {
                    while let Ok(ev) = rx.try_recv() {
                        subs.emit(ev);
                    }
                    break;
                }
            }
        }
        subs.shutdown().await;
    });
}

/// The serialization point. Owns the registry; runs on one task.
struct HubLoop {
    registry: Registry,
    control_rx: mpsc::Receiver<Control>,
    unregister_rx: mpsc::Receiver<Unregister>,
    broadcast_rx: mpsc::Receiver<Broadcast>,
    stop: CancellationToken,
    bus: Bus,
    clients: Arc<AtomicUsize>,
    closed_on_stop: Arc<AtomicUsize>,
    greeting: bool,
}

impl HubLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                Some(cmd) = self.control_rx.recv() => self.on_control(cmd),
                Some(req) = self.unregister_rx.recv() => self.on_unregister(req.id, req.reason),
                Some(item) = self.broadcast_rx.recv() => self.on_broadcast(item),
                else => break,
            }
        }
        self.stop_all();
    }

    fn on_control(&mut self, cmd: Control) {
        match cmd {
            Control::Register { handle, reply } => {
                let id = handle.id();
                let res = self.registry.insert(handle);
                match &res {
                    Ok(()) => {
                        self.sync_gauge();
                        if self.greeting {
                            self.greet(id);
                        }
                        self.bus.publish(
                            HubEvent::new(HubEventKind::ClientRegistered)
                                .with_client(id)
                                .with_count(self.registry.len()),
                        );
                    }
                    Err(err) => self.publish_rejected(id, err),
                }
                // Nobody is waiting for the ack: the caller gave up, so the
                // client would never get pumps. Take it back out.
                let accepted = res.is_ok();
                if reply.send(res).is_err() && accepted {
                    debug!(client = %id, "registration abandoned, rolling back");
                    self.on_unregister(id, CloseReason::Requested);
                }
            }
            Control::Snapshot { reply } => {
                let _ = reply.send(self.registry.ids());
            }
        }
    }

    fn on_unregister(&mut self, id: ClientId, reason: CloseReason) {
        if self.registry.remove(id).is_some() {
            self.sync_gauge();
            self.bus.publish(
                HubEvent::new(HubEventKind::ClientUnregistered)
                    .with_client(id)
                    .with_close(reason)
                    .with_count(self.registry.len()),
            );
        }
    }

    fn on_broadcast(&mut self, item: Broadcast) {
        let fanout = self.registry.fan_out(&item.frame);
        for (id, reason) in fanout.failed {
            self.on_unregister(id, reason);
        }
        self.bus
            .publish(HubEvent::new(HubEventKind::BroadcastFanout).with_count(fanout.reached));
        if let Some(done) = item.done {
            let _ = done.send(fanout.reached);
        }
    }

    /// Refuses queued registrations, discards queued broadcasts and releases
    /// every client.
    fn stop_all(&mut self) {
        self.control_rx.close();
        while let Ok(cmd) = self.control_rx.try_recv() {
            match cmd {
                Control::Register { handle, reply } => {
                    let err = RegisterError::ShuttingDown;
                    self.publish_rejected(handle.id(), &err);
                    let _ = reply.send(Err(err));
                }
                Control::Snapshot { reply } => {
                    let _ = reply.send(Vec::new());
                }
            }
        }

        self.broadcast_rx.close();
        while let Ok(item) = self.broadcast_rx.try_recv() {
            drop(item);
            self.bus.publish(
                HubEvent::new(HubEventKind::BroadcastDropped).with_reason("hub_stopped"),
            );
        }

        self.unregister_rx.close();
        while let Ok(req) = self.unregister_rx.try_recv() {
            self.on_unregister(req.id, req.reason);
        }

        let released = self.registry.drain();
        let total = released.len();
        for handle in released {
            self.bus.publish(
                HubEvent::new(HubEventKind::ClientUnregistered)
                    .with_client(handle.id())
                    .with_close(CloseReason::Shutdown)
                    .with_count(0),
            );
        }
        self.sync_gauge();
        self.closed_on_stop.store(total, Ordering::Release);
    }

    /// Best-effort `connected` frame for a new client.
    fn greet(&self, id: ClientId) {
        match Message::connected().encode() {
            Ok(frame) => {
                self.registry.offer(id, frame);
            }
            Err(err) => debug!(client = %id, error = %err, "greeting not encoded"),
        }
    }

    fn publish_rejected(&self, id: ClientId, err: &RegisterError) {
        self.bus.publish(
            HubEvent::new(HubEventKind::ClientRejected)
                .with_client(id)
                .with_reason(err.as_label()),
        );
    }

    fn sync_gauge(&self) {
        self.clients.store(self.registry.len(), Ordering::Release);
    }
}
