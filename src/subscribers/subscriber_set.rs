//! # Lifecycle event delivery to subscribers.
//!
//! [`SubscriberSet`] gives each subscriber its own bounded lane and worker
//! task. The hub's listener calls [`SubscriberSet::emit`], which never waits:
//!
//! ```text
//!            ┌─► lane "log"   ─► worker ─► LogWriter::on_event
//! emit(ev) ──┼─► lane "stats" ─► worker ─► HubStats::on_event
//!            └─► lane ...
//! ```
//!
//! A lane delivers in emit order. Lanes are independent of each other, so a
//! stuck subscriber only loses its own events (reported as
//! `SubscriberOverflow`) and a panic inside `on_event` becomes a
//! `SubscriberPanicked` event while the worker keeps draining its lane.
//!
//! Panics are caught through `AssertUnwindSafe`; a subscriber that panics
//! while holding a lock may leave that state poisoned.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, HubEvent};
use crate::subscribers::Subscribe;

struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<HubEvent>>,
}

/// Delivers lifecycle events to a fixed group of subscribers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Queue capacities below 1 become 1.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (lanes, workers): (Vec<_>, Vec<_>) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let lane = Lane {
                    name: sub.name(),
                    tx,
                };
                (lane, tokio::spawn(run_worker(sub, rx, bus.clone())))
            })
            .unzip();
        Self {
            lanes,
            workers,
            bus,
        }
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Offers `event` to every lane without waiting.
    ///
    /// A full or closed lane drops the event and publishes
    /// `SubscriberOverflow`, except when the dropped event is itself an
    /// overflow report.
    pub fn emit(&self, event: HubEvent) {
        let report = !event.is_subscriber_overflow();
        let event = Arc::new(event);

        for lane in &self.lanes {
            let reason = match lane.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if report {
                self.bus
                    .publish(HubEvent::subscriber_overflow(lane.name, reason));
            }
        }
    }

    /// Closes every lane and waits until the workers drained what was queued.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn run_worker(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<HubEvent>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let delivery = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await;
        if let Err(payload) = delivery {
            bus.publish(HubEvent::subscriber_panicked(
                sub.name(),
                panic_message(payload.as_ref()),
            ));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
