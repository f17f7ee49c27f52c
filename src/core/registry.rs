//! # Client registry owned by the hub loop.
//!
//! The [`Registry`] is a plain map with no locks: only the hub loop holds it,
//! and every mutation arrives through the loop's queues.
//!
//! ## Rules
//! - A client is present iff it was registered and not yet unregistered
//! - Duplicate ids and already-closed clients are refused
//! - Fan-out uses `try_send` only; a full or closed outbox is reported back
//!   so the loop can disconnect that client

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::core::{ClientHandle, ClientId};
use crate::error::RegisterError;
use crate::events::CloseReason;
use crate::message::Frame;

/// Result of one fan-out pass.
#[derive(Debug, Default)]
pub(crate) struct Fanout {
    /// Outboxes that accepted the frame.
    pub(crate) reached: usize,
    /// Clients whose outbox refused it, with the reason to unregister them.
    pub(crate) failed: Vec<(ClientId, CloseReason)>,
}

/// Live clients by id.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    clients: HashMap<ClientId, ClientHandle>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.clients.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Adds a client.
    pub(crate) fn insert(&mut self, handle: ClientHandle) -> Result<(), RegisterError> {
        let id = handle.id();
        if self.clients.contains_key(&id) {
            return Err(RegisterError::Duplicate { id });
        }
        if handle.is_closed() {
            return Err(RegisterError::AlreadyClosed { id });
        }
        self.clients.insert(id, handle);
        Ok(())
    }

    /// Removes a client and fires its close guard. `None` if it was not present.
    pub(crate) fn remove(&mut self, id: ClientId) -> Option<ClientHandle> {
        let handle = self.clients.remove(&id)?;
        // Stop the pumps from asking for an unregistration that already happened.
        handle.shared.claim_unregister();
        handle.shared.closed.cancel();
        Some(handle)
    }

    /// Offers `frame` to every outbox without waiting.
    pub(crate) fn fan_out(&self, frame: &Frame) -> Fanout {
        let mut out = Fanout::default();
        for (id, handle) in &self.clients {
            match handle.outbox.try_send(frame.clone()) {
                Ok(()) => out.reached += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    out.failed.push((*id, CloseReason::Overflow));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    out.failed.push((*id, CloseReason::OutboxClosed));
                }
            }
        }
        out
    }

    /// Best-effort enqueue to a single client (greeting).
    pub(crate) fn offer(&self, id: ClientId, frame: Frame) -> bool {
        self.clients
            .get(&id)
            .is_some_and(|h| h.outbox.try_send(frame).is_ok())
    }

    /// Sorted ids of registered clients.
    pub(crate) fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Removes every client, firing each close guard.
    pub(crate) fn drain(&mut self) -> Vec<ClientHandle> {
        self.clients
            .drain()
            .map(|(_, handle)| {
                handle.shared.claim_unregister();
                handle.shared.closed.cancel();
                handle
            })
            .collect()
    }
}
