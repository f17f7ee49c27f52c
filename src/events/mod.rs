//! Hub lifecycle events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by the hub loop, client pumps,
//! the lifecycle controller and subscriber workers.
//!
//! These events describe what the hub *did* (registered a client, dropped a
//! slow one, exceeded its grace period). They are never sent to viewers; the
//! frames viewers receive live in [`crate::message`].
//!
//! ## Contents
//! - [`HubEventKind`], [`HubEvent`] event classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: hub loop, client pumps, `Hub::shutdown`, `Broadcaster`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the hub's subscriber listener (fans out to `SubscriberSet`),
//!   and any caller of [`Hub::bus`](crate::Hub::bus).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{CloseReason, HubEvent, HubEventKind};
