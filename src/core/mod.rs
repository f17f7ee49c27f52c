//! Hub core: registry, client pumps and lifecycle.
//!
//! The public surface is [`Hub`] (plus its builder), [`Client`]/[`ClientHandle`]
//! for callers that manage connections themselves, and [`ShutdownReport`].
//!
//! Internal modules:
//! - [`hub`]: the serialization loop and its handle;
//! - [`registry`]: the id → client map owned by the loop;
//! - [`client`]: per-connection outbound/inbound pumps;
//! - [`lifecycle`]: graceful shutdown with a grace period;
//! - [`shutdown`]: cross-platform OS signal handling.

mod client;
mod hub;
mod lifecycle;
mod registry;
mod shutdown;

pub use client::{Client, ClientHandle, ClientId};
pub use hub::{Hub, HubBuilder};
pub use lifecycle::ShutdownReport;
pub use shutdown::wait_for_shutdown_signal;
