//! # Lifecycle event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and built-in implementations for handling events published on the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! hub loop / pumps ── publish(HubEvent) ──► Bus ──► subscriber_listener
//!                                                         │
//!                                                  SubscriberSet::emit
//!                                               ┌─────────┴─────────┐
//!                                               ▼                   ▼
//!                                           LogWriter            HubStats
//!                                        (tracing output)    (atomic counters)
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use ctfhub::{HubEvent, HubEventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct Alerts;
//!
//! #[async_trait]
//! impl Subscribe for Alerts {
//!     async fn on_event(&self, event: &HubEvent) {
//!         if event.kind == HubEventKind::GraceExceeded {
//!             // page someone
//!         }
//!     }
//!     fn name(&self) -> &'static str { "alerts" }
//! }
//! ```

mod log;
mod stats;
mod subscribe;
mod subscriber_set;

pub use log::LogWriter;
pub use stats::{HubStats, StatsSnapshot};
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
