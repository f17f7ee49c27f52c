//! # ctfhub
//!
//! **ctfhub** pushes competition events (solves, first bloods, status changes,
//! announcements) to every connected scoreboard viewer in real time.
//!
//! Viewers are passive: they connect once over WebSocket and receive a stream
//! of JSON frames. A viewer that cannot keep up is disconnected instead of
//! slowing everybody else down.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   flag submission        competition control        organizers
//!          │                       │                       │
//!          └────────────┬──────────┴───────────────────────┘
//!                       ▼
//!            ┌─────────────────────┐
//!            │ Broadcaster         │  ScoreNotifier: never fails the caller
//!            │ (event source)      │
//!            └──────────┬──────────┘
//!                       │ broadcast_confirmed(Frame)
//!                       ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Hub (one serialization loop, owns the Registry)                  │
//! │  - control queue:    register, snapshot                           │
//! │  - unregister queue: pumps, explicit unregister                   │
//! │  - broadcast queue:  frames, fanned out with try_send             │
//! │  - stop token:       in the same biased select                    │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐
//!   │ outbox 1 │       │ outbox 2 │       │ outbox N │   bounded; full ⇒ disconnect
//!   └────┬─────┘       └────┬─────┘       └────┬─────┘
//!        ▼                  ▼                  ▼
//!   write pump         write pump         write pump     write deadline, pings,
//!   read pump          read pump          read pump      read deadline
//!        │                  │                  │
//!        ▼                  ▼                  ▼
//!   Connection         Connection         Connection     WebSocket or in-process
//! ```
//!
//! ### Lifecycle events
//! ```text
//! hub loop ─┐
//! pumps    ─┼──► Bus (broadcast) ──► subscriber listener ──► SubscriberSet
//! shutdown ─┘                                              ┌──────┴──────┐
//!                                                          ▼             ▼
//!                                                      LogWriter      HubStats
//! ```
//!
//! ### Shutdown
//! ```text
//! Hub::shutdown()
//!   ├─► refuse new and queued registrations
//!   ├─► drop queued broadcasts
//!   ├─► unregister every client (close guard fires, pumps unblock)
//!   └─► wait for all pumps (grace), then force-close leftovers
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types                                  |
//! |-------------------|----------------------------------------------------------|--------------------------------------------|
//! | **Hub**           | Registry, ordered fan-out, backpressure, shutdown        | [`Hub`], [`HubBuilder`], [`ShutdownReport`] |
//! | **Clients**       | Per-connection pumps and handles                         | [`Client`], [`ClientHandle`], [`ClientId`]  |
//! | **Messages**      | JSON envelope encoded once per broadcast                 | [`Message`], [`Frame`]                      |
//! | **Event source**  | Business-facing notifications                            | [`ScoreNotifier`], [`Broadcaster`]          |
//! | **Transport**     | WebSocket and in-process connections                     | [`transport::Connection`]                   |
//! | **Observability** | Lifecycle events, logging and counters                   | [`HubEvent`], [`LogWriter`], [`HubStats`]   |
//! | **Configuration** | Hub settings and layered loading                         | [`HubConfig`], [`Settings`]                 |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use ctfhub::transport::channel;
//! use ctfhub::{Hub, HubConfig, LogWriter, Subscribe};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
//!     let hub = Hub::builder(HubConfig::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let (conn, mut viewer) = channel::pair(16);
//!     hub.connect(conn).await.unwrap();
//!
//!     // Greeting first, then the broadcast.
//!     let hello = viewer.next_frame().await.unwrap();
//!     assert!(hello.as_str().contains("\"connected\""));
//!
//!     hub.broadcast_confirmed("{\"type\":\"notification\"}").await.unwrap();
//!     assert!(viewer.next_frame().await.is_some());
//!
//!     let report = hub.shutdown().await;
//!     assert_eq!(report.closed, 1);
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod message;
mod source;
mod subscribers;

pub mod server;
pub mod transport;

// ---- Public re-exports ----

pub use config::{HubConfig, Settings};
pub use crate::core::{
    Client, ClientHandle, ClientId, Hub, HubBuilder, ShutdownReport, wait_for_shutdown_signal,
};
pub use error::{ConfigError, PublishError, RegisterError, TransportError};
pub use events::{Bus, CloseReason, HubEvent, HubEventKind};
pub use message::{
    CompetitionStatus, Frame, Message, MessageKind, NoticeLevel, Notification, ScoreboardUpdate,
    UpdateKind,
};
pub use source::{Broadcaster, ScoreNotifier};
pub use subscribers::{HubStats, LogWriter, StatsSnapshot, Subscribe, SubscriberSet};
