//! # Connection adapters.
//!
//! A [`Connection`] wraps one physical bidirectional connection. The hub
//! never touches it: a [`Client`](crate::Client) splits it once into a
//! [`FrameSink`] (owned by the outbound pump) and a [`FrameStream`] (owned by
//! the inbound pump).
//!
//! ```text
//!            Connection::split()
//!                   │
//!        ┌──────────┴──────────┐
//!        ▼                     ▼
//!   FrameSink              FrameStream
//!   send(Outbound)         recv() → Inbound
//!   close()  (once)
//!        ▲                     ▲
//!   outbound pump          inbound pump
//! ```
//!
//! ## Adapters
//! - [`WsConnection`]: an upgraded axum WebSocket.
//! - [`channel`]: an in-process pair with fault injection, used by tests and
//!   by embedders that bridge the hub onto something other than WebSockets.

pub mod channel;
mod ws;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::message::Frame;

pub use ws::WsConnection;

/// Item written by the outbound pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Encoded message frame.
    Frame(Frame),
    /// Keepalive ping.
    Ping,
}

/// Item read by the inbound pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Text sent by the viewer (ignored by the hub).
    Text(String),
    /// Binary payload of the given size (ignored by the hub).
    Binary(usize),
    Ping,
    Pong,
    /// Viewer-initiated close.
    Close,
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Writes one item; completes when the transport accepted it.
    async fn send(&mut self, item: Outbound) -> Result<(), TransportError>;

    /// Closes the physical connection. Called exactly once by the outbound pump.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection.
#[async_trait]
pub trait FrameStream: Send + 'static {
    /// Reads the next item. `None` means the peer ended the stream.
    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>>;
}

/// One live bidirectional connection, ready to be handed to the hub.
pub trait Connection: Send + 'static {
    /// Splits the connection into independently owned halves.
    fn split(self) -> (Box<dyn FrameSink>, Box<dyn FrameStream>);
}
