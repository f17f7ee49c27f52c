//! WebSocket adapter over an upgraded axum socket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};

use super::{Connection, FrameSink, FrameStream, Inbound, Outbound};
use crate::error::TransportError;

/// Upgraded WebSocket connection.
pub struct WsConnection {
    socket: WebSocket,
    limit: Option<usize>,
}

impl WsConnection {
    /// Wraps an upgraded socket. Inbound frames above `limit` bytes fail
    /// the read; `None` accepts any size.
    pub fn new(socket: WebSocket, limit: Option<usize>) -> Self {
        Self { socket, limit }
    }
}

impl Connection for WsConnection {
    fn split(self) -> (Box<dyn FrameSink>, Box<dyn FrameStream>) {
        let (sink, stream) = self.socket.split();
        (
            Box::new(WsSink { sink }),
            Box::new(WsStream {
                stream,
                limit: self.limit,
            }),
        )
    }
}

struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, item: Outbound) -> Result<(), TransportError> {
        let msg = match item {
            Outbound::Frame(frame) => Message::Text(frame.as_str().to_owned().into()),
            Outbound::Ping => Message::Ping(Default::default()),
        };
        self.sink.send(msg).await.map_err(TransportError::io)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // The close frame is best-effort: the peer may already be gone.
        let _ = self.sink.send(Message::Close(None)).await;
        self.sink.close().await.map_err(TransportError::io)
    }
}

struct WsStream {
    stream: SplitStream<WebSocket>,
    limit: Option<usize>,
}

impl WsStream {
    fn check(&self, len: usize) -> Result<(), TransportError> {
        match self.limit {
            Some(limit) if len > limit => Err(TransportError::MessageTooLarge { limit }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl FrameStream for WsStream {
    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>> {
        let msg = match self.stream.next().await? {
            Ok(msg) => msg,
            Err(e) => return Some(Err(TransportError::io(e))),
        };
        let item = match msg {
            Message::Text(text) => self
                .check(text.as_str().len())
                .map(|_| Inbound::Text(text.as_str().to_owned())),
            Message::Binary(data) => self.check(data.len()).map(|_| Inbound::Binary(data.len())),
            Message::Ping(_) => Ok(Inbound::Ping),
            Message::Pong(_) => Ok(Inbound::Pong),
            Message::Close(_) => Ok(Inbound::Close),
        };
        Some(item)
    }
}
