//! # In-process transport with fault injection.
//!
//! [`pair`] returns a [`ChannelConnection`] (hand it to the hub) and the
//! matching [`Peer`] (the viewer side). Frames written by the hub arrive at
//! the peer through a bounded queue, so a peer that never reads behaves like
//! a slow consumer: once its buffer is full, the client's writes block.
//!
//! ## Fault injection
//! - [`Peer::break_connection`]: every pending and future read and write fails.
//! - [`Peer::stall_writes`]: writes and `close()` hang until the connection breaks.
//! - [`Peer::hang_up`]: ends the inbound stream (peer went away).
//! - [`Peer::close_calls`]: how many times the hub side called `close()`.
//!
//! ## Example
//! ```rust
//! use ctfhub::transport::channel;
//!
//! let (conn, peer) = channel::pair(16);
//! assert_eq!(peer.close_calls(), 0);
//! # drop(conn);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Connection, FrameSink, FrameStream, Inbound, Outbound};
use crate::error::TransportError;
use crate::message::Frame;

/// State shared by both ends of a pair.
#[derive(Debug, Default)]
struct Faults {
    broken: CancellationToken,
    closed: CancellationToken,
    stalled: AtomicBool,
    close_calls: AtomicUsize,
    writes: AtomicUsize,
}

/// Creates a connected pair; `buffer` bounds how many unread outbound items
/// the peer can hold (min 1).
pub fn pair(buffer: usize) -> (ChannelConnection, Peer) {
    let faults = Arc::new(Faults::default());
    let (out_tx, out_rx) = mpsc::channel(buffer.max(1));
    let (in_tx, in_rx) = mpsc::channel(16);

    let conn = ChannelConnection {
        out_tx,
        in_rx,
        faults: faults.clone(),
    };
    let peer = Peer {
        out_rx,
        in_tx: Some(in_tx),
        faults,
    };
    (conn, peer)
}

/// Hub side of an in-process pair.
pub struct ChannelConnection {
    out_tx: mpsc::Sender<Outbound>,
    in_rx: mpsc::Receiver<Inbound>,
    faults: Arc<Faults>,
}

impl Connection for ChannelConnection {
    fn split(self) -> (Box<dyn FrameSink>, Box<dyn FrameStream>) {
        (
            Box::new(ChannelSink {
                tx: Some(self.out_tx),
                faults: self.faults.clone(),
            }),
            Box::new(ChannelStream {
                rx: self.in_rx,
                faults: self.faults,
            }),
        )
    }
}

struct ChannelSink {
    tx: Option<mpsc::Sender<Outbound>>,
    faults: Arc<Faults>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, item: Outbound) -> Result<(), TransportError> {
        let Some(tx) = &self.tx else {
            return Err(TransportError::Closed);
        };
        let broken = self.faults.broken.clone();
        if broken.is_cancelled() {
            return Err(TransportError::io("injected write failure"));
        }
        if self.faults.stalled.load(Ordering::SeqCst) {
            broken.cancelled().await;
            return Err(TransportError::io("injected write failure"));
        }
        tokio::select! {
            biased;
            _ = broken.cancelled() => Err(TransportError::io("injected write failure")),
            res = tx.send(item) => {
                self.faults.writes.fetch_add(1, Ordering::SeqCst);
                res.map_err(|_| TransportError::Closed)
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.faults.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.stalled.load(Ordering::SeqCst) {
            self.faults.broken.cancelled().await;
        }
        self.faults.closed.cancel();
        self.tx.take();
        Ok(())
    }
}

struct ChannelStream {
    rx: mpsc::Receiver<Inbound>,
    faults: Arc<Faults>,
}

#[async_trait]
impl FrameStream for ChannelStream {
    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>> {
        let broken = self.faults.broken.clone();
        tokio::select! {
            biased;
            _ = broken.cancelled() => Some(Err(TransportError::io("injected read failure"))),
            item = self.rx.recv() => item.map(Ok),
        }
    }
}

/// Viewer side of an in-process pair.
pub struct Peer {
    out_rx: mpsc::Receiver<Outbound>,
    in_tx: Option<mpsc::Sender<Inbound>>,
    faults: Arc<Faults>,
}

impl Peer {
    /// Next item written by the hub side, pings included.
    /// `None` once the hub side closed the connection and the buffer is drained.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.out_rx.recv().await
    }

    /// Next message frame, skipping pings.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.out_rx.recv().await? {
                Outbound::Frame(frame) => return Some(frame),
                Outbound::Ping => continue,
            }
        }
    }

    /// Drains every buffered message frame without waiting.
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(item) = self.out_rx.try_recv() {
            if let Outbound::Frame(frame) = item {
                frames.push(frame);
            }
        }
        frames
    }

    /// Sends an inbound item to the hub side.
    pub async fn send(&self, item: Inbound) -> Result<(), TransportError> {
        match &self.in_tx {
            Some(tx) => tx.send(item).await.map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    /// Ends the inbound stream, as if the viewer disappeared.
    pub fn hang_up(&mut self) {
        self.in_tx.take();
    }

    /// Makes every read and write on the hub side fail from now on.
    pub fn break_connection(&self) {
        self.faults.broken.cancel();
    }

    /// Toggles hanging writes and closes.
    pub fn stall_writes(&self, on: bool) {
        self.faults.stalled.store(on, Ordering::SeqCst);
    }

    /// Number of `close()` calls made by the hub side.
    pub fn close_calls(&self) -> usize {
        self.faults.close_calls.load(Ordering::SeqCst)
    }

    /// Number of items the hub side managed to write.
    pub fn writes(&self) -> usize {
        self.faults.writes.load(Ordering::SeqCst)
    }

    /// True once the hub side closed the connection.
    pub fn is_closed(&self) -> bool {
        self.faults.closed.is_cancelled()
    }

    /// Waits until the hub side closes the connection.
    pub async fn closed(&self) {
        self.faults.closed.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_to_peer() {
        let (conn, mut peer) = pair(4);
        let (mut sink, _stream) = conn.split();

        sink.send(Outbound::Ping).await.unwrap();
        sink.send(Outbound::Frame(Frame::from("hello"))).await.unwrap();

        assert_eq!(peer.next_frame().await, Some(Frame::from("hello")));
        assert_eq!(peer.writes(), 2);
    }

    #[tokio::test]
    async fn test_break_fails_both_halves() {
        let (conn, peer) = pair(4);
        let (mut sink, mut stream) = conn.split();

        peer.break_connection();

        assert!(matches!(stream.recv().await, Some(Err(TransportError::Io { .. }))));
        assert!(sink.send(Outbound::Ping).await.is_err());
    }

    #[tokio::test]
    async fn test_hang_up_ends_stream() {
        let (conn, mut peer) = pair(4);
        let (_sink, mut stream) = conn.split();

        peer.send(Inbound::Text("hi".into())).await.unwrap();
        peer.hang_up();

        assert_eq!(stream.recv().await, Some(Ok(Inbound::Text("hi".into()))));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_counts_and_ends_peer() {
        let (conn, mut peer) = pair(4);
        let (mut sink, _stream) = conn.split();

        sink.close().await.unwrap();

        assert_eq!(peer.close_calls(), 1);
        assert!(peer.is_closed());
        assert_eq!(peer.recv().await, None);
    }
}
