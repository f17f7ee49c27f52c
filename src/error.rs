//! Error types used by the hub, its transports and publishers.
//!
//! - [`RegisterError`]: a client could not enter the registry.
//! - [`PublishError`]: a frame could not be handed to the hub loop.
//! - [`TransportError`]: a connection adapter failed to send or receive.
//! - [`ConfigError`]: settings could not be loaded.
//!
//! Every enum exposes `as_label()` with a stable snake_case string for
//! logs and metrics.

use std::time::Duration;
use thiserror::Error;

use crate::core::ClientId;

/// # Errors returned when registering a client.
///
/// The hub surfaces nothing beyond accept/reject: a rejected caller is
/// expected to close its connection and, for duplicates, retry with a fresh id.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// The hub is stopping (or already stopped) and accepts no new clients.
    #[error("hub is shutting down")]
    ShuttingDown,

    /// A client with the same id is already registered.
    #[error("client {id} is already registered")]
    Duplicate {
        /// The conflicting id.
        id: ClientId,
    },

    /// The client tore itself down before the hub processed its registration.
    #[error("client {id} closed before registration")]
    AlreadyClosed {
        /// The id of the closed client.
        id: ClientId,
    },
}

impl RegisterError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegisterError::ShuttingDown => "register_shutting_down",
            RegisterError::Duplicate { .. } => "register_duplicate",
            RegisterError::AlreadyClosed { .. } => "register_already_closed",
        }
    }
}

/// # Errors returned when handing a broadcast to the hub.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The broadcast queue is saturated (hub overloaded).
    #[error("broadcast queue is full")]
    Full,

    /// The hub loop has exited.
    #[error("hub is closed")]
    Closed,

    /// Enqueue or fan-out confirmation did not happen in time.
    #[error("broadcast timed out after {timeout:?}")]
    Timeout {
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// The message could not be serialized.
    #[error("failed to encode message: {error}")]
    Encode {
        /// The serializer message.
        error: String,
    },
}

impl PublishError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PublishError::Full => "publish_full",
            PublishError::Closed => "publish_closed",
            PublishError::Timeout { .. } => "publish_timeout",
            PublishError::Encode { .. } => "publish_encode",
        }
    }
}

/// # Errors produced by a connection adapter.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer (or the local side) closed the connection.
    #[error("connection closed")]
    Closed,

    /// An operation exceeded its deadline.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// An inbound frame exceeded the configured read limit.
    #[error("inbound frame exceeds {limit} bytes")]
    MessageTooLarge {
        /// The configured limit.
        limit: usize,
    },

    /// Underlying I/O or protocol error.
    #[error("transport error: {error}")]
    Io {
        /// The underlying error message.
        error: String,
    },
}

impl TransportError {
    /// Wraps any displayable error as [`TransportError::Io`].
    pub fn io(error: impl std::fmt::Display) -> Self {
        TransportError::Io {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Closed => "transport_closed",
            TransportError::Timeout { .. } => "transport_timeout",
            TransportError::MessageTooLarge { .. } => "transport_too_large",
            TransportError::Io { .. } => "transport_io",
        }
    }
}

/// # Errors produced while loading settings.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Layered sources could not be read or deserialized.
    #[error("invalid configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Load(_) => "config_load",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(RegisterError::ShuttingDown.as_label(), "register_shutting_down");
        assert_eq!(
            RegisterError::Duplicate { id: ClientId::from_raw(7) }.as_label(),
            "register_duplicate"
        );
        assert_eq!(PublishError::Full.as_label(), "publish_full");
        assert_eq!(
            TransportError::Timeout { timeout: Duration::from_secs(1) }.as_label(),
            "transport_timeout"
        );
    }

    #[test]
    fn test_display_includes_details() {
        let err = RegisterError::Duplicate { id: ClientId::from_raw(42) };
        assert_eq!(err.to_string(), "client client-42 is already registered");

        let err = TransportError::io("broken pipe");
        assert_eq!(err.to_string(), "transport error: broken pipe");
    }
}
