// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the delivery tracker.
//!
//! Only [`PublishError`] is ever returned to a publishing caller. Retry
//! exhaustion, duplicate acknowledgments and malformed acknowledgment frames
//! are resolved asynchronously and surface through statistics and logs.

use thiserror::Error;

/// Errors reported by a [`Transport`](crate::transport::Transport) when a
/// message cannot be handed to the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Client is not connected to the broker.
    #[error("transport unavailable: not connected")]
    Unavailable,

    /// Client refused the message (queue full, packet ids exhausted, ...).
    #[error("transport rejected dispatch: {0}")]
    Rejected(String),
}

/// Errors returned synchronously by the publish gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Topic name was empty.
    #[error("topic must not be empty")]
    EmptyTopic,

    /// The transport could not accept the message. Nothing was tracked.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(#[source] TransportError),
}

impl From<TransportError> for PublishError {
    fn from(err: TransportError) -> Self {
        Self::TransportUnavailable(err)
    }
}

/// Decode failures for acknowledgment frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AckDecodeError {
    /// Frame shorter than a fixed header plus packet id.
    #[error("acknowledgment frame truncated ({0} bytes)")]
    Truncated(usize),

    /// Fixed header does not announce a PUBACK.
    #[error("unexpected packet type 0x{0:02x}")]
    UnexpectedType(u8),

    /// Remaining-length field is malformed or disagrees with the frame size.
    #[error("invalid remaining length")]
    InvalidLength,

    /// Packet id 0 is reserved.
    #[error("packet id 0 is not a valid message id")]
    ZeroPacketId,
}

/// Errors raised while wiring up or running the delivery service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// `start` was called outside a tokio runtime.
    #[error("delivery service must be started inside a tokio runtime")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_converts_to_publish_error() {
        let err: PublishError = TransportError::Unavailable.into();
        assert_eq!(
            err,
            PublishError::TransportUnavailable(TransportError::Unavailable)
        );
        assert!(err.to_string().contains("not connected"));
    }

    #[test]
    fn test_ack_decode_error_display() {
        assert_eq!(
            AckDecodeError::UnexpectedType(0x30).to_string(),
            "unexpected packet type 0x30"
        );
    }
}
