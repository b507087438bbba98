// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport abstraction.
//!
//! The tracker never speaks a wire protocol itself. It consumes a pub/sub
//! client through the [`Transport`] trait and is fed back by the client's
//! event context through [`AckObserver`], [`InboundObserver`] and
//! connection-state notifications.
//!
//! ## Contract
//!
//! - `dispatch` hands a message to the client with QoS 1 and returns the
//!   client-assigned packet id, or fails fast with
//!   [`TransportError::Unavailable`] when the link is down.
//! - The client fires one acknowledgment per confirmed publish. Duplicates
//!   are allowed.
//! - Implementations must be callable from any thread and must not call back
//!   into the tracker from inside `dispatch`.

use std::fmt;

use crate::error::TransportError;

/// Transport-assigned message identifier.
///
/// Unique among in-flight messages only; the transport may reuse an id once
/// the message it named has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u16);

impl MessageId {
    /// Raw packet identifier.
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for MessageId {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

/// MQTT quality-of-service levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QosLevel {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QosLevel {
    /// Numeric level as carried on the wire.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Link state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Events emitted by a transport's delivery context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Broker confirmed a publish.
    Acknowledged(MessageId),
    /// Undecoded acknowledgment frame, decoded by the event pump.
    RawAck(Vec<u8>),
    /// Message arrived on a subscribed topic.
    Inbound { topic: String, payload: Vec<u8> },
    /// Link came up or went down.
    Connection(ConnectionState),
}

/// Outbound side of a pub/sub client.
pub trait Transport: Send + Sync {
    /// Hand a message to the client.
    ///
    /// Must not block on broker acknowledgment.
    fn dispatch(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QosLevel,
    ) -> Result<MessageId, TransportError>;

    /// Whether the client currently believes it is connected.
    fn is_connected(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn dispatch(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QosLevel,
    ) -> Result<MessageId, TransportError> {
        (**self).dispatch(topic, payload, qos)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// Receives broker acknowledgments.
///
/// Invoked from whatever context the transport uses.
pub trait AckObserver: Send + Sync {
    /// Broker confirmed the publish identified by `id`.
    fn on_acknowledged(&self, id: MessageId);
}

/// Receives messages on subscribed topics.
pub trait InboundObserver: Send + Sync {
    /// A message arrived on `topic`.
    fn on_message_received(&self, topic: &str, payload: &[u8]);
}

/// Receives link state transitions.
pub trait ConnectionObserver: Send + Sync {
    /// Link state changed.
    fn on_connection_change(&self, state: ConnectionState);
}
