// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport.
//!
//! Assigns packet ids, records every dispatch and lets the caller play the
//! broker: acknowledge, inject inbound messages, drop and restore the link.
//! Events are delivered on an unbounded channel, the same way a real client's
//! event loop would feed the [`EventRouter`](crate::events::EventRouter).

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::ack::encode_puback;
use crate::error::TransportError;
use crate::inbound::TopicFilter;
use crate::transport::{ConnectionState, MessageId, QosLevel, Transport, TransportEvent};

/// One accepted dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub id: MessageId,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QosLevel,
}

#[derive(Debug)]
struct LoopbackState {
    next_id: u16,
    dispatched: Vec<Dispatched>,
}

/// Loopback transport.
#[derive(Debug)]
pub struct LoopbackTransport {
    connected: AtomicBool,
    state: Mutex<LoopbackState>,
    subscriptions: Vec<TopicFilter>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl LoopbackTransport {
    /// Connected transport that accepts inbound messages on any topic.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        Self::with_subscriptions(Vec::new())
    }

    /// Connected transport that only delivers inbound messages matching one
    /// of `subscriptions`. An empty list accepts everything.
    pub fn with_subscriptions(
        subscriptions: Vec<TopicFilter>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            connected: AtomicBool::new(true),
            state: Mutex::new(LoopbackState {
                next_id: 1,
                dispatched: Vec::new(),
            }),
            subscriptions,
            events: tx,
        };
        (transport, rx)
    }

    /// Bring the link up or down. Emits a connection event on change.
    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if was != connected {
            let state = if connected {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            };
            self.emit(TransportEvent::Connection(state));
        }
    }

    /// Acknowledge `id` as the broker would.
    pub fn ack(&self, id: MessageId) {
        self.emit(TransportEvent::Acknowledged(id));
    }

    /// Deliver an acknowledgment as a raw PUBACK frame.
    pub fn ack_raw(&self, id: MessageId, reason_code: u8) {
        self.emit(TransportEvent::RawAck(encode_puback(id, reason_code)));
    }

    /// Deliver arbitrary bytes as an acknowledgment frame.
    pub fn ack_frame(&self, frame: Vec<u8>) {
        self.emit(TransportEvent::RawAck(frame));
    }

    /// Inject an inbound message. Returns `false` if no subscription matches.
    pub fn inject_inbound(&self, topic: &str, payload: impl Into<Vec<u8>>) -> bool {
        if !self.subscriptions.is_empty() && !self.subscriptions.iter().any(|f| f.matches(topic)) {
            tracing::trace!(topic, "no subscription matches, dropping inbound message");
            return false;
        }
        self.emit(TransportEvent::Inbound {
            topic: topic.to_string(),
            payload: payload.into(),
        });
        true
    }

    /// Copy of all accepted dispatches, oldest first.
    pub fn dispatched(&self) -> Vec<Dispatched> {
        self.state.lock().dispatched.clone()
    }

    /// Drain the dispatch log.
    pub fn take_dispatched(&self) -> Vec<Dispatched> {
        std::mem::take(&mut self.state.lock().dispatched)
    }

    /// Number of dispatches currently in the log.
    pub fn dispatch_count(&self) -> usize {
        self.state.lock().dispatched.len()
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("loopback event receiver dropped");
        }
    }
}

impl Transport for LoopbackTransport {
    fn dispatch(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QosLevel,
    ) -> Result<MessageId, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable);
        }

        let mut state = self.state.lock();
        let id = MessageId(state.next_id);
        // Packet id 0 is reserved.
        state.next_id = state.next_id.checked_add(1).unwrap_or(1);
        state.dispatched.push(Dispatched {
            id,
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        Ok(id)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
