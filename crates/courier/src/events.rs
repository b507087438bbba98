// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport event pump.
//!
//! Drains the transport's event channel and dispatches each event to the
//! matching observer. Raw acknowledgment frames are decoded here; frames that
//! fail to decode are logged, counted and otherwise dropped, leaving the
//! entry they may have named to the retry path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::ack::decode_puback;
use crate::transport::{AckObserver, ConnectionObserver, InboundObserver, TransportEvent};

/// Routes transport events to observers.
pub struct EventRouter {
    acks: Arc<dyn AckObserver>,
    inbound: Arc<dyn InboundObserver>,
    connection: Arc<dyn ConnectionObserver>,
    malformed_acks: AtomicU64,
    rejected_acks: AtomicU64,
}

impl EventRouter {
    pub fn new(
        acks: Arc<dyn AckObserver>,
        inbound: Arc<dyn InboundObserver>,
        connection: Arc<dyn ConnectionObserver>,
    ) -> Self {
        Self {
            acks,
            inbound,
            connection,
            malformed_acks: AtomicU64::new(0),
            rejected_acks: AtomicU64::new(0),
        }
    }

    /// Acknowledgment frames that could not be decoded.
    pub fn malformed_acks(&self) -> u64 {
        self.malformed_acks.load(Ordering::Relaxed)
    }

    /// Acknowledgments carrying a failure reason code.
    pub fn rejected_acks(&self) -> u64 {
        self.rejected_acks.load(Ordering::Relaxed)
    }

    /// Dispatch one event.
    pub fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::Acknowledged(id) => self.acks.on_acknowledged(id),
            TransportEvent::RawAck(frame) => match decode_puback(&frame) {
                Ok(ack) if ack.is_success() => self.acks.on_acknowledged(ack.id),
                Ok(ack) => {
                    // The broker refused the publish; the entry stays pending
                    // and is retried.
                    self.rejected_acks.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        message_id = %ack.id,
                        reason_code = ack.reason_code,
                        "broker rejected publish"
                    );
                }
                Err(err) => {
                    self.malformed_acks.fetch_add(1, Ordering::Relaxed);
                    warn!(%err, len = frame.len(), "dropping malformed acknowledgment");
                }
            },
            TransportEvent::Inbound { topic, payload } => {
                self.inbound.on_message_received(&topic, &payload);
            }
            TransportEvent::Connection(state) => self.connection.on_connection_change(state),
        }
    }

    /// Pump events until the channel closes or `shutdown` is notified.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        shutdown: Arc<Notify>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => {
                    debug!("Event router shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => {
                        debug!("Transport event channel closed");
                        break;
                    }
                },
            }
        }
    }
}
