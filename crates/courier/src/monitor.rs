// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link state tracking.
//!
//! Mirrors the transport's connection state and fires a reconnect sweep on
//! every disconnected-to-connected transition, so entries held back while the
//! link was down go out without waiting for the next periodic tick.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::scheduler::SweepTrigger;
use crate::transport::{ConnectionObserver, ConnectionState};

/// Connection state observer.
#[derive(Debug)]
pub struct ConnectionMonitor {
    connected: AtomicBool,
    disconnects: AtomicU64,
    reconnects: AtomicU64,
    trigger: SweepTrigger,
}

impl ConnectionMonitor {
    /// Create a monitor starting from `initially_connected`.
    pub fn new(initially_connected: bool, trigger: SweepTrigger) -> Self {
        Self {
            connected: AtomicBool::new(initially_connected),
            disconnects: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            trigger,
        }
    }

    /// Last reported link state.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Link losses observed.
    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    /// Link recoveries observed.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }
}

impl ConnectionObserver for ConnectionMonitor {
    fn on_connection_change(&self, state: ConnectionState) {
        let now_connected = state == ConnectionState::Connected;
        let was_connected = self.connected.swap(now_connected, Ordering::SeqCst);
        if was_connected == now_connected {
            return;
        }

        if now_connected {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
            tracing::info!("Broker link restored, sweeping pending messages");
            self.trigger.fire();
        } else {
            self.disconnects.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Broker link lost, retries deferred until reconnect");
        }
    }
}
