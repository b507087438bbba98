// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pending message table.
//!
//! Authoritative in-memory record of messages awaiting acknowledgment. Only
//! `Pending` entries are stored; acknowledgment or failure removes the entry
//! in the same critical section that counts it.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::transport::{MessageId, QosLevel};

/// Delivery state of a tracked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Acknowledged,
    Failed,
}

/// One in-flight publish attempt.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    /// Transport-assigned id of the most recent attempt.
    pub id: MessageId,
    /// Tracker-local sequence, unique for the lifetime of the process.
    ///
    /// Distinguishes this entry from a later message that reuses its id.
    pub seq: u64,
    /// Destination topic.
    pub topic: String,
    /// Payload, republished verbatim.
    pub payload: Vec<u8>,
    /// Always [`QosLevel::AtLeastOnce`].
    pub qos: QosLevel,
    /// First dispatch.
    pub created_at: Instant,
    /// Most recent (re)dispatch.
    pub last_attempt_at: Instant,
    /// Retries issued so far.
    pub retry_count: u32,
    /// Always [`DeliveryState::Pending`] while stored.
    pub state: DeliveryState,
}

impl PendingMessage {
    /// Entry for a message that was just dispatched.
    pub fn new(id: MessageId, seq: u64, topic: String, payload: Vec<u8>, now: Instant) -> Self {
        Self {
            id,
            seq,
            topic,
            payload,
            qos: QosLevel::AtLeastOnce,
            created_at: now,
            last_attempt_at: now,
            retry_count: 0,
            state: DeliveryState::Pending,
        }
    }

    /// Time since the last attempt.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_attempt_at)
    }

    /// Whether the last attempt has gone unacknowledged for `retry_delay`.
    pub fn is_due(&self, now: Instant, retry_delay: Duration) -> bool {
        self.age(now) >= retry_delay
    }
}

/// Pending entries keyed by live message id.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<MessageId, PendingMessage>,
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: MessageId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Look up a live entry.
    pub fn get(&self, id: MessageId) -> Option<&PendingMessage> {
        self.entries.get(&id)
    }

    /// Insert an entry, returning any entry that held the same id.
    ///
    /// A displaced entry means the transport reused an id that was still
    /// live; the caller must resolve it.
    pub fn insert(&mut self, msg: PendingMessage) -> Option<PendingMessage> {
        self.entries.insert(msg.id, msg)
    }

    /// Remove and return the entry for `id`.
    pub fn remove(&mut self, id: MessageId) -> Option<PendingMessage> {
        self.entries.remove(&id)
    }

    /// Record a successful re-dispatch of the entry `(id, seq)`.
    ///
    /// Moves the entry under `new_id` when the transport assigned a fresh id.
    /// Returns `None` if that entry is no longer live (resolved while the
    /// re-dispatch was in flight, possibly with `id` since reused), and
    /// otherwise any entry displaced from `new_id` (`Some(None)` when nothing
    /// was displaced).
    pub fn record_retry(
        &mut self,
        id: MessageId,
        seq: u64,
        new_id: MessageId,
        now: Instant,
    ) -> Option<Option<PendingMessage>> {
        if self.entries.get(&id).map(|m| m.seq) != Some(seq) {
            return None;
        }
        let mut msg = self.entries.remove(&id)?;
        msg.retry_count += 1;
        msg.last_attempt_at = now;
        msg.id = new_id;
        Some(self.entries.insert(new_id, msg))
    }

    /// Iterate over live entries.
    pub fn iter(&self) -> impl Iterator<Item = &PendingMessage> {
        self.entries.values()
    }

    /// Drop every entry, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}
