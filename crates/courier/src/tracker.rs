// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery tracker.
//!
//! Owns the pending table and the delivery counters behind one lock and
//! implements the three operations allowed to mutate them:
//!
//! | Operation | Role |
//! |-----------|------|
//! | [`DeliveryTracker::publish`] | Dispatch, then register a pending entry |
//! | [`DeliveryTracker::on_acknowledged`] | Resolve an entry on broker ack |
//! | [`DeliveryTracker::retry_sweep`] | Re-dispatch timed-out entries, fail exhausted ones |
//!
//! ```text
//! publish ──dispatch──> transport ──PUBACK──> on_acknowledged
//!    │                                            │
//!    └──> pending table <── retry_sweep ──────────┘
//!                 │
//!                 └──> counters ──> snapshot()
//! ```
//!
//! No transport call is made while the lock is held. A sweep collects its
//! candidates under the lock, releases it for every re-dispatch, and takes it
//! again only to record the outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::TrackerConfig;
use crate::error::PublishError;
use crate::inbound::InboundMessage;
use crate::pending::{PendingMessage, PendingTable};
use crate::stats::{DeliveryCounters, DeliveryStats};
use crate::transport::{AckObserver, InboundObserver, MessageId, QosLevel, Transport};

/// Terminal outcome of a tracked publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Broker acknowledged the message.
    Acknowledged,
    /// Retries exhausted without acknowledgment.
    Failed { retries: u32 },
}

/// Per-message completion signal returned by
/// [`DeliveryTracker::publish_with_receipt`].
#[derive(Debug)]
pub struct DeliveryReceipt {
    rx: oneshot::Receiver<DeliveryOutcome>,
}

impl DeliveryReceipt {
    /// Wait for the terminal outcome.
    ///
    /// Returns `None` if the tracker discarded the entry (shutdown) before it
    /// resolved.
    pub async fn outcome(self) -> Option<DeliveryOutcome> {
        self.rx.await.ok()
    }

    /// Non-blocking check for the outcome.
    pub fn try_outcome(&mut self) -> Option<DeliveryOutcome> {
        self.rx.try_recv().ok()
    }
}

/// Which entries a sweep considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    /// Entries whose last attempt is at least `retry_delay` old.
    Periodic,
    /// Every entry below the retry limit, regardless of age. Entries at the
    /// limit still wait out `retry_delay` before failing.
    Reconnect,
}

/// Outcome counts of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries successfully re-dispatched.
    pub retried: usize,
    /// Entries moved to failed.
    pub failed: usize,
    /// Re-dispatches refused by the transport, left for the next sweep.
    pub deferred: usize,
}

impl SweepReport {
    /// Whether the sweep did anything worth logging.
    pub fn is_empty(&self) -> bool {
        self.retried == 0 && self.failed == 0 && self.deferred == 0
    }
}

/// Handler invoked with decoded inbound messages.
pub type InboundHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

struct RetryCandidate {
    id: MessageId,
    seq: u64,
    topic: String,
    payload: Vec<u8>,
}

#[derive(Default)]
struct TrackerState {
    table: PendingTable,
    counters: DeliveryCounters,
    receipts: HashMap<MessageId, oneshot::Sender<DeliveryOutcome>>,
    next_seq: u64,
}

impl TrackerState {
    /// Resolve an entry that was pushed out of its id slot by a reused id.
    fn fail_displaced(
        &mut self,
        displaced: PendingMessage,
    ) -> (PendingMessage, Option<oneshot::Sender<DeliveryOutcome>>) {
        self.counters.failed += 1;
        let receipt = self.receipts.remove(&displaced.id);
        (displaced, receipt)
    }
}

/// Reliable delivery tracker.
///
/// Constructed once per transport and shared by reference (`Arc`). All
/// methods take `&self` and may be called from any thread.
pub struct DeliveryTracker<T: Transport> {
    transport: T,
    retry_delay: Duration,
    max_retries: u32,
    state: Mutex<TrackerState>,
    /// Serializes sweeps. Never held together with `state` across a dispatch.
    sweep_lock: Mutex<()>,
    inbound_handler: RwLock<Option<InboundHandler>>,
}

impl<T: Transport> DeliveryTracker<T> {
    /// Create a tracker over `transport`.
    pub fn new(transport: T, config: &TrackerConfig) -> Self {
        Self {
            transport,
            retry_delay: config.retry_delay_duration(),
            max_retries: config.max_retries,
            state: Mutex::new(TrackerState::default()),
            sweep_lock: Mutex::new(()),
            inbound_handler: RwLock::new(None),
        }
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Retry eligibility timeout.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Retry limit.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Register a handler for decoded inbound messages.
    pub fn set_inbound_handler(&self, handler: InboundHandler) {
        *self.inbound_handler.write() = Some(handler);
    }

    /// Publish with at-least-once delivery.
    ///
    /// Returns once the transport has accepted the message; acknowledgment
    /// is tracked in the background.
    pub fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<MessageId, PublishError> {
        self.publish_inner(topic, payload.into(), None)
    }

    /// Publish and obtain a receipt resolving to the terminal outcome.
    pub fn publish_with_receipt(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(MessageId, DeliveryReceipt), PublishError> {
        let (tx, rx) = oneshot::channel();
        let id = self.publish_inner(topic, payload.into(), Some(tx))?;
        Ok((id, DeliveryReceipt { rx }))
    }

    fn publish_inner(
        &self,
        topic: &str,
        payload: Vec<u8>,
        completion: Option<oneshot::Sender<DeliveryOutcome>>,
    ) -> Result<MessageId, PublishError> {
        if topic.is_empty() {
            return Err(PublishError::EmptyTopic);
        }

        let id = self
            .transport
            .dispatch(topic, &payload, QosLevel::AtLeastOnce)
            .map_err(|err| {
                tracing::debug!(topic, %err, "publish refused by transport");
                PublishError::from(err)
            })?;

        let now = Instant::now();
        let displaced = {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.counters.published += 1;

            let entry = PendingMessage::new(id, seq, topic.to_string(), payload, now);
            let displaced = state
                .table
                .insert(entry)
                .map(|old| state.fail_displaced(old));
            if let Some(tx) = completion {
                state.receipts.insert(id, tx);
            }
            displaced
        };

        if let Some((old, receipt)) = displaced {
            report_displaced(&old, receipt);
        }

        tracing::trace!(message_id = %id, topic, "message pending acknowledgment");
        Ok(id)
    }

    /// Resolve the entry for `id` as acknowledged.
    ///
    /// Returns `false` for unknown ids (duplicate or late acknowledgments),
    /// which are ignored.
    pub fn on_acknowledged(&self, id: MessageId) -> bool {
        let resolved = {
            let mut state = self.state.lock();
            match state.table.remove(id) {
                Some(msg) => {
                    state.counters.acknowledged += 1;
                    Some((msg, state.receipts.remove(&id)))
                }
                None => None,
            }
        };

        let Some((msg, receipt)) = resolved else {
            tracing::debug!(message_id = %id, "ignoring acknowledgment for unknown message id");
            return false;
        };

        if let Some(tx) = receipt {
            let _ = tx.send(DeliveryOutcome::Acknowledged);
        }
        tracing::trace!(
            message_id = %id,
            topic = %msg.topic,
            retry_count = msg.retry_count,
            "message acknowledged"
        );
        true
    }

    /// Count an inbound message and hand it to the inbound handler, if any.
    pub fn on_message_received(&self, topic: &str, payload: &[u8]) {
        self.state.lock().counters.received += 1;

        let handler = self.inbound_handler.read().clone();
        if let Some(handler) = handler {
            handler(InboundMessage::decode(topic, payload));
        }
    }

    /// Periodic sweep: retry timed-out entries, fail exhausted ones.
    pub fn retry_sweep(&self) -> SweepReport {
        self.sweep(SweepMode::Periodic)
    }

    /// Out-of-band sweep after the link comes back.
    pub fn reconnect_sweep(&self) -> SweepReport {
        self.sweep(SweepMode::Reconnect)
    }

    /// Run one sweep in the given mode.
    pub fn sweep(&self, mode: SweepMode) -> SweepReport {
        let _sweeping = self.sweep_lock.lock();
        let now = Instant::now();
        let mut report = SweepReport::default();

        let (candidates, failed) = {
            let mut state = self.state.lock();
            let mut candidates = Vec::new();
            let mut exhausted = Vec::new();

            for msg in state.table.iter() {
                let due = msg.is_due(now, self.retry_delay);
                if msg.retry_count >= self.max_retries {
                    if due {
                        exhausted.push(msg.id);
                    }
                } else if due || mode == SweepMode::Reconnect {
                    candidates.push(RetryCandidate {
                        id: msg.id,
                        seq: msg.seq,
                        topic: msg.topic.clone(),
                        payload: msg.payload.clone(),
                    });
                }
            }

            let mut failed = Vec::with_capacity(exhausted.len());
            for id in exhausted {
                if let Some(msg) = state.table.remove(id) {
                    state.counters.failed += 1;
                    let receipt = state.receipts.remove(&id);
                    failed.push((msg, receipt));
                }
            }
            (candidates, failed)
        };

        for (msg, receipt) in failed {
            report.failed += 1;
            tracing::warn!(
                message_id = %msg.id,
                topic = %msg.topic,
                retry_count = msg.retry_count,
                "delivery failed: max retries exceeded"
            );
            if let Some(tx) = receipt {
                let _ = tx.send(DeliveryOutcome::Failed {
                    retries: msg.retry_count,
                });
            }
        }

        for candidate in candidates {
            match self.transport.dispatch(
                &candidate.topic,
                &candidate.payload,
                QosLevel::AtLeastOnce,
            ) {
                Ok(new_id) => {
                    if self.record_retry(&candidate, new_id) {
                        report.retried += 1;
                    }
                }
                Err(err) => {
                    report.deferred += 1;
                    tracing::debug!(
                        message_id = %candidate.id,
                        topic = %candidate.topic,
                        %err,
                        "re-dispatch refused, keeping entry for next sweep"
                    );
                }
            }
        }

        report
    }

    fn record_retry(&self, candidate: &RetryCandidate, new_id: MessageId) -> bool {
        let now = Instant::now();
        let outcome = {
            let mut state = self.state.lock();
            match state
                .table
                .record_retry(candidate.id, candidate.seq, new_id, now)
            {
                Some(displaced) => {
                    state.counters.retried += 1;
                    let receipt = if new_id != candidate.id {
                        state.receipts.remove(&candidate.id)
                    } else {
                        None
                    };
                    // Any receipt parked under new_id belongs to the displaced entry.
                    let displaced = displaced.map(|old| state.fail_displaced(old));
                    if let Some(tx) = receipt {
                        state.receipts.insert(new_id, tx);
                    }
                    Some(displaced)
                }
                None => None,
            }
        };

        match outcome {
            Some(displaced) => {
                if let Some((old, receipt)) = displaced {
                    report_displaced(&old, receipt);
                }
                tracing::debug!(
                    message_id = %new_id,
                    previous_id = %candidate.id,
                    topic = %candidate.topic,
                    "message re-dispatched"
                );
                true
            }
            None => {
                tracing::debug!(
                    message_id = %candidate.id,
                    "entry resolved while re-dispatch was in flight"
                );
                false
            }
        }
    }

    /// Consistent point-in-time copy of the counters.
    pub fn snapshot(&self) -> DeliveryStats {
        let state = self.state.lock();
        state.counters.snapshot(state.table.len())
    }

    /// Current number of pending entries.
    pub fn pending_count(&self) -> usize {
        self.state.lock().table.len()
    }

    /// Copy of the pending entries.
    pub fn pending_messages(&self) -> Vec<PendingMessage> {
        self.state.lock().table.iter().cloned().collect()
    }

    /// Drop all pending entries without counting them. Outstanding receipts
    /// resolve to `None`.
    pub fn discard_pending(&self) -> usize {
        let mut state = self.state.lock();
        state.receipts.clear();
        state.table.clear()
    }
}

fn report_displaced(old: &PendingMessage, receipt: Option<oneshot::Sender<DeliveryOutcome>>) {
    tracing::warn!(
        message_id = %old.id,
        topic = %old.topic,
        retry_count = old.retry_count,
        "transport reused a live message id, counting the displaced entry as failed"
    );
    if let Some(tx) = receipt {
        let _ = tx.send(DeliveryOutcome::Failed {
            retries: old.retry_count,
        });
    }
}

impl<T: Transport> AckObserver for DeliveryTracker<T> {
    fn on_acknowledged(&self, id: MessageId) {
        DeliveryTracker::on_acknowledged(self, id);
    }
}

impl<T: Transport> InboundObserver for DeliveryTracker<T> {
    fn on_message_received(&self, topic: &str, payload: &[u8]) {
        DeliveryTracker::on_message_received(self, topic, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::loopback::LoopbackTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DELAY: Duration = Duration::from_secs(2);

    fn tracker(max_retries: u32) -> DeliveryTracker<Arc<LoopbackTransport>> {
        let (transport, _events) = LoopbackTransport::new();
        let config = TrackerConfig::default()
            .retry_delay(DELAY)
            .max_retries(max_retries);
        DeliveryTracker::new(Arc::new(transport), &config)
    }

    fn pending_for(
        tracker: &DeliveryTracker<Arc<LoopbackTransport>>,
        topic: &str,
    ) -> Option<PendingMessage> {
        tracker
            .pending_messages()
            .into_iter()
            .find(|m| m.topic == topic)
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_registers_pending_entry() {
        let tracker = tracker(3);
        let id = tracker.publish("sensors/dht22/1", b"21.5".to_vec()).expect("publish");

        let stats = tracker.snapshot();
        assert_eq!(stats.total_published, 1);
        assert_eq!(stats.pending_count, 1);

        let msg = pending_for(&tracker, "sensors/dht22/1").expect("pending");
        assert_eq!(msg.id, id);
        assert_eq!(msg.retry_count, 0);
        assert_eq!(msg.payload, b"21.5");
        assert_eq!(tracker.transport().dispatch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_rejects_empty_topic() {
        let tracker = tracker(3);
        assert_eq!(tracker.publish("", b"x".to_vec()), Err(PublishError::EmptyTopic));
        assert_eq!(tracker.snapshot().total_published, 0);
        assert_eq!(tracker.transport().dispatch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_while_disconnected_tracks_nothing() {
        let tracker = tracker(3);
        tracker.transport().set_connected(false);

        let err = tracker.publish("sensors/pir/1", b"1".to_vec()).unwrap_err();
        assert_eq!(
            err,
            PublishError::TransportUnavailable(TransportError::Unavailable)
        );
        let stats = tracker.snapshot();
        assert_eq!(stats.total_published, 0);
        assert_eq!(stats.pending_count, 0);
        assert_eq!(stats.total_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_resolves_entry() {
        let tracker = tracker(3);
        let id = tracker.publish("sensors/pir/1", b"1".to_vec()).expect("publish");

        assert!(tracker.on_acknowledged(id));
        let stats = tracker.snapshot();
        assert_eq!(stats.total_acknowledged, 1);
        assert_eq!(stats.pending_count, 0);
        assert_eq!(stats.reliability_percentage(), 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_ack_is_ignored() {
        let tracker = tracker(3);
        let id = tracker.publish("sensors/pir/1", b"1".to_vec()).expect("publish");
        assert!(tracker.on_acknowledged(id));
        let before = tracker.snapshot();

        assert!(!tracker.on_acknowledged(id));
        assert!(!tracker.on_acknowledged(MessageId(999)));
        assert_eq!(tracker.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acks_out_of_order() {
        let tracker = tracker(3);
        let ids: Vec<_> = (0..5)
            .map(|i| {
                tracker
                    .publish(&format!("sensors/dht22/{}", i), vec![i as u8])
                    .expect("publish")
            })
            .collect();

        for id in ids.iter().rev() {
            assert!(tracker.on_acknowledged(*id));
        }
        let stats = tracker.snapshot();
        assert_eq!(stats.total_acknowledged, 5);
        assert_eq!(stats.pending_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_before_delay_does_nothing() {
        let tracker = tracker(3);
        tracker.publish("sensors/pir/1", b"1".to_vec()).expect("publish");

        tokio::time::advance(DELAY - Duration::from_millis(1)).await;
        assert!(tracker.retry_sweep().is_empty());
        assert_eq!(tracker.transport().dispatch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acked_before_delay_never_retried() {
        let tracker = tracker(3);
        let id = tracker.publish("sensors/pir/1", b"1".to_vec()).expect("publish");
        tokio::time::advance(Duration::from_millis(500)).await;
        tracker.on_acknowledged(id);

        for _ in 0..5 {
            tokio::time::advance(DELAY).await;
            tracker.retry_sweep();
        }
        assert_eq!(tracker.snapshot().total_retried, 0);
        assert_eq!(tracker.transport().dispatch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_fail_after_max_retries() {
        let tracker = tracker(3);
        let (_, mut receipt) = tracker
            .publish_with_receipt("wearable/fall/1", b"{}".to_vec())
            .expect("publish");

        for attempt in 1..=3u32 {
            tokio::time::advance(DELAY).await;
            let report = tracker.retry_sweep();
            assert_eq!(report.retried, 1);
            let msg = pending_for(&tracker, "wearable/fall/1").expect("still pending");
            assert_eq!(msg.retry_count, attempt);
            assert_eq!(msg.payload, b"{}");
        }
        assert!(receipt.try_outcome().is_none());

        tokio::time::advance(DELAY).await;
        let report = tracker.retry_sweep();
        assert_eq!(report.failed, 1);
        assert_eq!(report.retried, 0);

        let stats = tracker.snapshot();
        assert_eq!(stats.total_retried, 3);
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.pending_count, 0);
        assert_eq!(
            receipt.try_outcome(),
            Some(DeliveryOutcome::Failed { retries: 3 })
        );

        // Failed exactly once.
        tokio::time::advance(DELAY).await;
        assert!(tracker.retry_sweep().is_empty());
        assert_eq!(tracker.snapshot().total_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_retries_fails_on_first_timeout() {
        let tracker = tracker(0);
        tracker.publish("sensors/pir/1", b"1".to_vec()).expect("publish");
        tokio::time::advance(DELAY).await;
        let report = tracker.retry_sweep();
        assert_eq!(report.failed, 1);
        assert_eq!(tracker.snapshot().total_retried, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_after_retry_uses_new_id() {
        let tracker = tracker(3);
        let first = tracker.publish("sensors/pir/1", b"1".to_vec()).expect("publish");
        tokio::time::advance(DELAY).await;
        tracker.retry_sweep();

        let msg = pending_for(&tracker, "sensors/pir/1").expect("pending");
        assert_ne!(msg.id, first);

        // Late ack for the first attempt is a duplicate.
        assert!(!tracker.on_acknowledged(first));
        assert!(tracker.on_acknowledged(msg.id));
        let stats = tracker.snapshot();
        assert_eq!(stats.total_acknowledged, 1);
        assert_eq!(stats.total_retried, 1);
        assert_eq!(stats.pending_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redispatch_failure_keeps_retry_count() {
        let tracker = tracker(3);
        tracker.publish("sensors/pir/1", b"1".to_vec()).expect("publish");
        tracker.transport().set_connected(false);

        for _ in 0..6 {
            tokio::time::advance(DELAY).await;
            let report = tracker.retry_sweep();
            assert_eq!(report.deferred, 1);
        }
        let msg = pending_for(&tracker, "sensors/pir/1").expect("pending");
        assert_eq!(msg.retry_count, 0);
        let stats = tracker.snapshot();
        assert_eq!(stats.total_retried, 0);
        assert_eq!(stats.total_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_sweep_ignores_age() {
        let tracker = tracker(3);
        for i in 0..3 {
            tracker
                .publish(&format!("sensors/dht22/{}", i), b"x".to_vec())
                .expect("publish");
        }
        tokio::time::advance(Duration::from_millis(300)).await;

        assert!(tracker.retry_sweep().is_empty());
        let report = tracker.reconnect_sweep();
        assert_eq!(report.retried, 3);
        assert!(tracker.pending_messages().iter().all(|m| m.retry_count == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_sweep_does_not_fail_fresh_exhausted_entries() {
        let tracker = tracker(1);
        tracker.publish("sensors/pir/1", b"1".to_vec()).expect("publish");
        tokio::time::advance(DELAY).await;
        assert_eq!(tracker.retry_sweep().retried, 1);

        // At the limit but its last attempt is fresh.
        let report = tracker.reconnect_sweep();
        assert!(report.is_empty());
        assert_eq!(tracker.pending_count(), 1);

        tokio::time::advance(DELAY).await;
        assert_eq!(tracker.reconnect_sweep().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_resolves_on_ack() {
        let tracker = tracker(3);
        let (id, receipt) = tracker
            .publish_with_receipt("sensors/pir/1", b"1".to_vec())
            .expect("publish");
        tracker.on_acknowledged(id);
        assert_eq!(receipt.outcome().await, Some(DeliveryOutcome::Acknowledged));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_follows_rekeyed_entry() {
        let tracker = tracker(3);
        let (_, receipt) = tracker
            .publish_with_receipt("sensors/pir/1", b"1".to_vec())
            .expect("publish");
        tokio::time::advance(DELAY).await;
        tracker.retry_sweep();

        let msg = pending_for(&tracker, "sensors/pir/1").expect("pending");
        tracker.on_acknowledged(msg.id);
        assert_eq!(receipt.outcome().await, Some(DeliveryOutcome::Acknowledged));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_pending_drops_receipts() {
        let tracker = tracker(3);
        let (_, receipt) = tracker
            .publish_with_receipt("sensors/pir/1", b"1".to_vec())
            .expect("publish");
        assert_eq!(tracker.discard_pending(), 1);
        assert_eq!(receipt.outcome().await, None);
        assert_eq!(tracker.snapshot().total_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_counted_and_forwarded() {
        let tracker = tracker(3);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        tracker.set_inbound_handler(Arc::new(move |msg: InboundMessage| {
            assert_eq!(msg.str_field("device_id"), Some("n1"));
            seen_clone.fetch_add(1, Ordering::Relaxed);
        }));

        tracker.on_message_received("devices/n1/status", br#"{"device_id":"n1"}"#);
        tracker.on_message_received("devices/n1/status", br#"{"device_id":"n1"}"#);

        let stats = tracker.snapshot();
        assert_eq!(stats.total_received, 2);
        assert_eq!(stats.total_published, 0);
        assert_eq!(stats.pending_count, 0);
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accounting_invariant_holds_throughout() {
        let tracker = tracker(2);
        let mut ids = Vec::new();
        for i in 0..20u8 {
            ids.push(
                tracker
                    .publish(&format!("sensors/pir/{}", i), vec![i])
                    .expect("publish"),
            );
        }
        for id in ids.iter().step_by(3) {
            tracker.on_acknowledged(*id);
        }

        for _ in 0..4 {
            tokio::time::advance(DELAY).await;
            tracker.retry_sweep();
            let s = tracker.snapshot();
            assert!(s.total_resolved() + s.pending_count as u64 <= s.total_published);
        }

        let s = tracker.snapshot();
        assert_eq!(s.pending_count, 0);
        assert_eq!(s.total_resolved(), s.total_published);
        assert_eq!(s.total_acknowledged, 7);
        assert_eq!(s.total_failed, 13);
        assert_eq!(s.total_retried, 26);
    }
}
