// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery service wiring.
//!
//! Assembles the tracker, the connection monitor, the retry scheduler and the
//! event pump around one transport:
//!
//! ```text
//! transport events ──> EventRouter ──┬─> DeliveryTracker (acks, inbound)
//!                                    └─> ConnectionMonitor ──trigger──> RetryScheduler
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::CourierConfig;
use crate::error::{PublishError, ServiceError};
use crate::events::EventRouter;
use crate::monitor::ConnectionMonitor;
use crate::report::StatusReport;
use crate::scheduler::{RetryScheduler, SchedulerHandle, SweepTrigger};
use crate::stats::DeliveryStats;
use crate::tracker::{DeliveryReceipt, DeliveryTracker, InboundHandler};
use crate::transport::{MessageId, Transport, TransportEvent};

/// Running delivery service.
pub struct DeliveryService<T: Transport + 'static> {
    handle: ServiceHandle<T>,
    scheduler: SchedulerHandle,
    events_shutdown: Arc<Notify>,
    events_task: JoinHandle<()>,
}

impl<T: Transport + 'static> DeliveryService<T> {
    /// Validate `config` and start the service on the current runtime.
    pub fn start(
        config: &CourierConfig,
        transport: T,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ServiceError::NoRuntime);
        }

        let initially_connected = transport.is_connected();
        let tracker = Arc::new(DeliveryTracker::new(transport, &config.tracker));
        let trigger = SweepTrigger::new();
        let monitor = Arc::new(ConnectionMonitor::new(initially_connected, trigger.clone()));
        let router = Arc::new(EventRouter::new(
            tracker.clone(),
            tracker.clone(),
            monitor.clone(),
        ));

        let scheduler = RetryScheduler::spawn(Arc::clone(&tracker), trigger);
        let events_shutdown = Arc::new(Notify::new());
        let events_task = tokio::spawn(
            Arc::clone(&router).run(events, Arc::clone(&events_shutdown)),
        );

        info!(
            "Delivery service started (qos {}, retry delay {:?}, max retries {})",
            config.tracker.qos_level,
            tracker.retry_delay(),
            tracker.max_retries()
        );

        Ok(Self {
            handle: ServiceHandle {
                tracker,
                monitor,
                router,
            },
            scheduler,
            events_shutdown,
            events_task,
        })
    }

    /// Cloneable handle for publishers and the status surface.
    pub fn handle(&self) -> ServiceHandle<T> {
        self.handle.clone()
    }

    /// Stop the scheduler and the event pump, discard pending entries and
    /// return the final counters.
    pub async fn shutdown(self) -> DeliveryStats {
        self.scheduler.shutdown().await;
        self.events_shutdown.notify_one();
        if let Err(e) = self.events_task.await {
            tracing::warn!("Event pump task ended abnormally: {}", e);
        }

        let stats = self.handle.tracker.snapshot();
        let discarded = self.handle.tracker.discard_pending();
        if discarded > 0 {
            tracing::warn!("Discarding {} pending messages on shutdown", discarded);
        }
        info!("Delivery service stopped: {}", stats.format_summary());
        stats
    }
}

/// Shared access to a running service.
pub struct ServiceHandle<T: Transport + 'static> {
    tracker: Arc<DeliveryTracker<T>>,
    monitor: Arc<ConnectionMonitor>,
    router: Arc<EventRouter>,
}

impl<T: Transport + 'static> Clone for ServiceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tracker: Arc::clone(&self.tracker),
            monitor: Arc::clone(&self.monitor),
            router: Arc::clone(&self.router),
        }
    }
}

impl<T: Transport + 'static> ServiceHandle<T> {
    /// See [`DeliveryTracker::publish`].
    pub fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<MessageId, PublishError> {
        self.tracker.publish(topic, payload)
    }

    /// See [`DeliveryTracker::publish_with_receipt`].
    pub fn publish_with_receipt(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(MessageId, DeliveryReceipt), PublishError> {
        self.tracker.publish_with_receipt(topic, payload)
    }

    /// Register a handler for decoded inbound messages.
    pub fn set_inbound_handler(&self, handler: InboundHandler) {
        self.tracker.set_inbound_handler(handler);
    }

    /// Status report for the reporting interface.
    pub fn report(&self) -> StatusReport {
        StatusReport::new(&self.tracker.snapshot(), self.monitor.is_connected())
    }

    /// Raw counter snapshot.
    pub fn stats(&self) -> DeliveryStats {
        self.tracker.snapshot()
    }

    /// Last link state reported by the transport.
    pub fn is_connected(&self) -> bool {
        self.monitor.is_connected()
    }

    /// Link losses and recoveries observed so far.
    pub fn link_transitions(&self) -> (u64, u64) {
        (self.monitor.disconnects(), self.monitor.reconnects())
    }

    /// Acknowledgment frames dropped as undecodable.
    pub fn malformed_acks(&self) -> u64 {
        self.router.malformed_acks()
    }

    /// Acknowledgments that carried a failure reason code.
    pub fn rejected_acks(&self) -> u64 {
        self.router.rejected_acks()
    }

    /// Underlying tracker.
    pub fn tracker(&self) -> &Arc<DeliveryTracker<T>> {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackTransport;
    use crate::tracker::DeliveryOutcome;
    use std::time::Duration;

    fn config() -> CourierConfig {
        let mut config = CourierConfig::default();
        config.tracker = config.tracker.retry_delay(Duration::from_secs(2));
        config
    }

    #[test]
    fn test_start_requires_runtime() {
        let (transport, events) = LoopbackTransport::new();
        let result = DeliveryService::start(&config(), transport, events);
        assert!(matches!(result, Err(ServiceError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let mut config = config();
        config.tracker.qos_level = 0;
        let (transport, events) = LoopbackTransport::new();
        let result = DeliveryService::start(&config, transport, events);
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_sub_nanosecond_retry_delay() {
        let mut config = config();
        config.tracker.retry_delay_seconds = 1e-12;
        let (transport, events) = LoopbackTransport::new();
        let result = DeliveryService::start(&config, transport, events);
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_flows_through_event_pump() {
        let (transport, events) = LoopbackTransport::new();
        let transport = Arc::new(transport);
        let service =
            DeliveryService::start(&config(), Arc::clone(&transport), events).expect("start");
        let handle = service.handle();

        let (id, receipt) = handle
            .publish_with_receipt("sensors/dht22/1", b"{\"t\":21}".to_vec())
            .expect("publish");
        transport.ack_raw(id, 0);

        assert_eq!(receipt.outcome().await, Some(DeliveryOutcome::Acknowledged));
        let report = handle.report();
        assert_eq!(report.total_acknowledged, 1);
        assert_eq!(report.pending_messages, 0);
        assert!(report.mqtt_connected);

        let stats = service.shutdown().await;
        assert_eq!(stats.total_published, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_pending() {
        let (transport, events) = LoopbackTransport::new();
        let service = DeliveryService::start(&config(), transport, events).expect("start");
        let (_, receipt) = service
            .handle()
            .publish_with_receipt("sensors/pir/1", b"1".to_vec())
            .expect("publish");

        let stats = service.shutdown().await;
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.total_failed, 0);
        assert_eq!(receipt.outcome().await, None);
    }
}
