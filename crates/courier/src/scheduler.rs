// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Retry scheduler.
//!
//! Background task that runs [`DeliveryTracker::retry_sweep`] every
//! `retry_delay` and an immediate [`DeliveryTracker::reconnect_sweep`]
//! whenever its [`SweepTrigger`] fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::tracker::{DeliveryTracker, SweepReport};
use crate::transport::Transport;

/// Requests an out-of-band sweep.
///
/// Cloneable; firing while a sweep is already queued coalesces into one.
#[derive(Debug, Clone, Default)]
pub struct SweepTrigger {
    notify: Arc<Notify>,
}

impl SweepTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reconnect sweep.
    pub fn fire(&self) {
        self.notify.notify_one();
    }

    pub(crate) async fn fired(&self) {
        self.notify.notified().await;
    }
}

/// Spawns the periodic sweep task.
pub struct RetryScheduler;

impl RetryScheduler {
    /// Start sweeping `tracker` on the current runtime.
    ///
    /// The first periodic sweep runs one `retry_delay` after spawning.
    pub fn spawn<T>(tracker: Arc<DeliveryTracker<T>>, trigger: SweepTrigger) -> SchedulerHandle
    where
        T: Transport + 'static,
    {
        let shutdown = Arc::new(Notify::new());
        let period = tracker.retry_delay();
        let task = tokio::spawn(run_sweeps(
            tracker,
            period,
            trigger.clone(),
            Arc::clone(&shutdown),
        ));

        SchedulerHandle {
            trigger,
            shutdown,
            task,
        }
    }
}

async fn run_sweeps<T: Transport>(
    tracker: Arc<DeliveryTracker<T>>,
    period: Duration,
    trigger: SweepTrigger,
    shutdown: Arc<Notify>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!("Retry scheduler started (period {:?})", period);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.notified() => {
                debug!("Retry scheduler shutting down");
                break;
            }
            _ = ticker.tick() => {
                log_sweep("periodic", tracker.retry_sweep());
            }
            _ = trigger.fired() => {
                log_sweep("reconnect", tracker.reconnect_sweep());
            }
        }
    }
}

fn log_sweep(kind: &str, report: SweepReport) {
    if report.is_empty() {
        return;
    }
    if report.failed > 0 {
        info!(
            kind,
            retried = report.retried,
            failed = report.failed,
            deferred = report.deferred,
            "sweep completed with failures"
        );
    } else {
        debug!(
            kind,
            retried = report.retried,
            deferred = report.deferred,
            "sweep completed"
        );
    }
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    trigger: SweepTrigger,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Queue an immediate reconnect sweep.
    pub fn trigger(&self) {
        self.trigger.fire();
    }

    /// Trigger shared with connection observers.
    pub fn sweep_trigger(&self) -> SweepTrigger {
        self.trigger.clone()
    }

    /// Stop the task and wait for it to exit.
    ///
    /// A sweep already in progress completes first.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            tracing::warn!("Retry scheduler task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::loopback::LoopbackTransport;

    const DELAY: Duration = Duration::from_secs(2);

    fn tracker() -> Arc<DeliveryTracker<Arc<LoopbackTransport>>> {
        let (transport, _events) = LoopbackTransport::new();
        let config = TrackerConfig::default().retry_delay(DELAY);
        Arc::new(DeliveryTracker::new(Arc::new(transport), &config))
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweep_retries_and_fails() {
        let tracker = tracker();
        tracker.publish("sensors/pir/1", b"1".to_vec()).expect("publish");
        let handle = RetryScheduler::spawn(Arc::clone(&tracker), SweepTrigger::new());

        time::sleep(DELAY + Duration::from_millis(10)).await;
        assert_eq!(tracker.snapshot().total_retried, 1);

        time::sleep(DELAY * 3).await;
        let stats = tracker.snapshot();
        assert_eq!(stats.total_retried, 3);
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.pending_count, 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_runs_reconnect_sweep_immediately() {
        let tracker = tracker();
        tracker.publish("sensors/pir/1", b"1".to_vec()).expect("publish");
        let handle = RetryScheduler::spawn(Arc::clone(&tracker), SweepTrigger::new());

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(tracker.snapshot().total_retried, 0);

        handle.trigger();
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(tracker.snapshot().total_retried, 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sweeping() {
        let tracker = tracker();
        let handle = RetryScheduler::spawn(Arc::clone(&tracker), SweepTrigger::new());
        handle.shutdown().await;

        tracker.publish("sensors/pir/1", b"1".to_vec()).expect("publish");
        time::sleep(DELAY * 3).await;
        assert_eq!(tracker.snapshot().total_retried, 0);
        assert_eq!(tracker.pending_count(), 1);
    }
}
