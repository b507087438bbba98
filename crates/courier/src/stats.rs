// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery statistics.
//!
//! Counters live inside the tracker's lock next to the pending table, so a
//! snapshot is always consistent with the table size it reports.

use serde::Serialize;

/// Monotonic delivery counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DeliveryCounters {
    pub published: u64,
    pub acknowledged: u64,
    pub received: u64,
    pub failed: u64,
    pub retried: u64,
}

impl DeliveryCounters {
    pub(crate) fn snapshot(&self, pending_count: usize) -> DeliveryStats {
        DeliveryStats {
            total_published: self.published,
            total_acknowledged: self.acknowledged,
            total_received: self.received,
            total_failed: self.failed,
            total_retried: self.retried,
            pending_count,
        }
    }
}

/// Point-in-time copy of the delivery counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    /// Successful publish calls.
    pub total_published: u64,
    /// Messages resolved by a broker acknowledgment.
    pub total_acknowledged: u64,
    /// Inbound messages on subscribed topics.
    pub total_received: u64,
    /// Messages given up on after exhausting retries.
    pub total_failed: u64,
    /// Successful re-dispatches.
    pub total_retried: u64,
    /// Entries still awaiting acknowledgment.
    pub pending_count: usize,
}

impl DeliveryStats {
    /// Acknowledged share of published messages, in percent.
    ///
    /// `100.0` when nothing has been published yet.
    pub fn reliability_percentage(&self) -> f64 {
        if self.total_published == 0 {
            return 100.0;
        }
        self.total_acknowledged as f64 / self.total_published as f64 * 100.0
    }

    /// Messages that reached a terminal state.
    pub fn total_resolved(&self) -> u64 {
        self.total_acknowledged + self.total_failed
    }

    /// Format stats as a one-line summary.
    pub fn format_summary(&self) -> String {
        format!(
            "published={} acked={} failed={} retried={} pending={} received={} reliability={:.2}%",
            self.total_published,
            self.total_acknowledged,
            self.total_failed,
            self.total_retried,
            self.pending_count,
            self.total_received,
            self.reliability_percentage()
        )
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliability_with_nothing_published() {
        let stats = DeliveryStats::default();
        assert_eq!(stats.reliability_percentage(), 100.0);
    }

    #[test]
    fn test_reliability_ratio() {
        let stats = DeliveryStats {
            total_published: 10,
            total_acknowledged: 8,
            ..Default::default()
        };
        assert_eq!(round2(stats.reliability_percentage()), 80.0);
    }

    #[test]
    fn test_reliability_rounding() {
        let stats = DeliveryStats {
            total_published: 3,
            total_acknowledged: 2,
            ..Default::default()
        };
        assert_eq!(round2(stats.reliability_percentage()), 66.67);

        let stats = DeliveryStats {
            total_published: 3,
            total_acknowledged: 1,
            ..Default::default()
        };
        assert_eq!(round2(stats.reliability_percentage()), 33.33);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = DeliveryCounters {
            published: 5,
            acknowledged: 3,
            received: 9,
            failed: 1,
            retried: 4,
        };
        let stats = counters.snapshot(1);
        assert_eq!(stats.total_published, 5);
        assert_eq!(stats.total_resolved(), 4);
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.total_received, 9);
    }

    #[test]
    fn test_format_summary() {
        let stats = DeliveryStats {
            total_published: 4,
            total_acknowledged: 3,
            ..Default::default()
        };
        assert!(stats.format_summary().contains("reliability=75.00%"));
    }
}
