// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Status report served to operators.

use serde::Serialize;

use crate::stats::{round2, DeliveryStats};
use crate::transport::QosLevel;

/// Delivery status as exposed on the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub total_published: u64,
    pub total_acknowledged: u64,
    pub total_failed: u64,
    pub total_received: u64,
    pub total_retried: u64,
    pub pending_messages: usize,
    /// Acknowledged share of published messages, two decimals.
    pub reliability_percentage: f64,
    pub qos_level: u8,
    pub mqtt_connected: bool,
}

impl StatusReport {
    /// Build a report from a stats snapshot and the current link state.
    pub fn new(stats: &DeliveryStats, connected: bool) -> Self {
        Self {
            total_published: stats.total_published,
            total_acknowledged: stats.total_acknowledged,
            total_failed: stats.total_failed,
            total_received: stats.total_received,
            total_retried: stats.total_retried,
            pending_messages: stats.pending_count,
            reliability_percentage: round2(stats.reliability_percentage()),
            qos_level: QosLevel::AtLeastOnce.as_u8(),
            mqtt_connected: connected,
        }
    }
}
