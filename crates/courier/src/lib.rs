// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Courier Reliable Delivery Tracker
//!
//! At-least-once delivery on top of a QoS 1 publish/subscribe client, for
//! sensor nodes reporting to a backend aggregator.
//!
//! # Features
//!
//! - **Pending Tracking**: Every publish is held until the broker acknowledges it
//! - **Bounded Retries**: Unacknowledged messages are re-dispatched up to `max_retries` times
//! - **Reconnect Recovery**: A link recovery triggers an immediate sweep
//! - **Delivery Statistics**: Counters and a reliability percentage for operators
//!
//! # Quick Start
//!
//! ```no_run
//! use courier::{CourierConfig, DeliveryService, LoopbackTransport};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (transport, events) = LoopbackTransport::new();
//! let service = DeliveryService::start(&CourierConfig::default(), transport, events)?;
//!
//! let handle = service.handle();
//! let id = handle.publish("sensors/dht22/kitchen", br#"{"temperature":21.5}"#.to_vec())?;
//! println!("published {} ({}% reliable)", id, handle.report().reliability_percentage);
//!
//! let stats = service.shutdown().await;
//! println!("{}", stats.format_summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! [tracker]
//! retry_delay_seconds = 2.0
//! max_retries = 3
//!
//! [broker]
//! host = "localhost"
//! port = 1883
//! subscriptions = ["sensors/pir/+", "devices/+/status"]
//! ```

pub mod ack;
pub mod config;
pub mod error;
pub mod events;
pub mod inbound;
pub mod loopback;
pub mod monitor;
pub mod pending;
pub mod report;
pub mod scheduler;
pub mod service;
pub mod stats;
pub mod tracker;
pub mod transport;

pub use ack::{decode_puback, encode_puback, PubAck};
pub use config::{BrokerConfig, ConfigError, CourierConfig, GatewayConfig, TrackerConfig};
pub use error::{AckDecodeError, PublishError, ServiceError, TransportError};
pub use events::EventRouter;
pub use inbound::{FilterError, InboundMessage, TopicFilter};
pub use loopback::{Dispatched, LoopbackTransport};
pub use monitor::ConnectionMonitor;
pub use pending::{DeliveryState, PendingMessage};
pub use report::StatusReport;
pub use scheduler::{RetryScheduler, SchedulerHandle, SweepTrigger};
pub use service::{DeliveryService, ServiceHandle};
pub use stats::DeliveryStats;
pub use tracker::{
    DeliveryOutcome, DeliveryReceipt, DeliveryTracker, InboundHandler, SweepMode, SweepReport,
};
pub use transport::{
    AckObserver, ConnectionObserver, ConnectionState, InboundObserver, MessageId, QosLevel,
    Transport, TransportEvent,
};
