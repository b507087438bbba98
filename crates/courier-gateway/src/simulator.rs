// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulated broker and sensor nodes for `--mock` mode.
//!
//! Three tasks share the loopback transport:
//!
//! - **broker**: drains accepted dispatches, acknowledges them with a
//!   configurable loss rate, and echoes them to matching subscriptions
//! - **link**: drops the broker link for a few seconds at a fixed interval
//! - **sensors**: publishes synthetic readings through the delivery tracker

use courier::{LoopbackTransport, ServiceHandle, Transport};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const SENSOR_NODES: &[&str] = &["ESP8266_NODE_01", "ESP8266_NODE_02", "ESP8266_NODE_03"];

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that the broker never acknowledges a dispatch
    pub ack_loss: f64,
    /// How often the broker drains the dispatch log
    pub broker_tick: Duration,
    /// Synthetic reading interval (zero disables the sensors)
    pub publish_interval: Duration,
    /// Interval between link drops (zero disables flapping)
    pub flap_interval: Duration,
    /// How long the link stays down
    pub outage: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ack_loss: 0.1,
            broker_tick: Duration::from_millis(50),
            publish_interval: Duration::from_millis(500),
            flap_interval: Duration::from_secs(30),
            outage: Duration::from_secs(3),
        }
    }
}

/// Running simulation tasks
pub struct Simulator {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Simulator {
    /// Start the simulation tasks on the current runtime.
    pub fn spawn(
        transport: Arc<LoopbackTransport>,
        service: ServiceHandle<Arc<dyn Transport>>,
        config: SimulatorConfig,
    ) -> Self {
        let (shutdown, stop) = watch::channel(false);
        let mut tasks = vec![tokio::spawn(run_broker(
            Arc::clone(&transport),
            config.clone(),
            stop.clone(),
        ))];

        if !config.flap_interval.is_zero() {
            tasks.push(tokio::spawn(run_link_flaps(
                Arc::clone(&transport),
                config.flap_interval,
                config.outage,
                stop.clone(),
            )));
        }
        if !config.publish_interval.is_zero() {
            tasks.push(tokio::spawn(run_sensors(
                service,
                config.publish_interval,
                stop,
            )));
        }

        info!("Simulator started with {} tasks", tasks.len());
        Self { shutdown, tasks }
    }

    /// Stop every task and wait for them to exit.
    pub async fn shutdown(self) {
        // Receivers observe the change even if they were busy when it was sent.
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Simulator task ended abnormally: {}", e);
            }
        }
    }
}

async fn run_broker(
    transport: Arc<LoopbackTransport>,
    config: SimulatorConfig,
    mut stop: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(config.broker_tick);
    let mut dropped = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for dispatched in transport.take_dispatched() {
                    transport.inject_inbound(&dispatched.topic, dispatched.payload);

                    if fastrand::f64() < config.ack_loss {
                        dropped += 1;
                        debug!(
                            message_id = %dispatched.id,
                            "simulated broker dropped acknowledgment"
                        );
                        continue;
                    }
                    // Alternate between decoded and raw acknowledgments.
                    if dispatched.id.get() % 2 == 0 {
                        transport.ack(dispatched.id);
                    } else {
                        transport.ack_raw(dispatched.id, courier::ack::REASON_SUCCESS);
                    }
                }
            }
            _ = stop.changed() => {
                debug!("Simulated broker shutting down ({} acknowledgments dropped)", dropped);
                break;
            }
        }
    }
}

async fn run_link_flaps(
    transport: Arc<LoopbackTransport>,
    every: Duration,
    outage: Duration,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(every) => {
                info!("Simulating broker outage for {:?}", outage);
                transport.set_connected(false);
                tokio::select! {
                    _ = tokio::time::sleep(outage) => {}
                    _ = stop.changed() => {
                        transport.set_connected(true);
                        break;
                    }
                }
                transport.set_connected(true);
            }
            _ = stop.changed() => break,
        }
    }
}

async fn run_sensors(
    service: ServiceHandle<Arc<dyn Transport>>,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let node = SENSOR_NODES[(sequence as usize) % SENSOR_NODES.len()];
                let (topic, payload) = synthetic_reading(node, sequence);
                sequence += 1;

                if let Err(e) = service.publish(&topic, payload.to_string()) {
                    debug!(topic = %topic, "synthetic reading not published: {}", e);
                }
            }
            _ = stop.changed() => break,
        }
    }
}

/// Reading in the shape the sensor firmware reports.
fn synthetic_reading(node: &str, sequence: u64) -> (String, serde_json::Value) {
    match sequence % 3 {
        0 => (
            format!("sensors/dht22/{}", node),
            json!({
                "device_id": node,
                "temperature": round1(18.0 + fastrand::f64() * 8.0),
                "humidity": round1(35.0 + fastrand::f64() * 25.0),
            }),
        ),
        1 => (
            format!("sensors/pir/{}", node),
            json!({
                "device_id": node,
                "motion_detected": fastrand::bool(),
            }),
        ),
        _ => (
            format!("sensors/ultrasonic/{}", node),
            json!({
                "device_id": node,
                "distance_cm": round1(20.0 + fastrand::f64() * 280.0),
            }),
        ),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
