// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Courier configuration.
//!
//! Supports both programmatic and file-based configuration.
//!
//! ```toml
//! [tracker]
//! qos_level = 1
//! retry_delay_seconds = 2.0
//! max_retries = 3
//!
//! [broker]
//! host = "localhost"
//! port = 1883
//! subscriptions = ["sensors/dht22/+", "devices/+/status"]
//!
//! [gateway]
//! bind = "0.0.0.0"
//! port = 8080
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::transport::QosLevel;

/// Environment variable overriding [`BrokerConfig::host`].
pub const ENV_BROKER_HOST: &str = "MQTT_BROKER_HOST";
/// Environment variable overriding [`BrokerConfig::port`].
pub const ENV_BROKER_PORT: &str = "MQTT_BROKER_PORT";
/// Environment variable overriding [`BrokerConfig::username`].
pub const ENV_USERNAME: &str = "MQTT_USERNAME";
/// Environment variable overriding [`BrokerConfig::password`].
pub const ENV_PASSWORD: &str = "MQTT_PASSWORD";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Delivery tracking parameters.
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Broker connection parameters.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Status API parameters.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl CourierConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MQTT_*` environment overrides on top of the loaded values.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.broker.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tracker.validate()?;
        self.broker.validate()?;
        if self.gateway.bind.is_empty() {
            return Err(ConfigError::Invalid("gateway.bind must not be empty".into()));
        }
        Ok(())
    }
}

/// Retry and QoS parameters of the delivery tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// QoS level used for every tracked publish. Only `1` is accepted.
    #[serde(default = "default_qos_level")]
    pub qos_level: u8,

    /// Seconds without acknowledgment before an entry becomes eligible for retry.
    /// Also the retry scheduler period.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: f64,

    /// Retries issued before an entry is declared failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_qos_level() -> u8 {
    QosLevel::AtLeastOnce as u8
}

fn default_retry_delay() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    3
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            qos_level: default_qos_level(),
            retry_delay_seconds: default_retry_delay(),
            max_retries: default_max_retries(),
        }
    }
}

impl TrackerConfig {
    /// Override the retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_seconds = delay.as_secs_f64();
        self
    }

    /// Override the retry limit.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Retry delay as a [`Duration`].
    ///
    /// Falls back to the default delay when `retry_delay_seconds` does not
    /// convert to a non-zero duration. [`validate`](Self::validate) rejects
    /// such values.
    pub fn retry_delay_duration(&self) -> Duration {
        parse_retry_delay(self.retry_delay_seconds)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_retry_delay()))
    }

    /// Validate tracker parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.qos_level != QosLevel::AtLeastOnce as u8 {
            return Err(ConfigError::Invalid(format!(
                "qos_level {} not supported, tracked delivery requires 1",
                self.qos_level
            )));
        }
        parse_retry_delay(self.retry_delay_seconds)?;
        Ok(())
    }
}

/// Retry delays must convert to a non-zero [`Duration`]; the scheduler
/// period is derived from it.
fn parse_retry_delay(seconds: f64) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(seconds) {
        Ok(delay) if !delay.is_zero() => Ok(delay),
        _ => Err(ConfigError::Invalid(format!(
            "retry_delay_seconds must be a positive duration, got {}",
            seconds
        ))),
    }
}

/// Broker connection parameters handed to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker host name.
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client identifier presented to the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Username, if the broker requires authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Password. Read from file or environment, never written back out.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Keep-alive interval (seconds).
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Topic filters to subscribe to (MQTT `+` and `#` wildcards).
    #[serde(default = "default_subscriptions")]
    pub subscriptions: Vec<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "courier-backend".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_subscriptions() -> Vec<String> {
    [
        "sensors/pir/+",
        "sensors/ultrasonic/+",
        "sensors/dht22/+",
        "sensors/combined/+",
        "wearable/fall/+",
        "wearable/accelerometer/+",
        "devices/+/status",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
            subscriptions: default_subscriptions(),
        }
    }
}

impl BrokerConfig {
    /// `host:port` string.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Apply overrides from a key lookup (environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_BROKER_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_BROKER_PORT) {
            self.port = port.parse().map_err(|_| {
                ConfigError::Invalid(format!("{} is not a valid port: {}", ENV_BROKER_PORT, port))
            })?;
        }
        if let Some(username) = lookup(ENV_USERNAME) {
            self.username = Some(username);
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.password = Some(password);
        }
        Ok(())
    }

    /// Validate broker parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("broker.host must not be empty".into()));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::Invalid(
                "broker.client_id must not be empty".into(),
            ));
        }
        for filter in &self.subscriptions {
            crate::inbound::TopicFilter::parse(filter)
                .map_err(|e| ConfigError::Invalid(format!("subscription '{}': {}", filter, e)))?;
        }
        Ok(())
    }
}

/// Status API listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// HTTP port.
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_http_port(),
        }
    }
}
