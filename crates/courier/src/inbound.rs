// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound message handling.
//!
//! Subscription filters follow MQTT wildcard rules (`+` matches one level,
//! `#` matches the remainder and must be last). Inbound payloads are decoded
//! into JSON objects for downstream handlers; anything that is not a JSON
//! object is wrapped as `{"value": .., "raw": ..}`.

use std::fmt;
use std::time::SystemTime;

use serde_json::{Map, Value};
use thiserror::Error;

/// Filter parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("filter is empty")]
    Empty,

    #[error("'#' must be the last level and occupy it alone")]
    MisplacedMultiLevel,

    #[error("'+' must occupy a whole level")]
    MisplacedSingleLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Level {
    Exact(String),
    Single,
    Multi,
}

/// Parsed MQTT topic filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    raw: String,
    levels: Vec<Level>,
}

impl TopicFilter {
    /// Parse and validate a filter.
    pub fn parse(filter: &str) -> Result<Self, FilterError> {
        if filter.is_empty() {
            return Err(FilterError::Empty);
        }

        let parts: Vec<&str> = filter.split('/').collect();
        let mut levels = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let level = match *part {
                "#" if i + 1 == parts.len() => Level::Multi,
                "#" => return Err(FilterError::MisplacedMultiLevel),
                "+" => Level::Single,
                p if p.contains('#') => return Err(FilterError::MisplacedMultiLevel),
                p if p.contains('+') => return Err(FilterError::MisplacedSingleLevel),
                p => Level::Exact(p.to_string()),
            };
            levels.push(level);
        }

        Ok(Self {
            raw: filter.to_string(),
            levels,
        })
    }

    /// Filter text as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check whether a concrete topic name matches.
    pub fn matches(&self, topic: &str) -> bool {
        // Wildcards never match system topics at the first level.
        if topic.starts_with('$') && !matches!(self.levels.first(), Some(Level::Exact(_))) {
            return false;
        }

        let mut topic_levels = topic.split('/');
        for level in &self.levels {
            match level {
                Level::Multi => return true,
                Level::Single => {
                    if topic_levels.next().is_none() {
                        return false;
                    }
                }
                Level::Exact(expected) => match topic_levels.next() {
                    Some(actual) if actual == expected => {}
                    _ => return false,
                },
            }
        }
        topic_levels.next().is_none()
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse a list of filters, failing on the first invalid one.
pub fn parse_filters<S: AsRef<str>>(filters: &[S]) -> Result<Vec<TopicFilter>, FilterError> {
    filters.iter().map(|f| TopicFilter::parse(f.as_ref())).collect()
}

/// Decoded inbound message handed to inbound handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// JSON object body, with a `topic` key added.
    pub body: Value,
    /// Local receive time.
    pub received_at: SystemTime,
}

impl InboundMessage {
    /// Decode a raw payload.
    pub fn decode(topic: &str, payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        let mut object = match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map,
            Ok(other) => wrap_value(other),
            Err(_) => wrap_value(Value::String(text.into_owned())),
        };
        object.insert("topic".to_string(), Value::String(topic.to_string()));

        Self {
            topic: topic.to_string(),
            body: Value::Object(object),
            received_at: SystemTime::now(),
        }
    }

    /// String field from the body, if present.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }
}

fn wrap_value(value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("value".to_string(), value.clone());
    map.insert("raw".to_string(), value);
    map
}
