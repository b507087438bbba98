// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP request handlers for REST API.

use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use courier::PublishError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        Self {
            code: match err {
                PublishError::EmptyTopic => 400,
                PublishError::TransportUnavailable(_) => 503,
            },
            error: err.to_string(),
        }
    }
}

/// Body of `POST /api/v1/publish`.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub topic: String,
    /// Strings are sent as-is, anything else as compact JSON.
    #[serde(default)]
    pub payload: Value,
}

impl PublishRequest {
    fn payload_bytes(&self) -> Vec<u8> {
        match &self.payload {
            Value::String(s) => s.clone().into_bytes(),
            other => other.to_string().into_bytes(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub message_id: u16,
    pub topic: String,
    pub status: &'static str,
}

/// GET /api/v1/health
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let connected = state.service.is_connected();
    let body = serde_json::json!({
        "status": if connected { "healthy" } else { "degraded" },
        "mqtt_connected": connected,
        "uptime_secs": state.started_at.elapsed().as_secs(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// GET /api/v1/status - delivery statistics
pub async fn status(State(state): State<Arc<AppState>>) -> Response {
    (StatusCode::OK, Json(state.service.report())).into_response()
}

/// POST /api/v1/publish
pub async fn publish(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PublishRequest>,
) -> Result<Response, ApiError> {
    let id = state
        .service
        .publish(&request.topic, request.payload_bytes())?;

    let body = PublishResponse {
        message_id: id.get(),
        topic: request.topic,
        status: "pending",
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

/// GET /api/v1/info - Gateway info
pub async fn info(State(state): State<Arc<AppState>>) -> Response {
    let (disconnects, reconnects) = state.service.link_transitions();
    let info = serde_json::json!({
        "name": "courier-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "mode": "mock",
        "broker": state.config.broker.address(),
        "tracker": {
            "qos_level": state.config.tracker.qos_level,
            "retry_delay_seconds": state.config.tracker.retry_delay_seconds,
            "max_retries": state.config.tracker.max_retries,
        },
        "link": {
            "disconnects": disconnects,
            "reconnects": reconnects,
        },
        "acks": {
            "malformed": state.service.malformed_acks(),
            "rejected": state.service.rejected_acks(),
        },
        "endpoints": [
            "/api/v1/health",
            "/api/v1/status",
            "/api/v1/info",
            "/api/v1/publish"
        ]
    });

    (StatusCode::OK, Json(info)).into_response()
}
