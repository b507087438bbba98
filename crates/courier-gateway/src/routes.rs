// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route definitions for the REST API.

use crate::handlers;
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/status", get(handlers::status))
        .route("/api/v1/info", get(handlers::info))
        .route("/api/v1/publish", post(handlers::publish))
        // Legacy route (compatibility with existing health probes)
        .route("/health", get(handlers::health))
}
