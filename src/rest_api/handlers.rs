//! HTTP handlers for the REST API

use axum::{http::StatusCode, Json};
use prometheus_client::encoding::text::encode;
use serde::Serialize;
use tracing::{error, instrument};

use crate::controller::metrics::REGISTRY;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Metrics endpoint in OpenMetrics text format
pub async fn metrics() -> Result<String, StatusCode> {
    let mut buffer = String::new();
    encode(&mut buffer, &REGISTRY).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(buffer)
}
