use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Service name reported by the health endpoint
pub const SERVICE_NAME: &str = "marker-api";

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub torch_device: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub endpoints: BTreeMap<String, String>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        torch_device: state.config.torch_device.clone(),
        timestamp: Utc::now(),
    })
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service descriptor", body = ServiceInfo)
    ),
    tag = "system"
)]
pub async fn service_info() -> impl IntoResponse {
    let endpoints = BTreeMap::from([
        ("/convert".to_string(), "POST - Convert PDF to Markdown".to_string()),
        ("/health".to_string(), "GET - Health check".to_string()),
        ("/cleanup".to_string(), "GET - Remove stale staged uploads".to_string()),
    ]);

    Json(ServiceInfo {
        message: "Marker PDF to Markdown API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
    })
}
