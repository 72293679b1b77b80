use crate::AppState;
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CleanupResponse {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Run one sweep now. Removal failures are logged, never reported.
#[utoipa::path(
    get,
    path = "/cleanup",
    responses(
        (status = 200, description = "Sweep finished", body = CleanupResponse)
    ),
    tag = "system"
)]
pub async fn manual_cleanup(State(state): State<AppState>) -> Json<CleanupResponse> {
    let report = state.cleanup.sweep().await;
    tracing::info!(
        scanned = report.scanned,
        removed = report.removed,
        failed = report.failed,
        "Manual cleanup triggered"
    );

    Json(CleanupResponse {
        message: "Cleanup completed".to_string(),
        timestamp: Utc::now(),
    })
}
