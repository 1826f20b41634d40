//! WebAPI - HTTP endpoints
//!
//! ## Responsibilities
//!
//! - Route table
//! - Health and status reporting
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let online = state.status.online_count().await;

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_sec": (Utc::now() - state.started_at).num_seconds(),
        "cameras_online": online,
        "cameras_total": state.geometry.camera_count,
        "snapshot_enabled": state.snapshot.is_some(),
    }))
}

/// Per-camera connection status
pub async fn camera_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.status.all_statuses().await)
}
