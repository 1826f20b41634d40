//! API Routes

use axum::{
    extract::{Path, State},
    response::{Html, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::camera_status))
        .route("/", get(index_page))
        .route("/image/:index", get(stream_mosaic))
        .route("/snapshot", get(serve_snapshot))
        .with_state(state)
}

/// Subscribe the client to the mosaic stream for camera `index`.
async fn stream_mosaic(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Response> {
    let output = state
        .outputs
        .get(index)
        .ok_or_else(|| Error::NotFound(format!("no stream {}", index)))?;

    Ok(output.subscribe().into_response())
}

#[derive(Debug, Serialize)]
struct SnapshotResponse {
    url: String,
}

/// Take a snapshot, upload it, and answer with its public URL.
async fn serve_snapshot(State(state): State<AppState>) -> Result<Json<SnapshotResponse>> {
    let service = state
        .snapshot
        .as_ref()
        .ok_or_else(|| Error::NotFound("snapshot camera not configured".to_string()))?;

    let url = service.serve_snapshot().await?;
    Ok(Json(SnapshotResponse { url }))
}

/// Index page: the first mosaic stream with a clickable image map switching
/// the main view by thumbnail.
async fn index_page(State(state): State<AppState>) -> Html<String> {
    let geo = state.geometry;

    let mut areas = String::new();
    for i in 0..geo.camera_count {
        let rect = geo.thumbnail_rect(i);
        areas.push_str(&format!(
            "      <area shape=\"rect\" coords=\"{},{},{},{}\" href=\"/image/{}\" alt=\"camera {}\">\n",
            rect.x,
            rect.y,
            rect.x + rect.width,
            rect.y + rect.height,
            i,
            i
        ));
    }

    Html(format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><title>Camera Mosaic</title></head>\n\
         <body style=\"margin:0;background:#000\">\n\
           <img src=\"/image/0\" width=\"{}\" height=\"{}\" usemap=\"#cameras\" alt=\"mosaic\">\n\
           <map name=\"cameras\">\n{}      </map>\n\
         </body>\n\
         </html>\n",
        geo.width, geo.total_height, areas
    ))
}
