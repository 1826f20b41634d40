//! Mosaic Camserver
//!
//! Main entry point: configuration, component wiring, supervised task
//! spawning, HTTP serving, graceful shutdown.

use mosaic_camserver::{
    camera_pipeline::{CameraPipeline, CameraSlot},
    camera_status_tracker::CameraStatusTracker,
    frame_source::SourcePolicy,
    geometry::MosaicGeometry,
    mjpeg::MjpegBroadcaster,
    mosaic::MosaicCompositor,
    snapshot_service::{SnapshotCache, SnapshotService},
    state::{AppConfig, AppState},
    storage::HttpObjectStorage,
    web_api,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mosaic_camserver=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting mosaic camserver v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; fewer than two cameras is fatal
    let config = AppConfig::from_env();
    config.validate()?;
    tracing::info!(
        width = config.width,
        height = config.height,
        cameras = config.camera_urls.len(),
        urls = ?config.camera_urls,
        "Configuration loaded"
    );

    let geometry = MosaicGeometry::new(config.width, config.height, config.camera_urls.len());
    tracing::info!(
        thumb_width = geometry.thumb_width,
        thumb_height = geometry.thumb_height,
        total_height = geometry.total_height,
        "Geometry computed"
    );

    let status = Arc::new(CameraStatusTracker::new(config.camera_urls.clone()));

    // Streaming HTTP client: connect timeout only. Read has no client-side
    // deadline; stalled streams are handled by the source's watchdog.
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    // Every long-lived task lives in this set and observes a child of the
    // root cancellation token.
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    let outputs: Vec<Arc<MjpegBroadcaster>> = (0..config.camera_urls.len())
        .map(|_| Arc::new(MjpegBroadcaster::new(4)))
        .collect();

    let slots: Vec<CameraSlot> = config
        .camera_urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            CameraPipeline::spawn(
                i,
                url.clone(),
                geometry,
                client.clone(),
                SourcePolicy::default(),
                status.clone(),
                &cancel,
                &mut tasks,
            )
        })
        .collect();
    tracing::info!(cameras = slots.len(), "Camera pipelines started");

    let compositor = MosaicCompositor::new(geometry, slots, outputs.clone());
    tasks.spawn(compositor.run(cancel.child_token()));
    tracing::info!("Mosaic compositor started");

    let snapshot = match (&config.snapshot_cam_url, &config.storage_endpoint) {
        (Some(cam_url), Some(endpoint)) => {
            let cache = SnapshotCache::spawn(
                cam_url.clone(),
                client.clone(),
                SourcePolicy::default(),
                &cancel,
                &mut tasks,
            );
            let storage = Arc::new(HttpObjectStorage::new(endpoint.clone()));
            tracing::info!(camera = %cam_url, endpoint = %endpoint, "Snapshot service started");
            Some(Arc::new(SnapshotService::new(
                cache,
                storage,
                config.storage_bucket.clone(),
                config.storage_domain.clone(),
            )))
        }
        _ => {
            tracing::info!("Snapshot service disabled (SNAPSHOT_CAM_URL not set)");
            None
        }
    };

    let state = AppState {
        config: Arc::new(config),
        geometry,
        status,
        outputs: Arc::new(outputs),
        snapshot,
        started_at: Utc::now(),
    };

    let app = web_api::create_router(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop every camera, compositor, and snapshot task and wait for clean
    // exit before returning.
    cancel.cancel();
    while tasks.join_next().await.is_some() {}
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
