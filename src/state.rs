//! Application state
//!
//! Configuration constructed once at startup plus the shared handles axum
//! handlers work against.

use crate::camera_status_tracker::CameraStatusTracker;
use crate::error::{Error, Result};
use crate::geometry::MosaicGeometry;
use crate::mjpeg::MjpegBroadcaster;
use crate::snapshot_service::SnapshotService;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Application configuration, immutable after startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Width of the source/main image
    pub width: u32,
    /// Height of the source/main image
    pub height: u32,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Camera stream URLs, one mosaic output stream each
    pub camera_urls: Vec<String>,
    /// Camera to take snapshots from (snapshot feature disabled when unset)
    pub snapshot_cam_url: Option<String>,
    /// Object storage endpoint (required when the snapshot camera is set)
    pub storage_endpoint: Option<String>,
    /// Object storage bucket
    pub storage_bucket: String,
    /// Public domain for uploaded snapshot URLs
    pub storage_domain: String,
}

impl AppConfig {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            width: env_parsed("WIDTH", 1296),
            height: env_parsed("HEIGHT", 768),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parsed("PORT", 8888),
            camera_urls: std::env::var("CAMERA_URLS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            snapshot_cam_url: std::env::var("SNAPSHOT_CAM_URL").ok(),
            storage_endpoint: std::env::var("STORAGE_ENDPOINT").ok(),
            storage_bucket: std::env::var("STORAGE_BUCKET")
                .unwrap_or_else(|_| "public".to_string()),
            storage_domain: std::env::var("STORAGE_DOMAIN")
                .unwrap_or_else(|_| "example.com".to_string()),
        }
    }

    /// Startup validation. Any failure here aborts the process.
    pub fn validate(&self) -> Result<()> {
        if self.camera_urls.len() < 2 {
            return Err(Error::Config(
                "there must be at least two camera stream urls".to_string(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(
                "canvas width and height must be non-zero".to_string(),
            ));
        }
        if self.snapshot_cam_url.is_some() && self.storage_endpoint.is_none() {
            return Err(Error::Config(
                "SNAPSHOT_CAM_URL is set but STORAGE_ENDPOINT is missing".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: Arc<AppConfig>,
    /// Mosaic canvas geometry
    pub geometry: MosaicGeometry,
    /// Per-camera connection status
    pub status: Arc<CameraStatusTracker>,
    /// One published MJPEG stream per camera-as-main, by index
    pub outputs: Arc<Vec<Arc<MjpegBroadcaster>>>,
    /// SnapshotService, present when a snapshot camera is configured
    pub snapshot: Option<Arc<SnapshotService>>,
    /// Process start time, for uptime reporting
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            width: 1296,
            height: 768,
            host: "0.0.0.0".to_string(),
            port: 8888,
            camera_urls: vec![
                "http://cam0/stream".to_string(),
                "http://cam1/stream".to_string(),
            ],
            snapshot_cam_url: None,
            storage_endpoint: None,
            storage_bucket: "public".to_string(),
            storage_domain: "example.com".to_string(),
        }
    }

    #[test]
    fn test_validate_accepts_two_cameras() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_single_camera() {
        let mut config = base_config();
        config.camera_urls.truncate(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_snapshot_without_storage() {
        let mut config = base_config();
        config.snapshot_cam_url = Some("http://cam2/stream".to_string());
        assert!(config.validate().is_err());

        config.storage_endpoint = Some("http://minio:9000".to_string());
        assert!(config.validate().is_ok());
    }
}
