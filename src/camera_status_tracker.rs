//! Camera Status Tracker
//!
//! Tracks per-camera connection status changes to detect lost/recovered
//! events. Only transitions are logged to avoid spamming the log while a
//! camera stays down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Camera connection status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraConnectionStatus {
    /// Initial state (never connected)
    Unknown,
    /// Camera is online and producing frames
    Online,
    /// Camera is offline or not responding
    Offline,
}

/// Camera status transition event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraStatusEvent {
    /// Camera went from Online to Offline
    Lost,
    /// Camera went from Offline to Online
    Recovered,
}

/// Per-camera status snapshot for the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStatus {
    pub camera: usize,
    pub url: String,
    pub connection: CameraConnectionStatus,
    pub changed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct TrackerEntry {
    connection: CameraConnectionStatus,
    changed_at: Option<DateTime<Utc>>,
}

/// Tracks camera connection status and detects transitions
pub struct CameraStatusTracker {
    /// Camera URLs by index, fixed at startup
    urls: Vec<String>,
    /// Current status of each camera (index -> entry)
    statuses: RwLock<HashMap<usize, TrackerEntry>>,
}

impl CameraStatusTracker {
    /// Create a tracker for the configured cameras.
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            statuses: RwLock::new(HashMap::new()),
        }
    }

    /// Update camera status and return the transition event if any.
    ///
    /// Returns:
    /// - `Some(Lost)` when the camera goes Online -> Offline, or its very
    ///   first report is Offline
    /// - `Some(Recovered)` when the camera goes Offline -> Online
    /// - `None` otherwise
    pub async fn update_status(&self, camera: usize, is_online: bool) -> Option<CameraStatusEvent> {
        let mut statuses = self.statuses.write().await;
        let prev = statuses
            .get(&camera)
            .map(|e| e.connection.clone())
            .unwrap_or(CameraConnectionStatus::Unknown);

        let new_status = if is_online {
            CameraConnectionStatus::Online
        } else {
            CameraConnectionStatus::Offline
        };

        let event = match (&prev, &new_status) {
            (CameraConnectionStatus::Online, CameraConnectionStatus::Offline) => {
                tracing::warn!(camera = camera, url = %self.url(camera), "Camera connection lost");
                Some(CameraStatusEvent::Lost)
            }
            (CameraConnectionStatus::Offline, CameraConnectionStatus::Online) => {
                tracing::info!(camera = camera, url = %self.url(camera), "Camera connection recovered");
                Some(CameraStatusEvent::Recovered)
            }
            (CameraConnectionStatus::Unknown, CameraConnectionStatus::Offline) => {
                tracing::warn!(camera = camera, url = %self.url(camera), "Camera first connect failed - marking as lost");
                Some(CameraStatusEvent::Lost)
            }
            _ => None,
        };

        let changed = prev != new_status;
        let entry = statuses.entry(camera).or_insert(TrackerEntry {
            connection: CameraConnectionStatus::Unknown,
            changed_at: None,
        });
        entry.connection = new_status;
        if changed {
            entry.changed_at = Some(Utc::now());
        }

        event
    }

    /// Get current status for a camera.
    pub async fn get_status(&self, camera: usize) -> CameraConnectionStatus {
        self.statuses
            .read()
            .await
            .get(&camera)
            .map(|e| e.connection.clone())
            .unwrap_or(CameraConnectionStatus::Unknown)
    }

    /// Snapshot of every configured camera's status, ordered by index.
    pub async fn all_statuses(&self) -> Vec<CameraStatus> {
        let statuses = self.statuses.read().await;
        self.urls
            .iter()
            .enumerate()
            .map(|(i, url)| {
                let entry = statuses.get(&i);
                CameraStatus {
                    camera: i,
                    url: url.clone(),
                    connection: entry
                        .map(|e| e.connection.clone())
                        .unwrap_or(CameraConnectionStatus::Unknown),
                    changed_at: entry.and_then(|e| e.changed_at),
                }
            })
            .collect()
    }

    /// Number of cameras currently online.
    pub async fn online_count(&self) -> usize {
        self.statuses
            .read()
            .await
            .values()
            .filter(|e| e.connection == CameraConnectionStatus::Online)
            .count()
    }

    fn url(&self, camera: usize) -> &str {
        self.urls.get(camera).map(String::as_str).unwrap_or("?")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> CameraStatusTracker {
        CameraStatusTracker::new(vec![
            "http://cam0/stream".to_string(),
            "http://cam1/stream".to_string(),
        ])
    }

    #[tokio::test]
    async fn test_initial_online_no_event() {
        let t = tracker();
        assert!(t.update_status(0, true).await.is_none());
    }

    #[tokio::test]
    async fn test_initial_offline_triggers_lost() {
        let t = tracker();
        assert_eq!(t.update_status(0, false).await, Some(CameraStatusEvent::Lost));
    }

    #[tokio::test]
    async fn test_online_to_offline_triggers_lost() {
        let t = tracker();
        t.update_status(0, true).await;
        assert_eq!(t.update_status(0, false).await, Some(CameraStatusEvent::Lost));
    }

    #[tokio::test]
    async fn test_offline_to_online_triggers_recovered() {
        let t = tracker();
        t.update_status(0, false).await;
        assert_eq!(
            t.update_status(0, true).await,
            Some(CameraStatusEvent::Recovered)
        );
    }

    #[tokio::test]
    async fn test_repeated_status_no_event() {
        let t = tracker();
        t.update_status(0, false).await;
        assert!(t.update_status(0, false).await.is_none());
        t.update_status(0, true).await;
        assert!(t.update_status(0, true).await.is_none());
    }

    #[tokio::test]
    async fn test_cameras_tracked_independently() {
        let t = tracker();
        t.update_status(0, true).await;
        t.update_status(1, false).await;
        assert_eq!(t.get_status(0).await, CameraConnectionStatus::Online);
        assert_eq!(t.get_status(1).await, CameraConnectionStatus::Offline);
        assert_eq!(t.online_count().await, 1);

        let all = t.all_statuses().await;
        assert_eq!(all.len(), 2);
        assert!(all[0].changed_at.is_some());
    }
}
