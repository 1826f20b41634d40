//! SnapshotService - on-demand still capture backed by a warm cache
//!
//! ## Responsibilities
//!
//! - Continuously refresh one decoded frame from the designated snapshot
//!   camera, so a request never waits for a full reconnect/decode cycle
//! - On demand: bounded-wait read of the cache, JPEG encode, upload through
//!   the ObjectStorage capability, return the public URL
//!
//! The refresher retries indefinitely with the same backoff policy as any
//! camera source; its failures never reach a caller. Request failures
//! (timeout, encode, upload) are surfaced to the caller.

use crate::error::{Error, Result};
use crate::frame_source::{FrameSource, SourcePolicy};
use crate::mailbox;
use crate::mjpeg;
use crate::storage::{object_url, ObjectStorage};
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Bounded wait for a cached frame before a request fails.
pub const SNAPSHOT_WAIT: Duration = Duration::from_secs(10);

/// Continuously refreshed single-slot cache of the snapshot camera's most
/// recent frame. One writer (the refresher), any number of concurrent
/// readers.
pub struct SnapshotCache {
    slot: watch::Receiver<Option<Arc<RgbImage>>>,
}

impl SnapshotCache {
    /// Spawn the refresher tasks for the camera at `url` and return the
    /// cache handle.
    pub fn spawn(
        url: String,
        client: reqwest::Client,
        policy: SourcePolicy,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<()>,
    ) -> Self {
        let (slot_tx, slot_rx) = watch::channel(None);
        let (frame_tx, mut frame_rx) = mailbox::mailbox();

        // no placeholder frames here: a blank image must never be served as
        // a snapshot
        let source = FrameSource::new(0, url, client, policy);
        tasks.spawn(source.run(frame_tx, cancel.child_token()));

        let refresher_cancel = cancel.child_token();
        tasks.spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = refresher_cancel.cancelled() => break,
                    next = frame_rx.recv() => match next {
                        Some(frame) => frame,
                        None => break,
                    },
                };

                if slot_tx.send(Some(Arc::new(frame))).is_err() {
                    break;
                }
            }
            tracing::debug!("Snapshot cache refresher stopped");
        });

        Self { slot: slot_rx }
    }

    /// Build a cache over an existing slot (tests).
    pub fn from_slot(slot: watch::Receiver<Option<Arc<RgbImage>>>) -> Self {
        Self { slot }
    }

    /// Wait up to `wait` for a populated cache slot.
    pub async fn wait_for_frame(&self, wait: Duration) -> Result<Arc<RgbImage>> {
        let mut rx = self.slot.clone();

        timeout(wait, async move {
            loop {
                if let Some(frame) = rx.borrow_and_update().clone() {
                    return Ok(frame);
                }
                if rx.changed().await.is_err() {
                    return Err(Error::Internal(
                        "snapshot refresher stopped".to_string(),
                    ));
                }
            }
        })
        .await
        .map_err(|_| Error::Timeout(format!("no snapshot frame within {}s", wait.as_secs())))?
    }
}

/// On-demand snapshot endpoint logic: cached frame -> JPEG -> storage ->
/// public URL.
pub struct SnapshotService {
    cache: SnapshotCache,
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    domain: String,
}

impl SnapshotService {
    pub fn new(
        cache: SnapshotCache,
        storage: Arc<dyn ObjectStorage>,
        bucket: String,
        domain: String,
    ) -> Self {
        Self {
            cache,
            storage,
            bucket,
            domain,
        }
    }

    /// Capture the latest cached frame, upload it, and return its public
    /// URL.
    pub async fn serve_snapshot(&self) -> Result<String> {
        let frame = self.cache.wait_for_frame(SNAPSHOT_WAIT).await?;
        let jpeg = mjpeg::encode_jpeg(&frame, mjpeg::JPEG_QUALITY)?;

        let path = Self::object_path();
        let written = self
            .storage
            .put(&self.bucket, &path, jpeg, "image/jpeg")
            .await?;

        let url = object_url(&self.bucket, &self.domain, &path);
        tracing::info!(url = %url, bytes = written, "Snapshot uploaded");
        Ok(url)
    }

    /// `snapshots/<random id with separators>/snapshot.jpg`
    fn object_path() -> String {
        let id = Uuid::new_v4().to_string().replace('-', "/");
        format!("snapshots/{id}/snapshot.jpg")
    }
}
