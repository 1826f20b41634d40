//! CameraPipeline - per-camera ingestion and scaling
//!
//! ## Responsibilities
//!
//! - Own one FrameSource per camera
//! - Scale each accepted raw frame to thumbnail size
//! - Publish the latest `(raw, thumbnail)` pair into the camera's slot
//!
//! The pipeline runs independently of the compositor's tick; the compositor
//! only ever reads the latest slot value and never blocks on a pipeline.

use crate::camera_status_tracker::CameraStatusTracker;
use crate::frame_source::{FrameSource, SourcePolicy};
use crate::geometry::MosaicGeometry;
use crate::mailbox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Latest completed frame pair for one camera.
#[derive(Clone)]
pub struct ProcessedFrames {
    pub raw: Arc<RgbImage>,
    pub thumbnail: Arc<RgbImage>,
}

/// Single-value cell holding the most recent pair; `None` while the camera
/// has produced nothing yet, which readers must treat as "not ready".
pub type CameraSlot = watch::Receiver<Option<ProcessedFrames>>;

/// Deterministic bilinear resize to the target dimensions.
///
/// No aspect-ratio correction; the target dimensions are applied directly
/// and distortion is accepted. Pure and safe to call concurrently.
pub fn scale_frame(frame: &RgbImage, target_width: u32, target_height: u32) -> RgbImage {
    imageops::resize(frame, target_width, target_height, FilterType::Triangle)
}

/// Wiring for one camera's source + scaler task pair.
pub struct CameraPipeline;

impl CameraPipeline {
    /// Spawn the ingestion tasks for camera `index` into `tasks` and return
    /// the slot the compositor reads.
    pub fn spawn(
        index: usize,
        url: String,
        geometry: MosaicGeometry,
        client: reqwest::Client,
        policy: SourcePolicy,
        status: Arc<CameraStatusTracker>,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<()>,
    ) -> CameraSlot {
        let (slot_tx, slot_rx) = watch::channel(None);
        let (frame_tx, mut frame_rx) = mailbox::mailbox();

        let source = FrameSource::new(index, url, client, policy)
            .with_placeholder(geometry.width, geometry.total_height)
            .with_status_tracker(status);
        tasks.spawn(source.run(frame_tx, cancel.child_token()));

        let scaler_cancel = cancel.child_token();
        let (thumb_width, thumb_height) = (geometry.thumb_width, geometry.thumb_height);
        tasks.spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = scaler_cancel.cancelled() => break,
                    next = frame_rx.recv() => match next {
                        Some(frame) => frame,
                        None => break,
                    },
                };

                let thumbnail = scale_frame(&frame, thumb_width, thumb_height);
                let pair = ProcessedFrames {
                    raw: Arc::new(frame),
                    thumbnail: Arc::new(thumbnail),
                };

                if slot_tx.send(Some(pair)).is_err() {
                    // every slot reader is gone
                    break;
                }
            }
            tracing::debug!(camera = index, "Camera pipeline stopped");
        });

        slot_rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_frame_applies_target_dimensions() {
        let frame = RgbImage::from_pixel(100, 80, image::Rgb([10, 200, 30]));
        let scaled = scale_frame(&frame, 25, 10);
        assert_eq!(scaled.dimensions(), (25, 10));
    }

    #[test]
    fn test_scale_frame_preserves_uniform_color() {
        let frame = RgbImage::from_pixel(64, 64, image::Rgb([120, 60, 240]));
        let scaled = scale_frame(&frame, 8, 8);
        for pixel in scaled.pixels() {
            assert_eq!(pixel, &image::Rgb([120, 60, 240]));
        }
    }

    #[test]
    fn test_scale_frame_is_deterministic() {
        let mut frame = RgbImage::new(32, 32);
        for (x, y, p) in frame.enumerate_pixels_mut() {
            *p = image::Rgb([(x * 8) as u8, (y * 8) as u8, 0]);
        }
        let a = scale_frame(&frame, 16, 16);
        let b = scale_frame(&frame, 16, 16);
        assert_eq!(a.as_raw(), b.as_raw());
    }
}
