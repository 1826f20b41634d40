//! MosaicCompositor - periodic mosaic composition and publication
//!
//! ## Responsibilities
//!
//! - On a fixed tick, snapshot the latest frame pair from every camera slot
//! - Compose one canvas per output stream: that stream's camera full-size,
//!   plus the thumbnail strip of all cameras
//! - Overlay a per-stream liveness indicator that alternates every tick
//! - JPEG-encode and publish each canvas; publication never blocks
//!
//! All N compositions of one tick run concurrently; the tick completes only
//! when they have all joined, and the duration is logged for diagnostics.

use crate::camera_pipeline::{CameraSlot, ProcessedFrames};
use crate::geometry::MosaicGeometry;
use crate::mjpeg::{self, MjpegBroadcaster};
use image::{imageops, Rgb, RgbImage};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Compose-and-publish cadence.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Side length of the liveness indicator block in the top-left corner.
const INDICATOR_SIZE: u32 = 10;
const INDICATOR_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Compose one output stream's mosaic canvas.
///
/// `frames` is indexed by camera; `None` entries (cameras still connecting)
/// are skipped and leave their region blank. `active` selects the camera
/// drawn full-size in the main region. When `indicator` is set, a red block
/// is drawn over the top-left corner so a frozen output can be told apart
/// from a live one.
pub fn compose_mosaic(
    geometry: &MosaicGeometry,
    frames: &[Option<ProcessedFrames>],
    active: usize,
    indicator: bool,
) -> RgbImage {
    let mut canvas = RgbImage::new(geometry.width, geometry.total_height);

    if let Some(main) = frames.get(active).and_then(Option::as_ref) {
        imageops::replace(&mut canvas, main.raw.as_ref(), 0, 0);
    }

    for (i, entry) in frames.iter().enumerate() {
        if let Some(pair) = entry {
            let rect = geometry.thumbnail_rect(i);
            imageops::replace(
                &mut canvas,
                pair.thumbnail.as_ref(),
                rect.x as i64,
                rect.y as i64,
            );
        }
    }

    if indicator {
        let w = INDICATOR_SIZE.min(canvas.width());
        let h = INDICATOR_SIZE.min(canvas.height());
        for y in 0..h {
            for x in 0..w {
                canvas.put_pixel(x, y, INDICATOR_COLOR);
            }
        }
    }

    canvas
}

/// Ticked fan-in over all camera slots, publishing one MJPEG stream per
/// camera-as-main.
pub struct MosaicCompositor {
    geometry: MosaicGeometry,
    slots: Vec<CameraSlot>,
    outputs: Vec<Arc<MjpegBroadcaster>>,
    tick: Duration,
}

impl MosaicCompositor {
    pub fn new(
        geometry: MosaicGeometry,
        slots: Vec<CameraSlot>,
        outputs: Vec<Arc<MjpegBroadcaster>>,
    ) -> Self {
        Self {
            geometry,
            slots,
            outputs,
            tick: TICK_INTERVAL,
        }
    }

    /// Override the tick interval (tests).
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Run until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // each output stream's indicator state is owned here and toggled
        // before its composition task is spawned
        let mut indicators = vec![false; self.outputs.len()];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();

            let frames: Arc<Vec<Option<ProcessedFrames>>> =
                Arc::new(self.slots.iter().map(|slot| slot.borrow().clone()).collect());

            let mut compositions = JoinSet::new();
            for (i, output) in self.outputs.iter().enumerate() {
                indicators[i] = !indicators[i];
                let indicator = indicators[i];
                let frames = frames.clone();
                let output = output.clone();
                let geometry = self.geometry;

                compositions.spawn(async move {
                    let canvas = compose_mosaic(&geometry, &frames, i, indicator);
                    match mjpeg::encode_jpeg(&canvas, mjpeg::JPEG_QUALITY) {
                        Ok(bytes) => {
                            output.publish(bytes);
                        }
                        Err(e) => {
                            tracing::error!(stream = i, error = %e, "Mosaic encode failed");
                        }
                    }
                });
            }

            // the tick is complete only once every stream has been composed
            while compositions.join_next().await.is_some() {}

            tracing::debug!(
                streams = self.outputs.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "All streams processed"
            );
        }

        tracing::debug!("Mosaic compositor stopped");
    }
}
