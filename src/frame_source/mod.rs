//! FrameSource - camera ingestion with reconnect and backoff
//!
//! ## Responsibilities
//!
//! - Open and decode one camera's MJPEG stream
//! - Reconnect on failure with linear, capped backoff
//! - Watchdog stalled streams (no frame within the stall window)
//! - Hand decoded frames to the consumer within a bounded window
//!
//! The loop runs `Disconnected -> Connecting -> Streaming -> (Failed |
//! Timeout) -> Connecting` until cancelled. Failures stay inside the loop;
//! nothing here is fatal to the process.

use crate::camera_status_tracker::CameraStatusTracker;
use crate::error::Error;
use crate::mailbox::MailboxSender;
use crate::mjpeg::MjpegStream;
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Timing policy for a source loop. The defaults are the production values;
/// tests compress them.
#[derive(Debug, Clone, Copy)]
pub struct SourcePolicy {
    /// Backoff unit; reconnect delay is `consecutive failures x unit`
    pub backoff_unit: Duration,
    /// Cap on the consecutive-failure count, and thus on the backoff delay
    pub max_failures: u32,
    /// Abandon the session when no frame decodes within this window
    pub stall_timeout: Duration,
    /// Acceptance window for handing a frame to the consumer
    pub handoff_window: Duration,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self {
            backoff_unit: Duration::from_secs(1),
            max_failures: 30,
            stall_timeout: Duration::from_secs(5),
            handoff_window: Duration::from_secs(1),
        }
    }
}

/// Linear capped backoff state, private to one camera.
#[derive(Debug, Default)]
pub struct ReconnectState {
    consecutive_failures: u32,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed connection attempt and return the delay to sleep
    /// before the next one.
    pub fn record_failure(&mut self, policy: &SourcePolicy) -> Duration {
        if self.consecutive_failures < policy.max_failures {
            self.consecutive_failures += 1;
        }
        policy.backoff_unit * self.consecutive_failures
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.consecutive_failures
    }
}

enum SessionEnd {
    /// No frame within the stall window
    Stalled,
    /// Decode or transport error
    Failed(Error),
    /// External cancellation
    Cancelled,
}

/// One camera's ingestion loop.
pub struct FrameSource {
    camera: usize,
    url: String,
    client: reqwest::Client,
    policy: SourcePolicy,
    /// Blank frame of these dimensions is emitted at the top of every
    /// connect cycle; `None` disables the placeholder.
    placeholder: Option<(u32, u32)>,
    status: Option<Arc<CameraStatusTracker>>,
}

impl FrameSource {
    pub fn new(camera: usize, url: String, client: reqwest::Client, policy: SourcePolicy) -> Self {
        Self {
            camera,
            url,
            client,
            policy,
            placeholder: None,
            status: None,
        }
    }

    /// Emit a blank `width x height` frame before each connect attempt so a
    /// downstream consumer always has something to draw from tick one.
    pub fn with_placeholder(mut self, width: u32, height: u32) -> Self {
        self.placeholder = Some((width, height));
        self
    }

    /// Report connect/disconnect transitions to the status tracker.
    pub fn with_status_tracker(mut self, tracker: Arc<CameraStatusTracker>) -> Self {
        self.status = Some(tracker);
        self
    }

    /// Run until cancelled, offering decoded frames through `frames`.
    pub async fn run(self, frames: MailboxSender<RgbImage>, cancel: CancellationToken) {
        let mut reconnect = ReconnectState::new();

        loop {
            if cancel.is_cancelled() || frames.is_closed() {
                break;
            }

            tracing::info!(camera = self.camera, url = %self.url, "Connecting");

            if let Some((w, h)) = self.placeholder {
                if !frames
                    .offer(RgbImage::new(w, h), self.policy.handoff_window)
                    .await
                {
                    tracing::debug!(
                        camera = self.camera,
                        url = %self.url,
                        "Placeholder frame not accepted"
                    );
                }
            }

            let mut stream = match MjpegStream::open(&self.client, &self.url).await {
                Ok(s) => s,
                Err(e) => {
                    let delay = reconnect.record_failure(&self.policy);
                    self.report(false).await;
                    tracing::error!(
                        camera = self.camera,
                        url = %self.url,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Connect failed, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(delay) => {}
                    }
                    continue;
                }
            };

            reconnect.reset();
            self.report(true).await;
            tracing::info!(camera = self.camera, url = %self.url, "Connected");

            match self.stream_frames(&mut stream, &frames, &cancel).await {
                SessionEnd::Cancelled => break,
                SessionEnd::Stalled => {
                    self.report(false).await;
                    tracing::error!(
                        camera = self.camera,
                        url = %self.url,
                        stall_ms = self.policy.stall_timeout.as_millis() as u64,
                        "Timeout receiving frames, reconnecting"
                    );
                }
                SessionEnd::Failed(e) => {
                    self.report(false).await;
                    tracing::error!(
                        camera = self.camera,
                        url = %self.url,
                        error = %e,
                        "Stream ended, reconnecting"
                    );
                }
            }
        }

        tracing::debug!(camera = self.camera, url = %self.url, "Frame source stopped");
    }

    async fn stream_frames(
        &self,
        stream: &mut MjpegStream,
        frames: &MailboxSender<RgbImage>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                next = timeout(self.policy.stall_timeout, stream.next_image()) => next,
            };

            match next {
                Err(_) => return SessionEnd::Stalled,
                Ok(Err(e)) => return SessionEnd::Failed(e),
                Ok(Ok(frame)) => {
                    if !frames.offer(frame, self.policy.handoff_window).await {
                        if frames.is_closed() {
                            return SessionEnd::Cancelled;
                        }
                        tracing::warn!(
                            camera = self.camera,
                            url = %self.url,
                            "Consumer not ready, dropping frame"
                        );
                    }
                }
            }
        }
    }

    async fn report(&self, online: bool) {
        if let Some(tracker) = &self.status {
            tracker.update_status(self.camera, online).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_linear_and_capped() {
        let policy = SourcePolicy::default();
        let mut state = ReconnectState::new();

        let mut last = Duration::ZERO;
        for i in 1..=35u32 {
            let delay = state.record_failure(&policy);
            assert!(delay >= last, "backoff must be non-decreasing");
            assert!(delay <= Duration::from_secs(30), "backoff must cap at 30s");
            if i <= 30 {
                assert_eq!(delay, Duration::from_secs(i as u64));
            }
            last = delay;
        }
        assert_eq!(state.failures(), 30);
    }

    #[test]
    fn test_backoff_resets_on_success() {
        let policy = SourcePolicy::default();
        let mut state = ReconnectState::new();

        state.record_failure(&policy);
        state.record_failure(&policy);
        assert_eq!(state.failures(), 2);

        state.reset();
        assert_eq!(state.failures(), 0);
        assert_eq!(state.record_failure(&policy), Duration::from_secs(1));
    }
}
