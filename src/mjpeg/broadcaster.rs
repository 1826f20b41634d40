//! MJPEG egress: frame fan-out to HTTP subscribers

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Part boundary for the multipart body. Must not occur inside JPEG data.
const MJPEG_BOUNDARY: &str = "mosaicframeboundary";

/// A frame ready for publication.
#[derive(Clone)]
pub struct MjpegFrame {
    /// JPEG-encoded image data
    pub jpeg: Bytes,
    /// Monotonic sequence number, for diagnostics
    pub seq: u64,
}

/// Fan-out point for one published MJPEG stream.
///
/// Publication never blocks: subscribers that fall behind the channel
/// capacity skip frames and pick up again at the newest one.
pub struct MjpegBroadcaster {
    tx: broadcast::Sender<MjpegFrame>,
    seq: AtomicU64,
}

impl MjpegBroadcaster {
    /// Create a broadcaster buffering at most `capacity` frames per
    /// subscriber. 2-4 is plenty for a 1 Hz mosaic.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    /// Publish encoded bytes to all current subscribers.
    ///
    /// Returns the number of subscribers that were sent the frame.
    pub fn publish(&self, jpeg: Bytes) -> usize {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.tx.send(MjpegFrame { jpeg, seq }).unwrap_or(0)
    }

    pub fn subscribe(&self) -> MjpegSubscriber {
        MjpegSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MjpegBroadcaster {
    fn default() -> Self {
        Self::new(4)
    }
}

/// One HTTP client's view of a published stream.
pub struct MjpegSubscriber {
    rx: broadcast::Receiver<MjpegFrame>,
}

impl MjpegSubscriber {
    /// Receive the next frame, skipping over any the subscriber lagged
    /// behind on. `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<MjpegFrame> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped = skipped, "Subscriber lagged, skipping frames");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Turn the subscription into a `multipart/x-mixed-replace` response.
    pub fn into_response(self) -> Response {
        let stream = BroadcastStream::new(self.rx).filter_map(|result| {
            match result {
                Ok(frame) => {
                    let head = format!(
                        "--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                        frame.jpeg.len()
                    );

                    let mut part = Vec::with_capacity(head.len() + frame.jpeg.len() + 2);
                    part.extend_from_slice(head.as_bytes());
                    part.extend_from_slice(&frame.jpeg);
                    part.extend_from_slice(b"\r\n");

                    Some(Ok::<_, std::convert::Infallible>(Bytes::from(part)))
                }
                // lagged receivers skip to the next frame
                Err(_) => None,
            }
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}"),
            )
            .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .body(Body::from_stream(stream))
            .expect("static MJPEG response parts are valid")
    }
}
