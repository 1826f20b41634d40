//! MJPEG ingest: JPEG frame extraction and decoding from a live HTTP stream

use crate::error::{Error, Result};
use bytes::{Buf, Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use image::RgbImage;

/// JPEG start-of-image marker
const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Upper bound on buffered bytes while waiting for a frame to complete.
/// A camera that never produces a valid marker pair must not grow the
/// buffer without limit.
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Incremental JPEG frame extractor.
///
/// Multipart part headers and boundary lines between frames are skipped by
/// scanning for the SOI/EOI marker pair, so the extractor works against any
/// MJPEG flavor regardless of its boundary string.
#[derive(Default)]
pub struct JpegFrameExtractor {
    buf: BytesMut,
}

impl JpegFrameExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw stream bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete JPEG frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let soi = find_marker(&self.buf, SOI)?;
        if soi > 0 {
            // discard multipart headers / boundary between frames
            self.buf.advance(soi);
        }

        let eoi = find_marker(&self.buf[2..], EOI)? + 2;
        Some(self.buf.split_to(eoi + 2).freeze())
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

/// An open MJPEG decode session against a camera URL.
pub struct MjpegStream {
    chunks: BoxStream<'static, reqwest::Result<Bytes>>,
    extractor: JpegFrameExtractor,
}

impl MjpegStream {
    /// Open the camera URL and prepare to decode its multipart body.
    pub async fn open(client: &reqwest::Client, url: &str) -> Result<Self> {
        let resp = client.get(url).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Stream(format!(
                "camera returned {}",
                resp.status()
            )));
        }

        Ok(Self {
            chunks: resp.bytes_stream().boxed(),
            extractor: JpegFrameExtractor::new(),
        })
    }

    /// Read the next complete JPEG frame off the wire.
    pub async fn next_jpeg(&mut self) -> Result<Bytes> {
        loop {
            if let Some(frame) = self.extractor.next_frame() {
                return Ok(frame);
            }

            if self.extractor.buffered() > MAX_FRAME_BYTES {
                return Err(Error::Stream(format!(
                    "no frame boundary within {} buffered bytes",
                    MAX_FRAME_BYTES
                )));
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => self.extractor.push(&chunk),
                Some(Err(e)) => return Err(Error::Http(e)),
                None => return Err(Error::Stream("stream closed".to_string())),
            }
        }
    }

    /// Read and decode the next frame.
    pub async fn next_image(&mut self) -> Result<RgbImage> {
        let jpeg = self.next_jpeg().await?;
        let img = image::load_from_memory(&jpeg)?;
        Ok(img.to_rgb8())
    }
}
