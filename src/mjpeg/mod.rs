//! MJPEG wire format support
//!
//! ## Responsibilities
//!
//! - Ingest: pull complete JPEG frames out of a `multipart/x-mixed-replace`
//!   HTTP byte stream and decode them
//! - Egress: fan encoded frames out to any number of HTTP subscribers
//! - JPEG encoding of composed canvases and snapshots

mod broadcaster;
mod decoder;

pub use broadcaster::{MjpegBroadcaster, MjpegFrame, MjpegSubscriber};
pub use decoder::{JpegFrameExtractor, MjpegStream};

use crate::error::Result;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

/// JPEG quality used for published mosaics and snapshots.
pub const JPEG_QUALITY: u8 = 90;

/// Encode an RGB frame to JPEG bytes at the given quality.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Bytes> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(img)?;
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_jpeg_magic_bytes() {
        let img = RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&img, JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }
}
