//! Mosaic canvas geometry
//!
//! ## Responsibilities
//!
//! - Canvas and thumbnail dimensions from configured width/height/camera count
//! - Per-thumbnail placement rectangles along the bottom strip

/// Placement rectangle on the mosaic canvas (pixel coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Mosaic canvas geometry, immutable once constructed.
///
/// The canvas is the full-size main view of `width x height` with a strip of
/// `camera_count` thumbnails below it, giving a total canvas of
/// `width x total_height`. Integer division truncates, so thumbnails may not
/// tile the full width exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MosaicGeometry {
    pub width: u32,
    pub height: u32,
    pub camera_count: usize,
    pub thumb_width: u32,
    pub thumb_height: u32,
    pub total_height: u32,
}

impl MosaicGeometry {
    /// Compute geometry for the given canvas size and camera count.
    ///
    /// `camera_count` must be at least 1.
    pub fn new(width: u32, height: u32, camera_count: usize) -> Self {
        assert!(camera_count >= 1, "camera_count must be at least 1");

        let thumb_width = width / camera_count as u32;
        let thumb_height = height / camera_count as u32;

        Self {
            width,
            height,
            camera_count,
            thumb_width,
            thumb_height,
            total_height: height + thumb_height,
        }
    }

    /// Placement rectangle for thumbnail `index`.
    ///
    /// Thumbnails are laid out left to right below the main image, one band
    /// per camera, never overlapping.
    pub fn thumbnail_rect(&self, index: usize) -> ThumbRect {
        ThumbRect {
            x: index as u32 * self.thumb_width,
            y: self.height,
            width: self.thumb_width,
            height: self.thumb_height,
        }
    }
}
