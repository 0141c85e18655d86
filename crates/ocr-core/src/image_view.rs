//! The read-only image view the engines operate on
//!
//! The core never decodes image files itself — that is the caller's
//! concern — but it needs a concrete, owned pixel buffer to pass through
//! the staged engine and the collaborator contracts. [`RasterImage`] wraps
//! the `image` crate's `RgbImage`, the same buffer type the host
//! workspace's own image-handling modules build on.

use image::RgbImage;

/// A read-only view over a rectangular pixel domain.
///
/// Implemented by [`RasterImage`] for owned in-memory buffers; a caller
/// integrating a lazily-decoded or memory-mapped source can implement this
/// directly instead of materializing a `RgbImage` up front.
pub trait ImageView: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Clones this view into an owned [`RasterImage`]. Rotation helpers and
    /// the stub collaborators operate on this concrete buffer; a caller
    /// with a more efficient representation can override this to avoid an
    /// extra copy before handing the image to `image`-crate-based helpers.
    fn to_raster(&self) -> RasterImage;
}

/// An owned RGB8 pixel buffer: the working image handed between pipeline
/// stages and collaborators.
#[derive(Debug, Clone)]
pub struct RasterImage {
    buffer: RgbImage,
}

impl RasterImage {
    #[must_use]
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// A solid-color image of the given size; used by tests and the
    /// no-op stub collaborators (§8 scenario 3's "blank white" images).
    #[must_use]
    pub fn solid(width: u32, height: u32, pixel: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width.max(1), height.max(1), image::Rgb(pixel)))
    }

    #[must_use]
    pub fn buffer(&self) -> &RgbImage {
        &self.buffer
    }

    #[must_use]
    pub fn rotate_90_ccw(&self) -> RasterImage {
        // `image`'s rotate90 is clockwise; three clockwise turns equal one
        // counter-clockwise turn.
        let once = image::imageops::rotate90(&self.buffer);
        let twice = image::imageops::rotate90(&once);
        RasterImage::new(image::imageops::rotate90(&twice))
    }

    #[must_use]
    pub fn rotate_180(&self) -> RasterImage {
        RasterImage::new(image::imageops::rotate180(&self.buffer))
    }

    #[must_use]
    pub fn rotate_270_ccw(&self) -> RasterImage {
        RasterImage::new(image::imageops::rotate90(&self.buffer))
    }
}

impl ImageView for RasterImage {
    fn width(&self) -> u32 {
        self.buffer.width()
    }

    fn height(&self) -> u32 {
        self.buffer.height()
    }

    fn to_raster(&self) -> RasterImage {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_image_has_requested_dimensions() {
        let img = RasterImage::solid(80, 50, [255, 255, 255]);
        assert_eq!(img.width(), 80);
        assert_eq!(img.height(), 50);
    }

    #[test]
    fn rotate_90_ccw_swaps_dimensions() {
        let img = RasterImage::solid(80, 50, [0, 0, 0]);
        let rotated = img.rotate_90_ccw();
        assert_eq!(rotated.width(), 50);
        assert_eq!(rotated.height(), 80);
    }

    #[test]
    fn four_quarter_turns_is_identity_shape() {
        let img = RasterImage::solid(80, 50, [1, 2, 3]);
        let back = img.rotate_90_ccw().rotate_90_ccw().rotate_90_ccw().rotate_90_ccw();
        assert_eq!(back.width(), img.width());
        assert_eq!(back.height(), img.height());
    }
}
