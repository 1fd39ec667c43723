// THEORY:
// The `frame_buffer` module holds the two "dumb" pixel containers the engine is
// built on. A `Frame` is the caller's borrowed input for a single tick: it is
// validated once, at the boundary, so nothing deeper in the pipeline ever has to
// re-check buffer lengths. A `FrameBuffer` is an engine-owned RGBA image (backed
// by `image::RgbaImage`) that is reallocated only when the input dimensions change.
//
// Key principles:
// 1.  **Validation at the edge**: `Frame::new` is the only place where malformed
//     input is rejected. Everything downstream can index freely.
// 2.  **Resize on demand**: `ensure_size` is a no-op on the hot path and the only
//     place that allocates.
// 3.  **Mask convention**: a mask pixel is "on" when its red channel is non-zero.

use crate::error::VisionError;
use image::RgbaImage;

pub const CHANNELS: usize = 4;
pub const MASK_ON: u8 = 255;
pub const MASK_OFF: u8 = 0;
pub const OPAQUE: u8 = 255;

/// Byte length of a `width * height` RGBA buffer, `None` when it does not fit in `usize`.
fn rgba_len(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)?.checked_mul(CHANNELS)
}

/// A borrowed, validated RGBA frame supplied by the host for one update.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pixels: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> Frame<'a> {
    pub fn new(pixels: &'a [u8], width: u32, height: u32) -> Result<Self, VisionError> {
        if pixels.is_empty() {
            return Err(VisionError::EmptyFrame);
        }
        if width == 0 || height == 0 {
            return Err(VisionError::InvalidDimensions { width, height });
        }
        let expected = rgba_len(width, height).ok_or(VisionError::InvalidDimensions { width, height })?;
        if pixels.len() != expected {
            return Err(VisionError::BufferSizeMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { pixels, width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    /// The bytes of row `y`.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let stride = self.width as usize * CHANNELS;
        let start = y as usize * stride;
        &self.pixels[start..start + stride]
    }
}

/// An engine-owned RGBA image.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    image: RgbaImage,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    /// Wraps an existing RGBA byte vector.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, VisionError> {
        let actual = pixels.len();
        let expected = rgba_len(width, height).ok_or(VisionError::InvalidDimensions { width, height })?;
        RgbaImage::from_raw(width, height, pixels)
            .filter(|_| actual == expected)
            .map(|image| Self { image })
            .ok_or(VisionError::BufferSizeMismatch {
                width,
                height,
                expected,
                actual,
            })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub(crate) fn as_raw_mut(&mut self) -> &mut [u8] {
        let raw: &mut [u8] = &mut self.image;
        raw
    }

    /// Reallocates (zero-filled) when the dimensions differ from the stored ones.
    /// Returns `true` if a reallocation happened.
    pub fn ensure_size(&mut self, width: u32, height: u32) -> bool {
        if self.image.dimensions() == (width, height) {
            return false;
        }
        self.image = RgbaImage::new(width, height);
        true
    }

    /// Copies the pixels of a buffer with identical dimensions.
    pub(crate) fn copy_from(&mut self, other: &FrameBuffer) {
        debug_assert_eq!(self.dimensions(), other.dimensions());
        self.as_raw_mut().copy_from_slice(other.as_raw());
    }

    /// Mask test for pixel (x, y). Callers keep coordinates in bounds.
    #[inline]
    pub fn is_on(&self, x: u32, y: u32) -> bool {
        let index = (y as usize * self.width() as usize + x as usize) * CHANNELS;
        self.as_raw()[index] > 0
    }

    /// Number of "on" pixels in the whole buffer.
    pub fn count_on(&self) -> usize {
        self.as_raw()
            .chunks_exact(CHANNELS)
            .filter(|pixel| pixel[0] > 0)
            .count()
    }

    /// Mask test at a normalized position. Anything outside the image is off.
    pub fn hit_test(&self, norm_x: f64, norm_y: f64) -> bool {
        if !norm_x.is_finite() || !norm_y.is_finite() {
            return false;
        }
        let x = (norm_x * self.width() as f64).floor();
        let y = (norm_y * self.height() as f64).floor();
        if x < 0.0 || y < 0.0 || x >= self.width() as f64 || y >= self.height() as f64 {
            return false;
        }
        self.is_on(x as u32, y as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_malformed_input() {
        assert_eq!(Frame::new(&[], 2, 2).unwrap_err(), VisionError::EmptyFrame);
        assert_eq!(
            Frame::new(&[0u8; 16], 0, 4).unwrap_err(),
            VisionError::InvalidDimensions { width: 0, height: 4 }
        );
        let err = Frame::new(&[0u8; 15], 2, 2).unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(
            err,
            VisionError::BufferSizeMismatch {
                width: 2,
                height: 2,
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn frame_rows_are_sliced_by_stride() {
        let pixels: Vec<u8> = (0..24).collect();
        let frame = Frame::new(&pixels, 3, 2).unwrap();
        assert_eq!(frame.row(1), &pixels[12..24]);
    }

    #[test]
    fn ensure_size_only_reallocates_on_change() {
        let mut buffer = FrameBuffer::new(4, 4);
        buffer.as_raw_mut()[0] = 9;
        assert!(!buffer.ensure_size(4, 4));
        assert_eq!(buffer.as_raw()[0], 9);
        assert!(buffer.ensure_size(8, 2));
        assert_eq!(buffer.dimensions(), (8, 2));
        assert!(buffer.as_raw().iter().all(|&b| b == 0));
    }

    #[test]
    fn hit_test_maps_normalized_coordinates() {
        let mut buffer = FrameBuffer::new(10, 10);
        let index = (3 * 10 + 7) * CHANNELS;
        buffer.as_raw_mut()[index] = MASK_ON;

        assert!(buffer.hit_test(0.75, 0.35));
        assert!(!buffer.hit_test(0.05, 0.05));
        assert!(!buffer.hit_test(-0.1, 0.5));
        assert!(!buffer.hit_test(1.0, 0.5));
        assert_eq!(buffer.count_on(), 1);
    }

    #[test]
    fn hit_test_rejects_non_finite_coordinates() {
        let mut buffer = FrameBuffer::new(10, 10);
        buffer.as_raw_mut()[0] = MASK_ON;

        assert!(buffer.hit_test(0.0, 0.0));
        assert!(!buffer.hit_test(f64::NAN, 0.0));
        assert!(!buffer.hit_test(0.0, f64::NAN));
        assert!(!buffer.hit_test(f64::NEG_INFINITY, f64::INFINITY));
    }

    #[test]
    fn oversized_dimensions_are_rejected_without_overflow() {
        assert_eq!(
            Frame::new(&[0u8; 16], u32::MAX, u32::MAX).unwrap_err(),
            VisionError::InvalidDimensions {
                width: u32::MAX,
                height: u32::MAX
            }
        );
        assert!(FrameBuffer::from_raw(u32::MAX, u32::MAX, vec![0; 16]).unwrap_err().is_invalid_input());
    }

    #[test]
    fn from_raw_checks_length() {
        assert!(FrameBuffer::from_raw(2, 2, vec![0; 16]).is_ok());
        assert!(FrameBuffer::from_raw(2, 2, vec![0; 12]).is_err());
    }
}
