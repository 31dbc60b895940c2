//! The RGBA raster buffer shared by every pipeline stage.
//!
//! A [`RasterBuffer`] is a row-major grid of pixels stored as
//! interleaved 8-bit red, green, blue and alpha samples. The sample
//! vector always holds exactly `width * height * 4` entries; every
//! constructor enforces this and no method can change the length.
//!
//! Filters compute in `f32` and convert back through [`clamp8`], so a
//! written sample can never wrap.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError};

/// Number of interleaved samples per pixel (R, G, B, A).
pub const CHANNELS: usize = 4;

/// Number of color channels filtered by the windowed stages. Alpha is
/// always passed through.
pub const COLOR_CHANNELS: usize = 3;

/// Largest buffer, in pixels, that a checked constructor or a resample
/// will allocate: 2^28 pixels, or 1 GiB of samples.
pub const MAX_PIXELS: u64 = 1 << 28;

/// Map any real number to the nearest integer in `[0, 255]`.
///
/// Saturating, not wrapping. `NaN` maps to 0.
#[must_use]
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp8(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

/// An in-memory RGBA image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RasterProxy", into = "RasterProxy")]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl RasterBuffer {
    /// Create a buffer filled with transparent black.
    ///
    /// # Panics
    ///
    /// Panics with a capacity overflow if `width * height` exceeds
    /// [`MAX_PIXELS`]. Use [`RasterBuffer::try_new`] for sizes that are
    /// not already known to be within the cap.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            samples: vec![0; sample_count(width, height)],
        }
    }

    /// Create a buffer filled with transparent black, rejecting sizes
    /// above [`MAX_PIXELS`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TooLarge`] if `width * height` exceeds
    /// [`MAX_PIXELS`].
    pub fn try_new(width: u32, height: u32) -> Result<Self, PipelineError> {
        let count = checked_sample_count(width, height)
            .ok_or(PipelineError::TooLarge { width, height })?;
        Ok(Self {
            width,
            height,
            samples: vec![0; count],
        })
    }

    /// Create a buffer where every pixel has the given RGBA value.
    #[must_use]
    pub fn from_pixel(width: u32, height: u32, pixel: [u8; 4]) -> Self {
        let count = sample_count(width, height) / CHANNELS;
        let mut samples = Vec::with_capacity(count * CHANNELS);
        for _ in 0..count {
            samples.extend_from_slice(&pixel);
        }
        Self {
            width,
            height,
            samples,
        }
    }

    /// Create a buffer by evaluating `f(x, y)` for every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 4]) -> Self {
        let mut samples = Vec::with_capacity(sample_count(width, height));
        for y in 0..height {
            for x in 0..width {
                samples.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            samples,
        }
    }

    /// Wrap an existing RGBA sample vector.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TooLarge`] if the dimensions exceed
    /// [`MAX_PIXELS`], or [`PipelineError::SizeMismatch`] if
    /// `samples.len()` is not `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, samples: Vec<u8>) -> Result<Self, PipelineError> {
        let expected = checked_sample_count(width, height)
            .ok_or(PipelineError::TooLarge { width, height })?;
        if samples.len() != expected {
            return Err(PipelineError::SizeMismatch {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Width and height as a [`Dimensions`] value.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// The raw interleaved RGBA samples.
    #[must_use]
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Mutable access to the samples. The length cannot change through
    /// a slice, so the size invariant holds.
    pub(crate) fn samples_mut(&mut self) -> &mut [u8] {
        &mut self.samples
    }

    /// Consume the buffer and return the sample vector.
    #[must_use]
    pub fn into_samples(self) -> Vec<u8> {
        self.samples
    }

    /// Read one sample.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::OutOfBounds`] if the coordinate or the
    /// channel index lies outside the buffer.
    pub fn get(&self, x: u32, y: u32, channel: usize) -> Result<u8, PipelineError> {
        let idx = self.checked_index(x, y, channel)?;
        Ok(self.samples[idx])
    }

    /// Write one sample.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::OutOfBounds`] if the coordinate or the
    /// channel index lies outside the buffer.
    pub fn set(&mut self, x: u32, y: u32, channel: usize, value: u8) -> Result<(), PipelineError> {
        let idx = self.checked_index(x, y, channel)?;
        self.samples[idx] = value;
        Ok(())
    }

    /// Read a whole pixel as `[r, g, b, a]`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::OutOfBounds`] if `(x, y)` lies outside
    /// the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> Result<[u8; 4], PipelineError> {
        let idx = self.checked_index(x, y, 0)?;
        let mut px = [0; CHANNELS];
        px.copy_from_slice(&self.samples[idx..idx + CHANNELS]);
        Ok(px)
    }

    /// Sample index of `(x, y, channel)` without bounds checks.
    ///
    /// Windowed filters only call this for interior coordinates.
    #[inline]
    pub(crate) const fn index(&self, x: usize, y: usize, channel: usize) -> usize {
        (y * self.width as usize + x) * CHANNELS + channel
    }

    fn checked_index(&self, x: u32, y: u32, channel: usize) -> Result<usize, PipelineError> {
        if x >= self.width || y >= self.height || channel >= CHANNELS {
            return Err(PipelineError::OutOfBounds {
                x,
                y,
                channel,
                width: self.width,
                height: self.height,
            });
        }
        Ok(self.index(x as usize, y as usize, channel))
    }

    /// Copy into an `image` crate buffer.
    #[must_use]
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        let mut img = image::RgbaImage::new(self.width, self.height);
        img.copy_from_slice(&self.samples);
        img
    }
}

impl From<image::RgbaImage> for RasterBuffer {
    fn from(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            samples: img.into_raw(),
        }
    }
}

impl From<&RasterBuffer> for image::RgbaImage {
    fn from(buffer: &RasterBuffer) -> Self {
        buffer.to_rgba_image()
    }
}

/// Number of samples for a `width x height` RGBA buffer.
///
/// Saturates above [`MAX_PIXELS`] so the allocation fails loudly instead of
/// silently wrapping to a small buffer.
pub(crate) fn sample_count(width: u32, height: u32) -> usize {
    checked_sample_count(width, height).unwrap_or(usize::MAX)
}

/// Number of samples for a `width x height` RGBA buffer, or `None` if
/// the buffer would exceed [`MAX_PIXELS`] or not fit in `usize`.
pub(crate) fn checked_sample_count(width: u32, height: u32) -> Option<usize> {
    if u64::from(width) * u64::from(height) > MAX_PIXELS {
        return None;
    }
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(CHANNELS)
}

/// Serde proxy so deserialization goes through [`RasterBuffer::from_raw`]
/// and cannot produce a buffer that violates the size invariant.
#[derive(Serialize, Deserialize)]
struct RasterProxy {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl TryFrom<RasterProxy> for RasterBuffer {
    type Error = PipelineError;

    fn try_from(proxy: RasterProxy) -> Result<Self, Self::Error> {
        Self::from_raw(proxy.width, proxy.height, proxy.samples)
    }
}

impl From<RasterBuffer> for RasterProxy {
    fn from(buffer: RasterBuffer) -> Self {
        Self {
            width: buffer.width,
            height: buffer.height,
            samples: buffer.samples,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn clamp8_saturates() {
        assert_eq!(clamp8(-12.0), 0);
        assert_eq!(clamp8(300.0), 255);
        assert_eq!(clamp8(f32::INFINITY), 255);
        assert_eq!(clamp8(f32::NEG_INFINITY), 0);
        assert_eq!(clamp8(f32::NAN), 0);
    }

    #[test]
    fn clamp8_rounds_to_nearest() {
        assert_eq!(clamp8(127.4), 127);
        assert_eq!(clamp8(127.6), 128);
        assert_eq!(clamp8(254.9999), 255);
    }

    #[test]
    fn new_has_expected_length() {
        let buf = RasterBuffer::new(7, 3);
        assert_eq!(buf.samples().len(), 7 * 3 * 4);
        assert!(buf.samples().iter().all(|&s| s == 0));
    }

    #[test]
    fn from_pixel_fills_every_pixel() {
        let buf = RasterBuffer::from_pixel(3, 2, [1, 2, 3, 4]);
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(buf.pixel(x, y).unwrap(), [1, 2, 3, 4]);
            }
        }
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn from_fn_is_row_major() {
        let buf = RasterBuffer::from_fn(3, 2, |x, y| [x as u8, y as u8, 0, 255]);
        assert_eq!(&buf.samples()[0..4], &[0, 0, 0, 255]);
        assert_eq!(&buf.samples()[4..8], &[1, 0, 0, 255]);
        assert_eq!(&buf.samples()[12..16], &[0, 1, 0, 255]);
    }

    #[test]
    fn from_raw_rejects_wrong_length() {
        let result = RasterBuffer::from_raw(2, 2, vec![0; 15]);
        assert!(matches!(
            result,
            Err(PipelineError::SizeMismatch {
                expected: 16,
                actual: 15
            })
        ));
    }

    #[test]
    fn absurd_dimensions_are_rejected_without_allocating() {
        assert!(matches!(
            RasterBuffer::try_new(u32::MAX, u32::MAX),
            Err(PipelineError::TooLarge {
                width: u32::MAX,
                height: u32::MAX
            })
        ));
        assert!(matches!(
            RasterBuffer::from_raw(u32::MAX, 2, Vec::new()),
            Err(PipelineError::TooLarge { .. })
        ));
    }

    #[test]
    fn try_new_accepts_ordinary_sizes() {
        let buf = RasterBuffer::try_new(7, 3).unwrap();
        assert_eq!(buf, RasterBuffer::new(7, 3));
        assert!(RasterBuffer::try_new(0, 0).unwrap().samples().is_empty());
    }

    #[test]
    fn pixel_cap_is_inclusive() {
        let side = 1 << 14;
        assert_eq!(u64::from(side) * u64::from(side), MAX_PIXELS);
        assert!(checked_sample_count(side, side).is_some());
        assert!(checked_sample_count(side, side + 1).is_none());
    }

    #[test]
    fn get_and_set_round_trip() {
        let mut buf = RasterBuffer::new(4, 4);
        buf.set(2, 3, 1, 99).unwrap();
        assert_eq!(buf.get(2, 3, 1).unwrap(), 99);
        assert_eq!(buf.get(2, 3, 0).unwrap(), 0);
    }

    #[test]
    fn out_of_bounds_access_is_rejected() {
        let mut buf = RasterBuffer::new(4, 4);
        assert!(matches!(
            buf.get(4, 0, 0),
            Err(PipelineError::OutOfBounds { x: 4, y: 0, .. })
        ));
        assert!(matches!(
            buf.get(0, 4, 0),
            Err(PipelineError::OutOfBounds { y: 4, .. })
        ));
        assert!(matches!(
            buf.set(0, 0, 4, 1),
            Err(PipelineError::OutOfBounds { channel: 4, .. })
        ));
        assert!(buf.pixel(10, 10).is_err());
    }

    #[test]
    fn rgba_image_conversion_preserves_samples() {
        let buf = RasterBuffer::from_fn(5, 4, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            let v = (x * 40 + y) as u8;
            [v, 255 - v, v / 2, 200]
        });
        let img = buf.to_rgba_image();
        assert_eq!(img.dimensions(), (5, 4));
        let back = RasterBuffer::from(img);
        assert_eq!(buf, back);
    }

    #[test]
    fn serde_round_trip() {
        let buf = RasterBuffer::from_pixel(2, 1, [10, 20, 30, 40]);
        let json = serde_json::to_string(&buf).unwrap();
        let back: RasterBuffer = serde_json::from_str(&json).unwrap();
        assert_eq!(buf, back);
    }

    #[test]
    fn deserialize_rejects_inconsistent_length() {
        let json = r#"{"width":2,"height":2,"samples":[0,0,0,0]}"#;
        let result: Result<RasterBuffer, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
