//! Integer-factor magnification.
//!
//! [`resample`] scales a buffer by a whole-number factor in both axes.
//! Nearest-neighbor is done by hand so it stays exact and
//! alpha-preserving; the smooth variants delegate to the `image`
//! crate's separable resampler, which clamps source coordinates at the
//! edges so border pixels are replicated rather than read out of bounds.

use std::fmt;
use std::str::FromStr;

use image::imageops::FilterType;
use serde::{Deserialize, Deserializer, Serialize};

use crate::raster::{CHANNELS, RasterBuffer, checked_sample_count};
use crate::types::{PipelineError, deserialize_or_fallback};

/// Resampling method used when magnifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    /// Each output pixel copies the source pixel it falls inside.
    Nearest,
    /// Bicubic (Catmull-Rom): continuous, high-quality smoothing.
    #[default]
    Smooth,
    /// Lanczos with 3 lobes: sharper than bicubic, may ring slightly.
    Lanczos,
}

impl ResampleMethod {
    /// Convert to the `image` crate's `FilterType`.
    ///
    /// Returns `None` for [`ResampleMethod::Nearest`], which is handled
    /// without the `image` resampler.
    const fn to_image_filter(self) -> Option<FilterType> {
        match self {
            Self::Nearest => None,
            Self::Smooth => Some(FilterType::CatmullRom),
            Self::Lanczos => Some(FilterType::Lanczos3),
        }
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("nearest"),
            Self::Smooth => f.write_str("smooth"),
            Self::Lanczos => f.write_str("lanczos"),
        }
    }
}

impl FromStr for ResampleMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "smooth" | "bicubic" => Ok(Self::Smooth),
            "lanczos" | "lanczos3" => Ok(Self::Lanczos),
            _ => Err(PipelineError::UnsupportedConfig(format!(
                "unknown resample method `{s}`"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for ResampleMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_or_fallback(deserializer, Self::default())
    }
}

/// Output dimensions for `scale_factor`, or an error if the factor is
/// zero or the result would not be addressable.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidScaleFactor`] if `scale_factor` is 0
/// or the scaled buffer would exceed [`crate::raster::MAX_PIXELS`].
pub fn scaled_dimensions(
    width: u32,
    height: u32,
    scale_factor: u32,
) -> Result<(u32, u32), PipelineError> {
    if scale_factor < 1 {
        return Err(PipelineError::InvalidScaleFactor(scale_factor));
    }
    let overflow = || PipelineError::InvalidScaleFactor(scale_factor);
    let w = width.checked_mul(scale_factor).ok_or_else(overflow)?;
    let h = height.checked_mul(scale_factor).ok_or_else(overflow)?;
    checked_sample_count(w, h).ok_or_else(overflow)?;
    Ok((w, h))
}

/// Magnify `src` by `scale_factor` in both axes.
///
/// A factor of 1 returns an exact copy for every method.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidScaleFactor`] if `scale_factor < 1`
/// or the output would exceed [`crate::raster::MAX_PIXELS`].
pub fn resample(
    src: &RasterBuffer,
    scale_factor: u32,
    method: ResampleMethod,
) -> Result<RasterBuffer, PipelineError> {
    let (new_width, new_height) = scaled_dimensions(src.width(), src.height(), scale_factor)?;
    tracing::trace!(
        from = %src.dimensions(),
        to_width = new_width,
        to_height = new_height,
        %method,
        "resample",
    );

    if scale_factor == 1 {
        return Ok(src.clone());
    }
    if src.pixel_count() == 0 {
        return Ok(RasterBuffer::new(new_width, new_height));
    }

    match method.to_image_filter() {
        None => Ok(nearest(src, scale_factor, new_width, new_height)),
        Some(filter) => {
            let resized =
                image::imageops::resize(&src.to_rgba_image(), new_width, new_height, filter);
            Ok(RasterBuffer::from(resized))
        }
    }
}

/// Nearest-neighbor magnification: destination `(x, y)` copies source
/// `(x / s, y / s)`.
fn nearest(src: &RasterBuffer, scale: u32, new_width: u32, new_height: u32) -> RasterBuffer {
    let scale = scale as usize;
    let src_width = src.width() as usize;
    let src_row_len = src_width * CHANNELS;
    let mut dst = RasterBuffer::new(new_width, new_height);
    let dst_row_len = new_width as usize * CHANNELS;

    let samples = src.samples();
    let out = dst.samples_mut();
    for (dy, dst_row) in out.chunks_exact_mut(dst_row_len).enumerate() {
        let src_row = &samples[(dy / scale) * src_row_len..][..src_row_len];
        for (sx, px) in src_row.chunks_exact(CHANNELS).enumerate() {
            let start = sx * scale * CHANNELS;
            for block in dst_row[start..start + scale * CHANNELS].chunks_exact_mut(CHANNELS) {
                block.copy_from_slice(px);
            }
        }
    }
    dst
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_possible_truncation)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RasterBuffer {
        RasterBuffer::from_fn(w, h, |x, y| {
            [(x * 37) as u8, (y * 53) as u8, ((x + y) * 11) as u8, (200 + x) as u8]
        })
    }

    #[test]
    fn default_method_is_smooth() {
        assert_eq!(ResampleMethod::default(), ResampleMethod::Smooth);
    }

    #[test]
    fn method_from_str_accepts_aliases() {
        assert_eq!("bicubic".parse::<ResampleMethod>().unwrap(), ResampleMethod::Smooth);
        assert_eq!("Nearest".parse::<ResampleMethod>().unwrap(), ResampleMethod::Nearest);
        assert_eq!("lanczos3".parse::<ResampleMethod>().unwrap(), ResampleMethod::Lanczos);
        assert!(matches!(
            "cubic-spline".parse::<ResampleMethod>(),
            Err(PipelineError::UnsupportedConfig(_))
        ));
    }

    #[test]
    fn zero_scale_factor_is_rejected() {
        let src = gradient(3, 3);
        for method in [ResampleMethod::Nearest, ResampleMethod::Smooth, ResampleMethod::Lanczos] {
            assert!(matches!(
                resample(&src, 0, method),
                Err(PipelineError::InvalidScaleFactor(0))
            ));
        }
    }

    #[test]
    fn overflowing_scale_factor_is_rejected() {
        let src = gradient(4, 4);
        assert!(matches!(
            resample(&src, u32::MAX, ResampleMethod::Nearest),
            Err(PipelineError::InvalidScaleFactor(_))
        ));
    }

    #[test]
    fn output_above_pixel_cap_is_rejected_before_allocating() {
        let src = RasterBuffer::from_pixel(1, 1, [9, 9, 9, 255]);
        assert!(matches!(
            resample(&src, 60_000, ResampleMethod::Smooth),
            Err(PipelineError::InvalidScaleFactor(60_000))
        ));
        // Exactly at the cap is still addressable.
        assert_eq!(scaled_dimensions(1, 1, 1 << 14).unwrap(), (1 << 14, 1 << 14));
        assert!(scaled_dimensions(2, 1, 1 << 14).is_err());
        assert!(u64::from(1u32 << 14) * u64::from(1u32 << 14) <= crate::raster::MAX_PIXELS);
    }

    #[test]
    fn scale_one_is_identity_for_every_method() {
        let src = gradient(6, 5);
        for method in [ResampleMethod::Nearest, ResampleMethod::Smooth, ResampleMethod::Lanczos] {
            assert_eq!(resample(&src, 1, method).unwrap(), src, "method {method}");
        }
    }

    #[test]
    fn nearest_copies_source_blocks_exactly() {
        let src = gradient(5, 3);
        for s in 2..=4 {
            let dst = resample(&src, s, ResampleMethod::Nearest).unwrap();
            assert_eq!(dst.width(), 5 * s);
            assert_eq!(dst.height(), 3 * s);
            for y in 0..dst.height() {
                for x in 0..dst.width() {
                    assert_eq!(
                        dst.pixel(x, y).unwrap(),
                        src.pixel(x / s, y / s).unwrap(),
                        "scale {s} at ({x},{y})",
                    );
                }
            }
        }
    }

    #[test]
    fn nearest_uniform_red_scales_to_uniform_red() {
        let src = RasterBuffer::from_pixel(4, 4, [255, 0, 0, 255]);
        let dst = resample(&src, 2, ResampleMethod::Nearest).unwrap();
        assert_eq!(dst, RasterBuffer::from_pixel(8, 8, [255, 0, 0, 255]));
    }

    #[test]
    fn smooth_output_has_scaled_dimensions() {
        let src = gradient(7, 3);
        let dst = resample(&src, 3, ResampleMethod::Smooth).unwrap();
        assert_eq!((dst.width(), dst.height()), (21, 9));
    }

    #[test]
    fn smooth_spreads_a_single_bright_pixel() {
        let src = RasterBuffer::from_fn(10, 10, |x, y| {
            if (x, y) == (5, 5) {
                [255, 255, 255, 255]
            } else {
                [0, 0, 0, 255]
            }
        });
        let dst = resample(&src, 3, ResampleMethod::Smooth).unwrap();
        assert_eq!((dst.width(), dst.height()), (30, 30));

        // Count lit pixels in the neighbourhood of the original location.
        let mut lit = 0;
        let mut partial = 0;
        for y in 12..21 {
            for x in 12..21 {
                let v = dst.get(x, y, 0).unwrap();
                if v > 0 {
                    lit += 1;
                }
                if v > 0 && v < 255 {
                    partial += 1;
                }
            }
        }
        assert!(lit > 9, "expected the highlight to spread, got {lit} lit pixels");
        assert!(partial > 0, "expected blended intermediate values");
        // Far away the image stays black.
        assert_eq!(dst.get(0, 0, 0).unwrap(), 0);
        assert_eq!(dst.get(29, 29, 0).unwrap(), 0);
    }

    #[test]
    fn smooth_preserves_uniform_color() {
        let src = RasterBuffer::from_pixel(4, 4, [90, 140, 200, 255]);
        let dst = resample(&src, 2, ResampleMethod::Smooth).unwrap();
        assert_eq!(dst, RasterBuffer::from_pixel(8, 8, [90, 140, 200, 255]));
    }
}
