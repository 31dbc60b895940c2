//! Pointwise tone and color adjustments.
//!
//! These stages mutate the buffer in place. Only R, G and B are touched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::raster::{CHANNELS, COLOR_CHANNELS, RasterBuffer, clamp8};
use crate::types::{PipelineError, deserialize_or_fallback};

/// Default multiplier for [`contrast_boost`].
pub const DEFAULT_CONTRAST_FACTOR: f32 = 1.05;

/// Default amount for [`saturation_boost`].
pub const DEFAULT_SATURATION_AMOUNT: f32 = 1.2;

/// Pixels whose channel spread (`max - min`) is at or below this are
/// treated as gray and left alone by [`saturation_boost`].
pub const DEFAULT_SATURATION_THRESHOLD: u8 = 10;

/// Which tone adjustment the detail-enhance stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetailMethod {
    /// Smooth S-shaped contrast curve.
    #[default]
    SCurve,
    /// Multiply every sample by [`DEFAULT_CONTRAST_FACTOR`].
    LinearContrast,
}

impl fmt::Display for DetailMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SCurve => f.write_str("s-curve"),
            Self::LinearContrast => f.write_str("linear-contrast"),
        }
    }
}

impl FromStr for DetailMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s-curve" | "scurve" => Ok(Self::SCurve),
            "linear-contrast" | "linear" | "contrast" => Ok(Self::LinearContrast),
            _ => Err(PipelineError::UnsupportedConfig(format!(
                "unknown detail method `{s}`"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for DetailMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_or_fallback(deserializer, Self::default())
    }
}

/// Run the adjustment selected by `method`.
pub fn enhance_detail(buffer: &mut RasterBuffer, method: DetailMethod) {
    match method {
        DetailMethod::SCurve => s_curve_contrast(buffer),
        DetailMethod::LinearContrast => contrast_boost(buffer, DEFAULT_CONTRAST_FACTOR),
    }
}

/// `c = clamp8(c * factor)` for every color sample.
pub fn contrast_boost(buffer: &mut RasterBuffer, factor: f32) {
    tracing::trace!(dims = %buffer.dimensions(), factor, "contrast boost");
    let mut lut = [0u8; 256];
    for (v, out) in (0u8..=255).zip(lut.iter_mut()) {
        *out = clamp8(f32::from(v) * factor);
    }
    apply_lut(buffer, &lut);
}

/// Apply the ease-in-out quadratic curve
/// `x < 0.5 ? 2x^2 : 1 - (-2x + 2)^2 / 2` to every color sample.
pub fn s_curve_contrast(buffer: &mut RasterBuffer) {
    tracing::trace!(dims = %buffer.dimensions(), "s-curve contrast");
    apply_lut(buffer, &s_curve_lut());
}

/// The 256-entry lookup table for [`s_curve_contrast`].
#[must_use]
pub fn s_curve_lut() -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (v, out) in (0u8..=255).zip(lut.iter_mut()) {
        let x = f32::from(v) / 255.0;
        let y = if x < 0.5 {
            2.0 * x * x
        } else {
            let t = (-2.0f32).mul_add(x, 2.0);
            1.0 - t * t / 2.0
        };
        *out = clamp8(y * 255.0);
    }
    lut
}

fn apply_lut(buffer: &mut RasterBuffer, lut: &[u8; 256]) {
    for px in buffer.samples_mut().chunks_exact_mut(CHANNELS) {
        for s in &mut px[..COLOR_CHANNELS] {
            *s = lut[usize::from(*s)];
        }
    }
}

/// Push each channel away from the pixel's mean: `c = c + (c - mean) * amount`.
///
/// Pixels with `max - min <= threshold` are left unchanged, so grays stay
/// gray.
pub fn saturation_boost(buffer: &mut RasterBuffer, amount: f32, threshold: u8) {
    tracing::trace!(dims = %buffer.dimensions(), amount, threshold, "saturation boost");
    for px in buffer.samples_mut().chunks_exact_mut(CHANNELS) {
        let rgb = &mut px[..COLOR_CHANNELS];
        let (min, max) = rgb
            .iter()
            .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if max - min <= threshold {
            continue;
        }
        let mean = rgb.iter().map(|&v| f32::from(v)).sum::<f32>() / 3.0;
        for s in rgb {
            let c = f32::from(*s);
            *s = clamp8((c - mean).mul_add(amount, c));
        }
    }
}
