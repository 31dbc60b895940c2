//! Noise reduction.
//!
//! The canonical denoiser is a bilateral filter: each neighbor is
//! weighted by both its distance and its color difference from the
//! center, so flat regions are smoothed while strong edges survive. A
//! plain box blur is available as the cheaper alternative.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::convolve::{box_blur, interior};
use crate::raster::{COLOR_CHANNELS, RasterBuffer, clamp8};
use crate::types::{PipelineError, deserialize_or_fallback};

/// Which denoiser the denoise stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DenoiseMethod {
    /// Edge-preserving bilateral filter with the default sigmas.
    #[default]
    Bilateral,
    /// Box blur over the denoise window.
    Box,
}

impl fmt::Display for DenoiseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bilateral => f.write_str("bilateral"),
            Self::Box => f.write_str("box"),
        }
    }
}

impl FromStr for DenoiseMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bilateral" => Ok(Self::Bilateral),
            "box" => Ok(Self::Box),
            _ => Err(PipelineError::UnsupportedConfig(format!(
                "unknown denoise method `{s}`"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for DenoiseMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_or_fallback(deserializer, Self::default())
    }
}

/// Parameters for [`bilateral`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilateralParams {
    /// Window radius in pixels.
    pub radius: usize,
    /// Color (range) standard deviation, in sample units.
    pub sigma_color: f32,
    /// Spatial standard deviation, in pixels.
    pub sigma_space: f32,
}

impl BilateralParams {
    /// Default window radius.
    pub const DEFAULT_RADIUS: usize = 1;
    /// Default color sigma.
    pub const DEFAULT_SIGMA_COLOR: f32 = 10.0;
    /// Default spatial sigma.
    pub const DEFAULT_SIGMA_SPACE: f32 = 10.0;
}

impl Default for BilateralParams {
    fn default() -> Self {
        Self {
            radius: Self::DEFAULT_RADIUS,
            sigma_color: Self::DEFAULT_SIGMA_COLOR,
            sigma_space: Self::DEFAULT_SIGMA_SPACE,
        }
    }
}

/// Run the denoiser selected by `method` with a `(2r+1)^2` window.
///
/// The bilateral filter keeps its default sigmas; only the window
/// grows with `radius`. Radius 0 is the identity.
#[must_use = "returns the denoised buffer"]
pub fn denoise(src: &RasterBuffer, method: DenoiseMethod, radius: usize) -> RasterBuffer {
    match method {
        DenoiseMethod::Bilateral => bilateral(
            src,
            &BilateralParams {
                radius,
                ..BilateralParams::default()
            },
        ),
        DenoiseMethod::Box => box_blur(src, radius),
    }
}

/// Bilateral filter over the color channels.
///
/// For each interior pixel and each of R, G, B independently, every
/// neighbor in the `(2r+1)^2` window contributes with weight
/// `exp(-dc^2 / 2sc^2) * exp(-ds^2 / 2ss^2)`, where `dc` is the sample
/// difference from the center and `ds` the Euclidean pixel distance.
/// Border pixels and alpha are copied unchanged.
#[must_use = "returns the denoised buffer"]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn bilateral(src: &RasterBuffer, params: &BilateralParams) -> RasterBuffer {
    tracing::trace!(
        dims = %src.dimensions(),
        radius = params.radius,
        sigma_color = params.sigma_color,
        sigma_space = params.sigma_space,
        "bilateral denoise",
    );

    let mut dst = src.clone();
    let radius = params.radius;
    let (Some(rows), Some(cols)) = (interior(src.height(), radius), interior(src.width(), radius))
    else {
        return dst;
    };

    let color_denom = 2.0 * params.sigma_color * params.sigma_color;
    let size = 2 * radius + 1;

    // Spatial weights depend only on the offset.
    let r = radius as isize;
    let space_denom = 2.0 * params.sigma_space * params.sigma_space;
    let spatial: Vec<f32> = (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (dx * dx + dy * dy) as f32))
        .map(|d2| (-d2 / space_denom).exp())
        .collect();

    let samples = src.samples();
    let out = dst.samples_mut();
    for y in rows {
        for x in cols.clone() {
            let center = src.index(x, y, 0);
            for c in 0..COLOR_CHANNELS {
                let cv = f32::from(samples[center + c]);
                let mut acc = 0.0f32;
                let mut total = 0.0f32;
                for ky in 0..size {
                    for kx in 0..size {
                        let nv = f32::from(samples[src.index(x + kx - radius, y + ky - radius, c)]);
                        let dc = nv - cv;
                        let w = (-(dc * dc) / color_denom).exp() * spatial[ky * size + kx];
                        acc += nv * w;
                        total += w;
                    }
                }
                // The center always contributes weight 1, so `total > 0`.
                out[center + c] = clamp8(acc / total);
            }
        }
    }
    dst
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_possible_truncation)]
mod tests {
    use super::*;

    fn outlier() -> RasterBuffer {
        RasterBuffer::from_fn(9, 9, |x, y| {
            if (x, y) == (4, 4) {
                [250, 250, 250, 255]
            } else {
                [100, 100, 100, 255]
            }
        })
    }

    // --- DenoiseMethod tests ---

    #[test]
    fn default_method_is_bilateral() {
        assert_eq!(DenoiseMethod::default(), DenoiseMethod::Bilateral);
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("BOX".parse::<DenoiseMethod>().unwrap(), DenoiseMethod::Box);
        assert_eq!(
            "bilateral".parse::<DenoiseMethod>().unwrap(),
            DenoiseMethod::Bilateral
        );
        assert!("median".parse::<DenoiseMethod>().is_err());
    }

    #[test]
    fn method_serde_uses_lowercase_names() {
        assert_eq!(
            serde_json::to_string(&DenoiseMethod::Box).unwrap(),
            "\"box\""
        );
    }

    // --- bilateral tests ---

    #[test]
    fn bilateral_default_params() {
        let p = BilateralParams::default();
        assert_eq!(p.radius, 1);
        assert!((p.sigma_color - 10.0).abs() < f32::EPSILON);
        assert!((p.sigma_space - 10.0).abs() < f32::EPSILON);
    }

    #[test]
    fn bilateral_flat_color_is_unchanged() {
        let src = RasterBuffer::from_pixel(7, 7, [33, 66, 99, 128]);
        assert_eq!(bilateral(&src, &BilateralParams::default()), src);
    }

    #[test]
    fn bilateral_preserves_edges_better_than_box_blur() {
        let src = outlier();

        let boxed = denoise(&src, DenoiseMethod::Box, 1);
        let filtered = denoise(&src, DenoiseMethod::Bilateral, 1);

        // Neighbor of the outlier: the box blur drags it up by ~17, the
        // bilateral filter almost ignores the 150-level jump.
        let box_shift = boxed.get(3, 4, 0).unwrap().abs_diff(100);
        let bilateral_shift = filtered.get(3, 4, 0).unwrap().abs_diff(100);
        assert!(box_shift >= 15, "box moved neighbor by {box_shift}");
        assert!(bilateral_shift <= 1, "bilateral moved neighbor by {bilateral_shift}");

        // The outlier itself survives the bilateral filter.
        assert_eq!(filtered.get(4, 4, 0).unwrap(), 250);
        assert!(boxed.get(4, 4, 0).unwrap() < 130);
    }

    #[test]
    fn bilateral_smooths_small_variations() {
        // ±4 checkerboard noise is well inside sigma_color.
        let src = RasterBuffer::from_fn(8, 8, |x, y| {
            let v = if (x + y) % 2 == 0 { 104 } else { 96 };
            [v, v, v, 255]
        });
        let dst = bilateral(&src, &BilateralParams::default());
        let before = src.get(3, 3, 0).unwrap().abs_diff(100);
        let after = dst.get(3, 3, 0).unwrap().abs_diff(100);
        assert!(after < before, "expected smoothing: {before} -> {after}");
    }

    #[test]
    fn bilateral_leaves_border_and_alpha_alone() {
        let src = RasterBuffer::from_fn(6, 5, |x, y| {
            [(x * 40) as u8, (y * 50) as u8, ((x + y) * 20) as u8, (10 * x + y) as u8]
        });
        let dst = bilateral(&src, &BilateralParams::default());
        for y in 0..5 {
            for x in 0..6 {
                let px = dst.pixel(x, y).unwrap();
                assert_eq!(px[3], src.pixel(x, y).unwrap()[3]);
                if x == 0 || y == 0 || x == 5 || y == 4 {
                    assert_eq!(px, src.pixel(x, y).unwrap());
                }
            }
        }
    }

    #[test]
    fn tiny_buffer_is_unchanged() {
        let src = RasterBuffer::from_pixel(2, 9, [1, 2, 3, 4]);
        assert_eq!(denoise(&src, DenoiseMethod::Bilateral, 1), src);
        assert_eq!(denoise(&src, DenoiseMethod::Box, 1), src);
    }

    // --- radius tests ---

    #[test]
    fn zero_radius_is_identity() {
        let src = outlier();
        assert_eq!(denoise(&src, DenoiseMethod::Box, 0), src);
        assert_eq!(denoise(&src, DenoiseMethod::Bilateral, 0), src);
    }

    #[test]
    fn wider_box_window_spreads_further() {
        let src = outlier();
        let narrow = denoise(&src, DenoiseMethod::Box, 1);
        let wide = denoise(&src, DenoiseMethod::Box, 2);

        // Two pixels from the outlier: outside the 3x3 window, inside the 5x5.
        assert_eq!(narrow.get(2, 4, 0).unwrap(), 100);
        assert_eq!(wide.get(2, 4, 0).unwrap(), 106);
        // The border band widens with the window.
        assert_eq!(wide.pixel(1, 4).unwrap(), src.pixel(1, 4).unwrap());
    }

    #[test]
    fn unknown_method_name_deserializes_to_default() {
        let method: DenoiseMethod = serde_json::from_str("\"median\"").unwrap();
        assert_eq!(method, DenoiseMethod::Bilateral);
        let method: DenoiseMethod = serde_json::from_str("\"Box\"").unwrap();
        assert_eq!(method, DenoiseMethod::Box);
    }
}
