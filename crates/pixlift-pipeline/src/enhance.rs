//! Sharpening and edge enhancement.
//!
//! Everything here except [`unsharp_mask`] is a fixed [`Kernel`] handed
//! to [`convolve`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::convolve::{Kernel, convolve, gaussian_blur};
use crate::raster::{CHANNELS, COLOR_CHANNELS, RasterBuffer, clamp8};
use crate::types::{PipelineError, deserialize_or_fallback};

/// Which sharpener the sharpen stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SharpenMethod {
    /// Unsharp mask with a radius-1 Gaussian and amount 0.5.
    #[default]
    UnsharpMask,
    /// The 3x3 sharpen kernel (center 5, four neighbors -1).
    Kernel,
}

impl fmt::Display for SharpenMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsharpMask => f.write_str("unsharp-mask"),
            Self::Kernel => f.write_str("kernel"),
        }
    }
}

impl FromStr for SharpenMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unsharp-mask" | "unsharp" => Ok(Self::UnsharpMask),
            "kernel" => Ok(Self::Kernel),
            _ => Err(PipelineError::UnsupportedConfig(format!(
                "unknown sharpen method `{s}`"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for SharpenMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_or_fallback(deserializer, Self::default())
    }
}

/// Default Gaussian radius for [`unsharp_mask`].
pub const UNSHARP_RADIUS: usize = 1;

/// Default amount for [`unsharp_mask`].
pub const UNSHARP_AMOUNT: f32 = 0.5;

/// Weight of the local-contrast term in [`recover_details`].
pub const DETAIL_RECOVERY_AMOUNT: f32 = 0.3;

/// Edge-enhancement tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EdgeStyle {
    /// Center weight 5 over a 3x3 window.
    #[default]
    Standard,
    /// Center weight 9 over a 5x5 window, for flat-shaded line art.
    Anime,
}

impl EdgeStyle {
    /// The convolution kernel for this style.
    #[must_use]
    pub fn kernel(self) -> Kernel {
        match self {
            Self::Standard => Kernel::edge_enhance(5.0, 1),
            Self::Anime => Kernel::edge_enhance(9.0, 2),
        }
    }
}

/// Run the sharpener selected by `method`.
#[must_use = "returns the sharpened buffer"]
pub fn sharpen(src: &RasterBuffer, method: SharpenMethod) -> RasterBuffer {
    match method {
        SharpenMethod::UnsharpMask => unsharp_mask(src, UNSHARP_RADIUS, UNSHARP_AMOUNT),
        SharpenMethod::Kernel => convolve(src, &Kernel::sharpen(), false),
    }
}

/// Strong 3x3 sharpen used to crisp up line art.
#[must_use = "returns the sharpened buffer"]
pub fn sharpen_line_art(src: &RasterBuffer) -> RasterBuffer {
    convolve(src, &Kernel::sharpen_strong(), false)
}

/// `out = o + (o - gaussian(o, radius)) * amount`, clamped.
///
/// Border pixels are untouched because the Gaussian leaves them equal
/// to the source.
#[must_use = "returns the sharpened buffer"]
pub fn unsharp_mask(src: &RasterBuffer, radius: usize, amount: f32) -> RasterBuffer {
    tracing::trace!(dims = %src.dimensions(), radius, amount, "unsharp mask");

    let blurred = gaussian_blur(src, radius);
    let mut dst = src.clone();
    let out = dst.samples_mut();
    for (px, (orig, blur)) in out.chunks_exact_mut(CHANNELS).zip(
        src.samples()
            .chunks_exact(CHANNELS)
            .zip(blurred.samples().chunks_exact(CHANNELS)),
    ) {
        for c in 0..COLOR_CHANNELS {
            let o = f32::from(orig[c]);
            let b = f32::from(blur[c]);
            px[c] = clamp8((o - b).mul_add(amount, o));
        }
    }
    dst
}

/// Edge enhancement with the kernel for `style`.
///
/// The kernel weights do not sum to 1, so flat areas come out brighter.
#[must_use = "returns the enhanced buffer"]
pub fn edge_enhance(src: &RasterBuffer, style: EdgeStyle) -> RasterBuffer {
    tracing::trace!(dims = %src.dimensions(), ?style, "edge enhance");
    convolve(src, &style.kernel(), false)
}

/// Detail recovery: `out = o + (o - mean5x5) * 0.3`.
#[must_use = "returns the enhanced buffer"]
pub fn recover_details(src: &RasterBuffer) -> RasterBuffer {
    tracing::trace!(dims = %src.dimensions(), "detail recovery");
    convolve(src, &Kernel::detail_recovery(DETAIL_RECOVERY_AMOUNT), false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn step_edge() -> RasterBuffer {
        RasterBuffer::from_fn(10, 10, |x, _| {
            if x < 5 {
                [20, 20, 20, 255]
            } else {
                [230, 230, 230, 255]
            }
        })
    }

    // --- SharpenMethod tests ---

    #[test]
    fn default_method_is_unsharp_mask() {
        assert_eq!(SharpenMethod::default(), SharpenMethod::UnsharpMask);
    }

    #[test]
    fn method_names_round_trip() {
        for method in [SharpenMethod::UnsharpMask, SharpenMethod::Kernel] {
            assert_eq!(method.to_string().parse::<SharpenMethod>().unwrap(), method);
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{method}\""));
        }
    }

    // --- sharpen tests ---

    #[test]
    fn sharpen_flat_region_is_unchanged() {
        let src = RasterBuffer::from_pixel(9, 9, [128, 64, 32, 255]);
        assert_eq!(sharpen(&src, SharpenMethod::UnsharpMask), src);
        assert_eq!(sharpen(&src, SharpenMethod::Kernel), src);
        assert_eq!(sharpen_line_art(&src), src);
    }

    #[test]
    fn sharpen_increases_edge_contrast() {
        let src = step_edge();
        for method in [SharpenMethod::UnsharpMask, SharpenMethod::Kernel] {
            let dst = sharpen(&src, method);
            let dark = dst.get(4, 5, 0).unwrap();
            let bright = dst.get(5, 5, 0).unwrap();
            assert!(dark < 20, "{method}: dark side {dark}");
            assert!(bright > 230, "{method}: bright side {bright}");
        }
    }

    #[test]
    fn unsharp_zero_amount_is_identity() {
        let src = step_edge();
        assert_eq!(unsharp_mask(&src, 1, 0.0), src);
    }

    #[test]
    fn unsharp_keeps_alpha() {
        let src = RasterBuffer::from_fn(6, 6, |x, y| {
            if x > 2 {
                [255, 0, 0, 77]
            } else {
                [0, 0, 255, u8::try_from(y * 10).unwrap()]
            }
        });
        let dst = unsharp_mask(&src, UNSHARP_RADIUS, UNSHARP_AMOUNT);
        for (a, b) in src.samples().chunks(4).zip(dst.samples().chunks(4)) {
            assert_eq!(a[3], b[3]);
        }
    }

    // --- edge enhance tests ---

    #[test]
    fn edge_enhance_standard_triples_flat_interior() {
        let src = RasterBuffer::from_pixel(5, 5, [40, 40, 40, 255]);
        let dst = edge_enhance(&src, EdgeStyle::Standard);
        assert_eq!(dst.pixel(2, 2).unwrap(), [120, 120, 120, 255]);
        assert_eq!(dst.pixel(0, 0).unwrap(), [40, 40, 40, 255]);
    }

    #[test]
    fn edge_enhance_anime_uses_wider_window() {
        // Anime: 9c - 24c/16 = 7.5c on flat input; standard border is 1
        // pixel, anime border is 2.
        let src = RasterBuffer::from_pixel(7, 7, [20, 20, 20, 255]);
        let dst = edge_enhance(&src, EdgeStyle::Anime);
        assert_eq!(dst.get(3, 3, 0).unwrap(), 150);
        assert_eq!(dst.get(1, 3, 0).unwrap(), 20);
        assert_eq!(dst.get(2, 3, 0).unwrap(), 150);
    }

    // --- detail recovery tests ---

    #[test]
    fn recover_details_keeps_flat_regions() {
        let src = RasterBuffer::from_pixel(8, 8, [10, 200, 90, 255]);
        assert_eq!(recover_details(&src), src);
    }

    #[test]
    fn recover_details_amplifies_local_contrast() {
        let src = step_edge();
        let dst = recover_details(&src);
        assert!(dst.get(4, 5, 0).unwrap() < 20);
        assert!(dst.get(5, 5, 0).unwrap() > 230);
    }
}
