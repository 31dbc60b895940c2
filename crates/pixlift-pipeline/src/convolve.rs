//! Windowed-kernel convolution over RGBA buffers.
//!
//! Every windowed filter in the pipeline except the bilateral denoiser
//! is a [`Kernel`] handed to [`convolve`], or, for the Gaussian, the
//! separable two-pass variant in [`gaussian_blur`].
//!
//! # Border policy
//!
//! Only interior pixels are written. A pixel closer than the kernel
//! radius to any edge is copied unchanged from the source, so the
//! engine never reads outside the buffer and never pads. A buffer too
//! small to have an interior comes back unchanged.
//!
//! Only R, G and B are filtered; alpha is always passed through.

use crate::raster::{COLOR_CHANNELS, RasterBuffer, clamp8};
use crate::types::PipelineError;

/// A square, odd-sized convolution kernel stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    weights: Vec<f32>,
    size: usize,
}

impl Kernel {
    /// Create a kernel from row-major weights.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedConfig`] if `size` is even or
    /// zero, or if `weights.len() != size * size`.
    pub fn new(weights: Vec<f32>, size: usize) -> Result<Self, PipelineError> {
        if size % 2 == 0 {
            return Err(PipelineError::UnsupportedConfig(format!(
                "kernel size must be odd, got {size}"
            )));
        }
        if weights.len() != size * size {
            return Err(PipelineError::UnsupportedConfig(format!(
                "kernel has {} weights, expected {size}x{size}",
                weights.len()
            )));
        }
        Ok(Self { weights, size })
    }

    /// Create a kernel from a 2-D array of rows.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedConfig`] if the rows are
    /// ragged, the kernel is not square, or its size is even.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self, PipelineError> {
        let size = rows.len();
        if let Some(bad) = rows.iter().position(|r| r.as_ref().len() != size) {
            return Err(PipelineError::UnsupportedConfig(format!(
                "kernel row {bad} has {} weights, expected {size}",
                rows[bad].as_ref().len()
            )));
        }
        let weights = rows.iter().flat_map(|r| r.as_ref().iter().copied()).collect();
        Self::new(weights, size)
    }

    /// 3x3 sharpen: center 5, the four edge neighbors -1.
    #[must_use]
    pub fn sharpen() -> Self {
        Self {
            weights: vec![
                0.0, -1.0, 0.0, //
                -1.0, 5.0, -1.0, //
                0.0, -1.0, 0.0,
            ],
            size: 3,
        }
    }

    /// Strong 3x3 sharpen: center 9, all eight neighbors -1.
    #[must_use]
    pub fn sharpen_strong() -> Self {
        let mut weights = vec![-1.0; 9];
        weights[4] = 9.0;
        Self { weights, size: 3 }
    }

    /// Uniform `(2r+1) x (2r+1)` averaging window.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn box_blur(radius: usize) -> Self {
        let size = 2 * radius + 1;
        let count = size * size;
        Self {
            weights: vec![1.0 / count as f32; count],
            size,
        }
    }

    /// Edge-enhancement window: `center * k` minus every neighbor in a
    /// `(2*reach+1)^2` window divided by `reach^2 * 4`.
    ///
    /// The weights do not sum to 1, so flat regions are brightened. This
    /// is the characteristic look of the line-art passes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn edge_enhance(center: f32, reach: usize) -> Self {
        let reach = reach.max(1);
        let size = 2 * reach + 1;
        let neighbor = -1.0 / (reach * reach * 4) as f32;
        let mut weights = vec![neighbor; size * size];
        weights[size * size / 2] = center;
        Self { weights, size }
    }

    /// High-pass emphasis: `o + (o - mean5x5) * amount`.
    #[must_use]
    pub fn detail_recovery(amount: f32) -> Self {
        const SIZE: usize = 5;
        const COUNT: f32 = 25.0;
        let neighbor = -amount / COUNT;
        let mut weights = vec![neighbor; SIZE * SIZE];
        weights[SIZE * SIZE / 2] = 1.0 + amount - amount / COUNT;
        Self {
            weights,
            size: SIZE,
        }
    }

    /// Side length.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Half the side length, rounded down.
    #[must_use]
    pub const fn radius(&self) -> usize {
        self.size / 2
    }

    /// Row-major weights.
    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Sum of all weights.
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.weights.iter().sum()
    }

    /// Weight at offset `(dx, dy)` from the center.
    #[must_use]
    pub fn weight(&self, dx: isize, dy: isize) -> Option<f32> {
        let r = self.radius().cast_signed();
        if dx.abs() > r || dy.abs() > r {
            return None;
        }
        let col = (dx + r).cast_unsigned();
        let row = (dy + r).cast_unsigned();
        Some(self.weights[row * self.size + col])
    }
}

/// Interior coordinate range along one axis, or `None` if the axis is
/// too short to have one.
pub(crate) const fn interior(len: u32, radius: usize) -> Option<std::ops::Range<usize>> {
    let len = len as usize;
    if len <= 2 * radius {
        return None;
    }
    Some(radius..len - radius)
}

/// Convolve the color channels of `src` with `kernel`.
///
/// With `normalize` set, weights are divided by their sum (when the sum
/// is not zero) before use.
#[must_use = "returns the filtered buffer"]
pub fn convolve(src: &RasterBuffer, kernel: &Kernel, normalize: bool) -> RasterBuffer {
    tracing::trace!(
        dims = %src.dimensions(),
        size = kernel.size(),
        normalize,
        "convolve",
    );

    let mut dst = src.clone();
    let radius = kernel.radius();
    let (Some(rows), Some(cols)) = (interior(src.height(), radius), interior(src.width(), radius))
    else {
        return dst;
    };

    let sum = kernel.sum();
    let scale = if normalize && sum.abs() > f32::EPSILON {
        sum.recip()
    } else {
        1.0
    };

    let size = kernel.size();
    let samples = src.samples();
    let out = dst.samples_mut();
    for y in rows {
        for x in cols.clone() {
            let mut acc = [0.0f32; COLOR_CHANNELS];
            for ky in 0..size {
                let sy = y + ky - radius;
                for kx in 0..size {
                    let w = kernel.weights[ky * size + kx];
                    let idx = src.index(x + kx - radius, sy, 0);
                    for (c, a) in acc.iter_mut().enumerate() {
                        *a += f32::from(samples[idx + c]) * w;
                    }
                }
            }
            let idx = src.index(x, y, 0);
            for (c, a) in acc.iter().enumerate() {
                out[idx + c] = clamp8(a * scale);
            }
        }
    }
    dst
}

/// Box blur with a `(2r+1) x (2r+1)` window.
#[must_use = "returns the blurred buffer"]
pub fn box_blur(src: &RasterBuffer, radius: usize) -> RasterBuffer {
    tracing::trace!(dims = %src.dimensions(), radius, "box blur");
    convolve(src, &Kernel::box_blur(radius), false)
}

/// Normalized 1-D Gaussian weights for `radius`, with `sigma = radius/3`.
///
/// Radius 0 yields the identity kernel `[1.0]`.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn gaussian_kernel_1d(radius: usize) -> Vec<f32> {
    if radius == 0 {
        return vec![1.0];
    }
    let sigma = radius as f32 / 3.0;
    let denom = 2.0 * sigma * sigma;
    let r = radius as isize;
    let mut kernel: Vec<f32> = (-r..=r)
        .map(|i| {
            let i = i as f32;
            (-(i * i) / denom).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Separable Gaussian blur: a horizontal pass then a vertical pass over
/// the intermediate, `O(r)` per pixel per pass.
///
/// The horizontal pass fills every row for the interior columns so the
/// vertical pass has a full window; only pixels interior in both axes
/// are written to the output.
#[must_use = "returns the blurred buffer"]
pub fn gaussian_blur(src: &RasterBuffer, radius: usize) -> RasterBuffer {
    tracing::trace!(dims = %src.dimensions(), radius, "gaussian blur");

    let mut dst = src.clone();
    let (Some(rows), Some(cols)) = (interior(src.height(), radius), interior(src.width(), radius))
    else {
        return dst;
    };
    let kernel = gaussian_kernel_1d(radius);
    let width = src.width() as usize;
    let height = src.height() as usize;
    let samples = src.samples();

    // Horizontal pass into an f32 intermediate, one value per color
    // sample. Columns outside `cols` are never read by the vertical pass.
    let mut temp = vec![0.0f32; width * height * COLOR_CHANNELS];
    for y in 0..height {
        for x in cols.clone() {
            let mut acc = [0.0f32; COLOR_CHANNELS];
            for (k, &w) in kernel.iter().enumerate() {
                let idx = src.index(x + k - radius, y, 0);
                for (c, a) in acc.iter_mut().enumerate() {
                    *a += f32::from(samples[idx + c]) * w;
                }
            }
            let t = (y * width + x) * COLOR_CHANNELS;
            temp[t..t + COLOR_CHANNELS].copy_from_slice(&acc);
        }
    }

    // Vertical pass over the intermediate.
    let out = dst.samples_mut();
    for y in rows {
        for x in cols.clone() {
            let mut acc = [0.0f32; COLOR_CHANNELS];
            for (k, &w) in kernel.iter().enumerate() {
                let t = ((y + k - radius) * width + x) * COLOR_CHANNELS;
                for (c, a) in acc.iter_mut().enumerate() {
                    *a += temp[t + c] * w;
                }
            }
            let idx = src.index(x, y, 0);
            for (c, a) in acc.iter().enumerate() {
                out[idx + c] = clamp8(*a);
            }
        }
    }
    dst
}
