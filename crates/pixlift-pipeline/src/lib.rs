//! pixlift-pipeline: Deterministic RGBA filter pipeline for image
//! upscaling (sans-IO).
//!
//! Magnifies a raster by an integer factor and optionally runs a fixed
//! sequence of enhancement filters:
//! resample -> edge enhancement -> detail recovery -> denoise ->
//! detail enhance -> sharpen.
//!
//! Which stages run is decided by the [`Model`] and the toggles in
//! [`PipelineConfig`]; see [`pipeline::plan`]. No stage runs a learned
//! network.
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! [`RasterBuffer`]s; the [`codec`] module converts to and from encoded
//! bytes for hosts that need it.

pub mod codec;
pub mod convolve;
pub mod denoise;
pub mod diagnostics;
pub mod enhance;
pub mod pipeline;
pub mod raster;
pub mod resample;
pub mod tone;
pub mod types;

pub use denoise::DenoiseMethod;
pub use diagnostics::PipelineDiagnostics;
pub use enhance::SharpenMethod;
pub use pipeline::{CancelToken, Progress, Step, Upscaled, Upscaler, plan};
pub use raster::{MAX_PIXELS, RasterBuffer, clamp8};
pub use resample::ResampleMethod;
pub use tone::DetailMethod;
pub use types::{Dimensions, Model, PipelineConfig, PipelineError};

/// Run the full pipeline without progress reporting or cancellation.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidScaleFactor`] if `config.scale_factor`
/// is 0 or the output would overflow.
pub fn process(src: &RasterBuffer, config: &PipelineConfig) -> Result<RasterBuffer, PipelineError> {
    Upscaler::new()
        .run(src, config, &CancelToken::new(), |_| {})
        .map(|upscaled| upscaled.image)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn process_default_config_doubles_size() {
        let src = RasterBuffer::from_pixel(3, 4, [10, 20, 30, 255]);
        let out = process(&src, &PipelineConfig::default()).unwrap();
        assert_eq!((out.width(), out.height()), (6, 8));
    }

    #[test]
    fn process_rejects_zero_scale() {
        let src = RasterBuffer::new(2, 2);
        let config = PipelineConfig {
            scale_factor: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            process(&src, &config),
            Err(PipelineError::InvalidScaleFactor(0))
        ));
    }

    #[test]
    fn process_empty_buffer() {
        let src = RasterBuffer::new(0, 0);
        let out = process(&src, &PipelineConfig::default()).unwrap();
        assert_eq!((out.width(), out.height()), (0, 0));
    }
}
