//! Stage sequencing, progress reporting and cancellation.
//!
//! A run is planned up front by [`plan`], which maps a
//! [`PipelineConfig`] to an ordered list of [`Step`]s. [`Upscaler::run`]
//! then executes the steps strictly in order:
//!
//! ```text
//! Idle -> Resampling -> (Denoise?) -> (DetailEnhance?) -> (Sharpen?) -> Complete
//!                 \________________________________________________/
//!                                   |
//!                          Failed / Cancelled
//! ```
//!
//! The caller's source buffer is only ever borrowed, so neither an
//! error nor a cancellation can leave it partially processed.
//!
//! ```rust
//! # use pixlift_pipeline::{CancelToken, PipelineConfig, PipelineError, RasterBuffer, Upscaler};
//! # fn run() -> Result<(), PipelineError> {
//! let src = RasterBuffer::from_pixel(4, 4, [255, 0, 0, 255]);
//! let upscaler = Upscaler::new();
//! let cancel = CancelToken::new();
//! let upscaled = upscaler.run(&src, &PipelineConfig::default(), &cancel, |p| {
//!     println!("{:>3}% {}", p.percent, p.message);
//! })?;
//! assert_eq!(upscaled.image.width(), 8);
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use web_time::Instant;

use crate::denoise::{DenoiseMethod, denoise};
use crate::diagnostics::{PipelineDiagnostics, StageDiagnostics};
use crate::enhance::{
    EdgeStyle, SharpenMethod, edge_enhance, recover_details, sharpen, sharpen_line_art,
};
use crate::raster::RasterBuffer;
use crate::resample::{ResampleMethod, resample};
use crate::tone::{
    DEFAULT_SATURATION_AMOUNT, DEFAULT_SATURATION_THRESHOLD, DetailMethod, enhance_detail,
    saturation_boost,
};
use crate::types::{Model, PipelineConfig, PipelineError};

// ───────────────────────── Progress ──────────────────────────

/// A progress report delivered at a stage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Machine-readable stage name.
    pub stage: &'static str,
    /// Overall completion, `0..=100`. Never decreases within a run.
    pub percent: u8,
    /// Human-readable status line.
    pub message: &'static str,
}

impl Progress {
    /// Reported once the config has been validated.
    pub const INITIALIZE: Self = Self {
        stage: "initialize",
        percent: 10,
        message: "Initializing upscaler...",
    };

    /// Reported after the last stage, before the final cancellation check.
    pub const FINALIZE: Self = Self {
        stage: "finalize",
        percent: 95,
        message: "Finalizing...",
    };

    /// Reported immediately before a successful run returns.
    pub const COMPLETE: Self = Self {
        stage: "complete",
        percent: 100,
        message: "Processing complete!",
    };
}

// ───────────────────────── Plan ──────────────────────────

/// One stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Saturation boost on a copy of the source, before resampling.
    SaturationBoost,
    /// Integer-factor magnification.
    Resample(ResampleMethod),
    /// Edge-enhancement kernel.
    EdgeEnhance(EdgeStyle),
    /// `o + (o - mean5x5) * 0.3`.
    DetailRecovery,
    /// Strong 3x3 sharpen for line art.
    LineArtSharpen,
    /// Optional denoise with a `(2r+1)^2` window.
    Denoise {
        /// Which denoiser runs.
        method: DenoiseMethod,
        /// Window radius in pixels.
        radius: usize,
    },
    /// Optional tone curve.
    DetailEnhance(DetailMethod),
    /// Optional sharpen.
    Sharpen(SharpenMethod),
}

impl Step {
    /// Machine-readable stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SaturationBoost => "saturation",
            Self::Resample(_) => "resample",
            Self::EdgeEnhance(_) => "edge-enhance",
            Self::DetailRecovery => "detail-recovery",
            Self::LineArtSharpen => "line-art-sharpen",
            Self::Denoise { .. } => "denoise",
            Self::DetailEnhance(_) => "detail-enhance",
            Self::Sharpen(_) => "sharpen",
        }
    }

    /// Completion percentage reported when this step starts.
    #[must_use]
    pub const fn percent(self) -> u8 {
        match self {
            Self::SaturationBoost => 20,
            Self::Resample(_) => 30,
            Self::EdgeEnhance(_) => 50,
            Self::DetailRecovery => 60,
            Self::LineArtSharpen => 70,
            Self::Denoise { .. } => 80,
            Self::DetailEnhance(_) => 85,
            Self::Sharpen(_) => 90,
        }
    }

    /// Human-readable status line.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::SaturationBoost => "Boosting color saturation...",
            Self::Resample(ResampleMethod::Nearest) => "Upscaling with nearest-neighbor sampling...",
            Self::Resample(ResampleMethod::Smooth) => "Upscaling with bicubic interpolation...",
            Self::Resample(ResampleMethod::Lanczos) => "Upscaling with Lanczos interpolation...",
            Self::EdgeEnhance(_) => "Enhancing edges...",
            Self::DetailRecovery => "Recovering details...",
            Self::LineArtSharpen => "Sharpening line art...",
            Self::Denoise { .. } => "Applying denoising...",
            Self::DetailEnhance(_) => "Enhancing details...",
            Self::Sharpen(_) => "Sharpening image...",
        }
    }

    /// The progress report for the start of this step.
    #[must_use]
    pub const fn progress(self) -> Progress {
        Progress {
            stage: self.name(),
            percent: self.percent(),
            message: self.message(),
        }
    }

    /// Compact parameter summary for diagnostics.
    #[must_use]
    pub fn detail(self, scale_factor: u32) -> String {
        match self {
            Self::SaturationBoost => format!(
                "amount={DEFAULT_SATURATION_AMOUNT} threshold={DEFAULT_SATURATION_THRESHOLD}"
            ),
            Self::Resample(method) => format!("method={method} x{scale_factor}"),
            Self::EdgeEnhance(EdgeStyle::Standard) => "style=standard".to_string(),
            Self::EdgeEnhance(EdgeStyle::Anime) => "style=anime".to_string(),
            Self::DetailRecovery | Self::LineArtSharpen => String::new(),
            Self::Denoise { method, radius } => format!("method={method} radius={radius}"),
            Self::DetailEnhance(method) => format!("method={method}"),
            Self::Sharpen(method) => format!("method={method}"),
        }
    }

    /// Run this step.
    ///
    /// Pointwise steps reuse `input` when it is already owned; windowed
    /// steps read it and allocate a new buffer.
    fn apply(
        self,
        input: Cow<'_, RasterBuffer>,
        scale_factor: u32,
    ) -> Result<RasterBuffer, PipelineError> {
        Ok(match self {
            Self::SaturationBoost => {
                let mut buffer = input.into_owned();
                saturation_boost(
                    &mut buffer,
                    DEFAULT_SATURATION_AMOUNT,
                    DEFAULT_SATURATION_THRESHOLD,
                );
                buffer
            }
            Self::Resample(method) => resample(&input, scale_factor, method)?,
            Self::EdgeEnhance(style) => edge_enhance(&input, style),
            Self::DetailRecovery => recover_details(&input),
            Self::LineArtSharpen => sharpen_line_art(&input),
            Self::Denoise { method, radius } => denoise(&input, method, radius),
            Self::DetailEnhance(method) => {
                let mut buffer = input.into_owned();
                enhance_detail(&mut buffer, method);
                buffer
            }
            Self::Sharpen(method) => sharpen(&input, method),
        })
    }
}

/// The ordered stage list for `config`.
///
/// The model selects the core sequence; the enhancement toggles then
/// append denoise, detail enhance and sharpen in that order. Every plan
/// contains exactly one [`Step::Resample`].
#[must_use]
pub fn plan(config: &PipelineConfig) -> Vec<Step> {
    let mut steps = match config.model {
        Model::Bicubic => vec![Step::Resample(config.resample_method)],
        Model::Lanczos => vec![Step::Resample(ResampleMethod::Lanczos)],
        Model::Esrgan | Model::RealEsrgan => vec![
            Step::Resample(ResampleMethod::Smooth),
            Step::EdgeEnhance(EdgeStyle::Standard),
            Step::DetailRecovery,
        ],
        Model::Waifu2x => vec![
            Step::SaturationBoost,
            Step::Resample(ResampleMethod::Smooth),
            Step::EdgeEnhance(EdgeStyle::Anime),
            Step::DetailRecovery,
            Step::LineArtSharpen,
        ],
    };
    if config.enable_denoise {
        steps.push(Step::Denoise {
            method: config.denoise_method,
            radius: config.denoise_radius,
        });
    }
    if config.enable_detail_enhance {
        steps.push(Step::DetailEnhance(config.detail_method));
    }
    if config.enable_sharpen {
        steps.push(Step::Sharpen(config.sharpen_method));
    }
    steps
}

// ───────────────────────── Cancellation ──────────────────────────

/// Cooperative cancellation flag shared between a run and its caller.
///
/// Clones share the same flag. The run checks it before every stage and
/// once more before returning, so cancellation takes effect at the next
/// stage boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` if cancellation has been requested.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] once [`cancel`](Self::cancel)
    /// has been called on any clone.
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

// ───────────────────────── Upscaler ──────────────────────────

/// The output of a successful run.
#[derive(Debug, Clone)]
pub struct Upscaled {
    /// The final buffer, `scale_factor` times the source in each axis.
    pub image: RasterBuffer,
    /// Per-stage timing.
    pub diagnostics: PipelineDiagnostics,
}

/// Runs the pipeline, one run at a time.
#[derive(Debug, Default)]
pub struct Upscaler {
    busy: AtomicBool,
}

/// Clears the busy flag when the run ends, on every exit path.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, PipelineError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Upscaler {
    /// An idle upscaler.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Whether a run is currently in progress.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Upscale `src` according to `config`.
    ///
    /// `on_progress` is called at every stage boundary with
    /// non-decreasing percentages, ending at 100 on success.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Busy`] if another run is active on this upscaler.
    /// - [`PipelineError::InvalidScaleFactor`] if `scale_factor` is 0 or
    ///   the output would overflow.
    /// - [`PipelineError::Cancelled`] if `cancel` fired before a stage
    ///   boundary. No partial buffer is returned.
    pub fn run(
        &self,
        src: &RasterBuffer,
        config: &PipelineConfig,
        cancel: &CancelToken,
        mut on_progress: impl FnMut(&Progress),
    ) -> Result<Upscaled, PipelineError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let result = execute(src, config, cancel, &mut on_progress);
        if let Err(err) = &result {
            if err.is_cancelled() {
                tracing::debug!("run cancelled");
            } else {
                tracing::debug!(%err, "run failed");
            }
        }
        result
    }
}

fn execute(
    src: &RasterBuffer,
    config: &PipelineConfig,
    cancel: &CancelToken,
    on_progress: &mut impl FnMut(&Progress),
) -> Result<Upscaled, PipelineError> {
    let start = Instant::now();
    config.validate()?;
    cancel.check()?;
    on_progress(&Progress::INITIALIZE);

    let steps = plan(config);
    tracing::debug!(
        model = %config.model,
        scale_factor = config.scale_factor,
        input = %src.dimensions(),
        ?steps,
        "starting run",
    );

    let mut current: Cow<'_, RasterBuffer> = Cow::Borrowed(src);
    let mut stages = Vec::with_capacity(steps.len());
    for step in steps {
        cancel.check()?;
        on_progress(&step.progress());

        let stage_start = Instant::now();
        let next = step.apply(current, config.scale_factor)?;
        let duration = stage_start.elapsed();
        tracing::debug!(
            stage = step.name(),
            output = %next.dimensions(),
            elapsed_ms = duration.as_secs_f64() * 1000.0,
            "stage done",
        );

        stages.push(StageDiagnostics {
            stage: step.name().to_string(),
            detail: step.detail(config.scale_factor),
            duration,
            output: next.dimensions(),
        });
        current = Cow::Owned(next);
    }

    cancel.check()?;
    on_progress(&Progress::FINALIZE);
    cancel.check()?;

    let image = current.into_owned();
    let diagnostics = PipelineDiagnostics {
        model: config.model,
        scale_factor: config.scale_factor,
        input: src.dimensions(),
        output: image.dimensions(),
        stages,
        total_duration: start.elapsed(),
    };
    on_progress(&Progress::COMPLETE);
    Ok(Upscaled { image, diagnostics })
}
