//! Shared types for the pixlift filter pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::denoise::DenoiseMethod;
use crate::enhance::SharpenMethod;
use crate::resample::ResampleMethod;
use crate::tone::DetailMethod;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Upscaling model selection.
///
/// None of these run a learned network. Each name selects a fixed
/// sequence of filter stages; see [`crate::pipeline::plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Model {
    /// Smooth resample followed by edge enhancement and detail recovery.
    #[default]
    Esrgan,
    /// Same stage sequence as [`Model::Esrgan`].
    RealEsrgan,
    /// Anime-tuned: saturation boost, smooth resample, wide edge
    /// enhancement, detail recovery and a strong line-art sharpen.
    Waifu2x,
    /// Resample only, using the configured [`ResampleMethod`].
    Bicubic,
    /// Resample only, using Lanczos3.
    Lanczos,
}

impl Model {
    /// All models in presentation order.
    pub const ALL: [Self; 5] = [
        Self::Esrgan,
        Self::RealEsrgan,
        Self::Waifu2x,
        Self::Bicubic,
        Self::Lanczos,
    ];

    /// Stable lowercase name, as used in configs and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Esrgan => "esrgan",
            Self::RealEsrgan => "real-esrgan",
            Self::Waifu2x => "waifu2x",
            Self::Bicubic => "bicubic",
            Self::Lanczos => "lanczos",
        }
    }

    /// Whether this model runs the multi-pass enhancement after
    /// resampling.
    #[must_use]
    pub const fn is_advanced(self) -> bool {
        matches!(self, Self::Esrgan | Self::RealEsrgan | Self::Waifu2x)
    }

    /// Parse a model name, falling back to [`Model::Bicubic`] for
    /// anything unrecognized.
    ///
    /// The fallback is logged as a warning rather than returned as an
    /// error.
    #[must_use]
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|err: PipelineError| {
            tracing::warn!(%err, "falling back to bicubic resampling");
            Self::Bicubic
        })
    }
}

/// Deserialize a name through its strict `FromStr`, substituting
/// `fallback` for anything unrecognized.
///
/// Configs arrive from hosts that may be newer or older than this
/// crate, so an unknown name is logged as a warning instead of failing
/// the run. Non-string values are still rejected.
pub(crate) fn deserialize_or_fallback<'de, D, T>(deserializer: D, fallback: T) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = PipelineError> + fmt::Display,
{
    let name = String::deserialize(deserializer)?;
    Ok(name.parse().unwrap_or_else(|err: PipelineError| {
        tracing::warn!(%err, %fallback, "unrecognized config value, using fallback");
        fallback
    }))
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == name)
            .ok_or_else(|| PipelineError::UnsupportedConfig(format!("unknown model `{s}`")))
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Model {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name_or_default(&name))
    }
}

/// Configuration for one pipeline run.
///
/// Each option that has more than one implementation carries an
/// explicit method selector, so a toggle always means the same
/// operation regardless of which model is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Integer magnification factor. Must be at least 1.
    pub scale_factor: u32,

    /// Which stage sequence to run.
    pub model: Model,

    /// Resampling method for [`Model::Bicubic`]. The advanced models
    /// always resample with [`ResampleMethod::Smooth`] and
    /// [`Model::Lanczos`] always uses [`ResampleMethod::Lanczos`].
    pub resample_method: ResampleMethod,

    /// Run the denoise stage after resampling.
    pub enable_denoise: bool,

    /// Run the detail-enhance (tone curve) stage.
    pub enable_detail_enhance: bool,

    /// Run the sharpen stage.
    pub enable_sharpen: bool,

    /// Which denoiser the denoise toggle runs.
    pub denoise_method: DenoiseMethod,

    /// Denoise window radius in pixels; the window is `(2r+1)^2`.
    pub denoise_radius: usize,

    /// Which tone adjustment the detail-enhance toggle runs.
    pub detail_method: DetailMethod,

    /// Which sharpener the sharpen toggle runs.
    pub sharpen_method: SharpenMethod,
}

impl PipelineConfig {
    /// Default magnification factor.
    pub const DEFAULT_SCALE_FACTOR: u32 = 2;

    /// Default denoise window radius.
    pub const DEFAULT_DENOISE_RADIUS: usize = 1;

    /// Largest accepted denoise window radius.
    pub const MAX_DENOISE_RADIUS: usize = 16;

    /// Check the config before any stage runs.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidScaleFactor`] if `scale_factor`
    /// is zero, or [`PipelineError::UnsupportedConfig`] if
    /// `denoise_radius` exceeds [`Self::MAX_DENOISE_RADIUS`].
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.scale_factor < 1 {
            return Err(PipelineError::InvalidScaleFactor(self.scale_factor));
        }
        if self.denoise_radius > Self::MAX_DENOISE_RADIUS {
            return Err(PipelineError::UnsupportedConfig(format!(
                "denoise radius {} exceeds the maximum of {}",
                self.denoise_radius,
                Self::MAX_DENOISE_RADIUS
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scale_factor: Self::DEFAULT_SCALE_FACTOR,
            model: Model::default(),
            resample_method: ResampleMethod::default(),
            enable_denoise: false,
            enable_detail_enhance: false,
            enable_sharpen: false,
            denoise_method: DenoiseMethod::default(),
            denoise_radius: Self::DEFAULT_DENOISE_RADIUS,
            detail_method: DetailMethod::default(),
            sharpen_method: SharpenMethod::default(),
        }
    }
}

/// Errors that can occur during pipeline processing.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The scale factor is below 1, or the scaled dimensions overflow.
    #[error("invalid scale factor {0}: must be at least 1 and keep the output addressable")]
    InvalidScaleFactor(u32),

    /// A buffer accessor was called with coordinates outside the buffer.
    #[error("pixel ({x}, {y}) channel {channel} is outside a {width}x{height} buffer")]
    OutOfBounds {
        /// Requested column.
        x: u32,
        /// Requested row.
        y: u32,
        /// Requested channel index.
        channel: usize,
        /// Buffer width.
        width: u32,
        /// Buffer height.
        height: u32,
    },

    /// The run was cancelled at a stage boundary. Not a failure; the
    /// caller's buffer is untouched and no result is produced.
    #[error("processing cancelled")]
    Cancelled,

    /// A kernel, model or method description could not be used.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfig(String),

    /// Raw sample data does not match the declared dimensions.
    #[error("buffer holds {actual} samples, expected {expected}")]
    SizeMismatch {
        /// `width * height * 4`.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// The requested buffer would exceed [`crate::raster::MAX_PIXELS`].
    #[error("{width}x{height} exceeds the limit of {max} pixels", max = crate::raster::MAX_PIXELS)]
    TooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Another run is already active on this upscaler.
    #[error("a run is already in progress")]
    Busy,

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Failed to encode the output image.
    #[error("failed to encode image: {0}")]
    ImageEncode(String),
}

impl PipelineError {
    /// Whether this is the cancellation outcome rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Serde-compatible proxy for `PipelineError`.
///
/// `image::ImageError` does not implement serde, so the `ImageDecode`
/// variant stores its `Display` string instead.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    InvalidScaleFactor(u32),
    OutOfBounds {
        x: u32,
        y: u32,
        channel: usize,
        width: u32,
        height: u32,
    },
    Cancelled,
    UnsupportedConfig(String),
    SizeMismatch {
        expected: usize,
        actual: usize,
    },
    TooLarge {
        width: u32,
        height: u32,
    },
    Busy,
    EmptyInput,
    ImageDecode(String),
    ImageEncode(String),
}

impl Serialize for PipelineError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::InvalidScaleFactor(s) => PipelineErrorProxy::InvalidScaleFactor(*s),
            Self::OutOfBounds {
                x,
                y,
                channel,
                width,
                height,
            } => PipelineErrorProxy::OutOfBounds {
                x: *x,
                y: *y,
                channel: *channel,
                width: *width,
                height: *height,
            },
            Self::Cancelled => PipelineErrorProxy::Cancelled,
            Self::UnsupportedConfig(s) => PipelineErrorProxy::UnsupportedConfig(s.clone()),
            Self::SizeMismatch { expected, actual } => PipelineErrorProxy::SizeMismatch {
                expected: *expected,
                actual: *actual,
            },
            Self::TooLarge { width, height } => PipelineErrorProxy::TooLarge {
                width: *width,
                height: *height,
            },
            Self::Busy => PipelineErrorProxy::Busy,
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::ImageEncode(s) => PipelineErrorProxy::ImageEncode(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::InvalidScaleFactor(s) => Self::InvalidScaleFactor(s),
            PipelineErrorProxy::OutOfBounds {
                x,
                y,
                channel,
                width,
                height,
            } => Self::OutOfBounds {
                x,
                y,
                channel,
                width,
                height,
            },
            PipelineErrorProxy::Cancelled => Self::Cancelled,
            PipelineErrorProxy::UnsupportedConfig(s) => Self::UnsupportedConfig(s),
            PipelineErrorProxy::SizeMismatch { expected, actual } => {
                Self::SizeMismatch { expected, actual }
            }
            PipelineErrorProxy::TooLarge { width, height } => Self::TooLarge { width, height },
            PipelineErrorProxy::Busy => Self::Busy,
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            // The typed image error cannot be rebuilt; keep the message.
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::UnsupportedConfig(format!("image decode error: {msg}"))
            }
            PipelineErrorProxy::ImageEncode(s) => Self::ImageEncode(s),
        })
    }
}
