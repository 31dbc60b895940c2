//! pixlift: upscale an image file from the command line.
//!
//! Decodes the input (PNG, JPEG, BMP, WebP), runs the filter pipeline
//! and writes the result as PNG. Per-stage diagnostics go to stdout,
//! either as a human-readable report or as JSON.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin pixlift -- [OPTIONS] <INPUT> -o <OUTPUT>
//! ```
//!
//! Logging honors `RUST_LOG`; `-v` raises the default level to debug.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pixlift_pipeline::{
    CancelToken, DenoiseMethod, DetailMethod, Model, PipelineConfig, ResampleMethod,
    SharpenMethod, Upscaler, codec,
};
use tracing_subscriber::EnvFilter;

/// Integer-factor image upscaler.
///
/// Each model selects a fixed sequence of resampling and enhancement
/// filters; the optional toggles append denoise, detail enhance and
/// sharpen stages.
#[derive(Parser)]
#[command(name = "pixlift", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    input: PathBuf,

    /// Path for the PNG output.
    #[arg(short, long)]
    output: PathBuf,

    /// Integer magnification factor.
    #[arg(short, long, default_value_t = PipelineConfig::DEFAULT_SCALE_FACTOR, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    scale: u32,

    /// Model: esrgan, real-esrgan, waifu2x, bicubic, lanczos.
    #[arg(short, long, default_value_t = Model::default())]
    model: Model,

    /// Resample method for the bicubic model: nearest, smooth, lanczos.
    #[arg(long, default_value_t = ResampleMethod::default())]
    resample: ResampleMethod,

    /// Run the denoise stage, optionally choosing the method (bilateral, box).
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "bilateral")]
    denoise: Option<DenoiseMethod>,

    /// Denoise window radius in pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_DENOISE_RADIUS, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(0..=PipelineConfig::MAX_DENOISE_RADIUS as u64))]
    denoise_radius: usize,

    /// Run the detail-enhance stage.
    #[arg(long)]
    enhance_details: bool,

    /// Tone adjustment for --enhance-details: s-curve, linear-contrast.
    #[arg(long, default_value_t = DetailMethod::default())]
    detail_method: DetailMethod,

    /// Run the sharpen stage.
    #[arg(long)]
    sharpen: bool,

    /// Sharpener for --sharpen: unsharp-mask, kernel.
    #[arg(long, default_value_t = SharpenMethod::default())]
    sharpen_method: SharpenMethod,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Log stage details (debug level) unless `RUST_LOG` is set.
    #[arg(short, long)]
    verbose: bool,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).context("parsing --config-json");
    }

    Ok(PipelineConfig {
        scale_factor: cli.scale,
        model: cli.model,
        resample_method: cli.resample,
        enable_denoise: cli.denoise.is_some(),
        enable_detail_enhance: cli.enhance_details,
        enable_sharpen: cli.sharpen,
        denoise_method: cli.denoise.unwrap_or_default(),
        denoise_radius: cli.denoise_radius,
        detail_method: cli.detail_method,
        sharpen_method: cli.sharpen_method,
    })
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = config_from_cli(cli)?;
    tracing::debug!(?config, "resolved config");

    let bytes = std::fs::read(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let src = codec::decode(&bytes)
        .with_context(|| format!("decoding {}", cli.input.display()))?;
    tracing::info!(
        input = %cli.input.display(),
        size = %src.dimensions(),
        model = %config.model,
        scale = config.scale_factor,
        "loaded image",
    );

    let upscaled = Upscaler::new()
        .run(&src, &config, &CancelToken::new(), |progress| {
            tracing::info!("{:>3}% {}", progress.percent, progress.message);
        })
        .context("upscaling failed")?;

    let png = codec::encode_png(&upscaled.image)?;
    std::fs::write(&cli.output, &png)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    tracing::info!(
        output = %cli.output.display(),
        size = %upscaled.image.dimensions(),
        bytes = png.len(),
        "wrote image",
    );

    if cli.json {
        let json = serde_json::to_string_pretty(&upscaled.diagnostics)
            .context("serializing diagnostics")?;
        println!("{json}");
    } else {
        println!("{}", upscaled.diagnostics.report());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
