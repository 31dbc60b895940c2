//! Pipeline diagnostics: per-stage timing and output sizes.
//!
//! Every successful run through [`Upscaler::run`](crate::Upscaler::run)
//! returns diagnostics alongside the image. Timestamps are captured via
//! the `web-time` crate, which uses `performance.now()` on WASM and
//! `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Model};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Model whose stage plan was executed.
    pub model: Model,
    /// Magnification factor.
    pub scale_factor: u32,
    /// Source buffer size.
    pub input: Dimensions,
    /// Output buffer size.
    pub output: Dimensions,
    /// One entry per executed stage, in execution order.
    pub stages: Vec<StageDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Stage name, as reported to the progress callback.
    pub stage: String,
    /// Stage parameters in compact form, e.g. `method=smooth`.
    pub detail: String,
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Buffer size after the stage.
    pub output: Dimensions,
}

impl PipelineDiagnostics {
    /// Sum of the per-stage durations.
    #[must_use]
    pub fn stage_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Model: {}  |  Scale: x{}  |  {} -> {}",
            self.model, self.scale_factor, self.input, self.output,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for diag in &self.stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "{:<24} {ms:>8.3}ms {pct:>9.1}%  {} -> {}",
                diag.stage, diag.detail, diag.output,
            ));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> PipelineDiagnostics {
        let output = Dimensions {
            width: 200,
            height: 100,
        };
        PipelineDiagnostics {
            model: Model::Esrgan,
            scale_factor: 2,
            input: Dimensions {
                width: 100,
                height: 50,
            },
            output,
            stages: vec![
                StageDiagnostics {
                    stage: "resample".to_string(),
                    detail: "method=smooth".to_string(),
                    duration: Duration::from_millis(12),
                    output,
                },
                StageDiagnostics {
                    stage: "edge-enhance".to_string(),
                    detail: "style=standard".to_string(),
                    duration: Duration::from_millis(8),
                    output,
                },
            ],
            total_duration: Duration::from_millis(25),
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn stage_duration_sums_stages() {
        assert_eq!(sample().stage_duration(), Duration::from_millis(20));
    }

    #[test]
    fn report_lists_every_stage() {
        let report = sample().report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        assert!(report.contains("esrgan"));
        assert!(report.contains("100x50 -> 200x100"));
        assert!(report.contains("edge-enhance"));
        assert!(report.contains("method=smooth"));
    }

    #[test]
    fn serde_round_trip_uses_seconds() {
        let diag = sample();
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"total_duration\":0.025"));
        let back: PipelineDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, diag);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = r#"{"stage":"x","detail":"","duration":-1.0,"output":{"width":1,"height":1}}"#;
        let result: Result<StageDiagnostics, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
