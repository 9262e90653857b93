use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Result, bail};
use clap::Args;
use recognition::CompreFaceConfig;
use video_ingest::CaptureSettings;

/// Options for `facecam serve`.
#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Camera index or device URI; `pattern` selects the synthetic feed.
    #[arg(long, env = "FACECAM_SOURCE", default_value = "0")]
    pub source: String,
    #[arg(long, default_value_t = 640)]
    pub width: i32,
    #[arg(long, default_value_t = 480)]
    pub height: i32,
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,
    /// Pipeline and stream cadence.
    #[arg(long, default_value_t = 33)]
    pub frame_interval_ms: u64,
    /// Minimum spacing between recognition calls.
    #[arg(long, default_value_t = 300)]
    pub recognition_interval_ms: u64,
    /// Upper bound for one recognition request.
    #[arg(long, default_value_t = 2000)]
    pub recognition_timeout_ms: u64,
    #[arg(long, default_value_t = 85)]
    pub stream_quality: u8,
    #[arg(long, default_value_t = 70)]
    pub recognition_quality: u8,
    #[arg(long, env = "FACECAM_COMPREFACE_URL", default_value = "http://localhost:8000")]
    pub compreface_url: String,
    #[arg(long, env = "FACECAM_API_KEY", hide_env_values = true)]
    pub api_key: String,
    #[arg(long, default_value_t = 0.8)]
    pub det_prob_threshold: f32,
    #[arg(long, default_value_t = 1)]
    pub prediction_count: u32,
    #[arg(long, env = "FACECAM_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,
    /// Write a Chrome trace of pipeline spans to this file.
    #[arg(long)]
    pub chrome_trace: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct TelemetryOptions {
    pub(crate) chrome_trace_path: Option<PathBuf>,
}

/// Validated runtime configuration.
#[derive(Clone, Debug)]
pub struct WebcamConfig {
    pub(crate) source: String,
    pub(crate) capture: CaptureSettings,
    pub(crate) frame_interval: Duration,
    pub(crate) recognition_interval: Duration,
    pub(crate) stream_quality: u8,
    pub(crate) recognition_quality: u8,
    pub(crate) compreface: CompreFaceConfig,
    pub(crate) bind: SocketAddr,
    pub(crate) telemetry: TelemetryOptions,
}

impl TryFrom<ServeArgs> for WebcamConfig {
    type Error = anyhow::Error;

    fn try_from(args: ServeArgs) -> Result<Self> {
        if args.source.trim().is_empty() {
            bail!("--source must not be empty");
        }
        if args.width <= 0 || args.height <= 0 {
            bail!("--width and --height must be positive integers");
        }
        if !(args.fps.is_finite() && args.fps > 0.0) {
            bail!("--fps must be a positive number");
        }
        if args.frame_interval_ms == 0 {
            bail!("--frame-interval-ms must be at least 1");
        }
        if args.recognition_timeout_ms == 0 {
            bail!("--recognition-timeout-ms must be at least 1");
        }
        for (flag, quality) in [
            ("--stream-quality", args.stream_quality),
            ("--recognition-quality", args.recognition_quality),
        ] {
            if !(1..=100).contains(&quality) {
                bail!("{flag} must be an integer between 1 and 100");
            }
        }
        if !(0.0..=1.0).contains(&args.det_prob_threshold) {
            bail!("--det-prob-threshold must be between 0 and 1");
        }
        if args.prediction_count == 0 {
            bail!("--prediction-count must be at least 1");
        }
        if args.api_key.trim().is_empty() {
            bail!("--api-key must not be empty");
        }
        let base_url = args.compreface_url.trim().to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("--compreface-url must start with http:// or https://");
        }

        Ok(Self {
            source: args.source,
            capture: CaptureSettings {
                width: args.width,
                height: args.height,
                fps: args.fps,
                ..CaptureSettings::default()
            },
            frame_interval: Duration::from_millis(args.frame_interval_ms),
            recognition_interval: Duration::from_millis(args.recognition_interval_ms),
            stream_quality: args.stream_quality,
            recognition_quality: args.recognition_quality,
            compreface: CompreFaceConfig {
                base_url,
                api_key: args.api_key,
                timeout: Duration::from_millis(args.recognition_timeout_ms),
                det_prob_threshold: args.det_prob_threshold,
                prediction_count: args.prediction_count,
            },
            bind: args.bind,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
            },
        })
    }
}
