//! Webcam face recognition service: captures frames, throttles calls to the
//! recognition service, and serves annotated previews over HTTP.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `session`: Camera lifecycle (start/stop) and the read-only status views.
//! - `pipeline`: Per-tick capture → mirror → throttle → annotate loop.
//! - `worker`: Recognition worker thread calling the external service.
//! - `state`: Shared, atomically replaced recognition snapshot.
//! - `annotation`: Drawing boxes and labels onto frames.
//! - `encoding`: JPEG encode helpers.
//! - `stream`: Per-client multipart stream over the latest encoded frame.
//! - `server`: Actix Web endpoints.
//! - `health`: Stage heartbeats reported by `/health`.
//! - `clock`: Time source seam used by the pipeline.
//! - `data`: Shared structs and response payloads.

use std::sync::Arc;

use anyhow::{Context, Result};
use recognition::{CompreFaceClient, Recognizer};
use tracing::info;
use video_ingest::{DeviceFactory, PatternFactory};

/// Re-export settings so callers can configure runs without reaching into
/// submodules.
pub use config::{ServeArgs, WebcamConfig};

mod annotation;
mod clock;
mod config;
mod data;
mod encoding;
mod health;
mod pipeline;
mod server;
mod session;
mod state;
mod stream;
mod telemetry;
mod worker;
#[cfg(test)]
mod testing;

use clock::SystemClock;
use server::ServerState;
use session::{CaptureSession, SessionSettings};

/// Build the session and serve HTTP until the server shuts down.
pub fn run(config: WebcamConfig) -> Result<()> {
    let _telemetry_guard = telemetry::install(&config.telemetry);
    let metrics = telemetry::init_metrics_recorder()?;

    let service_span = tracing::info_span!(
        "webcam.service",
        source = %config.source,
        width = config.capture.width,
        height = config.capture.height,
        recognition_interval_ms = config.recognition_interval.as_millis() as u64
    );
    let _service_guard = service_span.enter();

    let factory = device_factory(&config.source)?;
    let client = CompreFaceClient::new(config.compreface.clone())
        .context("Failed to build recognition client")?;
    info!("Recognition endpoint: {}", client.endpoint());
    let recognizer: Arc<dyn Recognizer> = Arc::new(client);

    let session = Arc::new(CaptureSession::new(
        factory,
        recognizer.clone(),
        Arc::new(SystemClock),
        SessionSettings::from(&config),
    ));

    let state = ServerState {
        session: session.clone(),
        stream_interval: config.frame_interval,
        metrics: Some(metrics),
    };
    info!(
        "Stream available at http://{}/webcam/stream once /webcam/start is called",
        config.bind
    );
    let result = server::run_server(state, config.bind);

    session.stop();
    drop(session);
    drop(recognizer);
    result
}

fn device_factory(source: &str) -> Result<Arc<dyn DeviceFactory>> {
    if source.eq_ignore_ascii_case("pattern") {
        return Ok(Arc::new(PatternFactory));
    }
    camera_factory(source)
}

#[cfg(feature = "opencv")]
fn camera_factory(source: &str) -> Result<Arc<dyn DeviceFactory>> {
    Ok(Arc::new(video_ingest::OpenCvFactory::new(source)))
}

#[cfg(not(feature = "opencv"))]
fn camera_factory(source: &str) -> Result<Arc<dyn DeviceFactory>> {
    anyhow::bail!(
        "camera source {source:?} requires building with the `opencv` feature; use --source pattern for the synthetic feed"
    )
}
