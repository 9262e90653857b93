//! Camera lifecycle: idempotent start/stop plus the read-only views served by
//! the status and recognition endpoints.

use std::{
    io,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use recognition::Recognizer;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use video_ingest::{CaptureBackend, CaptureDevice, CaptureError, CaptureSettings, DeviceFactory};

use crate::webcam::{
    clock::Clock,
    config::WebcamConfig,
    data::{FaceSummary, RecognitionResponse, activity_label},
    health::PipelineHealth,
    pipeline::{DeviceSlot, FramePipeline, FrameReceiver, FrameSender},
    state::RecognitionState,
    telemetry::spawn_thread,
    worker::spawn_recognition_worker,
};

/// How long `stop` waits for the pipeline thread before detaching it.
const PIPELINE_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub(crate) struct SessionSettings {
    pub(crate) capture: CaptureSettings,
    pub(crate) frame_interval: Duration,
    pub(crate) recognition_interval: Duration,
    pub(crate) stream_quality: u8,
    pub(crate) recognition_quality: u8,
}

impl From<&WebcamConfig> for SessionSettings {
    fn from(config: &WebcamConfig) -> Self {
        Self {
            capture: config.capture,
            frame_interval: config.frame_interval,
            recognition_interval: config.recognition_interval,
            stream_quality: config.stream_quality,
            recognition_quality: config.recognition_quality,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("unable to open camera {device}: {reason}")]
    DeviceUnavailable { device: String, reason: String },
    #[error("failed to spawn session thread: {0}")]
    Spawn(#[from] io::Error),
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StopOutcome {
    Stopped,
    NotRunning,
}

struct ActiveSession {
    device: Arc<DeviceSlot>,
    cancel: Arc<AtomicBool>,
    pipeline: Option<JoinHandle<()>>,
}

/// Owns the camera for at most one capture session at a time.
///
/// `start` and `stop` serialise on the session lock, which is held while the
/// camera opens. Status, recognition, and `subscribe` never take it: they read
/// atomics, the recognition snapshot, and the short-held `published` slot.
pub(crate) struct CaptureSession {
    factory: Arc<dyn DeviceFactory>,
    recognizer: Arc<dyn Recognizer>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    state: Arc<RecognitionState>,
    health: Arc<PipelineHealth>,
    running: AtomicBool,
    active: Mutex<Option<ActiveSession>>,
    published: Mutex<Option<Arc<FrameSender>>>,
}

impl CaptureSession {
    pub(crate) fn new(
        factory: Arc<dyn DeviceFactory>,
        recognizer: Arc<dyn Recognizer>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            factory,
            recognizer,
            clock,
            settings,
            state: Arc::new(RecognitionState::new()),
            health: Arc::new(PipelineHealth::new()),
            running: AtomicBool::new(false),
            active: Mutex::new(None),
            published: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn published(&self) -> MutexGuard<'_, Option<Arc<FrameSender>>> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn start(&self) -> Result<StartOutcome, SessionError> {
        let mut active = self.lock();
        if active.is_some() {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let span = tracing::info_span!("webcam.start", device = %self.factory.describe());
        let _guard = span.enter();

        let device = Arc::new(DeviceSlot::new(self.open_device()?));
        self.health.reset();
        let generation = self.state.reset();
        let recognition = spawn_recognition_worker(self.recognizer.clone(), self.state.clone())?;

        let (frames, _) = watch::channel(None);
        let frames = Arc::new(frames);
        let cancel = Arc::new(AtomicBool::new(false));
        let pipeline = FramePipeline::new(
            device.clone(),
            cancel.clone(),
            self.clock.clone(),
            self.state.clone(),
            self.health.clone(),
            frames.clone(),
            recognition,
            self.settings.clone(),
            generation,
        );
        let handle = match spawn_thread("webcam-pipeline", move || pipeline.run()) {
            Ok(handle) => handle,
            Err(err) => {
                device.release();
                self.state.reset();
                return Err(err.into());
            }
        };

        *self.published() = Some(frames);
        *active = Some(ActiveSession {
            device,
            cancel,
            pipeline: Some(handle),
        });
        self.running.store(true, Ordering::Release);
        metrics::gauge!("webcam_session_running").set(1.0);
        info!("webcam session started");
        Ok(StartOutcome::Started)
    }

    /// Try the platform's preferred capture backend first, then the default
    /// one. A backend counts once it has opened and configured; the warm-up
    /// read only drains the driver buffer and may come back empty.
    fn open_device(&self) -> Result<Box<dyn CaptureDevice>, SessionError> {
        let mut failures = Vec::new();
        for backend in [CaptureBackend::Preferred, CaptureBackend::Default] {
            match self.try_backend(backend) {
                Ok(device) => {
                    info!("camera opened with {} backend", backend.label());
                    return Ok(device);
                }
                Err(err) => {
                    warn!("{} backend failed: {err}", backend.label());
                    failures.push(format!("{}: {err}", backend.label()));
                }
            }
        }
        Err(SessionError::DeviceUnavailable {
            device: self.factory.describe(),
            reason: failures.join("; "),
        })
    }

    fn try_backend(&self, backend: CaptureBackend) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let mut device = self.factory.open(backend)?;
        device.configure(&self.settings.capture)?;
        if let Err(err) = device.read_frame() {
            debug!("warm-up read on {} backend failed: {err}", backend.label());
        }
        Ok(device)
    }

    pub(crate) fn stop(&self) -> StopOutcome {
        let mut active = self.lock();
        let Some(mut session) = active.take() else {
            return StopOutcome::NotRunning;
        };

        self.running.store(false, Ordering::Release);
        self.published().take();
        session.cancel.store(true, Ordering::Release);
        if !session.device.release() {
            debug!("device busy in a read; pipeline closes it on exit");
        }
        if let Some(handle) = session.pipeline.take() {
            join_pipeline(handle);
        }
        // The pipeline held the last sender; its exit ends every open stream.
        drop(session);
        self.state.reset();
        self.health.reset();
        metrics::gauge!("webcam_session_running").set(0.0);
        info!("webcam session stopped");
        StopOutcome::Stopped
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Faces from the latest completed recognition; empty while stopped.
    pub(crate) fn recognition(&self) -> RecognitionResponse {
        let running = self.is_running();
        let faces: Vec<FaceSummary> = if running {
            self.state.snapshot().face_summaries()
        } else {
            Vec::new()
        };
        RecognitionResponse {
            status: activity_label(running),
            faces,
        }
    }

    /// A receiver for the published frames, or `None` while stopped.
    pub(crate) fn subscribe(&self) -> Option<FrameReceiver> {
        self.published().as_ref().map(|frames| frames.subscribe())
    }

    /// Time since the recognition snapshot last changed; `None` while stopped.
    pub(crate) fn recognition_age_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        self.is_running().then(|| self.state.snapshot().age_ms(now))
    }

    pub(crate) fn health(&self) -> &PipelineHealth {
        &self.health
    }
}

/// Wait for the pipeline to exit, detaching it if the camera keeps a read
/// blocked past [`PIPELINE_JOIN_TIMEOUT`].
fn join_pipeline(handle: JoinHandle<()>) {
    let deadline = Instant::now() + PIPELINE_JOIN_TIMEOUT;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(
                "pipeline thread still blocked after {:?}; detaching it",
                PIPELINE_JOIN_TIMEOUT
            );
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        warn!("pipeline thread panicked");
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
