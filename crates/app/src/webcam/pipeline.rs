//! Capture loop: read, mirror, hand a throttled copy to recognition, annotate
//! with the cached results, and publish the encoded frame to stream clients.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, TryLockError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use tokio::sync::watch;
use tracing::{debug, warn};
use video_ingest::{CaptureDevice, CaptureError, Frame};

use crate::webcam::{
    annotation::annotate_and_encode,
    clock::Clock,
    data::FramePacket,
    encoding::encode_frame_jpeg,
    health::{HealthComponent, PipelineHealth},
    session::SessionSettings,
    state::RecognitionState,
    worker::{RecognitionHandle, RecognitionJob},
};

/// Latest published frame; `None` until the first frame after a start.
pub(crate) type FrameSender = watch::Sender<Option<Arc<FramePacket>>>;
pub(crate) type FrameReceiver = watch::Receiver<Option<Arc<FramePacket>>>;

/// The opened device, shared between the pipeline and the session so a stop
/// can release it while the pipeline is between reads. A read holds the lock
/// for as long as the camera blocks, so `release` never waits for it; the
/// pipeline closes the device itself on the way out.
pub(crate) struct DeviceSlot {
    device: Mutex<Option<Box<dyn CaptureDevice>>>,
}

impl DeviceSlot {
    pub(crate) fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            device: Mutex::new(Some(device)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn CaptureDevice>>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` once the device has been released.
    pub(crate) fn read_frame(&self) -> Option<Result<Frame, CaptureError>> {
        self.lock().as_mut().map(|device| device.read_frame())
    }

    /// Drop the device unless a read is in progress. Returns whether it was
    /// dropped here.
    pub(crate) fn release(&self) -> bool {
        match self.device.try_lock() {
            Ok(mut device) => device.take().is_some(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take().is_some(),
            Err(TryLockError::WouldBlock) => false,
        }
    }

    /// Drop the device, waiting out a read in progress.
    pub(crate) fn close(&self) -> bool {
        self.lock().take().is_some()
    }
}

/// Minimum spacing between recognition dispatches.
pub(crate) struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    pub(crate) fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Frame,
    Miss,
    Released,
}

pub(crate) struct FramePipeline {
    device: Arc<DeviceSlot>,
    cancel: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    state: Arc<RecognitionState>,
    health: Arc<PipelineHealth>,
    frames: Arc<FrameSender>,
    recognition: RecognitionHandle,
    settings: SessionSettings,
    generation: u64,
    throttle: Throttle,
    frame_number: u64,
}

impl FramePipeline {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        device: Arc<DeviceSlot>,
        cancel: Arc<AtomicBool>,
        clock: Arc<dyn Clock>,
        state: Arc<RecognitionState>,
        health: Arc<PipelineHealth>,
        frames: Arc<FrameSender>,
        recognition: RecognitionHandle,
        settings: SessionSettings,
        generation: u64,
    ) -> Self {
        let throttle = Throttle::new(settings.recognition_interval);
        Self {
            device,
            cancel,
            clock,
            state,
            health,
            frames,
            recognition,
            settings,
            generation,
            throttle,
            frame_number: 0,
        }
    }

    /// Tick at the frame cadence until cancelled or the device is released.
    pub(crate) fn run(mut self) {
        while !self.cancel.load(Ordering::Acquire) {
            let started = self.clock.now();
            let span = tracing::trace_span!("webcam.tick", frame = self.frame_number + 1);
            let outcome = {
                let _guard = span.enter();
                self.tick()
            };
            if outcome == TickOutcome::Released {
                break;
            }
            let elapsed = self.clock.now().saturating_duration_since(started);
            if let Some(remaining) = self.settings.frame_interval.checked_sub(elapsed) {
                self.clock.sleep(remaining);
            }
        }
        self.device.close();
        debug!("pipeline exiting after {} frames", self.frame_number);
    }

    pub(crate) fn tick(&mut self) -> TickOutcome {
        let mut frame = match self.device.read_frame() {
            None => return TickOutcome::Released,
            Some(Err(err)) => {
                metrics::counter!("webcam_read_misses_total").increment(1);
                debug!("frame read failed: {err}");
                return TickOutcome::Miss;
            }
            Some(Ok(frame)) => frame,
        };
        self.frame_number += 1;
        metrics::counter!("webcam_frames_captured_total").increment(1);
        self.health.beat(HealthComponent::Capture);

        frame.mirror_horizontal();

        let now = self.clock.now();
        if self.throttle.is_due(now) {
            self.dispatch_recognition(&frame, now);
        }

        if self.frames.receiver_count() > 0 {
            self.publish(&frame);
        }
        TickOutcome::Frame
    }

    fn dispatch_recognition(&mut self, frame: &Frame, now: Instant) {
        if !self.recognition.is_idle() {
            metrics::counter!("webcam_recognition_skipped_total").increment(1);
            return;
        }
        let jpeg = match encode_frame_jpeg(frame, self.settings.recognition_quality) {
            Ok(jpeg) => jpeg,
            Err(err) => {
                warn!("failed to encode frame for recognition: {err:#}");
                return;
            }
        };
        let job = RecognitionJob {
            generation: self.generation,
            frame_number: self.frame_number,
            jpeg,
        };
        if self.recognition.submit(job) {
            self.throttle.mark(now);
        } else {
            metrics::counter!("webcam_recognition_skipped_total").increment(1);
        }
    }

    fn publish(&self, frame: &Frame) {
        let snapshot = self.state.snapshot();
        match annotate_and_encode(frame, &snapshot, self.settings.stream_quality) {
            Ok(jpeg) => {
                self.frames.send_replace(Some(Arc::new(FramePacket {
                    jpeg,
                    timestamp_ms: frame.timestamp_ms,
                    frame_number: self.frame_number,
                    faces: snapshot.detections.len(),
                })));
            }
            Err(err) => warn!("failed to encode stream frame: {err:#}"),
        }
    }
}
