//! Fakes shared by the webcam unit tests.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use recognition::{BoundingBox, Candidate, Detection, RecognitionError, Recognizer};
use video_ingest::{
    CaptureBackend, CaptureDevice, CaptureError, CaptureSettings, DeviceFactory, Frame,
};

use crate::webcam::{clock::Clock, session::SessionSettings};

pub(crate) fn detection(candidates: &[(&str, f64)]) -> Detection {
    Detection {
        bbox: BoundingBox {
            x_min: 2,
            y_min: 2,
            x_max: 12,
            y_max: 12,
        },
        candidates: candidates
            .iter()
            .map(|(subject, similarity)| Candidate {
                subject: subject.to_string(),
                similarity: *similarity,
            })
            .collect(),
    }
}

pub(crate) fn blank_frame(width: i32, height: i32) -> Frame {
    Frame::bgr8(vec![0; (width * height * 3) as usize], width, height, 0).unwrap()
}

pub(crate) fn test_settings() -> SessionSettings {
    SessionSettings {
        capture: CaptureSettings {
            width: 32,
            height: 24,
            ..CaptureSettings::default()
        },
        frame_interval: Duration::from_millis(5),
        recognition_interval: Duration::from_millis(20),
        stream_quality: 80,
        recognition_quality: 60,
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    check()
}

/// Clock that only moves when told to.
pub(crate) struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        thread::sleep(Duration::from_millis(1));
    }
}

#[derive(Default)]
struct FactoryCounters {
    opened: Mutex<Vec<CaptureBackend>>,
    opens: AtomicUsize,
    reads: AtomicUsize,
    closes: AtomicUsize,
    failing_reads: AtomicBool,
    hanging_reads: AtomicBool,
}

/// Device factory producing black frames, with switchable failures.
pub(crate) struct FakeFactory {
    counters: Arc<FactoryCounters>,
    fail_preferred: bool,
    fail_all: bool,
    open_delay: Duration,
}

impl FakeFactory {
    pub(crate) fn new() -> Self {
        Self {
            counters: Arc::default(),
            fail_preferred: false,
            fail_all: false,
            open_delay: Duration::ZERO,
        }
    }

    /// Every open blocks for `delay` first, like a camera that is slow to
    /// come up.
    pub(crate) fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub(crate) fn failing_preferred(mut self) -> Self {
        self.fail_preferred = true;
        self
    }

    pub(crate) fn unavailable(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Successful opens.
    pub(crate) fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    /// Every backend an open was attempted with, in order.
    pub(crate) fn opened_backends(&self) -> Vec<CaptureBackend> {
        self.counters
            .opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Frames delivered so far across all devices.
    pub(crate) fn reads(&self) -> usize {
        self.counters.reads.load(Ordering::SeqCst)
    }

    /// Devices dropped so far.
    pub(crate) fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn set_read_failures(&self, failing: bool) {
        self.counters.failing_reads.store(failing, Ordering::SeqCst);
    }

    /// While set, reads block inside the device until cleared.
    pub(crate) fn set_read_hang(&self, hanging: bool) {
        self.counters.hanging_reads.store(hanging, Ordering::SeqCst);
    }
}

impl DeviceFactory for FakeFactory {
    fn describe(&self) -> String {
        "fake camera".to_string()
    }

    fn open(&self, backend: CaptureBackend) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        self.counters
            .opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(backend);
        if !self.open_delay.is_zero() {
            thread::sleep(self.open_delay);
        }
        let refused = self.fail_all || (self.fail_preferred && backend == CaptureBackend::Preferred);
        if refused {
            return Err(CaptureError::Open {
                uri: self.describe(),
                backend: backend.label(),
            });
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDevice {
            counters: self.counters.clone(),
            width: 16,
            height: 12,
        }))
    }
}

struct FakeDevice {
    counters: Arc<FactoryCounters>,
    width: i32,
    height: i32,
}

impl CaptureDevice for FakeDevice {
    fn configure(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError> {
        self.width = settings.width;
        self.height = settings.height;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        while self.counters.hanging_reads.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(2));
        }
        if self.counters.failing_reads.load(Ordering::SeqCst) {
            return Err(CaptureError::EmptyRead);
        }
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        Ok(blank_frame(self.width, self.height))
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

enum Reply {
    Detections(Vec<Detection>),
    Fail,
}

/// Recognizer with a canned reply and an optional delay per call.
pub(crate) struct FakeRecognizer {
    reply: Reply,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeRecognizer {
    pub(crate) fn returning(detections: Vec<Detection>) -> Self {
        Self {
            reply: Reply::Detections(detections),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: Reply::Fail,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Recognizer for FakeRecognizer {
    fn recognize(&self, _jpeg: &[u8]) -> Result<Vec<Detection>, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        match &self.reply {
            Reply::Detections(detections) => Ok(detections.clone()),
            Reply::Fail => Err(RecognitionError::Service {
                status: 503,
                message: "service unavailable".to_string(),
            }),
        }
    }
}
