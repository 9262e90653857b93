//! Recognition worker: one request in flight at a time, off the capture path.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use recognition::Recognizer;
use tracing::{debug, warn};

use crate::webcam::{state::RecognitionState, telemetry::spawn_thread};

pub(crate) struct RecognitionJob {
    pub(crate) generation: u64,
    pub(crate) frame_number: u64,
    pub(crate) jpeg: Vec<u8>,
}

/// Submitting side, owned by the pipeline.
#[derive(Clone)]
pub(crate) struct RecognitionHandle {
    jobs: Sender<RecognitionJob>,
    in_flight: Arc<AtomicBool>,
}

impl RecognitionHandle {
    pub(crate) fn is_idle(&self) -> bool {
        !self.in_flight.load(Ordering::Acquire)
    }

    /// Queue a job if no other request is in flight.
    pub(crate) fn submit(&self, job: RecognitionJob) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        match self.jobs.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.in_flight.store(false, Ordering::Release);
                false
            }
        }
    }
}

pub(crate) struct RecognitionQueue {
    jobs: Receiver<RecognitionJob>,
    in_flight: Arc<AtomicBool>,
}

impl RecognitionQueue {
    fn recv(&self) -> Option<RecognitionJob> {
        self.jobs.recv().ok()
    }

    fn done(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn try_next(&self) -> Option<RecognitionJob> {
        let job = self.jobs.try_recv().ok();
        if job.is_some() {
            self.done();
        }
        job
    }
}

pub(crate) fn channel() -> (RecognitionHandle, RecognitionQueue) {
    let (tx, rx) = bounded(1);
    let in_flight = Arc::new(AtomicBool::new(false));
    (
        RecognitionHandle {
            jobs: tx,
            in_flight: in_flight.clone(),
        },
        RecognitionQueue { jobs: rx, in_flight },
    )
}

/// Start a detached worker. It exits once every handle has been dropped; a
/// request still running at stop time finishes against the client timeout
/// and its result is discarded by the generation check.
pub(crate) fn spawn_recognition_worker(
    recognizer: Arc<dyn Recognizer>,
    state: Arc<RecognitionState>,
) -> io::Result<RecognitionHandle> {
    let (handle, queue) = channel();
    spawn_thread("webcam-recognition", move || {
        while let Some(job) = queue.recv() {
            run_job(recognizer.as_ref(), &state, job);
            queue.done();
        }
        debug!("recognition worker exiting");
    })?;
    Ok(handle)
}

pub(crate) fn run_job(
    recognizer: &dyn Recognizer,
    state: &RecognitionState,
    job: RecognitionJob,
) {
    let span = tracing::debug_span!(
        "webcam.recognize",
        frame = job.frame_number,
        bytes = job.jpeg.len()
    );
    let _guard = span.enter();

    let started = Instant::now();
    let detections = match recognizer.recognize(&job.jpeg) {
        Ok(detections) => {
            metrics::counter!("webcam_recognition_requests_total", "outcome" => "ok").increment(1);
            detections
        }
        Err(err) => {
            metrics::counter!("webcam_recognition_requests_total", "outcome" => "error")
                .increment(1);
            warn!("recognition failed for frame {}: {err}", job.frame_number);
            Vec::new()
        }
    };
    metrics::histogram!("webcam_recognition_latency_seconds")
        .record(started.elapsed().as_secs_f64());

    let faces = detections.len();
    if state.publish(job.generation, detections) {
        debug!(faces, "recognition snapshot updated");
    } else {
        metrics::counter!("webcam_recognition_stale_total").increment(1);
        debug!(
            "discarding recognition result from generation {}",
            job.generation
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::webcam::testing::{FakeRecognizer, detection, wait_until};

    fn job(generation: u64) -> RecognitionJob {
        RecognitionJob {
            generation,
            frame_number: 1,
            jpeg: vec![0xFF, 0xD8],
        }
    }

    #[test]
    fn only_one_job_in_flight() {
        let (handle, queue) = channel();
        assert!(handle.is_idle());
        assert!(handle.submit(job(1)));
        assert!(!handle.is_idle());
        assert!(!handle.submit(job(1)));

        assert!(queue.try_next().is_some());
        assert!(handle.is_idle());
        assert!(handle.submit(job(1)));
    }

    #[test]
    fn failed_call_publishes_empty_snapshot() {
        let state = RecognitionState::new();
        let generation = state.reset();
        state.publish(generation, vec![detection(&[("ana", 0.9)])]);

        let recognizer = FakeRecognizer::failing();
        run_job(&recognizer, &state, job(generation));

        assert!(state.snapshot().detections.is_empty());
        assert_eq!(recognizer.calls(), 1);
    }

    #[test]
    fn result_for_old_generation_is_dropped() {
        let state = RecognitionState::new();
        let old = state.reset();
        state.reset();

        let recognizer = FakeRecognizer::returning(vec![detection(&[("ana", 0.9)])]);
        run_job(&recognizer, &state, job(old));

        assert!(state.snapshot().detections.is_empty());
    }

    #[test]
    fn worker_thread_publishes_and_frees_the_slot() {
        let state = Arc::new(RecognitionState::new());
        let generation = state.reset();
        let recognizer = Arc::new(FakeRecognizer::returning(vec![detection(&[("ana", 0.9)])]));

        let handle = spawn_recognition_worker(recognizer.clone(), state.clone()).unwrap();
        assert!(handle.submit(job(generation)));

        assert!(wait_until(Duration::from_secs(2), || handle.is_idle()));
        assert_eq!(state.snapshot().detections.len(), 1);
        assert_eq!(recognizer.calls(), 1);
    }
}
