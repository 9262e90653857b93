//! Latest recognition results shared between the pipeline, the recognition
//! worker, and HTTP readers.
//!
//! Writers build a complete [`RecognitionSnapshot`] and swap it in under a
//! short-held lock; readers clone the `Arc` and never observe a partial
//! update. Every session start or stop opens a new generation, and results
//! tagged with an older generation are discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use recognition::Detection;

use crate::webcam::data::FaceSummary;

#[derive(Clone, Debug)]
pub(crate) struct RecognitionSnapshot {
    pub(crate) detections: Vec<Detection>,
    /// When these detections were stored (or cleared).
    pub(crate) captured_at: DateTime<Utc>,
}

impl RecognitionSnapshot {
    pub(crate) fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            captured_at: Utc::now(),
        }
    }

    pub(crate) fn age_ms(&self, now: DateTime<Utc>) -> u64 {
        now.signed_duration_since(self.captured_at)
            .num_milliseconds()
            .max(0) as u64
    }

    /// Best match per detection, similarity rounded to four decimals.
    pub(crate) fn face_summaries(&self) -> Vec<FaceSummary> {
        self.detections
            .iter()
            .map(|detection| match detection.best_candidate() {
                Some(best) => FaceSummary {
                    name: Some(best.subject.clone()),
                    similarity: round4(best.similarity),
                },
                None => FaceSummary {
                    name: None,
                    similarity: 0.0,
                },
            })
            .collect()
    }
}

struct Slot {
    generation: u64,
    snapshot: Arc<RecognitionSnapshot>,
}

pub(crate) struct RecognitionState {
    slot: Mutex<Slot>,
}

impl RecognitionState {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                generation: 0,
                snapshot: Arc::new(RecognitionSnapshot::new(Vec::new())),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> Arc<RecognitionSnapshot> {
        self.lock().snapshot.clone()
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Clear the detections and start a new generation, returning it.
    pub(crate) fn reset(&self) -> u64 {
        let fresh = Arc::new(RecognitionSnapshot::new(Vec::new()));
        let mut slot = self.lock();
        slot.generation = slot.generation.wrapping_add(1);
        slot.snapshot = fresh;
        slot.generation
    }

    /// Replace the snapshot if `generation` is still current. Returns whether
    /// the detections were applied.
    pub(crate) fn publish(&self, generation: u64, detections: Vec<Detection>) -> bool {
        let next = Arc::new(RecognitionSnapshot::new(detections));
        let mut slot = self.lock();
        if slot.generation != generation {
            return false;
        }
        slot.snapshot = next;
        true
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::webcam::testing::detection;

    #[test]
    fn publish_replaces_whole_snapshot() {
        let state = RecognitionState::new();
        let generation = state.reset();
        assert!(state.publish(generation, vec![detection(&[("ana", 0.9)])]));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.detections.len(), 1);

        assert!(state.publish(generation, Vec::new()));
        assert!(state.snapshot().detections.is_empty());
        assert_eq!(snapshot.detections.len(), 1, "readers keep their copy");
    }

    #[test]
    fn stale_generation_is_rejected() {
        let state = RecognitionState::new();
        let old = state.reset();
        let current = state.reset();
        assert_ne!(old, current);
        assert!(!state.publish(old, vec![detection(&[("ana", 0.9)])]));
        assert!(state.snapshot().detections.is_empty());
        assert_eq!(state.generation(), current);
    }

    #[test]
    fn reset_clears_detections() {
        let state = RecognitionState::new();
        let generation = state.reset();
        state.publish(generation, vec![detection(&[])]);
        state.reset();
        assert!(state.snapshot().detections.is_empty());
    }

    #[test]
    fn publish_stamps_capture_time() {
        let state = RecognitionState::new();
        let generation = state.reset();
        let cleared_at = state.snapshot().captured_at;
        thread::sleep(std::time::Duration::from_millis(5));

        assert!(state.publish(generation, vec![detection(&[("ana", 0.9)])]));
        let published = state.snapshot();
        assert!(published.captured_at > cleared_at);
        assert!(published.age_ms(published.captured_at) == 0);
        assert_eq!(
            published.age_ms(published.captured_at + chrono::Duration::milliseconds(250)),
            250
        );

        assert!(!state.publish(generation.wrapping_sub(1), Vec::new()));
        assert_eq!(state.snapshot().captured_at, published.captured_at);
    }

    #[test]
    fn summaries_pick_best_and_round() {
        let snapshot = RecognitionSnapshot::new(vec![
            detection(&[("A", 0.4), ("B", 0.912_345_6), ("C", 0.912_345_6)]),
            detection(&[]),
        ]);
        let faces = snapshot.face_summaries();
        assert_eq!(
            faces,
            vec![
                FaceSummary {
                    name: Some("B".to_string()),
                    similarity: 0.9123
                },
                FaceSummary {
                    name: None,
                    similarity: 0.0
                },
            ]
        );
    }

    #[test]
    fn concurrent_readers_see_complete_snapshots() {
        let state = Arc::new(RecognitionState::new());
        let generation = state.reset();
        let writer_state = state.clone();
        let writer = thread::spawn(move || {
            for n in 0..500 {
                let faces = (0..(n % 5))
                    .map(|_| detection(&[("x", 0.5)]))
                    .collect::<Vec<_>>();
                writer_state.publish(generation, faces);
            }
        });
        for _ in 0..500 {
            let snapshot = state.snapshot();
            assert!(snapshot.detections.len() < 5);
            assert!(
                snapshot
                    .detections
                    .iter()
                    .all(|d| d.candidates.len() == 1)
            );
        }
        writer.join().unwrap();
    }
}
