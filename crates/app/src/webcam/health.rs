use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

pub(crate) const STALE_THRESHOLD_MS: u64 = 1_500;

/// Marker for "no heartbeat recorded yet".
const NEVER: i64 = i64::MIN;

#[derive(Copy, Clone, Debug)]
pub(crate) enum HealthComponent {
    Capture,
}

impl HealthComponent {
    pub(crate) fn label(self) -> &'static str {
        match self {
            HealthComponent::Capture => "capture",
        }
    }
}

/// Last heartbeat per pipeline stage, in wall-clock milliseconds. Recognition
/// freshness comes from the snapshot timestamp instead.
///
/// Staleness is only reported; it never stops or restarts the session.
pub(crate) struct PipelineHealth {
    capture: AtomicI64,
}

impl PipelineHealth {
    pub(crate) fn new() -> Self {
        Self {
            capture: AtomicI64::new(NEVER),
        }
    }

    fn slot(&self, component: HealthComponent) -> &AtomicI64 {
        match component {
            HealthComponent::Capture => &self.capture,
        }
    }

    pub(crate) fn beat(&self, component: HealthComponent) {
        self.slot(component)
            .store(current_millis(), Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        self.capture.store(NEVER, Ordering::Relaxed);
    }

    pub(crate) fn age_ms(&self, component: HealthComponent, now: i64) -> Option<u64> {
        let last = self.slot(component).load(Ordering::Relaxed);
        if last == NEVER {
            return None;
        }
        Some(now.saturating_sub(last).max(0) as u64)
    }

    /// Stage that has gone quiet while the session is running.
    pub(crate) fn stale_component(&self, now: i64) -> Option<HealthComponent> {
        match self.age_ms(HealthComponent::Capture, now) {
            Some(age) if age > STALE_THRESHOLD_MS => Some(HealthComponent::Capture),
            _ => None,
        }
    }
}

pub(crate) fn current_millis() -> i64 {
    Utc::now().timestamp_millis()
}
