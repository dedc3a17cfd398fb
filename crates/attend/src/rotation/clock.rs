//! Wall-clock sources for the rotation timer

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// Wall-clock time source.
///
/// Epoch boundaries are absolute instants, so the timer reads wall-clock
/// time rather than a monotonic clock.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> SystemTime;
}

/// The host's real-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Wall clock that advances with tokio's clock.
///
/// Anchored to a fixed wall-clock instant when created. Under a paused tokio
/// runtime (`start_paused = true`) it moves only when tokio time does, which
/// makes timer behavior reproducible. `skew` pushes the clock forward on top
/// of that, standing in for a slow callback or a wall-clock step.
#[derive(Debug)]
pub struct TokioClock {
    anchor: SystemTime,
    base: tokio::time::Instant,
    skew_nanos: AtomicU64,
}

impl TokioClock {
    pub fn new(anchor: SystemTime) -> Self {
        Self {
            anchor,
            base: tokio::time::Instant::now(),
            skew_nanos: AtomicU64::new(0),
        }
    }

    /// Jump the clock forward without advancing tokio time.
    pub fn skew(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.skew_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for TokioClock {
    fn now(&self) -> SystemTime {
        let skew = Duration::from_nanos(self.skew_nanos.load(Ordering::SeqCst));
        self.anchor + self.base.elapsed() + skew
    }
}
