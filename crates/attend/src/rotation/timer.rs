//! Phase-locked periodic timer
//!
//! Fires a callback on the absolute boundaries `start + k * period` instead of
//! sleeping a fixed `period` between firings. After every firing the next delay
//! is recomputed from the current wall-clock time, so callback latency and
//! timer imprecision never accumulate:
//!
//! ```text
//!   start      start+P     start+2P    start+3P    start+4P
//!     |-----------|-----------|-----------|-----------|
//!        ^run()   ^fire       ^fire   (late)   ^fire  ^fire
//!                                       └─ next delay shortened
//! ```
//!
//! A firing that arrives after one or more boundaries have passed does not
//! catch up: exactly one next firing is scheduled on the nearest future
//! boundary and the missed ones are skipped.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use super::clock::{Clock, SystemClock};

/// Callback run on every boundary
pub type Tick = Box<dyn FnMut() -> Result<()> + Send + 'static>;

/// Cloneable stop switch for a running timer.
///
/// Safe to use from inside the timer's own callback.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancel: CancellationToken,
}

impl TimerHandle {
    /// Stop the timer. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Timer that keeps its firings locked to absolute period boundaries.
pub struct PhaseLockedTimer {
    start: SystemTime,
    period: Duration,
    clock: Arc<dyn Clock>,
    tick: Option<Tick>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
}

impl PhaseLockedTimer {
    /// Create a stopped timer.
    ///
    /// `start` is the reference instant the boundaries are counted from;
    /// it may lie in the past or the future.
    pub fn new<F>(tick: F, start: SystemTime, period: Duration) -> Result<Self>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        if period.is_zero() {
            bail!("Timer period must be positive");
        }

        Ok(Self {
            start,
            period,
            clock: Arc::new(SystemClock),
            tick: Some(Box::new(tick)),
            cancel: CancellationToken::new(),
            task: None,
        })
    }

    /// Replace the wall-clock source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop switch that can be moved into the callback.
    pub fn handle(&self) -> TimerHandle {
        TimerHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Start firing. The first firing happens immediately.
    ///
    /// Must be called from within a tokio runtime. A timer runs at most once;
    /// calling `run` again is an error.
    pub fn run(&mut self) -> Result<()> {
        let tick = self
            .tick
            .take()
            .context("Timer already started")?;

        let start = self.start;
        let period = self.period;
        let clock = self.clock.clone();
        let cancel = self.cancel.clone();

        debug!(
            "Phase-locked timer started: period {:?}, start {:?}",
            period, start
        );
        self.task = Some(tokio::spawn(run_loop(tick, start, period, clock, cancel)));
        Ok(())
    }

    /// Stop firing. Idempotent and safe before `run`.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the timer was started and has not stopped yet.
    pub fn is_running(&self) -> bool {
        match &self.task {
            Some(task) => !task.is_finished() && !self.cancel.is_cancelled(),
            None => false,
        }
    }

    /// Wait for the timer to stop and surface a callback failure.
    ///
    /// Returns immediately if the timer was never started.
    pub async fn wait(&mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => task.await.context("Timer task panicked")?,
            None => Ok(()),
        }
    }
}

impl Drop for PhaseLockedTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    mut tick: Tick,
    start: SystemTime,
    period: Duration,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut target: Option<i128> = None;
    let mut firings: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if let Err(e) = tick() {
            // Fail-stop
            error!("Timer callback failed after {} firings: {:#}", firings, e);
            cancel.cancel();
            return Err(e.context("Timer callback failed"));
        }
        firings += 1;

        if cancel.is_cancelled() {
            break;
        }

        let (delay, boundary) = next_firing(start, period, clock.now(), target);
        target = Some(boundary);
        trace!("Next firing at boundary {} in {:?}", boundary, delay);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("Phase-locked timer stopped after {} firings", firings);
    Ok(())
}

/// Delay until the next boundary, and that boundary's index.
///
/// The next boundary is the first one strictly after `now`. If that is the
/// boundary the previous sleep already targeted (the timer woke a hair early
/// by wall-clock time), the one after it is used so no boundary fires twice.
pub(crate) fn next_firing(
    start: SystemTime,
    period: Duration,
    now: SystemTime,
    previous: Option<i128>,
) -> (Duration, i128) {
    let period_ns = period.as_nanos().max(1) as i128;
    let elapsed_ns = match now.duration_since(start) {
        Ok(d) => d.as_nanos() as i128,
        Err(e) => -(e.duration().as_nanos() as i128),
    };

    let mut boundary = elapsed_ns.div_euclid(period_ns) + 1;
    if previous == Some(boundary) {
        boundary += 1;
    }

    let delay_ns = boundary * period_ns - elapsed_ns;
    let delay = Duration::from_nanos(u64::try_from(delay_ns).unwrap_or(u64::MAX));
    (delay, boundary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::clock::TokioClock;
    use std::sync::Mutex;
    use std::time::UNIX_EPOCH;

    fn at(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_next_firing_on_boundary() {
        let (delay, boundary) = next_firing(at(10_000), SECOND, at(13_000), None);
        assert_eq!(delay, SECOND);
        assert_eq!(boundary, 4);
    }

    #[test]
    fn test_next_firing_corrects_drift() {
        let (delay, boundary) = next_firing(at(10_000), SECOND, at(13_250), None);
        assert_eq!(delay, Duration::from_millis(750));
        assert_eq!(boundary, 4);
    }

    #[test]
    fn test_next_firing_skips_missed_boundaries() {
        // Woke 2.6 periods late: one firing on the next boundary only
        let (delay, boundary) = next_firing(at(10_000), SECOND, at(15_600), Some(3));
        assert_eq!(delay, Duration::from_millis(400));
        assert_eq!(boundary, 6);
    }

    #[test]
    fn test_next_firing_early_wakeup_does_not_refire() {
        let (delay, boundary) = next_firing(at(10_000), SECOND, at(13_999), Some(4));
        assert_eq!(boundary, 5);
        assert_eq!(delay, Duration::from_millis(1001));
    }

    #[test]
    fn test_next_firing_before_start() {
        let (delay, boundary) = next_firing(at(10_000), SECOND, at(8_700), None);
        assert_eq!(boundary, -1);
        assert_eq!(delay, Duration::from_millis(300));
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(PhaseLockedTimer::new(|| Ok(()), at(0), Duration::ZERO).is_err());
    }

    #[test]
    fn test_stop_before_run_is_safe() {
        let timer = PhaseLockedTimer::new(|| Ok(()), at(0), SECOND).unwrap();
        timer.stop();
        timer.stop();
        assert!(!timer.is_running());
    }

    fn recording_timer(
        clock: Arc<TokioClock>,
        start: SystemTime,
    ) -> (PhaseLockedTimer, Arc<Mutex<Vec<SystemTime>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let log = fired.clone();
        let tick_clock = clock.clone();
        let timer = PhaseLockedTimer::new(
            move || {
                log.lock().unwrap().push(tick_clock.now());
                Ok(())
            },
            start,
            SECOND,
        )
        .unwrap()
        .with_clock(clock);
        (timer, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_on_absolute_boundaries() {
        let clock = Arc::new(TokioClock::new(at(13_250)));
        let (mut timer, fired) = recording_timer(clock, at(10_000));

        timer.run().unwrap();
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        timer.stop();
        timer.wait().await.unwrap();

        let fired = fired.lock().unwrap().clone();
        assert_eq!(fired, vec![at(13_250), at(14_000), at(15_000), at(16_000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_callback_does_not_accumulate_drift() {
        let clock = Arc::new(TokioClock::new(at(10_000)));
        let fired = Arc::new(Mutex::new(Vec::new()));
        let log = fired.clone();
        let tick_clock = clock.clone();
        let mut timer = PhaseLockedTimer::new(
            move || {
                // Each callback "takes" 300ms of wall-clock time
                tick_clock.skew(Duration::from_millis(300));
                log.lock().unwrap().push(tick_clock.now());
                Ok(())
            },
            at(10_000),
            SECOND,
        )
        .unwrap()
        .with_clock(clock);

        timer.run().unwrap();
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        timer.stop();
        timer.wait().await.unwrap();

        // Every callback ends 300ms after its boundary, never later
        let fired = fired.lock().unwrap().clone();
        assert_eq!(fired, vec![at(10_300), at(11_300), at(12_300)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_firing_skips_missed_epochs() {
        let clock = Arc::new(TokioClock::new(at(10_000)));
        let fired = Arc::new(Mutex::new(Vec::new()));
        let log = fired.clone();
        let tick_clock = clock.clone();
        let mut calls = 0;
        let mut timer = PhaseLockedTimer::new(
            move || {
                calls += 1;
                if calls == 2 {
                    tick_clock.skew(Duration::from_millis(2_500));
                }
                log.lock().unwrap().push(tick_clock.now());
                Ok(())
            },
            at(10_000),
            SECOND,
        )
        .unwrap()
        .with_clock(clock);

        timer.run().unwrap();
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        timer.stop();
        timer.wait().await.unwrap();

        // Second call lands at 13.5s wall time; boundaries 12s and 13s are skipped
        let fired = fired.lock().unwrap().clone();
        assert_eq!(fired, vec![at(10_000), at(13_500), at(14_000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_from_inside_callback() {
        let clock = Arc::new(TokioClock::new(at(10_000)));
        let count = Arc::new(Mutex::new(0u32));
        let slot: Arc<Mutex<Option<TimerHandle>>> = Arc::new(Mutex::new(None));
        let seen = count.clone();
        let own_handle = slot.clone();
        let mut timer = PhaseLockedTimer::new(
            move || {
                let mut n = seen.lock().unwrap();
                *n += 1;
                if *n == 3 {
                    if let Some(handle) = own_handle.lock().unwrap().as_ref() {
                        handle.stop();
                    }
                }
                Ok(())
            },
            at(10_000),
            SECOND,
        )
        .unwrap()
        .with_clock(clock);
        *slot.lock().unwrap() = Some(timer.handle());

        timer.run().unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        timer.wait().await.unwrap();
        assert_eq!(*count.lock().unwrap(), 3);
        assert!(timer.handle().is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_error_stops_timer() {
        let clock = Arc::new(TokioClock::new(at(10_000)));
        let count = Arc::new(Mutex::new(0u32));
        let seen = count.clone();
        let mut timer = PhaseLockedTimer::new(
            move || {
                let mut n = seen.lock().unwrap();
                *n += 1;
                if *n == 2 {
                    anyhow::bail!("display went away");
                }
                Ok(())
            },
            at(10_000),
            SECOND,
        )
        .unwrap()
        .with_clock(clock);

        timer.run().unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!timer.is_running());

        let err = timer.wait().await.unwrap_err();
        assert!(format!("{:#}", err).contains("display went away"));
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_twice_is_an_error() {
        let mut timer = PhaseLockedTimer::new(|| Ok(()), at(0), SECOND).unwrap();
        timer.run().unwrap();
        assert!(timer.is_running());
        assert!(timer.run().is_err());
        timer.stop();
        timer.wait().await.unwrap();
        assert!(!timer.is_running());
    }
}
