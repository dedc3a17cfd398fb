//! Presenter-side code rotation
//!
//! Owns the session secret and the epoch counter. The counter starts at the
//! epoch the wall clock is in when the rotation is created, so a presenter
//! that joins late resumes mid-sequence. From then on every timer firing
//! advances it by exactly one; it is never re-read from the clock, which keeps
//! the delivered sequence gap-free even when firings are skipped.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::timer::{PhaseLockedTimer, TimerHandle};
use crate::code;
use crate::config::RotationConfig;

/// One code handed to the display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCode {
    pub session_id: u32,
    pub counter: u32,
    pub code: String,
}

/// Regenerates the session's check-in code on every epoch boundary.
pub struct CodeRotation {
    session_id: u32,
    counter: Arc<AtomicU32>,
    timer: PhaseLockedTimer,
}

impl CodeRotation {
    /// Create a stopped rotation that delivers each new code to `on_code`.
    ///
    /// Fails on an undecodable secret or an out-of-range `truncate_len`.
    /// An error returned by `on_code` stops the rotation.
    pub fn new<F>(config: &RotationConfig, on_code: F) -> Result<Self>
    where
        F: FnMut(IssuedCode) -> Result<()> + Send + 'static,
    {
        Self::with_clock(config, Arc::new(SystemClock), on_code)
    }

    /// Like [`CodeRotation::new`], reading wall-clock time from `clock`.
    pub fn with_clock<F>(config: &RotationConfig, clock: Arc<dyn Clock>, mut on_code: F) -> Result<Self>
    where
        F: FnMut(IssuedCode) -> Result<()> + Send + 'static,
    {
        config.validate()?;
        let secret = config.secret()?;
        let session_id = config.session_id;
        let truncate_len = config.truncate_len;

        let initial = initial_counter(config.t0, config.tx, clock.now())?;
        let counter = Arc::new(AtomicU32::new(initial));

        info!(
            "Code rotation for session {}: epoch {:?}, starting at counter {}",
            session_id, config.tx, initial
        );

        let shared = counter.clone();
        let tick = move || {
            let next = shared
                .load(Ordering::SeqCst)
                .checked_add(1)
                .context("Epoch counter exhausted")?;
            let code = code::encode(session_id, next, &secret, truncate_len)?;
            shared.store(next, Ordering::SeqCst);

            debug!("Session {} counter {} -> {}", session_id, next, code);
            on_code(IssuedCode {
                session_id,
                counter: next,
                code,
            })
        };

        let timer = PhaseLockedTimer::new(tick, config.t0, config.tx)?.with_clock(clock);

        Ok(Self {
            session_id,
            counter,
            timer,
        })
    }

    /// Create a rotation that sends codes into a bounded channel.
    ///
    /// A code that finds the channel full is dropped with a warning (the next
    /// epoch supersedes it). Dropping the receiver stops the rotation.
    pub fn channel(
        config: &RotationConfig,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<IssuedCode>)> {
        Self::channel_with_clock(config, capacity, Arc::new(SystemClock))
    }

    pub fn channel_with_clock(
        config: &RotationConfig,
        capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, mpsc::Receiver<IssuedCode>)> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rotation = Self::with_clock(config, clock, move |issued| {
            match tx.try_send(issued) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(issued)) => {
                    warn!("Code receiver lagging, dropped counter {}", issued.counter);
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    anyhow::bail!("Code receiver dropped")
                }
            }
        })?;
        Ok((rotation, rx))
    }

    /// Start rotating. The first code is delivered immediately.
    pub fn run(&mut self) -> Result<()> {
        self.timer.run()
    }

    /// Stop rotating. Idempotent.
    pub fn stop(&self) {
        self.timer.stop();
    }

    /// Stop switch usable from inside the delivery callback.
    pub fn handle(&self) -> TimerHandle {
        self.timer.handle()
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Wait for the rotation to stop; returns the delivery error if one ended it.
    pub async fn wait(&mut self) -> Result<()> {
        self.timer.wait().await
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Counter of the most recently delivered code (or the starting epoch).
    pub fn counter(&self) -> u32 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// `floor((now - t0) / tx)`, or 0 when `now` is before `t0`.
pub(crate) fn initial_counter(t0: SystemTime, tx: Duration, now: SystemTime) -> Result<u32> {
    let elapsed = now.duration_since(t0).unwrap_or_default();
    let epochs = elapsed.as_nanos() / tx.as_nanos().max(1);
    u32::try_from(epochs).context("Session start is too far in the past for a 32-bit counter")
}
