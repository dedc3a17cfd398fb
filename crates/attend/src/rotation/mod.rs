//! Presenter-side code rotation
//!
//! - [`PhaseLockedTimer`]: fires on absolute epoch boundaries without drift
//! - [`CodeRotation`]: advances the epoch counter and encodes a fresh code
//!   on every firing
//! - [`Clock`]: wall-clock source, swappable for deterministic tests

mod clock;
mod orchestrator;
mod timer;

pub use clock::{Clock, SystemClock, TokioClock};
pub use orchestrator::{CodeRotation, IssuedCode};
pub use timer::{PhaseLockedTimer, Tick, TimerHandle};
