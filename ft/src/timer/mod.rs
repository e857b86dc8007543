//! Countdown timer engine
//!
//! [`Countdown`] is the one-shot primitive. [`TimerManager`] owns one countdown,
//! broadcasts its remaining time on a fixed cadence, and exposes the controls the
//! command channel drives.

mod countdown;
mod manager;

pub use countdown::{CompletionHandler, Countdown, DEFAULT_BREAK_DURATION};
pub use manager::{DEFAULT_STEP, DEFAULT_TICK_INTERVAL, MIN_SUBSCRIBER_BUFFER, TimerManager, TimerOptions};
