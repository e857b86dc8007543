//! Countdown - a single one-shot timer
//!
//! `start` arms a fire after `duration`; the fire marks the countdown complete
//! and then runs the completion handler. Every arm carries a generation number
//! so a fire that lost a race with `stop` or a re-`start` is discarded.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::signal::lock;

/// Break span carried by every new countdown
pub const DEFAULT_BREAK_DURATION: Duration = Duration::from_secs(60);

/// Handler invoked once per completion
pub type CompletionHandler = Arc<dyn Fn() + Send + Sync>;

struct CountdownState {
    duration: Duration,
    break_duration: Duration,
    started_at: Option<Instant>,
    completed_at: Option<Instant>,
    is_complete: bool,
    handler: Option<CompletionHandler>,
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

impl CountdownState {
    /// Invalidate the current arm, if any
    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    fn elapsed(&self) -> Duration {
        match self.started_at {
            Some(started_at) if !self.is_complete => started_at.elapsed(),
            _ => Duration::ZERO,
        }
    }
}

/// One-shot countdown timer
///
/// All methods take `&self` and are safe to call from any thread. The handle of
/// the Tokio runtime current at construction drives the fire, so `start` works
/// outside runtime context too.
pub struct Countdown {
    state: Arc<Mutex<CountdownState>>,
    runtime: Handle,
}

impl fmt::Debug for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Countdown")
            .field("duration", &state.duration)
            .field("started_at", &state.started_at)
            .field("is_complete", &state.is_complete)
            .field("armed", &state.pending.is_some())
            .finish()
    }
}

impl Countdown {
    /// Create an idle countdown
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(duration: Duration) -> Self {
        Self::with_runtime(duration, Handle::current())
    }

    /// Create an idle countdown fired on the given runtime
    pub fn with_runtime(duration: Duration, runtime: Handle) -> Self {
        debug!(?duration, "Countdown::new: called");
        Self {
            state: Arc::new(Mutex::new(CountdownState {
                duration,
                break_duration: DEFAULT_BREAK_DURATION,
                started_at: None,
                completed_at: None,
                is_complete: false,
                handler: None,
                generation: 0,
                pending: None,
            })),
            runtime,
        }
    }

    /// Set the completion handler, replacing any previous one
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.state).handler = Some(Arc::new(handler));
    }

    /// Remove the completion handler
    pub fn clear_handler(&self) {
        lock(&self.state).handler = None;
    }

    /// Arm (or re-arm) the countdown from zero elapsed time
    pub fn start(&self) {
        let mut state = lock(&self.state);
        state.cancel_pending();
        state.started_at = Some(Instant::now());
        state.is_complete = false;

        let generation = state.generation;
        let duration = state.duration;
        let shared = Arc::clone(&self.state);
        debug!(?duration, generation, "Countdown::start: arming");
        state.pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            fire(&shared, generation);
        }));
    }

    /// Cancel the pending fire without completing
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        if state.pending.is_some() {
            debug!(generation = state.generation, "Countdown::stop: cancelling");
            state.cancel_pending();
        }
    }

    /// Time since `start`, or zero when never started or already complete
    pub fn elapsed(&self) -> Duration {
        lock(&self.state).elapsed()
    }

    /// `duration - elapsed`, floored at zero; zero when never started
    ///
    /// Because `elapsed` is zero after completion, this reports the full
    /// duration again once the countdown has fired.
    pub fn remaining(&self) -> Duration {
        let state = lock(&self.state);
        if state.started_at.is_none() {
            return Duration::ZERO;
        }
        state.duration.saturating_sub(state.elapsed())
    }

    pub fn duration(&self) -> Duration {
        lock(&self.state).duration
    }

    /// Change the target span; a running arm keeps its original fire time
    pub fn set_duration(&self, duration: Duration) {
        lock(&self.state).duration = duration;
    }

    /// Apply `f` to the duration under the lock
    pub fn update_duration<F>(&self, f: F) -> Duration
    where
        F: FnOnce(Duration) -> Duration,
    {
        let mut state = lock(&self.state);
        state.duration = f(state.duration);
        state.duration
    }

    pub fn break_duration(&self) -> Duration {
        lock(&self.state).break_duration
    }

    pub fn set_break_duration(&self, break_duration: Duration) {
        lock(&self.state).break_duration = break_duration;
    }

    pub fn is_complete(&self) -> bool {
        lock(&self.state).is_complete
    }

    pub fn has_started(&self) -> bool {
        lock(&self.state).started_at.is_some()
    }

    pub fn started_at(&self) -> Option<Instant> {
        lock(&self.state).started_at
    }

    pub fn completed_at(&self) -> Option<Instant> {
        lock(&self.state).completed_at
    }

    /// Whether a fire is pending
    pub fn is_armed(&self) -> bool {
        lock(&self.state).pending.is_some()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        lock(&self.state).cancel_pending();
    }
}

/// Complete the countdown if `generation` is still current, then run the handler
///
/// The handler runs after the lock is released, so it may call back into the
/// countdown.
fn fire(shared: &Mutex<CountdownState>, generation: u64) {
    let handler = {
        let mut state = lock(shared);
        if state.generation != generation {
            debug!(generation, current = state.generation, "Countdown::fire: stale arm, ignoring");
            return;
        }
        state.pending = None;
        state.is_complete = true;
        state.completed_at = Some(Instant::now());
        state.handler.clone()
    };

    debug!(generation, has_handler = handler.is_some(), "Countdown::fire: complete");
    if let Some(handler) = handler {
        handler();
    }
}
