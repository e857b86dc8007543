//! TimerManager - owns one countdown and broadcasts its remaining time
//!
//! A single broadcaster task samples the countdown every tick, stores the value
//! as the snapshot, and pushes it to every subscriber with `try_send`. Delivery
//! is at-most-latest: a subscriber whose buffer is full misses that tick.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use super::countdown::Countdown;
use crate::signal::{Signal, SignalListener, lock};

/// Broadcast cadence
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Amount added by `inc` and removed by `dec`
pub const DEFAULT_STEP: Duration = Duration::from_secs(5);

/// Smallest per-subscriber buffer
pub const MIN_SUBSCRIBER_BUFFER: usize = 10;

/// Tunables for a [`TimerManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerOptions {
    pub tick_interval: Duration,
    pub step: Duration,
    /// Raised to [`MIN_SUBSCRIBER_BUFFER`] when smaller
    pub subscriber_buffer: usize,
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            step: DEFAULT_STEP,
            subscriber_buffer: MIN_SUBSCRIBER_BUFFER,
        }
    }
}

struct ManagerState {
    countdown: Countdown,
    subscribers: Vec<mpsc::Sender<Duration>>,
    last_snapshot: Duration,
    done: Signal,
}

impl ManagerState {
    /// Remaining time as the consumers see it
    ///
    /// Unlike [`Countdown::remaining`], this is the full duration before the
    /// first start and zero once the countdown has completed.
    fn sample(&self) -> Duration {
        if self.countdown.is_complete() {
            Duration::ZERO
        } else if !self.countdown.has_started() {
            self.countdown.duration()
        } else {
            self.countdown.remaining()
        }
    }

    /// Record `value` as the snapshot and offer it to every subscriber
    fn publish(&mut self, value: Duration) {
        self.last_snapshot = value;
        self.subscribers.retain(|tx| match tx.try_send(value) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        });
    }
}

/// Countdown coordinator shared by the command channel and the consumers
///
/// Every control method is synchronous, total, and serialized by one lock.
pub struct TimerManager {
    state: Arc<Mutex<ManagerState>>,
    configured: Duration,
    options: TimerOptions,
    stop: Signal,
    tasks: TaskTracker,
    runtime: Handle,
}

impl TimerManager {
    /// Create a manager with default options and start its broadcaster
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(duration: Duration) -> Self {
        Self::with_options(duration, TimerOptions::default())
    }

    /// Create a manager with custom options and start its broadcaster
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn with_options(duration: Duration, options: TimerOptions) -> Self {
        debug!(?duration, ?options, "TimerManager::new: called");
        let runtime = Handle::current();
        let options = TimerOptions {
            subscriber_buffer: options.subscriber_buffer.max(MIN_SUBSCRIBER_BUFFER),
            ..options
        };

        let state = Arc::new(Mutex::new(ManagerState {
            countdown: Countdown::with_runtime(duration, runtime.clone()),
            subscribers: Vec::new(),
            last_snapshot: duration,
            done: Signal::new(),
        }));

        let manager = Self {
            state,
            configured: duration,
            options,
            stop: Signal::new(),
            tasks: TaskTracker::new(),
            runtime,
        };

        manager.tasks.spawn_on(
            broadcast(Arc::clone(&manager.state), options.tick_interval, manager.stop.listener()),
            &manager.runtime,
        );
        manager
    }

    /// Register a new subscriber
    ///
    /// The channel is never closed by the manager; dropping the receiver
    /// unregisters it on the next tick.
    pub fn subscribe(&self) -> mpsc::Receiver<Duration> {
        let (tx, rx) = mpsc::channel(self.options.subscriber_buffer);
        let mut state = lock(&self.state);
        state.subscribers.push(tx);
        debug!(count = state.subscribers.len(), "TimerManager::subscribe: added subscriber");
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    /// Start (or restart from zero) the countdown
    pub fn start(&self) {
        let state = lock(&self.state);
        let done = state.done.clone();
        let shared = Arc::downgrade(&self.state);
        state.countdown.set_handler(move || complete(&shared, &done));
        state.countdown.start();
        info!(duration = ?state.countdown.duration(), "Timer started");
    }

    /// Cancel the countdown without completing it
    pub fn stop(&self) {
        lock(&self.state).countdown.stop();
        info!("Timer stopped");
    }

    /// Replace the countdown with a fresh one of the configured duration
    ///
    /// Also installs a new, unfired completion signal; listeners obtained from
    /// `done()` before the reset never fire.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.countdown.stop();
        state.countdown = Countdown::with_runtime(self.configured, self.runtime.clone());
        state.last_snapshot = self.configured;
        state.done = Signal::new();
        info!(duration = ?self.configured, "Timer reset");
    }

    /// Lengthen the countdown by one step
    pub fn inc(&self) {
        let step = self.options.step;
        let duration = lock(&self.state).countdown.update_duration(|d| increase(d, step));
        debug!(?duration, "TimerManager::inc: duration increased");
    }

    /// Shorten the countdown by one step, never below zero
    pub fn dec(&self) {
        let step = self.options.step;
        let duration = lock(&self.state).countdown.update_duration(|d| decrease(d, step));
        debug!(?duration, "TimerManager::dec: duration decreased");
    }

    /// Current countdown duration
    pub fn duration(&self) -> Duration {
        lock(&self.state).countdown.duration()
    }

    /// Duration the manager was constructed with
    pub fn configured_duration(&self) -> Duration {
        self.configured
    }

    pub fn is_complete(&self) -> bool {
        lock(&self.state).countdown.is_complete()
    }

    /// Remaining time as of the last broadcast
    pub fn snapshot(&self) -> Duration {
        lock(&self.state).last_snapshot
    }

    /// Listener on the current completion signal
    pub fn done(&self) -> SignalListener {
        lock(&self.state).done.listener()
    }

    pub fn options(&self) -> TimerOptions {
        self.options
    }

    /// Stop the broadcaster and wait for it to exit
    ///
    /// Safe to call repeatedly and concurrently.
    pub async fn shutdown(&self) {
        if self.stop.fire() {
            info!("TimerManager shutting down");
        }
        self.tasks.close();
        self.tasks.wait().await;
        debug!("TimerManager::shutdown: broadcaster exited");
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.stop.fire();
    }
}

pub(crate) fn increase(duration: Duration, step: Duration) -> Duration {
    duration.saturating_add(step)
}

pub(crate) fn decrease(duration: Duration, step: Duration) -> Duration {
    duration.saturating_sub(step)
}

/// Completion handler installed by `start`
///
/// Runs outside the countdown's lock. It is a no-op when `done` is no longer
/// the manager's current signal, i.e. a reset raced with the fire.
fn complete(shared: &Weak<Mutex<ManagerState>>, done: &Signal) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut state = lock(&shared);
    if !state.done.same_signal(done) {
        debug!("TimerManager::complete: signal replaced, ignoring");
        return;
    }
    if done.fire() {
        info!("Timer complete");
    }
    state.publish(Duration::ZERO);
}

/// Broadcaster task body
async fn broadcast(state: Arc<Mutex<ManagerState>>, tick_interval: Duration, stop: SignalListener) {
    debug!(?tick_interval, "broadcast: starting");
    let mut ticker = tokio::time::interval_at(Instant::now() + tick_interval, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.wait() => {
                debug!("broadcast: stop signal received");
                break;
            }
            _ = ticker.tick() => {
                let mut state = lock(&state);
                let value = state.sample();
                state.publish(value);
            }
        }
    }
    debug!("broadcast: exited");
}
