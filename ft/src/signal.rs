//! One-shot signals
//!
//! A [`Signal`] fires at most once and every [`SignalListener`] created from it
//! observes the firing. Signals back the timer's completion notification and
//! the shared stop signal of the background tasks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

/// Lock a std mutex, recovering the guard if a previous holder panicked
///
/// Every structure guarded this way stays valid between statements, so a
/// poisoned lock carries no broken invariant.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Broadcast-once signal
///
/// Cloning a `Signal` yields another handle to the same signal.
#[derive(Debug, Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    /// Create a new, unfired signal
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal
    ///
    /// Returns `true` only for the call that actually fired it; later calls
    /// (concurrent or not) return `false` and change nothing.
    pub fn fire(&self) -> bool {
        let fired = self.tx.send_if_modified(|state| {
            if *state {
                false
            } else {
                *state = true;
                true
            }
        });
        debug!(fired, "Signal::fire");
        fired
    }

    /// Whether the signal has fired
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Whether both handles refer to the same signal
    pub fn same_signal(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }

    /// Create a listener for this signal
    pub fn listener(&self) -> SignalListener {
        SignalListener { rx: self.tx.subscribe() }
    }
}

/// Receiving side of a [`Signal`]
#[derive(Debug, Clone)]
pub struct SignalListener {
    rx: watch::Receiver<bool>,
}

impl SignalListener {
    /// Whether the signal has fired
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the signal fires
    ///
    /// Resolves immediately if it already fired. If every [`Signal`] handle is
    /// dropped without firing, this never resolves: a replaced signal does not
    /// wake its stale listeners.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Whether both listeners observe the same signal
    pub fn same_signal(&self, other: &SignalListener) -> bool {
        self.rx.same_channel(&other.rx)
    }
}
