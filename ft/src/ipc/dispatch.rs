//! CommandChannel - reads the command pipe and drives the timer
//!
//! The loop cycles OPENING -> READING -> CLOSING until the stop signal fires.
//! Every suspension point races the stop signal, so shutdown never waits on an
//! idle pipe.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::unix::pipe;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::allocator::allocate;
use super::commands::Command;
use super::error::PipeError;
use crate::signal::{Signal, SignalListener, lock};
use crate::timer::TimerManager;

/// Callback invoked for the `gui` command
pub type ToggleCallback = Arc<dyn Fn() + Send + Sync>;

/// Wait before retrying a failed open
pub const OPEN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Wait between EOF and reopening the pipe
pub const REOPEN_DEBOUNCE: Duration = Duration::from_millis(100);

type PipeLines = Lines<BufReader<pipe::Receiver>>;

enum LoopState {
    Opening,
    Reading(PipeLines),
    Closing,
    Stopped,
}

/// Routes parsed commands to the timer and the toggle callback
struct Router {
    manager: Arc<TimerManager>,
    toggle: Mutex<Option<ToggleCallback>>,
}

impl Router {
    fn dispatch(&self, cmd: Command) {
        debug!(%cmd, "dispatch: called");
        match cmd {
            Command::Start => self.manager.start(),
            Command::Stop => self.manager.stop(),
            Command::Inc => self.manager.inc(),
            Command::Dec => self.manager.dec(),
            Command::Gui => {
                let toggle = lock(&self.toggle).clone();
                match toggle {
                    Some(toggle) => toggle(),
                    None => debug!("dispatch: no toggle callback registered"),
                }
            }
        }
    }

    fn handle_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match line.parse::<Command>() {
            Ok(cmd) => {
                info!(%cmd, "Received command");
                self.dispatch(cmd);
            }
            Err(e) => warn!(error = %e, "Ignoring pipe input"),
        }
    }
}

/// Owner of one command pipe and its reader task
pub struct CommandChannel {
    path: PathBuf,
    router: Arc<Router>,
    stop: Signal,
    tasks: TaskTracker,
    spawned: AtomicBool,
    closed: Mutex<bool>,
}

impl CommandChannel {
    /// Allocate a pipe under `base` and bind it to `manager`
    ///
    /// The reader task is not started until [`spawn`](Self::spawn).
    pub fn open(base: &Path, manager: Arc<TimerManager>) -> Result<Self, PipeError> {
        let path = allocate(base)?;
        Ok(Self::from_path(path, manager))
    }

    /// Bind an already existing pipe
    pub fn from_path(path: PathBuf, manager: Arc<TimerManager>) -> Self {
        debug!(?path, "CommandChannel::from_path: called");
        Self {
            path,
            router: Arc::new(Router {
                manager,
                toggle: Mutex::new(None),
            }),
            stop: Signal::new(),
            tasks: TaskTracker::new(),
            spawned: AtomicBool::new(false),
            closed: Mutex::new(false),
        }
    }

    /// Path of the pipe this channel reads
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register (or replace) the `gui` callback
    pub fn set_toggle<F>(&self, toggle: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *lock(&self.router.toggle) = Some(Arc::new(toggle));
    }

    /// Start the reader task; later calls do nothing
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn(&self) {
        if self.spawned.swap(true, Ordering::SeqCst) {
            debug!("CommandChannel::spawn: already running");
            return;
        }
        info!(path = ?self.path, "Listening for commands");
        self.tasks.spawn(run_loop(
            self.path.clone(),
            Arc::clone(&self.router),
            self.stop.listener(),
        ));
    }

    /// Apply one command directly
    pub fn dispatch(&self, cmd: Command) {
        self.router.dispatch(cmd);
    }

    /// Parse and apply one line of pipe input; unknown input is ignored
    pub fn handle_line(&self, line: &str) {
        self.router.handle_line(line);
    }

    /// Listener on the channel's stop signal
    pub fn stop_listener(&self) -> SignalListener {
        self.stop.listener()
    }

    /// Stop the reader, remove the pipe, and wait for the task to exit
    ///
    /// Safe to call concurrently: the first caller fires the stop signal and
    /// removes the pipe, every caller waits for the exit.
    pub async fn shutdown(&self) {
        {
            let mut closed = lock(&self.closed);
            if !*closed {
                *closed = true;
                info!(path = ?self.path, "CommandChannel shutting down");
                self.stop.fire();
                remove_pipe(&self.path);
            }
        }
        self.tasks.close();
        self.tasks.wait().await;
        debug!("CommandChannel::shutdown: reader exited");
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.stop.fire();
    }
}

fn remove_pipe(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(?path, "remove_pipe: removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(?path, error = %e, "Failed to remove command pipe"),
    }
}

fn open_reader(path: &Path) -> io::Result<PipeLines> {
    let receiver = pipe::OpenOptions::new().open_receiver(path)?;
    Ok(BufReader::new(receiver).lines())
}

async fn run_loop(path: PathBuf, router: Arc<Router>, stop: SignalListener) {
    debug!(?path, "run_loop: started");
    let mut state = LoopState::Opening;

    loop {
        state = match state {
            LoopState::Opening => {
                if stop.is_fired() {
                    LoopState::Stopped
                } else {
                    match open_reader(&path) {
                        Ok(lines) => {
                            debug!(?path, "run_loop: pipe opened");
                            LoopState::Reading(lines)
                        }
                        Err(e) => {
                            warn!(?path, error = %e, "Failed to open command pipe, retrying");
                            tokio::select! {
                                _ = stop.wait() => LoopState::Stopped,
                                _ = tokio::time::sleep(OPEN_RETRY_DELAY) => LoopState::Opening,
                            }
                        }
                    }
                }
            }
            LoopState::Reading(mut lines) => {
                tokio::select! {
                    biased;
                    _ = stop.wait() => LoopState::Stopped,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            router.handle_line(&line);
                            LoopState::Reading(lines)
                        }
                        Ok(None) => {
                            debug!("run_loop: writer closed the pipe");
                            LoopState::Closing
                        }
                        Err(e) => {
                            warn!(?path, error = %e, "Error reading command pipe");
                            LoopState::Closing
                        }
                    },
                }
            }
            LoopState::Closing => {
                tokio::select! {
                    _ = stop.wait() => LoopState::Stopped,
                    _ = tokio::time::sleep(REOPEN_DEBOUNCE) => LoopState::Opening,
                }
            }
            LoopState::Stopped => break,
        };
    }

    debug!(?path, "run_loop: stopped");
}
