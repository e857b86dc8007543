//! Status-bar daemon
//!
//! Composition root for `ft run`: builds the timer, opens the command pipe,
//! wires the `gui` toggle, prints one status-bar line per refresh, and owns the
//! shutdown path.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::ipc::CommandChannel;
use crate::statusbar;
use crate::timer::{TimerManager, TimerOptions};

/// Current version from git describe (set at compile time)
pub const VERSION: &str = env!("GIT_DESCRIBE");

/// Settings resolved from config and CLI
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub duration: Duration,
    pub options: TimerOptions,
    pub pipe_base: PathBuf,
    pub refresh: Duration,
}

impl DaemonSettings {
    /// Merge config with CLI overrides
    pub fn from_config(config: &Config, duration_secs: Option<u64>, pipe_base: Option<&Path>) -> Self {
        Self {
            duration: duration_secs.map(Duration::from_secs).unwrap_or_else(|| config.timer.duration()),
            options: config.timer.options(),
            pipe_base: config.pipe_base(pipe_base),
            refresh: config.timer.refresh_interval(),
        }
    }
}

/// A running timer bound to a command pipe
pub struct Daemon {
    manager: Arc<TimerManager>,
    channel: CommandChannel,
    compact: Arc<AtomicBool>,
    refresh: Duration,
}

impl Daemon {
    /// Build the timer, allocate the pipe and start listening
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(settings: &DaemonSettings) -> Result<Self> {
        debug!(?settings, "Daemon::start: called");
        let manager = Arc::new(TimerManager::with_options(settings.duration, settings.options));
        let channel = CommandChannel::open(&settings.pipe_base, Arc::clone(&manager))
            .context("Failed to create command pipe")?;

        let compact = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&compact);
        channel.set_toggle(move || {
            let was = flag.fetch_xor(true, Ordering::SeqCst);
            debug!(compact = !was, "gui toggle");
        });
        channel.spawn();

        info!(pipe = ?channel.path(), duration = ?settings.duration, "Daemon started");
        Ok(Self {
            manager,
            channel,
            compact,
            refresh: settings.refresh,
        })
    }

    pub fn manager(&self) -> &Arc<TimerManager> {
        &self.manager
    }

    pub fn pipe_path(&self) -> &Path {
        self.channel.path()
    }

    pub fn is_compact(&self) -> bool {
        self.compact.load(Ordering::SeqCst)
    }

    /// Render the current status-bar line for `remaining`
    pub fn status_line(&self, remaining: Duration) -> String {
        statusbar::render(self.manager.duration(), remaining, self.pipe_path(), self.is_compact())
    }

    /// Print status lines to `out` until `stop` resolves
    ///
    /// The remaining time comes from a subscription, falling back to the
    /// snapshot between deliveries.
    pub async fn run_until<W, F>(&self, out: &mut W, stop: F) -> Result<()>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let mut updates: mpsc::Receiver<Duration> = self.manager.subscribe();
        let mut remaining = self.manager.snapshot();
        let mut ticker = tokio::time::interval(self.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    debug!("Daemon::run_until: stop requested");
                    break;
                }
                Some(value) = updates.recv() => {
                    remaining = value;
                }
                _ = ticker.tick() => {
                    writeln!(out, "{}", self.status_line(remaining)).context("Failed to write status line")?;
                    out.flush().context("Failed to flush status line")?;
                }
            }
        }
        Ok(())
    }

    /// Run until SIGINT or SIGTERM, printing to stdout, then shut down
    pub async fn run(&self) -> Result<()> {
        let mut stdout = std::io::stdout();
        self.serve(&mut stdout, stop_signals()).await
    }

    /// Run until `stop` resolves, then shut down
    ///
    /// The pipe is removed on every exit path, including a stop future that
    /// could not be set up.
    pub async fn serve<W, F>(&self, out: &mut W, stop: Result<F>) -> Result<()>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let result = match stop {
            Ok(stop) => {
                info!("Daemon running. Press Ctrl+C to stop.");
                self.run_until(out, stop).await
            }
            Err(e) => Err(e),
        };
        self.shutdown().await;
        result
    }

    /// Stop the reader and the broadcaster, removing the pipe
    ///
    /// Safe to call repeatedly and concurrently.
    pub async fn shutdown(&self) {
        info!("Daemon shutting down...");
        tokio::join!(self.channel.shutdown(), self.manager.shutdown());
        debug!("Daemon::shutdown: complete");
    }
}

/// Future resolving on the first SIGINT or SIGTERM
fn stop_signals() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    })
}
