//! FocoTimer - countdown timer driven through a named pipe
//!
//! A [`TimerManager`] owns one countdown and broadcasts its remaining time to
//! subscribers. A [`CommandChannel`] reads newline-delimited commands from a
//! process-scoped FIFO and applies them to the manager, so status-bar click
//! handlers can control the timer with a plain `echo 'inc' > <pipe>`.
//!
//! # Modules
//!
//! - [`signal`] - One-shot signals and task tracking
//! - [`timer`] - Countdown primitive and the broadcasting coordinator
//! - [`ipc`] - Pipe allocation, command dispatch, and the writing client
//! - [`statusbar`] - Clickable status-bar markup
//! - [`daemon`] - `ft run` composition root
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod daemon;
pub mod ipc;
pub mod signal;
pub mod statusbar;
pub mod timer;

pub use config::Config;
pub use daemon::{Daemon, DaemonSettings};
pub use ipc::{Command, CommandChannel, PipeClient, PipeError, allocate, discover_pipes};
pub use signal::{Signal, SignalListener};
pub use timer::{Countdown, TimerManager, TimerOptions};
