//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::ipc::Command as PipeCommand;

/// FocoTimer - countdown timer for status bars
#[derive(Parser)]
#[command(
    name = "ft",
    about = "Countdown timer for status bars, controlled through a named pipe",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/focotimer/logs/focotimer.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the timer and print a status-bar line every second
    Run {
        /// Initial duration in seconds
        #[arg(short, long, value_name = "SECS")]
        duration: Option<u64>,

        /// Base path of the command pipe
        #[arg(long, value_name = "PATH")]
        pipe_base: Option<PathBuf>,
    },

    /// Send a command to a running timer
    Send {
        /// Command to send
        #[arg(value_enum)]
        command: PipeCommand,

        /// Exact pipe to write to (skips discovery)
        #[arg(short, long, value_name = "PATH", conflicts_with = "pipe_base")]
        pipe: Option<PathBuf>,

        /// Base path used to discover the pipe
        #[arg(long, value_name = "PATH")]
        pipe_base: Option<PathBuf>,
    },

    /// List pipes of running timers
    Pipes {
        /// Base path used to discover pipes
        #[arg(long, value_name = "PATH")]
        pipe_base: Option<PathBuf>,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("focotimer")
        .join("logs")
        .join("focotimer.log");
    debug!(?path, "get_log_path: returning path");
    path
}
