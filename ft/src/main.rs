//! FocoTimer - status-bar countdown timer
//!
//! CLI entry point: runs the timer daemon or talks to a running one.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use focotimer::cli::{Cli, Command, get_log_path};
use focotimer::config::{Config, load_log_level};
use focotimer::daemon::{Daemon, DaemonSettings};
use focotimer::ipc::{Command as PipeCommand, PipeClient, discover_pipes};

fn parse_level(s: &str) -> tracing::Level {
    match s.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > INFO
    let level = cli_log_level
        .or(config_log_level)
        .map(parse_level)
        .unwrap_or(tracing::Level::INFO);

    // Append: `ft send` and `ft run` share the file
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!(pid = std::process::id(), "Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    debug!(?config, "main: config loaded");

    match cli.command {
        Some(Command::Run { duration, pipe_base }) => cmd_run(&config, duration, pipe_base.as_deref()).await,
        Some(Command::Send {
            command,
            pipe,
            pipe_base,
        }) => cmd_send(&config, command, pipe, pipe_base.as_deref()).await,
        Some(Command::Pipes { pipe_base }) => cmd_pipes(&config, pipe_base.as_deref()),
        None => cmd_run(&config, None, None).await,
    }
}

async fn cmd_run(config: &Config, duration: Option<u64>, pipe_base: Option<&Path>) -> Result<()> {
    let settings = DaemonSettings::from_config(config, duration, pipe_base);
    info!(version = focotimer::daemon::VERSION, ?settings, "Starting timer");

    let daemon = Daemon::start(&settings)?;
    eprintln!("Listening on {}", daemon.pipe_path().display());
    daemon.run().await
}

async fn cmd_send(config: &Config, command: PipeCommand, pipe: Option<PathBuf>, pipe_base: Option<&Path>) -> Result<()> {
    let path = match pipe {
        Some(path) => path,
        None => {
            let base = config.pipe_base(pipe_base);
            let mut pipes = discover_pipes(&base)?;
            match pipes.len() {
                0 => return Err(eyre::eyre!("No running timer found for {}", base.display())),
                1 => pipes.remove(0),
                n => {
                    return Err(eyre::eyre!(
                        "{} running timers found for {}; choose one with --pipe",
                        n,
                        base.display()
                    ));
                }
            }
        }
    };

    info!(?path, %command, "Sending command");
    PipeClient::new(&path)
        .send(command)
        .await
        .context(format!("Failed to send '{}' to {}", command, path.display()))
}

fn cmd_pipes(config: &Config, pipe_base: Option<&Path>) -> Result<()> {
    let base = config.pipe_base(pipe_base);
    let pipes = discover_pipes(&base)?;
    if pipes.is_empty() {
        println!("No running timers for {}", base.display());
    }
    for pipe in pipes {
        println!("{}", pipe.display());
    }
    Ok(())
}
