//! Writing side of the command pipe
//!
//! Used by `ft send` and by tests. A write-open fails with `ENXIO` while the
//! daemon is between reads, so [`PipeClient::send`] retries until its timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::pipe;
use tokio::time::Instant;
use tracing::debug;

use super::allocator::{is_fifo, parse_candidate};
use super::commands::Command;
use super::error::PipeError;
use super::resolve_base;

/// Default time to wait for a reader
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Delay between write-open attempts
const RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Client for a single command pipe
#[derive(Debug, Clone)]
pub struct PipeClient {
    path: PathBuf,
    timeout: Duration,
}

impl PipeClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the pipe exists and is a FIFO
    pub fn pipe_exists(&self) -> bool {
        is_fifo(&self.path)
    }

    /// Write one command line to the pipe
    pub async fn send(&self, cmd: Command) -> Result<()> {
        debug!(path = ?self.path, %cmd, "PipeClient::send: called");
        if !self.pipe_exists() {
            return Err(PipeError::NotAFifo(self.path.clone())).context("Failed to send command");
        }

        let mut sender = self.open_sender().await?;
        sender
            .write_all(format!("{}\n", cmd).as_bytes())
            .await
            .map_err(|source| PipeError::Io {
                path: self.path.clone(),
                source,
            })
            .context("Failed to write command")?;
        debug!(%cmd, "PipeClient::send: written");
        Ok(())
    }

    async fn open_sender(&self) -> Result<pipe::Sender> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let err = match pipe::OpenOptions::new().open_sender(&self.path) {
                Ok(sender) => return Ok(sender),
                Err(e) => open_error(&self.path, e),
            };
            if !err.is_transient() {
                return Err(err).context("Failed to open command pipe");
            }
            if Instant::now() >= deadline {
                return Err(err).context(format!("Timed out after {:?}", self.timeout));
            }
            debug!(error = %err, "PipeClient::open_sender: retrying");
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }
}

/// Classify a failed write-side open; `ENXIO` means no reader is attached
fn open_error(path: &Path, source: std::io::Error) -> PipeError {
    if source.raw_os_error() == Some(Errno::ENXIO as i32) {
        PipeError::NoReader(path.to_path_buf())
    } else {
        PipeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Check if a process is running
pub fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks existence; EPERM means it exists under another user
    matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}

/// Pipes under `base` whose owning process is still alive, sorted by path
pub fn discover_pipes(base: &Path) -> Result<Vec<PathBuf>> {
    let base = resolve_base(base);
    debug!(?base, "discover_pipes: called");
    let dir = base.parent().unwrap_or_else(|| Path::new("/"));
    let base_name = base
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| eyre::eyre!("Invalid pipe base: {}", base.display()))?;

    let entries = std::fs::read_dir(dir).context(format!("Failed to read {}", dir.display()))?;
    let mut pipes: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let (pid, _) = parse_candidate(base_name, name.to_str()?)?;
            let path = entry.path();
            (is_fifo(&path) && is_process_running(pid)).then_some(path)
        })
        .collect();
    pipes.sort();
    debug!(count = pipes.len(), "discover_pipes: found");
    Ok(pipes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::allocator::{PIPE_MODE, allocate, candidate_path};
    use nix::sys::stat::Mode;
    use nix::unistd::mkfifo;
    use tempfile::TempDir;
    use tokio::io::AsyncBufReadExt;

    #[test]
    fn test_client_with_timeout() {
        let client = PipeClient::new("/tmp/ft.pipe.1").with_timeout(Duration::from_secs(10));
        assert_eq!(client.timeout, Duration::from_secs(10));
        assert_eq!(client.path(), Path::new("/tmp/ft.pipe.1"));
    }

    #[test]
    fn test_pipe_exists_false() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain");
        std::fs::write(&file, "x").unwrap();

        assert!(!PipeClient::new(temp.path().join("absent")).pipe_exists());
        assert!(!PipeClient::new(file).pipe_exists());
    }

    #[tokio::test]
    async fn test_send_to_missing_pipe_fails() {
        let temp = TempDir::new().unwrap();
        let client = PipeClient::new(temp.path().join("absent"));
        let err = client.send(Command::Inc).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<PipeError>(), Some(PipeError::NotAFifo(_))));
    }

    #[tokio::test]
    async fn test_send_without_reader_times_out() {
        let temp = TempDir::new().unwrap();
        let path = allocate(&temp.path().join("ft.pipe")).unwrap();
        let client = PipeClient::new(&path).with_timeout(Duration::from_millis(100));

        let started = Instant::now();
        let err = client.send(Command::Start).await.unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(matches!(err.downcast_ref::<PipeError>(), Some(PipeError::NoReader(_))));
    }

    #[test]
    fn test_open_error_classification() {
        let path = Path::new("/tmp/ft.pipe.1");

        let no_reader = open_error(path, std::io::Error::from_raw_os_error(Errno::ENXIO as i32));
        assert!(matches!(no_reader, PipeError::NoReader(_)));
        assert!(no_reader.is_transient());

        let denied = open_error(path, std::io::Error::from_raw_os_error(Errno::EACCES as i32));
        assert!(matches!(denied, PipeError::Io { .. }));
        assert!(!denied.is_transient());
    }

    #[tokio::test]
    async fn test_send_writes_one_line() {
        let temp = TempDir::new().unwrap();
        let path = allocate(&temp.path().join("ft.pipe")).unwrap();
        let receiver = pipe::OpenOptions::new().open_receiver(&path).unwrap();
        let mut lines = tokio::io::BufReader::new(receiver).lines();

        PipeClient::new(&path).send(Command::Dec).await.unwrap();

        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line.as_deref(), Some("dec"));
    }

    #[test]
    fn test_is_process_running() {
        assert!(is_process_running(std::process::id()));
        assert!(!is_process_running(u32::MAX));
    }

    #[test]
    fn test_discover_pipes_filters_entries() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("ft.pipe");
        let me = std::process::id();

        let live = candidate_path(&base, me, 0);
        mkfifo(&live, Mode::from_bits_truncate(PIPE_MODE)).unwrap();
        let live_second = candidate_path(&base, me, 2);
        mkfifo(&live_second, Mode::from_bits_truncate(PIPE_MODE)).unwrap();
        // Regular file with a matching name
        std::fs::write(candidate_path(&base, me, 1), "x").unwrap();
        // Owner is not running
        mkfifo(&candidate_path(&base, i32::MAX as u32, 0), Mode::from_bits_truncate(PIPE_MODE)).unwrap();
        // Different base
        mkfifo(&temp.path().join(format!("other.pipe.{}", me)), Mode::from_bits_truncate(PIPE_MODE)).unwrap();

        let found = discover_pipes(&base).unwrap();
        assert_eq!(found, vec![live, live_second]);
    }

    #[test]
    fn test_discover_pipes_empty_dir() {
        let temp = TempDir::new().unwrap();
        assert!(discover_pipes(&temp.path().join("ft.pipe")).unwrap().is_empty());
    }

    #[test]
    fn test_discover_pipes_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(discover_pipes(&temp.path().join("missing").join("ft.pipe")).is_err());
    }
}
