//! Named-pipe command channel
//!
//! External processes (status-bar click handlers, shell scripts) drive the
//! timer by writing one command per line into a FIFO owned by this process.
//! [`allocate`] creates a process-scoped FIFO, [`CommandChannel`] reads it and
//! routes commands to the [`TimerManager`](crate::timer::TimerManager), and
//! [`PipeClient`] is the writing side.

use std::path::{Path, PathBuf};

pub mod allocator;
pub mod client;
pub mod commands;
pub mod dispatch;
mod error;

pub use allocator::{MAX_ATTEMPTS, allocate, candidate_path, is_fifo, probe_writable};
pub use client::{PipeClient, discover_pipes};
pub use commands::{Command, UnknownCommand};
pub use dispatch::{CommandChannel, ToggleCallback};
pub use error::PipeError;

/// Base path used when neither configuration nor environment supplies one
pub const DEFAULT_PIPE_BASE: &str = "/tmp/focotimer.pipe";

/// Environment variable overriding the pipe base path
pub const PIPE_BASE_ENV: &str = "FOCOTIMER_PIPE";

/// Get the pipe base path from the environment, or the default
pub fn default_pipe_base() -> PathBuf {
    std::env::var_os(PIPE_BASE_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PIPE_BASE))
}

/// Make a base path absolute, rooting relative paths in the temp directory
pub fn resolve_base(base: &Path) -> PathBuf {
    if base.is_absolute() {
        base.to_path_buf()
    } else {
        std::env::temp_dir().join(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_default_pipe_base_without_env() {
        // SAFETY: serialized with the other env-mutating tests
        unsafe { std::env::remove_var(PIPE_BASE_ENV) };
        assert_eq!(default_pipe_base(), PathBuf::from(DEFAULT_PIPE_BASE));
    }

    #[test]
    #[serial]
    fn test_default_pipe_base_from_env() {
        // SAFETY: serialized with the other env-mutating tests
        unsafe { std::env::set_var(PIPE_BASE_ENV, "/run/user/1000/ft.pipe") };
        assert_eq!(default_pipe_base(), PathBuf::from("/run/user/1000/ft.pipe"));
        unsafe { std::env::remove_var(PIPE_BASE_ENV) };
    }

    #[test]
    #[serial]
    fn test_default_pipe_base_ignores_empty_env() {
        // SAFETY: serialized with the other env-mutating tests
        unsafe { std::env::set_var(PIPE_BASE_ENV, "") };
        assert_eq!(default_pipe_base(), PathBuf::from(DEFAULT_PIPE_BASE));
        unsafe { std::env::remove_var(PIPE_BASE_ENV) };
    }

    #[test]
    fn test_resolve_base_keeps_absolute() {
        assert_eq!(
            resolve_base(Path::new("/var/run/ft.pipe")),
            PathBuf::from("/var/run/ft.pipe")
        );
    }

    #[test]
    fn test_resolve_base_roots_relative_in_temp() {
        let resolved = resolve_base(Path::new("ft.pipe"));
        assert!(resolved.is_absolute());
        assert_eq!(resolved, std::env::temp_dir().join("ft.pipe"));
    }
}
