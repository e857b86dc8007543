//! Command channel error types

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Errors raised while allocating or writing to a command pipe
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("Unable to allocate a unique pipe for {} after {attempts} attempts", .base.display())]
    Exhausted { base: PathBuf, attempts: usize },

    #[error("mkfifo {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: Errno,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a named pipe: {}", .0.display())]
    NotAFifo(PathBuf),

    #[error("No reader attached to {}", .0.display())]
    NoReader(PathBuf),
}

impl PipeError {
    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            PipeError::NoReader(_) => true,
            PipeError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}
