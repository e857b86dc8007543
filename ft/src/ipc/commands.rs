//! Pipe command vocabulary
//!
//! One command per line, plain lowercase tokens. Surrounding whitespace is
//! ignored.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use thiserror::Error;

/// A control command accepted on the pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Command {
    /// Start (or restart) the countdown
    Start,
    /// Stop the countdown without completing it
    Stop,
    /// Add one step to the duration
    Inc,
    /// Subtract one step from the duration
    Dec,
    /// Toggle the status-bar display mode
    Gui,
}

impl Command {
    pub const ALL: [Command; 5] = [Command::Start, Command::Stop, Command::Inc, Command::Dec, Command::Gui];

    /// Wire token for this command
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Inc => "inc",
            Command::Dec => "dec",
            Command::Gui => "gui",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line that is not a known command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown command: {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Command::ALL
            .into_iter()
            .find(|cmd| cmd.as_str() == token)
            .ok_or_else(|| UnknownCommand(token.to_string()))
    }
}
