//! Status-bar line rendering
//!
//! Output uses polybar's action-tag syntax: `%{A:<action>:} <label> %{A}`
//! makes `<label>` clickable and runs `<action>` on click. Actions write a
//! command into the daemon's pipe.

use std::path::Path;
use std::time::Duration;

use crate::ipc::Command;

/// Wrap `label` in a clickable action tag
///
/// A single trailing newline on the label is dropped.
pub fn action_button(label: &str, action: &str) -> String {
    let label = label.strip_suffix('\n').unwrap_or(label);
    format!("%{{A:{}:}} {} %{{A}}", action, label)
}

/// Shell action that writes `cmd` into `pipe`
pub fn pipe_command(cmd: Command, pipe: &Path) -> String {
    format!("echo '{}' > {}", cmd, pipe.display())
}

/// Drop the sub-second part of `d`
pub fn truncate_to_second(d: Duration) -> Duration {
    Duration::from_secs(d.as_secs())
}

/// Format a duration as `1h2m3s`, `4m0s`, `7s` or `0s`
///
/// Sub-second precision is discarded.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Render one status-bar line
///
/// The full line has `[-]`, `<duration> : <remaining>` and `[+]` buttons bound
/// to `dec`, `gui` and `inc`. The compact line keeps only the middle button,
/// showing the remaining time.
pub fn render(duration: Duration, remaining: Duration, pipe: &Path, compact: bool) -> String {
    let duration = format_duration(truncate_to_second(duration));
    let remaining = format_duration(truncate_to_second(remaining));

    if compact {
        return action_button(&remaining, &pipe_command(Command::Gui, pipe));
    }

    let timestring = format!("{} : {}", duration, remaining);
    [
        action_button("[-]", &pipe_command(Command::Dec, pipe)),
        action_button(&timestring, &pipe_command(Command::Gui, pipe)),
        action_button("[+]", &pipe_command(Command::Inc, pipe)),
    ]
    .concat()
}
