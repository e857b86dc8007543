//! FocoTimer configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ipc::default_pipe_base;
use crate::timer::TimerOptions;

/// Main FocoTimer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Countdown settings
    pub timer: TimerConfig,

    /// Command pipe settings
    pub pipe: PipeConfig,

    /// Log level used when `--log-level` is not given
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .focotimer.yml
        let local_config = PathBuf::from(".focotimer.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/focotimer/focotimer.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("focotimer").join("focotimer.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Fallback chain without logging; the first file that parses wins
    fn load_quiet() -> Option<Self> {
        let mut candidates = vec![PathBuf::from(".focotimer.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("focotimer").join("focotimer.yml"));
        }
        candidates
            .into_iter()
            .filter(|path| path.exists())
            .find_map(|path| fs::read_to_string(path).ok().and_then(|s| serde_yaml::from_str(&s).ok()))
    }

    /// Pipe base with the CLI override applied
    ///
    /// Priority: `cli` > `FOCOTIMER_PIPE` > `pipe.base` > built-in default.
    pub fn pipe_base(&self, cli: Option<&Path>) -> PathBuf {
        if let Some(base) = cli {
            return base.to_path_buf();
        }
        if std::env::var_os(crate::ipc::PIPE_BASE_ENV).is_some_and(|v| !v.is_empty()) {
            return default_pipe_base();
        }
        self.pipe.base.clone().unwrap_or_else(default_pipe_base)
    }
}

/// Read only the log level from the config chain
///
/// Logging is set up before the full config is loaded, so parse failures here
/// are swallowed; [`Config::load`] reports them once logging is up.
pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
    let config = match config_path {
        Some(path) => Config::load_from_file(path).ok()?,
        None => Config::load_quiet()?,
    };
    config.log_level
}

/// Countdown settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Initial countdown duration in seconds
    #[serde(rename = "duration-secs")]
    pub duration_secs: u64,

    /// Amount added or removed by `inc`/`dec`, in seconds
    #[serde(rename = "step-secs")]
    pub step_secs: u64,

    /// Broadcast cadence in milliseconds
    #[serde(rename = "tick-ms")]
    pub tick_ms: u64,

    /// Per-subscriber buffer size (minimum 10)
    #[serde(rename = "subscriber-buffer")]
    pub subscriber_buffer: usize,

    /// Status-line refresh interval in milliseconds
    #[serde(rename = "refresh-ms")]
    pub refresh_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        let options = TimerOptions::default();
        Self {
            duration_secs: 10,
            step_secs: options.step.as_secs(),
            tick_ms: options.tick_interval.as_millis() as u64,
            subscriber_buffer: options.subscriber_buffer,
            refresh_ms: 1000,
        }
    }
}

impl TimerConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms.max(1))
    }

    /// Manager options derived from this config
    pub fn options(&self) -> TimerOptions {
        TimerOptions {
            tick_interval: Duration::from_millis(self.tick_ms.max(1)),
            step: Duration::from_secs(self.step_secs),
            subscriber_buffer: self.subscriber_buffer,
        }
    }
}

/// Command pipe settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeConfig {
    /// Base path for the pipe; the pid (and a counter) are appended
    pub base: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{DEFAULT_PIPE_BASE, PIPE_BASE_ENV};
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.timer.duration(), Duration::from_secs(10));
        assert_eq!(config.timer.options(), TimerOptions::default());
        assert_eq!(config.timer.refresh_interval(), Duration::from_secs(1));
        assert!(config.pipe.base.is_none());
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
timer:
  duration-secs: 1500
  step-secs: 60
  tick-ms: 100
  subscriber-buffer: 32
  refresh-ms: 500

pipe:
  base: /run/user/1000/ft.pipe

log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.timer.duration(), Duration::from_secs(1500));
        assert_eq!(config.timer.options().step, Duration::from_secs(60));
        assert_eq!(config.timer.options().tick_interval, Duration::from_millis(100));
        assert_eq!(config.timer.options().subscriber_buffer, 32);
        assert_eq!(config.timer.refresh_interval(), Duration::from_millis(500));
        assert_eq!(config.pipe.base, Some(PathBuf::from("/run/user/1000/ft.pipe")));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
timer:
  duration-secs: 60
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.timer.duration(), Duration::from_secs(60));
        assert_eq!(config.timer.step_secs, 5);
        assert_eq!(config.timer.tick_ms, 200);
        assert!(config.pipe.base.is_none());
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("focotimer.yml");
        fs::write(&path, "timer:\n  duration-secs: 42\nlog-level: warn\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.timer.duration_secs, 42);
        assert_eq!(load_log_level(Some(&path)).as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.yml");
        assert!(Config::load(Some(&path)).is_err());
        assert!(load_log_level(Some(&path)).is_none());
    }

    #[test]
    fn test_load_explicit_invalid_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yml");
        fs::write(&path, "timer: [not, a, map]\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    #[serial]
    fn test_pipe_base_priority() {
        let mut config = Config::default();
        // SAFETY: serialized with the other env-mutating tests
        unsafe { std::env::remove_var(PIPE_BASE_ENV) };
        assert_eq!(config.pipe_base(None), PathBuf::from(DEFAULT_PIPE_BASE));

        config.pipe.base = Some(PathBuf::from("/from/config"));
        assert_eq!(config.pipe_base(None), PathBuf::from("/from/config"));

        unsafe { std::env::set_var(PIPE_BASE_ENV, "/from/env") };
        assert_eq!(config.pipe_base(None), PathBuf::from("/from/env"));
        assert_eq!(config.pipe_base(Some(Path::new("/from/cli"))), PathBuf::from("/from/cli"));

        unsafe { std::env::remove_var(PIPE_BASE_ENV) };
    }
}
