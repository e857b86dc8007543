//! Process-scoped FIFO allocation
//!
//! Candidates are `<base>.<pid>`, then `<base>.<pid>.1`, `<base>.<pid>.2`, ...
//! An existing entry is only reused when it is a FIFO that accepts a
//! non-blocking write-open.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::{debug, info};

use super::error::PipeError;
use super::resolve_base;

/// Upper bound on candidate paths tried by [`allocate`]
pub const MAX_ATTEMPTS: usize = 1000;

/// Permission bits requested for new pipes (subject to the umask)
pub const PIPE_MODE: u32 = 0o666;

/// Create a FIFO unique to this process
///
/// Relative `base` paths are rooted in the temp directory.
pub fn allocate(base: &Path) -> Result<PathBuf, PipeError> {
    allocate_with(base, std::process::id(), MAX_ATTEMPTS)
}

/// Create a FIFO for `pid`, trying at most `max_attempts` candidates
pub fn allocate_with(base: &Path, pid: u32, max_attempts: usize) -> Result<PathBuf, PipeError> {
    let base = resolve_base(base);
    debug!(?base, pid, max_attempts, "allocate: called");

    for attempt in 0..max_attempts {
        let path = candidate_path(&base, pid, attempt);
        match mkfifo(&path, Mode::from_bits_truncate(PIPE_MODE)) {
            Ok(()) => {
                info!(?path, "Created command pipe");
                return Ok(path);
            }
            Err(Errno::EEXIST) => {
                if !is_fifo(&path) {
                    debug!(?path, "allocate: existing entry is not a FIFO, skipping");
                    continue;
                }
                if probe_writable(&path) {
                    info!(?path, "Reusing existing command pipe");
                    return Ok(path);
                }
                debug!(?path, "allocate: existing FIFO failed the write probe, skipping");
            }
            Err(source) => {
                debug!(?path, %source, "allocate: mkfifo failed");
                return Err(PipeError::Create { path, source });
            }
        }
    }

    Err(PipeError::Exhausted {
        base,
        attempts: max_attempts,
    })
}

/// Path of the `attempt`-th candidate for `pid`
pub fn candidate_path(base: &Path, pid: u32, attempt: usize) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    if attempt == 0 {
        name.push(format!(".{}", pid));
    } else {
        name.push(format!(".{}.{}", pid, attempt));
    }
    PathBuf::from(name)
}

/// Split a candidate file name into `(pid, attempt)`
///
/// Inverse of [`candidate_path`] for the file-name part; returns `None` for
/// names that do not belong to `base_name`.
pub fn parse_candidate(base_name: &str, file_name: &str) -> Option<(u32, usize)> {
    let suffix = file_name.strip_prefix(base_name)?.strip_prefix('.')?;
    let mut parts = suffix.split('.');
    let pid = parts.next()?.parse().ok()?;
    let attempt = match parts.next() {
        None => 0,
        Some(n) => n.parse().ok().filter(|&n| n > 0)?,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((pid, attempt))
}

/// Whether `path` is a FIFO (symlinks are not followed)
pub fn is_fifo(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_fifo())
        .unwrap_or(false)
}

/// Try a non-blocking write-open of `path`, closing it immediately
pub fn probe_writable(path: &Path) -> bool {
    let result = OpenOptions::new()
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path);
    debug!(?path, ok = result.is_ok(), "probe_writable");
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn open_reader(path: &Path) -> File {
        OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(path)
            .unwrap()
    }

    #[test]
    fn test_candidate_paths() {
        let base = Path::new("/tmp/focotimer.pipe");
        assert_eq!(candidate_path(base, 42, 0), PathBuf::from("/tmp/focotimer.pipe.42"));
        assert_eq!(candidate_path(base, 42, 1), PathBuf::from("/tmp/focotimer.pipe.42.1"));
        assert_eq!(candidate_path(base, 42, 17), PathBuf::from("/tmp/focotimer.pipe.42.17"));
    }

    #[test]
    fn test_parse_candidate() {
        assert_eq!(parse_candidate("focotimer.pipe", "focotimer.pipe.42"), Some((42, 0)));
        assert_eq!(parse_candidate("focotimer.pipe", "focotimer.pipe.42.3"), Some((42, 3)));
        assert_eq!(parse_candidate("focotimer.pipe", "focotimer.pipe"), None);
        assert_eq!(parse_candidate("focotimer.pipe", "focotimer.pipe.x"), None);
        assert_eq!(parse_candidate("focotimer.pipe", "focotimer.pipe.42.0"), None);
        assert_eq!(parse_candidate("focotimer.pipe", "focotimer.pipe.42.3.1"), None);
        assert_eq!(parse_candidate("focotimer.pipe", "other.pipe.42"), None);
    }

    #[test]
    fn test_allocate_creates_fifo() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("ft.pipe");

        let path = allocate(&base).unwrap();
        assert_eq!(path, candidate_path(&base, std::process::id(), 0));
        assert!(is_fifo(&path));
    }

    #[test]
    fn test_allocate_twice_yields_distinct_pipes() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("ft.pipe");

        let first = allocate(&base).unwrap();
        let second = allocate(&base).unwrap();

        assert_ne!(first, second);
        assert!(is_fifo(&first));
        assert!(is_fifo(&second));
        let first_name = first.to_string_lossy().to_string();
        assert_eq!(second.to_string_lossy(), format!("{}.1", first_name));
    }

    #[test]
    fn test_allocate_skips_regular_file() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("ft.pipe");
        fs::write(candidate_path(&base, 7, 0), "not a pipe").unwrap();

        let path = allocate_with(&base, 7, MAX_ATTEMPTS).unwrap();
        assert_eq!(path, candidate_path(&base, 7, 1));
        assert!(is_fifo(&path));
    }

    #[test]
    fn test_allocate_reuses_fifo_accepting_writes() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("ft.pipe");
        let existing = candidate_path(&base, 7, 0);
        mkfifo(&existing, Mode::from_bits_truncate(PIPE_MODE)).unwrap();
        let _reader = open_reader(&existing);

        let path = allocate_with(&base, 7, MAX_ATTEMPTS).unwrap();
        assert_eq!(path, existing);
    }

    #[test]
    fn test_allocate_skips_fifo_failing_probe() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("ft.pipe");
        let stale = candidate_path(&base, 7, 0);
        mkfifo(&stale, Mode::from_bits_truncate(PIPE_MODE)).unwrap();

        let path = allocate_with(&base, 7, MAX_ATTEMPTS).unwrap();
        assert_eq!(path, candidate_path(&base, 7, 1));
    }

    #[test]
    fn test_allocate_exhausts_attempts() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("ft.pipe");
        for attempt in 0..3 {
            fs::write(candidate_path(&base, 7, attempt), "taken").unwrap();
        }

        let err = allocate_with(&base, 7, 3).unwrap_err();
        assert!(matches!(err, PipeError::Exhausted { attempts: 3, .. }));
    }

    #[test]
    fn test_allocate_missing_directory_is_fatal() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("missing").join("ft.pipe");

        let err = allocate(&base).unwrap_err();
        match err {
            PipeError::Create { source, .. } => assert_eq!(source, Errno::ENOENT),
            other => panic!("expected Create error, got {:?}", other),
        }
    }

    #[test]
    fn test_is_fifo() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, "x").unwrap();
        assert!(!is_fifo(&file));
        assert!(!is_fifo(&temp.path().join("absent")));

        let fifo = temp.path().join("fifo");
        mkfifo(&fifo, Mode::from_bits_truncate(PIPE_MODE)).unwrap();
        assert!(is_fifo(&fifo));
    }

    #[test]
    fn test_probe_writable() {
        let temp = TempDir::new().unwrap();
        let fifo = temp.path().join("fifo");
        mkfifo(&fifo, Mode::from_bits_truncate(PIPE_MODE)).unwrap();
        assert!(!probe_writable(&fifo));

        let _reader = open_reader(&fifo);
        assert!(probe_writable(&fifo));
        assert!(!probe_writable(&temp.path().join("absent")));
    }
}
