//! PID-file handling
//!
//! Refuses to start when the PID file names a process that is still
//! alive, probed with the no-op `kill(pid, 0)`. A stale file (dead PID or
//! unparseable content) is silently replaced. The file is removed when
//! the guard drops.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::PidFileError;

/// Guard holding the acquired PID file; removes it on drop.
#[derive(Debug)]
pub struct PidFile {
    path: Option<PathBuf>,
}

impl PidFile {
    /// Acquire the PID file at `path`, writing the current process id.
    ///
    /// An empty path disables PID-file handling entirely.
    ///
    /// # Errors
    ///
    /// Returns `PidFileError::AlreadyRunning` when the file holds a live
    /// PID, or `PidFileError::IoError` when the file cannot be written.
    pub fn acquire(path: &str) -> Result<Self, PidFileError> {
        if path.is_empty() {
            debug!("PID file disabled");
            return Ok(Self { path: None });
        }

        let path = PathBuf::from(path);
        if let Ok(contents) = fs::read_to_string(&path) {
            if let Ok(pid) = contents.trim().parse::<i32>() {
                if pid > 0 && process_alive(pid) {
                    return Err(PidFileError::AlreadyRunning {
                        pid,
                        path: path.display().to_string(),
                    });
                }
            }
            warn!(path = %path.display(), "replacing stale PID file");
        }

        fs::write(&path, std::process::id().to_string()).map_err(|e| PidFileError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        debug!(path = %path.display(), pid = std::process::id(), "PID file written");
        Ok(Self { path: Some(path) })
    }

    /// Remove the PID file now instead of waiting for drop.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove PID file");
            }
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Whether a signal can be delivered to `pid`.
fn process_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pid_path(dir: &TempDir) -> String {
        dir.path().join("test.pid").display().to_string()
    }

    #[test]
    fn test_empty_path_disables() {
        let guard = PidFile::acquire("").unwrap();
        drop(guard);
    }

    #[test]
    fn test_acquire_writes_own_pid() {
        let dir = TempDir::new().unwrap();
        let path = pid_path(&dir);

        let guard = PidFile::acquire(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, std::process::id().to_string());
        drop(guard);
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = pid_path(&dir);

        let guard = PidFile::acquire(&path).unwrap();
        assert!(fs::metadata(&path).is_ok());
        drop(guard);
        assert!(fs::metadata(&path).is_err());
    }

    #[test]
    fn test_release_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = pid_path(&dir);

        let guard = PidFile::acquire(&path).unwrap();
        guard.release();
        assert!(fs::metadata(&path).is_err());
    }

    #[test]
    fn test_live_pid_refuses_start() {
        let dir = TempDir::new().unwrap();
        let path = pid_path(&dir);

        // Our own PID is certainly alive.
        fs::write(&path, std::process::id().to_string()).unwrap();

        let result = PidFile::acquire(&path);
        assert!(matches!(result, Err(PidFileError::AlreadyRunning { .. })));
        // The existing file is left untouched on refusal.
        assert!(fs::metadata(&path).is_ok());
    }

    #[test]
    fn test_garbage_content_treated_as_stale() {
        let dir = TempDir::new().unwrap();
        let path = pid_path(&dir);

        fs::write(&path, "not a pid").unwrap();
        let guard = PidFile::acquire(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, std::process::id().to_string());
        drop(guard);
    }

    #[test]
    fn test_dead_pid_treated_as_stale() {
        let dir = TempDir::new().unwrap();
        let path = pid_path(&dir);

        // A child that has already been reaped cannot receive signals.
        let child = std::process::Command::new("true")
            .spawn()
            .expect("spawn true");
        let dead_pid = child.id();
        let mut child = child;
        child.wait().expect("wait");

        fs::write(&path, dead_pid.to_string()).unwrap();
        let guard = PidFile::acquire(&path).unwrap();
        drop(guard);
    }
}
