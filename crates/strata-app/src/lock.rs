//! Single-instance guard backed by a liveness-checked PID file.
//!
//! # Design
//! - The file is created exclusively and holds this process's PID.
//! - A second invocation reads the PID and probes it with signal 0: a live
//!   holder aborts the run, a dead or unparseable one marks the file stale
//!   and it is replaced.
//! - The file is removed when the guard drops.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

/// Held for the duration of a run; releases the lock file on drop.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    /// Acquire the lock at `path`, replacing a stale file if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::LockHeld`] when a live process holds the lock,
    /// or [`AppError::LockIo`] when the file cannot be maintained.
    pub fn acquire(path: &Path) -> AppResult<Self> {
        match Self::create(path) {
            Ok(lock) => Ok(lock),
            Err(source) if source.kind() == io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(path)
                    .map_err(|source| AppError::lock_io("read", path, source))?;
                if let Some(pid) = holder.trim().parse::<i32>().ok().filter(|pid| *pid > 0) {
                    if alive(pid) {
                        return Err(AppError::LockHeld {
                            path: path.to_path_buf(),
                            pid,
                        });
                    }
                }
                warn!(path = %path.display(), holder = holder.trim(), "stale lock file; replacing");
                fs::remove_file(path)
                    .map_err(|source| AppError::lock_io("remove stale", path, source))?;
                Self::create(path).map_err(|source| AppError::lock_io("recreate", path, source))
            }
            Err(source) => Err(AppError::lock_io("create", path, source)),
        }
    }

    fn create(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        write!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %error, "lock file removal failed");
        }
    }
}

/// Probe a PID with signal 0. `EPERM` means the process exists but belongs
/// to another user, which still counts as alive.
fn alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_own_pid_and_releases_on_drop() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("strata.lock");

        let lock = PidLock::acquire(&path)?;
        let held = fs::read_to_string(&path)?;
        assert_eq!(held, std::process::id().to_string());

        drop(lock);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn live_holder_blocks_a_second_instance() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("strata.lock");
        // Our own PID is certainly alive.
        fs::write(&path, std::process::id().to_string())?;

        let error = PidLock::acquire(&path).expect_err("live holder must block");
        assert!(matches!(error, AppError::LockHeld { .. }));
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn unparseable_lock_file_is_treated_as_stale() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("strata.lock");
        fs::write(&path, "not-a-pid")?;

        let _lock = PidLock::acquire(&path)?;
        assert_eq!(fs::read_to_string(&path)?, std::process::id().to_string());
        Ok(())
    }
}
