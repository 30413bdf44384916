// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-scope advisory lock.
//!
//! One lock file per scope, created with `O_CREAT|O_EXCL` and holding the
//! owning process id as decimal text. Release deletes the file. Startup
//! refuses to proceed when the file exists and its owner is still alive;
//! a stale file left by a dead process is reclaimed.

use nix::sys::signal::kill;
use nix::unistd::Pid;
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from lock acquisition.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("scope already locked by running daemon (pid {pid}) at {path}")]
    Held { pid: String, path: PathBuf },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lock file name for a scope: `daemon-<sha256(scope)[:12]>.lock`.
pub fn lock_file_name(scope: &str) -> String {
    let digest = Sha256::digest(scope.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("daemon-{}.lock", &hex[..12])
}

/// Held advisory lock for one scope. Deleted on [`release`](Self::release)
/// or drop.
#[derive(Debug)]
pub struct ScopeLock {
    path: PathBuf,
    released: bool,
}

impl ScopeLock {
    /// Acquire the lock for `scope`, creating the lock file in `dir`.
    ///
    /// If the file already exists and the recorded process is alive, fails
    /// with [`LockError::Held`] naming that pid. A stale file (dead or
    /// unparsable owner) is removed and acquisition retried once.
    pub fn acquire(dir: &Path, scope: &str) -> Result<Self, LockError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(lock_file_name(scope));

        for attempt in 0..2 {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    write!(file, "{}", std::process::id())?;
                    file.sync_all()?;
                    debug!(path = %path.display(), scope, "acquired scope lock");
                    return Ok(Self {
                        path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let pid = std::fs::read_to_string(&path)
                        .unwrap_or_default()
                        .trim()
                        .to_string();

                    if owner_alive(&pid) {
                        return Err(LockError::Held { pid, path });
                    }

                    if attempt == 0 {
                        warn!(
                            path = %path.display(),
                            stale_pid = %pid,
                            "removing stale scope lock left by dead process"
                        );
                        std::fs::remove_file(&path)?;
                        continue;
                    }
                    return Err(LockError::Held { pid, path });
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Both attempts raced with another starting daemon
        let pid = std::fs::read_to_string(&path)
            .unwrap_or_default()
            .trim()
            .to_string();
        Err(LockError::Held { pid, path })
    }

    /// Release the lock by deleting the file.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopeLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Whether the process recorded in the lock file is still running.
///
/// `kill(pid, 0)` probes without signalling: EPERM still means the process
/// exists. An unparsable pid is treated as dead so the stale file can be
/// reclaimed.
fn owner_alive(pid: &str) -> bool {
    let Ok(pid) = pid.parse::<i32>() else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
