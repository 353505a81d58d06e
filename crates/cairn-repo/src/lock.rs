//! Exclusive process lock on a repository root.
//!
//! Uses an OS-level advisory lock (`flock` on Unix, `LockFileEx` on Windows)
//! on `repo.lock`, which the OS releases even if the process crashes.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{error, info};

use crate::error::{RepoError, RepoResult};

/// Name of the lock file inside the repository root.
pub const LOCK_FILE: &str = "repo.lock";

/// Held while a repository is open. Dropping it releases the lock.
#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Take the lock on `root` without blocking.
    ///
    /// Fails with [`RepoError::Lock`] if another process (or another handle
    /// in this process) holds it.
    pub fn acquire(root: &Path) -> RepoResult<Self> {
        let path = root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                info!(path = %path.display(), "acquired repository lock");
                Ok(Self { file, path })
            }
            Err(e) if is_contended(&e) => {
                error!(path = %root.display(), "repository is locked by another process");
                Err(RepoError::Lock(root.to_path_buf()))
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to acquire repository lock");
                Err(RepoError::Io(e))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Some platforms report contention as a raw EWOULDBLOCK/EAGAIN instead of
/// `ErrorKind::WouldBlock` (11 on Linux, 35 on macOS).
fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock || matches!(e.raw_os_error(), Some(11) | Some(35))
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            error!(path = %self.path.display(), error = %e, "failed to release repository lock");
        } else {
            info!(path = %self.path.display(), "released repository lock");
        }
    }
}
