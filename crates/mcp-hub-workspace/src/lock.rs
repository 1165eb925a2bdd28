//! Advisory file lock for the Workspace Cache (spec §4.7).
//!
//! A sibling `.lock` file is held via `flock(2)` for the duration of a
//! mutation. Acquisition retries with exponential backoff starting at
//! 100 ms; once the retry budget is exhausted, a lock file whose mtime is
//! older than the stale threshold is unlinked and acquisition is retried
//! with a bounded recursion depth, recovering from crashed-hub lock leaks.

use mcp_hub_core::HubError;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(2);
const MAX_RETRIES: u32 = 20;
const STALE_THRESHOLD: Duration = Duration::from_secs(30);
const MAX_RECLAIM_DEPTH: u32 = 3;

/// Guard holding the workspace cache lock. Releases `flock` on drop.
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is a valid descriptor owned by `self.file` until drop.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

/// Acquire the advisory lock at `lock_path`, blocking the calling task with
/// async sleeps between non-blocking `flock` attempts. When the retry budget
/// is exhausted, bounded reclaim attempts unlink a stale lock file and retry.
pub async fn acquire(lock_path: &Path) -> Result<CacheLock, HubError> {
    for depth in 0..=MAX_RECLAIM_DEPTH {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|err| {
                HubError::workspace(format!(
                    "failed to open lock file {}: {err}",
                    lock_path.display()
                ))
            })?;

        let mut backoff = INITIAL_BACKOFF;
        for attempt in 0..MAX_RETRIES {
            let fd = file.as_raw_fd();
            // SAFETY: `fd` is a valid descriptor from the `File` opened above.
            let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
            if ret == 0 {
                return Ok(CacheLock {
                    file,
                    path: lock_path.to_path_buf(),
                });
            }

            debug!(attempt, backoff_ms = backoff.as_millis(), "cache lock busy, retrying");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        if depth >= MAX_RECLAIM_DEPTH || !is_stale(lock_path) {
            break;
        }

        warn!(path = %lock_path.display(), "reclaiming stale workspace cache lock");
        if let Err(err) = std::fs::remove_file(lock_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                return Err(HubError::workspace(format!(
                    "failed to reclaim stale lock {}: {err}",
                    lock_path.display()
                )));
            }
        }
    }

    Err(HubError::workspace(format!(
        "timed out acquiring workspace cache lock at {}",
        lock_path.display()
    )))
}

fn is_stale(lock_path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(lock_path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > STALE_THRESHOLD)
        .unwrap_or(false)
}

impl CacheLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn acquires_uncontended_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workspaces.lock");
        let guard = acquire(&path).await.unwrap();
        assert_eq!(guard.path(), path);
    }

    #[tokio::test]
    async fn reacquires_after_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workspaces.lock");
        {
            let _guard = acquire(&path).await.unwrap();
        }
        let _guard2 = acquire(&path).await.unwrap();
    }

    #[tokio::test]
    async fn stale_lock_file_is_reclaimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workspaces.lock");
        std::fs::write(&path, b"").unwrap();
        // Backdate the mtime well past the stale threshold.
        let old = std::time::SystemTime::now() - Duration::from_secs(120);
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(old).unwrap();
        let _ = file.metadata().unwrap().mtime();

        let guard = acquire(&path).await;
        assert!(guard.is_ok());
    }
}
