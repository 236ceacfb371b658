use crate::error::{PhaseError, Result};
use crate::paths;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Exclusive advisory lock on `.phase/context.md.lock`, released on drop.
///
/// The lock file is left in place between runs; only the OS-level lock
/// matters, so a crashed holder never blocks the next invocation.
#[derive(Debug)]
pub struct ContextLock {
    file: File,
    path: PathBuf,
}

impl ContextLock {
    /// Poll `try_lock_exclusive` until it succeeds or `timeout` elapses.
    pub fn acquire(root: &Path, timeout: Duration) -> Result<Self> {
        let path = paths::context_lock_path(root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "context lock acquired");
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        tracing::warn!(path = %path.display(), waited_ms = waited.as_millis() as u64, "context lock timed out");
                        return Err(PhaseError::ContextLocked {
                            path,
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL.min(timeout - waited));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ContextLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
