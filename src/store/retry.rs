use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::StoreError;

/// Bounded exponential backoff for cooperative multi-process access to a
/// shared result file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 200,
            initial_backoff_ms: 5,
            max_backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Runs `op` until it returns anything other than [`StoreError::Busy`].
    pub fn run<T>(
        &self,
        path: &Path,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = self.initial_backoff_ms;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op() {
                Err(StoreError::Busy { .. }) if attempt < max_attempts => {
                    warn!(
                        path = %path.display(),
                        attempt,
                        backoff_ms = backoff,
                        "result file busy; retrying"
                    );
                    std::thread::sleep(Duration::from_millis(backoff));
                    backoff = (backoff.saturating_mul(2)).min(self.max_backoff_ms.max(1));
                }
                Err(StoreError::Busy { .. }) => {
                    return Err(StoreError::Exhausted {
                        path: path.to_path_buf(),
                        attempts: attempt,
                        lock: LockGuard::lock_path(path),
                    });
                }
                other => return other,
            }
        }
    }
}

/// Exclusive advisory lock on `<target>.lock`, held for the guard's lifetime.
///
/// The lock file itself stays on disk and records the pid of the last holder.
/// The lock is owned by the open file, so the OS releases it when the holder
/// exits for any reason and a leftover file never blocks later runs.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
}

impl LockGuard {
    pub fn lock_path(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    pub fn acquire(target: &Path) -> Result<Self, StoreError> {
        let path = Self::lock_path(target);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        if let Err(err) = FileExt::try_lock_exclusive(&file) {
            if err.kind() == fs2::lock_contended_error().kind()
                || err.kind() == ErrorKind::WouldBlock
            {
                return Err(StoreError::Busy {
                    path: target.to_path_buf(),
                });
            }
            return Err(StoreError::Io { path, source: err });
        }

        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| writeln!(file, "{}", std::process::id()))
            .map_err(|source| StoreError::Io { path, source })?;
        Ok(Self { file })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
