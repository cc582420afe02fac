use fs2::FileExt;
use hdict_core::error::{HdictError, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Advisory exclusive lock on a sibling `<file>.lock`
///
/// Held for as long as a writable store is open; released on drop. The lock
/// file itself is left in place.
#[derive(Debug)]
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    pub fn lock_path(target: &Path) -> PathBuf {
        let mut name = target.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the lock, retrying `retries` times with `delay` between attempts
    /// before failing with `FileLocked`.
    pub fn acquire(target: &Path, retries: u32, delay: Duration) -> Result<Self> {
        let path = Self::lock_path(target);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        let mut attempt = 0;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!("Acquired lock {}", path.display());
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if attempt >= retries {
                        return Err(HdictError::FileLocked(target.to_path_buf()));
                    }
                    attempt += 1;
                    debug!(
                        "Lock {} is held, retry {}/{}",
                        path.display(),
                        attempt,
                        retries
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_lock_fails_until_released() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("data.hdc");

        let first = LockFile::acquire(&target, 0, Duration::from_millis(1)).unwrap();
        assert!(first.path().ends_with("data.hdc.lock"));

        let err = LockFile::acquire(&target, 2, Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, HdictError::FileLocked(_)));

        drop(first);
        assert!(LockFile::acquire(&target, 0, Duration::from_millis(1)).is_ok());
    }
}
