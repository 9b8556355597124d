//! Single-instance lock.
//!
//! The lock is a file created exclusively and holding the owner's PID. It is
//! removed when the [`InstanceLock`] is dropped.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::download::{DownloadError, DownloadResult};

/// Exclusive lock held for the lifetime of the process.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Try to take the lock at `path`.
    ///
    /// Returns `Ok(None)` if another instance holds it.
    pub fn acquire(path: impl Into<PathBuf>) -> DownloadResult<Option<Self>> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DownloadError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), holder = ?read_pid(&path), "Instance lock is held");
                return Ok(None);
            }
            Err(e) => return Err(DownloadError::write(&path, e)),
        };

        writeln!(file, "{}", std::process::id()).map_err(|e| DownloadError::write(&path, e))?;
        debug!(path = %path.display(), "Acquired instance lock");
        Ok(Some(Self { path }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release instance lock");
        }
    }
}

/// PID recorded in a lock file.
pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("partfetch.lock");

        let first = InstanceLock::acquire(&path).unwrap();
        assert!(first.is_some());
        assert_eq!(read_pid(&path), Some(std::process::id()));

        let second = InstanceLock::acquire(&path).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("partfetch.lock");

        let lock = InstanceLock::acquire(&path).unwrap().unwrap();
        assert_eq!(lock.path(), path.as_path());
        drop(lock);

        assert!(!path.exists());
        assert!(InstanceLock::acquire(&path).unwrap().is_some());
    }
}
