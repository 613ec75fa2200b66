//! store::lock
//!
//! Exclusive cross-process lock on the working tree.
//!
//! The in-process mutex in [`crate::store`] serializes operations within one
//! process, but nothing stops a second process from opening the same data
//! directory and interleaving index writes with ours. The store lock closes
//! that hole: an OS-level exclusive file lock acquired at open, held for the
//! life of the store, released on drop (RAII).
//!
//! # Storage
//!
//! The lock file is a sibling of the data directory (`<data_dir>.lock`), so
//! it never shows up as an untracked file inside the working tree and
//! survives the tree being obliterated and recreated.
//!
//! # Invariants
//!
//! - Acquisition is non-blocking (fails fast if another process holds it)
//! - The lock is released on drop, even if the holder panics

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("data directory '{}' is locked by another process", .path.display())]
    AlreadyLocked {
        /// The data directory the lock guards
        path: PathBuf,
    },

    /// Failed to create the lock file or its parent directory.
    #[error("failed to create lock file '{}': {source}", .path.display())]
    CreateFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// I/O error during lock operations.
    #[error("lock i/o error: {0}")]
    IoError(#[from] std::io::Error),
}

/// An exclusive lock on a store's data directory.
///
/// Automatically released when dropped.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    file: Option<File>,
}

impl StoreLock {
    /// Attempt to acquire the lock for `data_dir`.
    ///
    /// Non-blocking: if another process holds the lock this returns
    /// [`LockError::AlreadyLocked`] immediately.
    pub fn acquire(data_dir: &Path) -> Result<Self, LockError> {
        let path = Self::lock_path(data_dir);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LockError::CreateFailed {
                path: path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::CreateFailed {
                path: path.clone(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(LockError::AlreadyLocked {
                    path: data_dir.to_path_buf(),
                })
            }
            Err(e) => Err(LockError::IoError(e)),
        }
    }

    /// The lock file guarding `data_dir`: a `.lock` sibling.
    fn lock_path(data_dir: &Path) -> PathBuf {
        let mut os = data_dir.as_os_str().to_os_string();
        os.push(".lock");
        PathBuf::from(os)
    }

    /// Whether this guard currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            // Best effort; the OS releases the lock when the handle closes
            // regardless.
            let _ = fs2::FileExt::unlock(&file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");

        let lock = StoreLock::acquire(&data_dir).unwrap();
        assert!(lock.is_held());
        assert!(lock.path().exists());

        drop(lock);

        // Reacquirable after release.
        let lock = StoreLock::acquire(&data_dir).unwrap();
        assert!(lock.is_held());
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");

        let _held = StoreLock::acquire(&data_dir).unwrap();
        let second = StoreLock::acquire(&data_dir);
        assert!(matches!(second, Err(LockError::AlreadyLocked { .. })));
    }

    #[test]
    fn lock_file_is_sibling_of_data_dir() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");

        let lock = StoreLock::acquire(&data_dir).unwrap();
        assert_eq!(
            lock.path().file_name().unwrap().to_string_lossy(),
            "data.lock"
        );
        assert_eq!(lock.path().parent(), data_dir.parent());
    }
}
