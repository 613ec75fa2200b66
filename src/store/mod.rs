//! store
//!
//! The content store facade.
//!
//! [`Store`] is the narrow, typed surface the rest of the application talks
//! to: save/rename/delete content, search it, list what is currently
//! conflicted, and drive reconciliation with the master repository. Callers
//! never see version-control internals; every failure mode arrives as a
//! typed [`StoreError`] variant or a typed outcome ([`SaveOutcome`],
//! [`SyncStatus`]).
//!
//! # Consistency model
//!
//! Local commits are immediate and unconditional: every mutating call
//! returns only after its filesystem write and its commit are durable.
//! Remote convergence is eventual and can fail; the background scheduler in
//! [`crate::sync`] retries it on an interval.
//!
//! # Concurrency
//!
//! One store exists per process and owns the repository handle behind a
//! single mutex. All operations that touch the working tree or the index
//! (save, rename, delete, sync, push) are mutually exclusive; the underlying
//! index is not safe for concurrent writers. Reads (`search`, `conflicts`)
//! take the same mutex so they never observe a half-staged index.
//!
//! A cross-process file lock ([`lock::StoreLock`]) guards against a second
//! process opening the same data directory.

mod lock;
mod paths;

pub use lock::{LockError, StoreLock};
pub use paths::{ItemKind, ItemPath, PathError};

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, StoreConfig};
use crate::git::{GitError, GitRepo, SyncStatus};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The configuration failed validation before the repository was touched.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A classified repository or remote failure.
    #[error(transparent)]
    Git(#[from] GitError),

    /// The data directory is held by another process.
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl StoreError {
    /// Whether this failure is transient and safe to retry on the next
    /// scheduled attempt (network blips, index lock races).
    ///
    /// Configuration errors and unclassified failures are not transient:
    /// retrying them indefinitely would loop silently against a remote that
    /// structurally cannot work.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Git(GitError::ConnectionFailed { .. })
                | StoreError::Git(GitError::IndexLocked { .. })
        )
    }
}

/// Outcome of a successful `save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The content changed and one commit was recorded.
    Committed,

    /// The bytes were identical to what is already stored. No commit was
    /// created; callers treat this as a successful no-op.
    Unchanged,
}

/// A single search hit within a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    /// 1-based line number.
    pub line: usize,
    /// The matching line's text.
    pub text: String,
}

/// The versioned, remotely-synchronized content store.
///
/// Constructed explicitly via [`Store::open`]; there is no process-wide
/// singleton. Share it behind an `Arc` with whatever needs it.
#[derive(Debug)]
pub struct Store {
    repo: Mutex<GitRepo>,
    data_dir: PathBuf,
    _lock: StoreLock,
}

impl Store {
    /// Open the store, creating the working tree on first use.
    ///
    /// Validates `config`, takes the cross-process lock, then opens or
    /// initializes the repository (including the initial pull when the tree
    /// is freshly created).
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidValue`] if the config fails validation
    /// - [`LockError::AlreadyLocked`] if another process owns the data
    ///   directory
    /// - [`GitError::Init`] if initialization fails; fatal, do not retry
    /// - [`GitError::Configuration`] if the remote is structurally
    ///   unreachable during the initial pull
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;

        let lock = StoreLock::acquire(&config.data_dir)?;
        let repo = GitRepo::open_or_create(config)?;

        info!(data_dir = %config.data_dir.display(), "content store open");

        Ok(Self {
            repo: Mutex::new(repo),
            data_dir: config.data_dir.clone(),
            _lock: lock,
        })
    }

    /// Write `bytes` to `path` (overwriting) and commit with `message`.
    ///
    /// Byte-identical content yields [`SaveOutcome::Unchanged`] and leaves
    /// the history untouched.
    pub fn save(
        &self,
        path: &ItemPath,
        bytes: &[u8],
        message: &str,
    ) -> Result<SaveOutcome, StoreError> {
        let repo = self.repo();
        match repo.save(path.as_rel_path(), bytes, message)? {
            Some(commit) => {
                debug!(%path, %commit, "saved content item");
                Ok(SaveOutcome::Committed)
            }
            None => Ok(SaveOutcome::Unchanged),
        }
    }

    /// Move `from` to `to` and commit both sides as a single transaction.
    ///
    /// # Errors
    ///
    /// - [`GitError::FileNotFound`] if `from` does not exist; checked before
    ///   any staging, so failure leaves no partial state
    pub fn rename(&self, from: &ItemPath, to: &ItemPath, message: &str) -> Result<(), StoreError> {
        let repo = self.repo();
        repo.rename(from.as_rel_path(), to.as_rel_path(), message)?;
        debug!(%from, %to, "renamed content item");
        Ok(())
    }

    /// Delete `path` and commit the removal.
    pub fn delete(&self, path: &ItemPath, message: &str) -> Result<(), StoreError> {
        let repo = self.repo();
        repo.remove(path.as_rel_path(), message)?;
        debug!(%path, "deleted content item");
        Ok(())
    }

    /// Current bytes of a content item.
    pub fn read(&self, path: &ItemPath) -> Result<Vec<u8>, StoreError> {
        let repo = self.repo();
        let abs = repo.workdir().join(path.as_rel_path());
        match fs::read(&abs) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(GitError::FileNotFound { path: abs }.into())
            }
            Err(source) => Err(GitError::Io { path: abs, source }.into()),
        }
    }

    /// Whether a content item currently exists in the working tree.
    pub fn exists(&self, path: &ItemPath) -> bool {
        let repo = self.repo();
        repo.workdir().join(path.as_rel_path()).exists()
    }

    /// Names of all items of a kind, sorted.
    pub fn list(&self, kind: ItemKind) -> Result<Vec<String>, StoreError> {
        let repo = self.repo();
        let dir = repo.workdir().join(kind.dir());

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            // Nothing of this kind has been saved yet.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(GitError::Io { path: dir, source }.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| GitError::Io {
                path: dir.clone(),
                source,
            })?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Case-insensitive substring search across tracked files.
    ///
    /// Returns a map of path to matching lines. An empty query matches
    /// nothing.
    pub fn search(&self, query: &str) -> Result<BTreeMap<String, Vec<SearchMatch>>, StoreError> {
        if query.is_empty() {
            return Ok(BTreeMap::new());
        }

        let repo = self.repo();
        let raw = repo.grep(query)?;

        Ok(raw
            .into_iter()
            .map(|(path, matches)| {
                let matches = matches
                    .into_iter()
                    .map(|(line, text)| SearchMatch { line, text })
                    .collect();
                (path, matches)
            })
            .collect())
    }

    /// Distinct paths currently left unmerged by a failed reconciliation.
    ///
    /// Empty unless a previous [`Store::sync`] reported
    /// [`SyncStatus::Conflicted`]; cleared implicitly by the next successful
    /// merge.
    pub fn conflicts(&self) -> Result<Vec<String>, StoreError> {
        let repo = self.repo();
        Ok(repo.unmerged_paths()?)
    }

    /// Reconcile with the master repository: fetch, merge, then push when
    /// `push_on_sync` is configured.
    pub fn sync(&self) -> Result<SyncStatus, StoreError> {
        let repo = self.repo();
        Ok(repo.sync()?)
    }

    /// Flush local commits to the master without a prior fetch/merge.
    pub fn push(&self) -> Result<(), StoreError> {
        let repo = self.repo();
        Ok(repo.push()?)
    }

    /// Number of commits in the local history. Primarily for diagnostics.
    pub fn commit_count(&self) -> Result<usize, StoreError> {
        let repo = self.repo();
        Ok(repo.commit_count()?)
    }

    /// Destroy the working tree entirely, consuming the store.
    ///
    /// The data directory and all version-control state under it are
    /// removed. The cross-process lock is released when the store drops.
    pub fn obliterate(self) -> Result<(), StoreError> {
        let Store {
            repo,
            data_dir,
            _lock: lock,
        } = self;

        // Close libgit2 handles before removing the tree under them; keep
        // the cross-process lock until the removal finishes.
        drop(repo);

        fs::remove_dir_all(&data_dir).map_err(|source| GitError::Io {
            path: data_dir.clone(),
            source,
        })?;
        info!(data_dir = %data_dir.display(), "obliterated content store");
        drop(lock);
        Ok(())
    }

    /// Acquire the repository mutex.
    ///
    /// A poisoned mutex only means another caller panicked mid-operation;
    /// the repository itself surfaces any real damage as errors, so recover
    /// the guard rather than propagating the poison.
    fn repo(&self) -> MutexGuard<'_, GitRepo> {
        self.repo
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod store_error {
        use super::*;

        #[test]
        fn transient_variants() {
            let conn: StoreError = GitError::ConnectionFailed {
                message: "connection refused".to_string(),
            }
            .into();
            assert!(conn.is_transient());

            let locked: StoreError = GitError::IndexLocked {
                message: "index.lock exists".to_string(),
            }
            .into();
            assert!(locked.is_transient());
        }

        #[test]
        fn invalid_config_surfaces_as_config_error() {
            let config = StoreConfig::new("/tmp/wiki-data", "", "Wiki Server", "wiki@example.com");
            match Store::open(&config) {
                Err(StoreError::Config(ConfigError::InvalidValue(message))) => {
                    assert!(message.contains("remote_url"));
                }
                other => panic!("expected config validation error, got {:?}", other),
            }
        }

        #[test]
        fn fatal_variants_are_not_transient() {
            let config: StoreError = GitError::Configuration {
                url: "/srv/git/wiki.git".to_string(),
                hint: "check remote_url".to_string(),
            }
            .into();
            assert!(!config.is_transient());

            let internal: StoreError = GitError::Internal {
                message: "unexpected".to_string(),
            }
            .into();
            assert!(!internal.is_transient());
        }
    }
}
