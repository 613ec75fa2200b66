//! git::repo
//!
//! Repository handle implementation using git2.
//!
//! [`GitRepo`] owns the on-disk working copy and its single `origin` remote.
//! It is responsible for first-time initialization (init + identity + remote
//! + initial pull) versus reuse (open + config drift correction), for the
//! commit-per-mutation discipline, and for turning raw git2 failures into
//! the fixed outcome classification described in [`crate::git`].
//!
//! Classification prefers structured git2 error codes and classes; message
//! pattern matching is the documented last resort for conditions libgit2
//! reports with a generic class (for example a local-path remote that does
//! not exist).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::StoreConfig;

/// Retries applied to index operations that race another index writer.
const INDEX_LOCK_RETRIES: u32 = 5;

/// Backoff between index lock retries.
const INDEX_LOCK_BACKOFF: Duration = Duration::from_millis(25);

/// Errors from repository operations.
///
/// The remote-facing variants form the classification table that callers
/// (the store facade and the sync scheduler) dispatch on. Benign remote
/// conditions never appear here; they are absorbed before errors are built.
#[derive(Debug, Error)]
pub enum GitError {
    /// First-time initialization failed. Fatal and unrecoverable.
    #[error("failed to initialize repository at '{}': {message}", .path.display())]
    Init {
        /// The working tree path that could not be initialized
        path: PathBuf,
        /// Description of the failure
        message: String,
    },

    /// The remote is structurally unreachable (bad URL, missing repository).
    ///
    /// This must be surfaced to an operator; retrying cannot help.
    #[error("remote repository '{url}' is unreachable: {hint}")]
    Configuration {
        /// The configured remote URL
        url: String,
        /// Remediation hint for the operator
        hint: String,
    },

    /// Transient network or transport failure. Safe to retry later.
    #[error("connection to remote failed: {message}")]
    ConnectionFailed {
        /// The underlying transport diagnostic
        message: String,
    },

    /// A rename source does not exist on disk.
    #[error("file not found: {}", .path.display())]
    FileNotFound {
        /// The missing path
        path: PathBuf,
    },

    /// The index lock stayed contended past the bounded retry.
    #[error("index is locked by another operation: {message}")]
    IndexLocked {
        /// The underlying lock diagnostic
        message: String,
    },

    /// Filesystem error inside the working tree.
    #[error("i/o error at '{}': {source}", .path.display())]
    Io {
        /// The path being touched
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Unclassified git failure. Logged in full before being surfaced.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

/// Outcome of a reconciliation against the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Local and remote histories agree (including the benign no-op cases:
    /// empty remote, unborn local branch, nothing to push).
    Synced,

    /// The merge stopped on conflicting hunks. Carries the distinct paths
    /// currently unmerged; resolution is manual.
    Conflicted(Vec<String>),
}

impl SyncStatus {
    /// Whether this outcome left the working tree mid-conflict.
    pub fn is_conflicted(&self) -> bool {
        matches!(self, SyncStatus::Conflicted(_))
    }
}

/// The repository handle.
///
/// Owns the working tree, the index, and the `origin` remote link. One
/// handle exists per store; all access is serialized by the store facade,
/// so methods here take `&self` and assume no concurrent caller.
pub struct GitRepo {
    repo: git2::Repository,
    config: StoreConfig,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("workdir", &self.repo.workdir())
            .field("remote_url", &self.config.remote_url)
            .finish()
    }
}

impl GitRepo {
    // =========================================================================
    // Opening and Initialization
    // =========================================================================

    /// Open the working tree at the configured path, creating it on first use.
    ///
    /// Opening an existing tree reconciles its identity and remote
    /// configuration against `config` (deployments reusing a data directory
    /// drift otherwise). Creating a fresh tree initializes the repository,
    /// sets identity, adds `origin`, and performs an initial pull so the
    /// working tree starts from whatever the master already holds.
    ///
    /// # Errors
    ///
    /// - [`GitError::Init`] if the directory or repository cannot be created
    ///   or opened; this is fatal and must not be retried
    /// - [`GitError::Configuration`] / [`GitError::ConnectionFailed`] if the
    ///   initial pull cannot reach the remote
    pub fn open_or_create(config: &StoreConfig) -> Result<Self, GitError> {
        if config.data_dir.join(".git").exists() {
            Self::open_existing(config)
        } else {
            Self::create(config)
        }
    }

    /// Path to the working tree root.
    pub fn workdir(&self) -> &Path {
        // A repository opened or created through this module always has a
        // working directory.
        self.repo.workdir().unwrap_or_else(|| self.config.data_dir.as_path())
    }

    fn open_existing(config: &StoreConfig) -> Result<Self, GitError> {
        let repo = git2::Repository::open(&config.data_dir).map_err(|e| GitError::Init {
            path: config.data_dir.clone(),
            message: e.message().to_string(),
        })?;

        let handle = Self {
            repo,
            config: config.clone(),
        };
        handle.ensure_config()?;
        Ok(handle)
    }

    fn create(config: &StoreConfig) -> Result<Self, GitError> {
        fs::create_dir_all(&config.data_dir).map_err(|e| GitError::Init {
            path: config.data_dir.clone(),
            message: e.to_string(),
        })?;

        let repo = git2::Repository::init(&config.data_dir).map_err(|e| GitError::Init {
            path: config.data_dir.clone(),
            message: e.message().to_string(),
        })?;

        {
            let mut cfg = repo.config().map_err(internal)?;
            cfg.set_str("user.name", &config.author_name)
                .map_err(internal)?;
            cfg.set_str("user.email", &config.author_email)
                .map_err(internal)?;
            // Convert line endings to LF on commit
            cfg.set_str("core.autocrlf", "input").map_err(internal)?;
        }

        repo.remote("origin", &config.remote_url)
            .map_err(internal)?;

        // Point the unborn HEAD at the configured branch so the first commit
        // lands there regardless of the init default.
        repo.set_head(&config.local_branch_ref())
            .map_err(internal)?;

        info!(
            path = %config.data_dir.display(),
            remote = %config.remote_url,
            "created content repository"
        );

        let handle = Self {
            repo,
            config: config.clone(),
        };

        // Pull down initial content from the master.
        handle.pull()?;

        Ok(handle)
    }

    /// Reconcile stored identity and remote configuration with `config`.
    ///
    /// Called on every open of an existing tree. Each corrected key is
    /// logged; matching keys are left untouched.
    pub fn ensure_config(&self) -> Result<(), GitError> {
        let mut cfg = self.repo.config().map_err(internal)?;
        let snapshot = cfg.snapshot().map_err(internal)?;

        let desired = [
            ("user.name", self.config.author_name.as_str()),
            ("user.email", self.config.author_email.as_str()),
        ];

        for (key, want) in desired {
            let current = snapshot.get_string(key).ok();
            if current.as_deref() != Some(want) {
                info!(
                    key,
                    old = current.as_deref().unwrap_or("<unset>"),
                    new = want,
                    "correcting repository configuration drift"
                );
                cfg.set_str(key, want).map_err(internal)?;
            }
        }

        match self.repo.find_remote("origin") {
            Ok(remote) => {
                if remote.url() != Some(self.config.remote_url.as_str()) {
                    info!(
                        key = "remote.origin.url",
                        old = remote.url().unwrap_or("<unset>"),
                        new = %self.config.remote_url,
                        "correcting repository configuration drift"
                    );
                    self.repo
                        .remote_set_url("origin", &self.config.remote_url)
                        .map_err(internal)?;
                }
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                info!(
                    remote = %self.config.remote_url,
                    "adding missing origin remote"
                );
                self.repo
                    .remote("origin", &self.config.remote_url)
                    .map_err(internal)?;
            }
            Err(e) => return Err(internal(e)),
        }

        Ok(())
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Write `bytes` to `rel` (overwriting), stage it, and commit.
    ///
    /// Returns the new commit id, or `None` when the staged tree is
    /// byte-identical to HEAD (no empty commit is created).
    pub fn save(&self, rel: &Path, bytes: &[u8], message: &str) -> Result<Option<String>, GitError> {
        let abs = self.workdir().join(rel);
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).map_err(|source| GitError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&abs, bytes).map_err(|source| GitError::Io {
            path: abs.clone(),
            source,
        })?;

        self.with_index_retry(|repo| {
            let mut index = repo.index()?;
            index.add_path(rel)?;
            index.write()
        })?;

        self.commit_staged(message)
    }

    /// Move `from` to `to` on disk and record both sides under one commit.
    ///
    /// # Errors
    ///
    /// - [`GitError::FileNotFound`] if `from` does not exist; checked before
    ///   any staging happens, so a missing source leaves no partial state
    pub fn rename(&self, from: &Path, to: &Path, message: &str) -> Result<(), GitError> {
        let abs_from = self.workdir().join(from);
        if !abs_from.exists() {
            return Err(GitError::FileNotFound { path: abs_from });
        }

        let abs_to = self.workdir().join(to);
        if let Some(parent) = abs_to.parent() {
            fs::create_dir_all(parent).map_err(|source| GitError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::rename(&abs_from, &abs_to).map_err(|source| GitError::Io {
            path: abs_from.clone(),
            source,
        })?;

        self.with_index_retry(|repo| {
            let mut index = repo.index()?;
            index.add_path(to)?;
            index.remove_path(from)?;
            index.write()
        })?;

        self.commit_staged(message)?;
        Ok(())
    }

    /// Remove `rel` from disk and the index, then commit.
    ///
    /// Deleting a path that was never tracked is a successful no-op.
    pub fn remove(&self, rel: &Path, message: &str) -> Result<(), GitError> {
        let abs = self.workdir().join(rel);
        match fs::remove_file(&abs) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(GitError::Io { path: abs, source }),
        }

        self.with_index_retry(|repo| {
            let mut index = repo.index()?;
            match index.remove_path(rel) {
                Ok(()) => {}
                Err(e) if e.code() == git2::ErrorCode::NotFound => {}
                Err(e) => return Err(e),
            }
            index.write()
        })?;

        self.commit_staged(message)?;
        Ok(())
    }

    /// Commit whatever is staged, using the configured author identity.
    ///
    /// Returns `None` when the staged tree matches HEAD's tree, so
    /// byte-identical saves never create empty commits.
    ///
    /// A save that resolves the last conflicted path of an interrupted merge
    /// concludes that merge: the commit records the merge parents and the
    /// mid-merge state is cleaned up, exactly as `git commit` would.
    fn commit_staged(&self, message: &str) -> Result<Option<String>, GitError> {
        let tree_oid = self.with_index_retry(|repo| repo.index()?.write_tree())?;

        let concluding_merge = self.repo.state() == git2::RepositoryState::Merge;

        let head = self.head_commit()?;
        match &head {
            Some(parent) => {
                if parent.tree_id() == tree_oid && !concluding_merge {
                    debug!(commit_message = message, "staged tree identical to HEAD; skipping commit");
                    return Ok(None);
                }
            }
            None => {
                // Unborn branch with an empty staged tree: the first mutation
                // was a delete of an untracked path. Nothing changed.
                let tree = self.repo.find_tree(tree_oid).map_err(internal)?;
                if tree.is_empty() && !concluding_merge {
                    debug!(commit_message = message, "nothing staged on unborn branch; skipping commit");
                    return Ok(None);
                }
            }
        }

        let mut parent_ids: Vec<git2::Oid> = Vec::new();
        if let Some(parent) = &head {
            parent_ids.push(parent.id());
        }
        if concluding_merge {
            parent_ids.extend(self.merge_head_ids()?);
        }

        let mut parents: Vec<git2::Commit<'_>> = Vec::new();
        for id in parent_ids {
            parents.push(self.repo.find_commit(id).map_err(internal)?);
        }
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let tree = self.repo.find_tree(tree_oid).map_err(internal)?;
        let sig = self.signature()?;

        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .map_err(internal)?;

        if concluding_merge {
            self.repo.cleanup_state().map_err(internal)?;
        }

        debug!(commit = %oid, commit_message = message, "recorded content commit");
        Ok(Some(oid.to_string()))
    }

    /// Merge parents recorded for an in-progress merge, one id per
    /// `MERGE_HEAD` line.
    fn merge_head_ids(&self) -> Result<Vec<git2::Oid>, GitError> {
        let path = self.repo.path().join("MERGE_HEAD");
        let contents = fs::read_to_string(&path).map_err(|source| GitError::Io {
            path: path.clone(),
            source,
        })?;

        let mut ids = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            ids.push(git2::Oid::from_str(line).map_err(internal)?);
        }
        Ok(ids)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Distinct paths currently staged as unmerged.
    ///
    /// The ours/theirs/ancestor entries a conflicted path produces are
    /// deduplicated into one path per conflict.
    pub fn unmerged_paths(&self) -> Result<Vec<String>, GitError> {
        let index = self.repo.index().map_err(internal)?;
        let mut paths = BTreeSet::new();

        for conflict in index.conflicts().map_err(internal)? {
            let conflict = conflict.map_err(internal)?;
            for entry in [conflict.ancestor, conflict.our, conflict.their]
                .into_iter()
                .flatten()
            {
                paths.insert(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }

        Ok(paths.into_iter().collect())
    }

    /// Case-insensitive substring search across tracked files.
    ///
    /// Returns, per matching path, the 1-based line numbers and line text.
    /// Files that are not valid UTF-8 (uploads, images) are skipped.
    pub fn grep(&self, query: &str) -> Result<BTreeMap<String, Vec<(usize, String)>>, GitError> {
        let needle = query.to_lowercase();
        let index = self.repo.index().map_err(internal)?;
        let mut out = BTreeMap::new();

        for entry in index.iter() {
            let rel = String::from_utf8_lossy(&entry.path).into_owned();
            let text = match fs::read_to_string(self.workdir().join(&rel)) {
                Ok(t) => t,
                Err(_) => continue,
            };

            let matches: Vec<(usize, String)> = text
                .lines()
                .enumerate()
                .filter(|(_, line)| line.to_lowercase().contains(&needle))
                .map(|(i, line)| (i + 1, line.to_string()))
                .collect();

            if !matches.is_empty() {
                out.insert(rel, matches);
            }
        }

        Ok(out)
    }

    /// Number of commits reachable from HEAD. Zero for an unborn branch.
    pub fn commit_count(&self) -> Result<usize, GitError> {
        if self.head_commit()?.is_none() {
            return Ok(0);
        }

        let mut revwalk = self.repo.revwalk().map_err(internal)?;
        revwalk.push_head().map_err(internal)?;
        Ok(revwalk.count())
    }

    // =========================================================================
    // Remote Reconciliation
    // =========================================================================

    /// Fetch from origin and merge the tracking branch, then push local
    /// commits when `push_on_sync` is configured.
    ///
    /// A failure at fetch or merge never attempts the push. A conflicted
    /// merge is reported as [`SyncStatus::Conflicted`], not an error; it is
    /// the expected steady state until someone resolves the paths manually.
    pub fn sync(&self) -> Result<SyncStatus, GitError> {
        match self.pull()? {
            SyncStatus::Conflicted(paths) => Ok(SyncStatus::Conflicted(paths)),
            SyncStatus::Synced => {
                if self.config.push_on_sync {
                    self.push()?;
                }
                Ok(SyncStatus::Synced)
            }
        }
    }

    /// Fetch from origin and merge `origin/<branch>` into the local branch.
    fn pull(&self) -> Result<SyncStatus, GitError> {
        self.fetch()?;
        self.merge_tracking()
    }

    fn fetch(&self) -> Result<(), GitError> {
        let mut remote = self.repo.find_remote("origin").map_err(internal)?;

        let mut callbacks = git2::RemoteCallbacks::new();
        let deadline = Instant::now() + self.config.network_timeout();
        callbacks.transfer_progress(move |_| Instant::now() < deadline);

        let mut opts = git2::FetchOptions::new();
        opts.remote_callbacks(callbacks);

        // An empty refspec list uses the remote's configured refspecs, which
        // fetches nothing (successfully) from an empty remote instead of
        // failing on a missing branch.
        remote
            .fetch(&[] as &[&str], Some(&mut opts), None)
            .map_err(|e| classify_remote_error(e, &self.config.remote_url, self.config.network_timeout()))
    }

    /// Merge the remote tracking branch into the local branch.
    fn merge_tracking(&self) -> Result<SyncStatus, GitError> {
        // A reconciliation that previously stopped on conflicts leaves the
        // repository mid-merge; report that state instead of merging again.
        let index = self.repo.index().map_err(internal)?;
        if index.has_conflicts() || self.repo.state() != git2::RepositoryState::Clean {
            return Ok(SyncStatus::Conflicted(self.unmerged_paths()?));
        }

        let tracking = match self.repo.find_reference(&self.config.remote_tracking_ref()) {
            Ok(r) => r,
            // Remote exists but has no commits yet: nothing to merge.
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(SyncStatus::Synced),
            Err(e) => return Err(internal(e)),
        };

        let annotated = self
            .repo
            .reference_to_annotated_commit(&tracking)
            .map_err(internal)?;

        let (analysis, _) = self
            .repo
            .merge_analysis(&[&annotated])
            .map_err(internal)?;

        if analysis.is_up_to_date() {
            return Ok(SyncStatus::Synced);
        }

        if analysis.is_unborn() || analysis.is_fast_forward() {
            self.fast_forward(annotated.id())?;
            return Ok(SyncStatus::Synced);
        }

        if analysis.is_normal() {
            return self.merge_commit(&annotated);
        }

        Err(GitError::Internal {
            message: format!("unexpected merge analysis: {:?}", analysis),
        })
    }

    /// Advance the local branch to `target` and check out the result.
    ///
    /// Covers both the fast-forward case and the unborn-local-branch case
    /// (a fresh store pulling an existing master for the first time).
    fn fast_forward(&self, target: git2::Oid) -> Result<(), GitError> {
        let refname = self.config.local_branch_ref();
        self.repo
            .reference(&refname, target, true, "tether: fast-forward")
            .map_err(internal)?;
        self.repo.set_head(&refname).map_err(internal)?;

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        self.repo
            .checkout_head(Some(&mut checkout))
            .map_err(internal)?;

        debug!(oid = %target, "fast-forwarded to remote tracking branch");
        Ok(())
    }

    /// Perform a true merge of the remote tracking branch.
    ///
    /// On conflicting hunks the repository is intentionally left mid-merge
    /// (index conflicts and all) so the unmerged paths stay observable until
    /// they are resolved manually; the next clean merge clears them.
    fn merge_commit(&self, theirs: &git2::AnnotatedCommit<'_>) -> Result<SyncStatus, GitError> {
        let mut merge_opts = git2::MergeOptions::new();
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.allow_conflicts(true).conflict_style_merge(true);

        self.repo
            .merge(&[theirs], Some(&mut merge_opts), Some(&mut checkout))
            .map_err(internal)?;

        let mut index = self.repo.index().map_err(internal)?;
        if index.has_conflicts() {
            return Ok(SyncStatus::Conflicted(self.unmerged_paths()?));
        }

        let tree_oid = index.write_tree().map_err(internal)?;
        let tree = self.repo.find_tree(tree_oid).map_err(internal)?;

        let ours = self.head_commit()?.ok_or_else(|| GitError::Internal {
            message: "merge against an unborn local branch".to_string(),
        })?;
        let theirs_commit = self.repo.find_commit(theirs.id()).map_err(internal)?;

        let sig = self.signature()?;
        let message = format!("Merge remote-tracking branch 'origin/{}'", self.config.branch);
        self.repo
            .commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&ours, &theirs_commit])
            .map_err(internal)?;
        self.repo.cleanup_state().map_err(internal)?;

        debug!("merged remote changes");
        Ok(SyncStatus::Synced)
    }

    /// Push local commits to origin.
    ///
    /// An unborn local branch is a benign no-op (nothing to push yet).
    pub fn push(&self) -> Result<(), GitError> {
        let refname = self.config.local_branch_ref();
        if !self.ref_exists(&refname) {
            debug!("no local commits yet; skipping push");
            return Ok(());
        }

        let mut remote = self.repo.find_remote("origin").map_err(internal)?;

        let rejection: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let rejection_sink = Arc::clone(&rejection);

        // libgit2 exposes no abortable progress callback on the upload side,
        // so the configured network deadline cannot interrupt a push in
        // flight; a push is best-effort and relies on the transport failing.
        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.push_update_reference(move |name, status| {
            if let Some(status) = status {
                if let Ok(mut slot) = rejection_sink.lock() {
                    *slot = Some(format!("{}: {}", name, status));
                }
            }
            Ok(())
        });

        let mut opts = git2::PushOptions::new();
        opts.remote_callbacks(callbacks);

        let refspec = format!("{refname}:{refname}");
        remote
            .push(&[refspec.as_str()], Some(&mut opts))
            .map_err(|e| classify_remote_error(e, &self.config.remote_url, self.config.network_timeout()))?;

        let rejected = rejection.lock().ok().and_then(|mut slot| slot.take());
        if let Some(rejected) = rejected {
            let message = format!("push rejected by remote: {rejected}");
            error!(detail = %message, "unclassified remote failure");
            return Err(GitError::Internal { message });
        }

        debug!("pushed local commits to origin");
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn ref_exists(&self, refname: &str) -> bool {
        self.repo.find_reference(refname).is_ok()
    }

    /// HEAD commit, or `None` while the local branch is unborn.
    fn head_commit(&self) -> Result<Option<git2::Commit<'_>>, GitError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit().map_err(internal)?)),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                Ok(None)
            }
            Err(e) => Err(internal(e)),
        }
    }

    fn signature(&self) -> Result<git2::Signature<'_>, GitError> {
        git2::Signature::now(&self.config.author_name, &self.config.author_email)
            .map_err(internal)
    }

    /// Run an index operation, retrying briefly when another operation holds
    /// the index lock. Contention that outlasts the retries surfaces as
    /// [`GitError::IndexLocked`], a transient condition callers may retry.
    fn with_index_retry<T>(
        &self,
        mut op: impl FnMut(&git2::Repository) -> Result<T, git2::Error>,
    ) -> Result<T, GitError> {
        let mut attempts = 0;
        loop {
            match op(&self.repo) {
                Ok(value) => return Ok(value),
                Err(e) if e.code() == git2::ErrorCode::Locked => {
                    if attempts >= INDEX_LOCK_RETRIES {
                        return Err(GitError::IndexLocked {
                            message: e.message().to_string(),
                        });
                    }
                    attempts += 1;
                    std::thread::sleep(INDEX_LOCK_BACKOFF);
                }
                Err(e) => return Err(internal(e)),
            }
        }
    }
}

fn internal(e: git2::Error) -> GitError {
    GitError::Internal {
        message: e.message().to_string(),
    }
}

/// Classify a raw git2 remote failure into the fixed outcome table.
///
/// Structured code/class inspection comes first; the message patterns below
/// are the documented fallback for conditions libgit2 reports with a generic
/// class. Anything unmatched is logged in full and surfaced as
/// [`GitError::Internal`] rather than silently absorbed.
fn classify_remote_error(err: git2::Error, remote_url: &str, timeout: Duration) -> GitError {
    use git2::ErrorClass;

    // The transfer-progress callback aborts once the deadline passes, which
    // libgit2 reports as a user callback failure.
    if err.code() == git2::ErrorCode::User {
        return GitError::ConnectionFailed {
            message: format!(
                "network phase exceeded the {}s deadline",
                timeout.as_secs()
            ),
        };
    }

    let message = err.message().to_lowercase();

    // A structurally unreachable remote can surface under a transport class
    // (libgit2 reports "unsupported URL protocol" for a nonexistent local
    // path with class Net), so these patterns win over the class dispatch.
    let unreachable_remote = [
        "failed to resolve path",
        "unsupported url protocol",
        "does not appear to be a git repository",
        "repository not found",
        "no such file or directory",
    ];
    if unreachable_remote.iter().any(|p| message.contains(p)) {
        return GitError::Configuration {
            url: remote_url.to_string(),
            hint: "verify remote_url points at an existing repository; create the master \
                   repository if it has not been set up"
                .to_string(),
        };
    }

    match err.class() {
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh => {
            return GitError::ConnectionFailed {
                message: err.message().to_string(),
            };
        }
        _ => {}
    }

    let transport_failure = [
        "could not resolve",
        "connection refused",
        "connection timed out",
        "hung up",
        "early eof",
        "unexpected disconnect",
    ];
    if transport_failure.iter().any(|p| message.contains(p)) {
        return GitError::ConnectionFailed {
            message: err.message().to_string(),
        };
    }

    error!(
        class = ?err.class(),
        code = ?err.code(),
        detail = err.message(),
        "unclassified remote failure"
    );
    GitError::Internal {
        message: err.message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod classification {
        use super::*;
        use git2::{ErrorClass, ErrorCode};

        const URL: &str = "/srv/git/wiki.git";
        const TIMEOUT: Duration = Duration::from_secs(30);

        fn classify(code: ErrorCode, class: ErrorClass, message: &str) -> GitError {
            classify_remote_error(git2::Error::new(code, class, message), URL, TIMEOUT)
        }

        #[test]
        fn net_class_is_connection_failed() {
            let err = classify(
                ErrorCode::GenericError,
                ErrorClass::Net,
                "connection reset by peer",
            );
            assert!(matches!(err, GitError::ConnectionFailed { .. }));
        }

        #[test]
        fn http_and_ssh_classes_are_connection_failed() {
            for class in [ErrorClass::Http, ErrorClass::Ssh] {
                let err = classify(ErrorCode::GenericError, class, "transport broke");
                assert!(matches!(err, GitError::ConnectionFailed { .. }));
            }
        }

        #[test]
        fn callback_abort_is_connection_failed() {
            // Deadline expiry aborts the transfer via the progress callback.
            let err = classify(ErrorCode::User, ErrorClass::Callback, "user cancelled");
            match err {
                GitError::ConnectionFailed { message } => {
                    assert!(message.contains("deadline"));
                }
                other => panic!("expected ConnectionFailed, got {:?}", other),
            }
        }

        #[test]
        fn unreachable_remote_under_net_class_is_configuration() {
            // libgit2 reports a nonexistent local remote path with class Net;
            // it is still a fatal misconfiguration, not a transient failure.
            let err = classify(
                ErrorCode::GenericError,
                ErrorClass::Net,
                "unsupported URL protocol",
            );
            assert!(matches!(err, GitError::Configuration { .. }));
        }

        #[test]
        fn missing_local_path_remote_is_configuration() {
            let err = classify(
                ErrorCode::GenericError,
                ErrorClass::Os,
                "failed to resolve path '/srv/git/wiki.git': No such file or directory",
            );
            match err {
                GitError::Configuration { url, hint } => {
                    assert_eq!(url, URL);
                    assert!(hint.contains("remote_url"));
                }
                other => panic!("expected Configuration, got {:?}", other),
            }
        }

        #[test]
        fn not_a_repository_is_configuration() {
            let err = classify(
                ErrorCode::GenericError,
                ErrorClass::Repository,
                "remote '/tmp/x' does not appear to be a git repository",
            );
            assert!(matches!(err, GitError::Configuration { .. }));
        }

        #[test]
        fn hung_up_message_is_connection_failed() {
            let err = classify(
                ErrorCode::GenericError,
                ErrorClass::None,
                "the remote end hung up unexpectedly",
            );
            assert!(matches!(err, GitError::ConnectionFailed { .. }));
        }

        #[test]
        fn unknown_failure_stays_internal() {
            let err = classify(
                ErrorCode::GenericError,
                ErrorClass::Odb,
                "object database is on fire",
            );
            assert!(matches!(err, GitError::Internal { .. }));
        }
    }

    mod sync_status {
        use super::*;

        #[test]
        fn conflicted_flag() {
            assert!(!SyncStatus::Synced.is_conflicted());
            assert!(SyncStatus::Conflicted(vec!["pages/Home.textile".to_string()]).is_conflicted());
        }
    }

    mod error_display {
        use super::*;

        #[test]
        fn configuration_error_names_url_and_hint() {
            let err = GitError::Configuration {
                url: "/srv/git/wiki.git".to_string(),
                hint: "create the master repository".to_string(),
            };
            let text = err.to_string();
            assert!(text.contains("/srv/git/wiki.git"));
            assert!(text.contains("create the master repository"));
        }

        #[test]
        fn file_not_found_names_path() {
            let err = GitError::FileNotFound {
                path: PathBuf::from("/data/pages/Missing.textile"),
            };
            assert!(err.to_string().contains("Missing.textile"));
        }
    }
}
