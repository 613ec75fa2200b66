//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to Git. The working tree, the index,
//! and the remote link are all owned by [`GitRepo`]; no other module imports
//! `git2`. The surface is deliberately closed: it exposes exactly the
//! operations the content store needs (open-or-create, stage/commit, move,
//! remove, fetch/merge, push, config reconciliation, unmerged listing, grep)
//! and nothing else.
//!
//! # Error Handling
//!
//! Remote failures are normalized into a fixed classification so callers
//! never parse tool-specific error text:
//!
//! - [`GitError::Configuration`]: the remote URL is structurally unreachable
//!   (operator-fatal, carries the URL and a remediation hint)
//! - [`GitError::ConnectionFailed`]: transient transport failure (retryable)
//! - [`GitError::IndexLocked`]: index lock contention that outlasted the
//!   bounded retry (transient)
//! - [`GitError::FileNotFound`]: a rename source is missing (caller error)
//! - [`GitError::Internal`]: anything unclassified, logged with full detail
//!   and surfaced rather than swallowed
//!
//! Benign remote conditions (empty remote, unborn local branch, nothing to
//! push yet) are absorbed here and never surfaced.
//!
//! # Invariants
//!
//! - Every mutation commits exactly once, or not at all when the staged tree
//!   is byte-identical to HEAD
//! - The `origin` remote always points at the configured URL (drift is
//!   corrected on every open, not just at creation)
//! - No other module calls git2 directly

mod repo;

pub use repo::{GitError, GitRepo, SyncStatus};
