//! Tether - a git-backed, remotely-synchronized content store
//!
//! Tether persists documents (wiki pages, uploads) in a local working tree,
//! commits every mutation to a local git history, and periodically
//! reconciles that history with a master repository. The application above
//! it gets a small, typed surface and never touches version-control
//! internals.
//!
//! # Architecture
//!
//! - [`config`] - Store configuration schema and loading
//! - [`git`] - Single interface for all Git operations (the repository
//!   handle and the remote sync engine)
//! - [`store`] - The content store facade: mutations, search, conflicts
//! - [`sync`] - Background sync scheduler
//!
//! # Consistency model
//!
//! Local commits are immediate and unconditional; every mutating call
//! returns only after its commit is recorded. Remote convergence is
//! eventual: the scheduler fetches, merges, and pushes on an interval, and
//! classifies every failure into a fixed set of typed outcomes (benign
//! no-op, merge conflict, transient connection failure, fatal configuration
//! error, or unclassified).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether::{ItemKind, Store, StoreConfig, SyncScheduler};
//!
//! let config = StoreConfig::new(
//!     "/var/lib/wiki/data",
//!     "git+ssh://wiki-master/srv/git/wiki.git",
//!     "Wiki Server",
//!     "wiki@example.com",
//! );
//!
//! let store = Arc::new(Store::open(&config)?);
//! let scheduler = SyncScheduler::new(store.clone(), config.sync_interval()).spawn();
//!
//! let home = ItemKind::Page.item_path("Home.textile")?;
//! store.save(&home, b"h1. Welcome\n", "created Home")?;
//! ```

pub mod config;
pub mod git;
pub mod store;
pub mod sync;

pub use config::{ConfigError, StoreConfig};
pub use git::{GitError, SyncStatus};
pub use store::{
    ItemKind, ItemPath, LockError, PathError, SaveOutcome, SearchMatch, Store, StoreError,
};
pub use sync::{SchedulerHandle, SyncDriver, SyncScheduler};
