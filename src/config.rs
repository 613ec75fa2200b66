//! config
//!
//! Store configuration schema and loading.
//!
//! # Overview
//!
//! Everything the store needs to run comes from a single [`StoreConfig`]:
//! where the working tree lives, which master repository it reconciles
//! against, the author identity stamped on every commit, and the knobs for
//! the background synchronizer.
//!
//! The host application is expected to build a `StoreConfig` however it
//! likes (its own config system, CLI flags, environment); [`StoreConfig::from_toml_file`]
//! is provided for hosts that keep the store section in a TOML file.
//!
//! # Example
//!
//! ```toml
//! data_dir = "/var/lib/wiki/data"
//! remote_url = "git+ssh://wiki-master/srv/git/wiki.git"
//! author_name = "Wiki Server"
//! author_email = "wiki@example.com"
//! branch = "master"
//! sync_interval_secs = 60
//! push_on_sync = true
//! network_timeout_secs = 30
//! ```
//!
//! # Validation
//!
//! Config values are validated after parsing; [`StoreConfig::validate`] is
//! also called by `Store::open`, so a hand-built config cannot smuggle an
//! empty remote URL or a zero sync interval past the constructor.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {message}", .path.display())]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Store configuration.
///
/// `data_dir` and `remote_url` have no sensible defaults and must always be
/// provided; the remaining fields default to the values shown in the module
/// docs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Path to the working tree (created on first open if absent).
    pub data_dir: PathBuf,

    /// URL of the master repository the store reconciles against.
    pub remote_url: String,

    /// Author name stamped on every commit.
    pub author_name: String,

    /// Author email stamped on every commit.
    pub author_email: String,

    /// Branch shared with the master repository.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Seconds between background reconciliation attempts.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Whether a scheduled sync pushes local commits after merging.
    ///
    /// When false, `sync()` only fetches and merges; local commits are
    /// flushed by explicit `push()` calls.
    #[serde(default = "default_push_on_sync")]
    pub push_on_sync: bool,

    /// Deadline in seconds for the fetch phase of sync.
    ///
    /// A stalled download is aborted once the deadline passes so it cannot
    /// hold the store mutex and starve content mutations. Pushes cannot be
    /// interrupted mid-transfer and rely on the transport failing.
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_push_on_sync() -> bool {
    true
}

fn default_network_timeout_secs() -> u64 {
    30
}

impl StoreConfig {
    /// Build a config with default knobs from the four required values.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        remote_url: impl Into<String>,
        author_name: impl Into<String>,
        author_email: impl Into<String>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            remote_url: remote_url.into(),
            author_name: author_name.into(),
            author_email: author_email.into(),
            branch: default_branch(),
            sync_interval_secs: default_sync_interval_secs(),
            push_on_sync: default_push_on_sync(),
            network_timeout_secs: default_network_timeout_secs(),
        }
    }

    /// Load and validate a config from a TOML file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ReadError`] if the file cannot be read
    /// - [`ConfigError::ParseError`] if the contents are not valid TOML
    /// - [`ConfigError::InvalidValue`] if validation fails
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let config: StoreConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue(
                "data_dir cannot be empty".to_string(),
            ));
        }

        if self.remote_url.is_empty() {
            return Err(ConfigError::InvalidValue(
                "remote_url cannot be empty".to_string(),
            ));
        }

        if self.author_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "author_name cannot be empty".to_string(),
            ));
        }

        if self.author_email.is_empty() || !self.author_email.contains('@') {
            return Err(ConfigError::InvalidValue(format!(
                "author_email '{}' is not a plausible email address",
                self.author_email
            )));
        }

        if self.branch.is_empty() || self.branch.contains(' ') || self.branch.contains("..") {
            return Err(ConfigError::InvalidValue(format!(
                "invalid branch name '{}'",
                self.branch
            )));
        }

        if self.sync_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "sync_interval_secs must be at least 1".to_string(),
            ));
        }

        if self.network_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "network_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Interval between scheduled sync attempts.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Deadline applied to the fetch phase of sync.
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    /// The remote-tracking ref the local branch merges from.
    pub fn remote_tracking_ref(&self) -> String {
        format!("refs/remotes/origin/{}", self.branch)
    }

    /// The local branch ref.
    pub fn local_branch_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> StoreConfig {
        StoreConfig::new(
            "/tmp/wiki-data",
            "/srv/git/wiki.git",
            "Wiki Server",
            "wiki@example.com",
        )
    }

    mod defaults {
        use super::*;

        #[test]
        fn new_applies_default_knobs() {
            let config = base_config();
            assert_eq!(config.branch, "master");
            assert_eq!(config.sync_interval_secs, 60);
            assert!(config.push_on_sync);
            assert_eq!(config.network_timeout_secs, 30);
        }

        #[test]
        fn durations() {
            let config = base_config();
            assert_eq!(config.sync_interval(), Duration::from_secs(60));
            assert_eq!(config.network_timeout(), Duration::from_secs(30));
        }

        #[test]
        fn refs_follow_branch() {
            let mut config = base_config();
            config.branch = "main".to_string();
            assert_eq!(config.remote_tracking_ref(), "refs/remotes/origin/main");
            assert_eq!(config.local_branch_ref(), "refs/heads/main");
        }
    }

    mod parsing {
        use super::*;

        #[test]
        fn minimal_toml_gets_defaults() {
            let config: StoreConfig = toml::from_str(
                r#"
                data_dir = "/var/lib/wiki/data"
                remote_url = "/srv/git/wiki.git"
                author_name = "Wiki Server"
                author_email = "wiki@example.com"
                "#,
            )
            .unwrap();

            assert_eq!(config.branch, "master");
            assert_eq!(config.sync_interval_secs, 60);
            assert!(config.push_on_sync);
        }

        #[test]
        fn full_toml_round_trips() {
            let config: StoreConfig = toml::from_str(
                r#"
                data_dir = "/var/lib/wiki/data"
                remote_url = "git+ssh://host/srv/git/wiki.git"
                author_name = "Wiki Server"
                author_email = "wiki@example.com"
                branch = "main"
                sync_interval_secs = 15
                push_on_sync = false
                network_timeout_secs = 5
                "#,
            )
            .unwrap();

            assert_eq!(config.branch, "main");
            assert_eq!(config.sync_interval_secs, 15);
            assert!(!config.push_on_sync);
            assert_eq!(config.network_timeout_secs, 5);
        }

        #[test]
        fn unknown_keys_rejected() {
            let result: Result<StoreConfig, _> = toml::from_str(
                r#"
                data_dir = "/data"
                remote_url = "/srv/git/wiki.git"
                author_name = "Wiki Server"
                author_email = "wiki@example.com"
                shiny = true
                "#,
            );
            assert!(result.is_err());
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn base_config_is_valid() {
            assert!(base_config().validate().is_ok());
        }

        #[test]
        fn empty_remote_url_rejected() {
            let mut config = base_config();
            config.remote_url = String::new();
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidValue(_))
            ));
        }

        #[test]
        fn implausible_email_rejected() {
            let mut config = base_config();
            config.author_email = "not-an-email".to_string();
            assert!(config.validate().is_err());
        }

        #[test]
        fn zero_interval_rejected() {
            let mut config = base_config();
            config.sync_interval_secs = 0;
            assert!(config.validate().is_err());
        }

        #[test]
        fn bad_branch_rejected() {
            let mut config = base_config();
            config.branch = "two words".to_string();
            assert!(config.validate().is_err());
        }
    }
}
