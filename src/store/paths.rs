//! store::paths
//!
//! Validated content paths.
//!
//! Content items live at fixed locations inside the working tree:
//! `pages/<name>` for wiki pages and `uploads/<name>` for uploaded files.
//! [`ItemPath`] is the only path type the store accepts, so a caller cannot
//! hand the mutation API an empty path, an absolute path, or a traversal
//! that escapes the working tree.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Errors from content path validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("content path cannot be empty")]
    Empty,

    #[error("content path '{0}' must be relative")]
    Absolute(String),

    #[error("content path '{0}' escapes the working tree")]
    Traversal(String),

    #[error("content path '{0}' contains an invalid component")]
    InvalidComponent(String),
}

/// A validated path to a content item, relative to the working tree root.
///
/// Always uses forward slashes and never contains empty, `.`, or `..`
/// components.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemPath(String);

impl ItemPath {
    /// Validate and wrap a relative path.
    ///
    /// # Errors
    ///
    /// - [`PathError::Empty`] for an empty path
    /// - [`PathError::Absolute`] for absolute paths
    /// - [`PathError::Traversal`] for paths containing `..`
    /// - [`PathError::InvalidComponent`] for empty/`.` components, NUL bytes,
    ///   or backslashes
    pub fn new(path: impl Into<String>) -> Result<Self, PathError> {
        let path = path.into();

        if path.is_empty() {
            return Err(PathError::Empty);
        }
        if path.starts_with('/') {
            return Err(PathError::Absolute(path));
        }
        if path.contains('\0') || path.contains('\\') {
            return Err(PathError::InvalidComponent(path));
        }

        if path.split('/').any(|c| c == "..") {
            return Err(PathError::Traversal(path));
        }
        if path.split('/').any(|c| c.is_empty() || c == ".") {
            return Err(PathError::InvalidComponent(path));
        }

        Ok(Self(path))
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path as a relative `Path` for filesystem and index operations.
    pub fn as_rel_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for ItemPath {
    fn as_ref(&self) -> &Path {
        self.as_rel_path()
    }
}

/// The two kinds of content the store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A wiki page, stored under `pages/`.
    Page,
    /// An uploaded file, stored under `uploads/`.
    Upload,
}

impl ItemKind {
    /// Directory for this kind, relative to the working tree root.
    pub fn dir(&self) -> &'static str {
        match self {
            ItemKind::Page => "pages",
            ItemKind::Upload => "uploads",
        }
    }

    /// Map a logical item name to its path inside the working tree.
    ///
    /// The name itself is validated as a single path component, so `a/b`
    /// or `..` are rejected.
    pub fn item_path(&self, name: &str) -> Result<ItemPath, PathError> {
        if name.contains('/') {
            return Err(PathError::InvalidComponent(name.to_string()));
        }
        ItemPath::new(format!("{}/{}", self.dir(), name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod item_path {
        use super::*;

        #[test]
        fn accepts_simple_relative_paths() {
            let path = ItemPath::new("pages/Home.textile").unwrap();
            assert_eq!(path.as_str(), "pages/Home.textile");
            assert_eq!(path.as_rel_path(), Path::new("pages/Home.textile"));
        }

        #[test]
        fn rejects_empty() {
            assert_eq!(ItemPath::new(""), Err(PathError::Empty));
        }

        #[test]
        fn rejects_absolute() {
            assert!(matches!(
                ItemPath::new("/etc/passwd"),
                Err(PathError::Absolute(_))
            ));
        }

        #[test]
        fn rejects_traversal() {
            assert!(matches!(
                ItemPath::new("pages/../../secrets"),
                Err(PathError::Traversal(_))
            ));
        }

        #[test]
        fn rejects_empty_and_dot_components() {
            assert!(matches!(
                ItemPath::new("pages//Home"),
                Err(PathError::InvalidComponent(_))
            ));
            assert!(matches!(
                ItemPath::new("./pages/Home"),
                Err(PathError::InvalidComponent(_))
            ));
        }

        #[test]
        fn rejects_backslash_and_nul() {
            assert!(ItemPath::new("pages\\Home").is_err());
            assert!(ItemPath::new("pages/Ho\0me").is_err());
        }

        #[test]
        fn display_matches_input() {
            let path = ItemPath::new("uploads/photo.png").unwrap();
            assert_eq!(path.to_string(), "uploads/photo.png");
        }
    }

    mod item_kind {
        use super::*;

        #[test]
        fn maps_names_to_directories() {
            assert_eq!(
                ItemKind::Page.item_path("Home.textile").unwrap().as_str(),
                "pages/Home.textile"
            );
            assert_eq!(
                ItemKind::Upload.item_path("photo.png").unwrap().as_str(),
                "uploads/photo.png"
            );
        }

        #[test]
        fn rejects_nested_names() {
            assert!(ItemKind::Page.item_path("a/b").is_err());
            assert!(ItemKind::Page.item_path("..").is_err());
        }
    }
}
