//! # Spec Source Module
//!
//! The narrow seam between the reconciliation core and the machinery that
//! materializes a specification release (git clone, tarball download, bind
//! mount). The core only ever sees the result: a local directory tree plus
//! an opaque release identifier.

use crate::RespecError;
use crate::primitives::RELEASE_ID_FILE;
use std::path::{Path, PathBuf};

// =============================================================================
// CHECKOUT
// =============================================================================

/// A materialized specification release on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecCheckout {
    /// Root of the category subtree layout.
    pub root: PathBuf,
    /// Opaque release identifier for this checkout.
    pub release_id: String,
}

// =============================================================================
// SOURCE TRAIT
// =============================================================================

/// Produces a local checkout of the current specification release.
///
/// # Extension Point
///
/// Implementors own all network and archive mechanics. They must be cheap to
/// call repeatedly: `fetch` is invoked once per reconciliation pass and its
/// release identifier gates whether any further work happens.
pub trait SpecSource {
    /// Produce a checkout, or fail with `SourceUnavailable`.
    fn fetch(&self) -> Result<SpecCheckout, RespecError>;
}

// =============================================================================
// LOCAL DIRECTORY SOURCE
// =============================================================================

/// Spec source backed by an existing local directory.
///
/// The release identifier comes from a `.release_id` file at the tree root,
/// or from an explicit override (useful for pinned test fixtures).
#[derive(Debug, Clone)]
pub struct LocalDirSource {
    root: PathBuf,
    release_override: Option<String>,
}

impl LocalDirSource {
    /// Create a source over an existing directory tree.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            release_override: None,
        }
    }

    /// Pin the release identifier instead of reading `.release_id`.
    #[must_use]
    pub fn with_release_id(mut self, release_id: impl Into<String>) -> Self {
        self.release_override = Some(release_id.into());
        self
    }

    fn read_release_id(root: &Path) -> Result<String, RespecError> {
        let path = root.join(RELEASE_ID_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            RespecError::SourceUnavailable(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))
        })?;
        let id = raw.trim();
        if id.is_empty() {
            return Err(RespecError::SourceUnavailable(format!(
                "{} is empty",
                path.display()
            )));
        }
        Ok(id.to_string())
    }
}

impl SpecSource for LocalDirSource {
    fn fetch(&self) -> Result<SpecCheckout, RespecError> {
        if !self.root.is_dir() {
            return Err(RespecError::SourceUnavailable(format!(
                "spec path {} is not a directory",
                self.root.display()
            )));
        }
        let release_id = match &self.release_override {
            Some(id) => id.clone(),
            None => Self::read_release_id(&self.root)?,
        };
        Ok(SpecCheckout {
            root: self.root.clone(),
            release_id,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_is_source_unavailable() {
        let src = LocalDirSource::new("/nonexistent/respec-spec");
        let err = src.fetch().expect_err("must fail");
        assert!(matches!(err, RespecError::SourceUnavailable(_)));
    }

    #[test]
    fn release_override_skips_release_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = LocalDirSource::new(dir.path()).with_release_id("v42");
        let checkout = src.fetch().expect("fetch");
        assert_eq!(checkout.release_id, "v42");
        assert_eq!(checkout.root, dir.path());
    }

    #[test]
    fn release_file_is_trimmed() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(RELEASE_ID_FILE), "  2024.03\n").expect("write");
        let src = LocalDirSource::new(dir.path());
        let checkout = src.fetch().expect("fetch");
        assert_eq!(checkout.release_id, "2024.03");
    }

    #[test]
    fn empty_release_file_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(RELEASE_ID_FILE), "\n").expect("write");
        let src = LocalDirSource::new(dir.path());
        assert!(src.fetch().is_err());
    }
}
