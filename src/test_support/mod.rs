//! Test utilities for dock unit tests.
//!
//! Fixtures build manifests and on-disk package repositories; the helpers
//! here create projects and executable scripts.
//!
//! # Example
//!
//! ```rust,ignore
//! use dock::test_support::{create_test_project, ManifestBuilder};
//!
//! #[test]
//! fn test_example() {
//!     let manifest = ManifestBuilder::new("zed").part("zed", "plugin = \"nil\"\n").build();
//!     let project = create_test_project(&manifest);
//!     // Load `project.path().join("dock.toml")`...
//! }
//! ```

pub mod fixtures;

use std::path::{Path, PathBuf};

pub use fixtures::*;

use crate::util::context::MANIFEST_NAME;

/// Create a temporary project holding `manifest` as its `dock.toml`.
///
/// Returns the TempDir handle - dropping it will clean up the directory.
pub fn create_test_project(manifest: &str) -> tempfile::TempDir {
    let tmp = tempfile::TempDir::new().expect("failed to create temp dir");
    std::fs::write(tmp.path().join(MANIFEST_NAME), manifest).expect("failed to write manifest");
    tmp
}

/// A manifest with one `nil` part and no apps.
pub fn minimal_manifest(name: &str) -> String {
    ManifestBuilder::new(name)
        .part(name, "plugin = \"nil\"\n")
        .build()
}

/// Write an executable shell script.
pub fn write_script(path: &Path, body: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create script dir");
    }
    std::fs::write(path, format!("#!/bin/sh\n{}", body)).expect("failed to write script");
    crate::util::fs::set_executable(path).expect("failed to mark script executable");
    path.to_path_buf()
}

/// Assertion helpers for testing.
pub mod assertions {
    use std::path::Path;

    /// Assert that a result is Ok and return the value.
    pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
        match result {
            Ok(v) => v,
            Err(e) => panic!("expected Ok, got Err: {:?}", e),
        }
    }

    /// Assert that `root/rel` exists and is a regular file.
    pub fn assert_file(root: &Path, rel: &str) {
        let path = root.join(rel);
        assert!(path.is_file(), "expected file {}", path.display());
    }

    /// Assert that `root/rel` does not exist.
    pub fn assert_absent(root: &Path, rel: &str) {
        let path = root.join(rel);
        assert!(
            std::fs::symlink_metadata(&path).is_err(),
            "expected {} to be absent",
            path.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Manifest, ParseOptions};

    #[test]
    fn test_minimal_manifest_parses() {
        let project = create_test_project(&minimal_manifest("zed"));
        let manifest =
            Manifest::load(&project.path().join(MANIFEST_NAME), ParseOptions::default()).unwrap();
        assert_eq!(manifest.name(), "zed");
        assert!(manifest.apps.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_script_is_executable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let script = write_script(&tmp.path().join("bin/zed"), "echo zed\n");
        assert!(crate::util::fs::is_executable(&script));
    }
}
