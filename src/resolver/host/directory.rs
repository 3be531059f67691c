//! On-disk package repository backend.
//!
//! A repository is a directory with one subdirectory per package holding
//! the files the package installs (`<root>/libssl3/usr/lib/...`). An
//! optional `<root>/<name>.version` file carries the version. Packages in
//! the repository count as installed, which makes the backend suitable for
//! offline and hermetic builds.

use std::path::{Path, PathBuf};

use crate::resolver::errors::ResolveError;
use crate::resolver::host::{spawn_failed, PackageInfo, PackageManager};
use crate::resolver::plan::Namespace;
use crate::util::fs::copy_dir_all;

const NAME: &str = "directory";

#[derive(Debug, Clone)]
pub struct DirectoryManager {
    root: PathBuf,
    namespace: Namespace,
}

impl DirectoryManager {
    pub fn new(root: impl Into<PathBuf>, namespace: Namespace) -> Self {
        DirectoryManager {
            root: root.into(),
            namespace,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_dir(&self, package: &str) -> Option<PathBuf> {
        if package.contains(['/', '\\']) || package.starts_with('.') {
            return None;
        }
        let dir = self.root.join(package);
        dir.is_dir().then_some(dir)
    }
}

impl PackageManager for DirectoryManager {
    fn name(&self) -> &'static str {
        NAME
    }

    fn namespace(&self) -> Namespace {
        self.namespace
    }

    fn query(&self, package: &str) -> Result<Option<PackageInfo>, ResolveError> {
        Ok(self.package_dir(package).map(|_| {
            let version = std::fs::read_to_string(self.root.join(format!("{}.version", package)))
                .ok()
                .map(|v| v.trim().to_string());
            PackageInfo {
                name: package.to_string(),
                version,
            }
        }))
    }

    fn is_installed(&self, package: &str) -> Result<bool, ResolveError> {
        Ok(self.package_dir(package).is_some())
    }

    fn install(&self, packages: &[String]) -> Result<(), ResolveError> {
        tracing::debug!(
            "directory backend: {} already available",
            packages.join(", ")
        );
        Ok(())
    }

    fn unpack(&self, package: &str, dest: &Path) -> Result<(), ResolveError> {
        let src = self
            .package_dir(package)
            .ok_or_else(|| ResolveError::UnknownPackage {
                namespace: self.namespace,
                package: package.to_string(),
                requested_by: Vec::new(),
            })?;
        copy_dir_all(&src, dest).map_err(|e| spawn_failed(NAME, e))
    }
}
