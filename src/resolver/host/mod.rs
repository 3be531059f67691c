//! Host package manager backends.
//!
//! Each backend serves one [`Namespace`]. The resolver only talks to the
//! [`PackageManager`] trait; which backend serves a namespace comes from
//! `[packages]` in the config.

pub mod apt;
pub mod directory;
pub mod snap;

use std::path::Path;
use std::sync::Arc;

pub use apt::AptManager;
pub use directory::DirectoryManager;
pub use snap::SnapManager;

use crate::resolver::errors::ResolveError;
use crate::resolver::plan::Namespace;
use crate::util::config::{BackendKind, PackagesConfig};

/// What a backend knows about an available package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: Option<String>,
}

/// A host package manager.
pub trait PackageManager: Send + Sync {
    /// Backend name for messages (`apt`, `snap`, `directory`).
    fn name(&self) -> &'static str;

    fn namespace(&self) -> Namespace;

    /// Look a package up. `Ok(None)` means the package does not exist.
    fn query(&self, package: &str) -> Result<Option<PackageInfo>, ResolveError>;

    fn is_installed(&self, package: &str) -> Result<bool, ResolveError>;

    /// Install packages onto the build host.
    fn install(&self, packages: &[String]) -> Result<(), ResolveError>;

    /// Unpack a package's files into `dest` without installing it.
    fn unpack(&self, package: &str, dest: &Path) -> Result<(), ResolveError>;
}

/// The package managers serving each namespace.
#[derive(Clone, Default)]
pub struct HostManagers {
    deb: Option<Arc<dyn PackageManager>>,
    snap: Option<Arc<dyn PackageManager>>,
}

impl HostManagers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backends selected by the `[packages]` config section.
    pub fn from_config(config: &PackagesConfig) -> Result<Self, ResolveError> {
        match config.backend {
            BackendKind::Apt => Ok(HostManagers::new()
                .with(Arc::new(AptManager::new()))
                .with(Arc::new(SnapManager::new()))),
            BackendKind::Directory => {
                let root = config.repository.as_ref().ok_or(ResolveError::Backend {
                    manager: "directory",
                    message: "`packages.repository` must be set for the directory backend"
                        .to_string(),
                })?;
                Ok(HostManagers::new()
                    .with(Arc::new(DirectoryManager::new(root, Namespace::Deb)))
                    .with(Arc::new(DirectoryManager::new(root, Namespace::Snap))))
            }
        }
    }

    /// Register `manager` for its namespace, replacing any previous one.
    pub fn with(mut self, manager: Arc<dyn PackageManager>) -> Self {
        match manager.namespace() {
            Namespace::Deb => self.deb = Some(manager),
            Namespace::Snap => self.snap = Some(manager),
        }
        self
    }

    pub fn get(&self, namespace: Namespace) -> Result<&dyn PackageManager, ResolveError> {
        let manager = match namespace {
            Namespace::Deb => self.deb.as_deref(),
            Namespace::Snap => self.snap.as_deref(),
        };
        manager.ok_or(ResolveError::NoBackend { namespace })
    }
}

impl std::fmt::Debug for HostManagers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostManagers")
            .field("deb", &self.deb.as_ref().map(|m| m.name()))
            .field("snap", &self.snap.as_ref().map(|m| m.name()))
            .finish()
    }
}

/// Turn a failed command into a backend error.
pub(crate) fn command_failed(
    manager: &'static str,
    command: &str,
    output: &std::process::Output,
) -> ResolveError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    ResolveError::Backend {
        manager,
        message: format!(
            "`{}` exited with {}: {}",
            command,
            output
                .status
                .code()
                .map_or_else(|| "a signal".to_string(), |c| format!("code {}", c)),
            stderr.trim()
        ),
    }
}

pub(crate) fn spawn_failed(manager: &'static str, err: anyhow::Error) -> ResolveError {
    ResolveError::Backend {
        manager,
        message: format!("{:#}", err),
    }
}
