//! snapd backend for the `snap` namespace (build-snaps only).

use std::path::{Path, PathBuf};

use crate::resolver::errors::ResolveError;
use crate::resolver::host::{command_failed, spawn_failed, PackageInfo, PackageManager};
use crate::resolver::plan::Namespace;
use crate::util::process::ProcessBuilder;

const NAME: &str = "snap";

#[derive(Debug, Clone)]
pub struct SnapManager {
    snap: PathBuf,
}

impl SnapManager {
    pub fn new() -> Self {
        SnapManager {
            snap: PathBuf::from("snap"),
        }
    }
}

impl Default for SnapManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageManager for SnapManager {
    fn name(&self) -> &'static str {
        NAME
    }

    fn namespace(&self) -> Namespace {
        Namespace::Snap
    }

    fn query(&self, package: &str) -> Result<Option<PackageInfo>, ResolveError> {
        let output = ProcessBuilder::new(&self.snap)
            .args(["info", package])
            .exec()
            .map_err(|e| spawn_failed(NAME, e))?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = stdout
            .lines()
            .find_map(|l| l.trim().strip_prefix("latest/stable:"))
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string);
        Ok(Some(PackageInfo {
            name: package.to_string(),
            version,
        }))
    }

    fn is_installed(&self, package: &str) -> Result<bool, ResolveError> {
        let output = ProcessBuilder::new(&self.snap)
            .args(["list", package])
            .exec()
            .map_err(|e| spawn_failed(NAME, e))?;
        Ok(output.status.success())
    }

    fn install(&self, packages: &[String]) -> Result<(), ResolveError> {
        if packages.is_empty() {
            return Ok(());
        }
        tracing::info!("installing {} with snap", packages.join(" "));

        let cmd = ProcessBuilder::new(&self.snap).arg("install").args(packages);
        let output = cmd.exec().map_err(|e| spawn_failed(NAME, e))?;
        if !output.status.success() {
            return Err(command_failed(NAME, &cmd.display_command(), &output));
        }
        Ok(())
    }

    fn unpack(&self, _package: &str, _dest: &Path) -> Result<(), ResolveError> {
        Err(ResolveError::Unsupported {
            manager: NAME,
            operation: "unpack stage packages",
        })
    }
}
