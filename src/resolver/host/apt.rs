//! dpkg/apt backend for the `deb` namespace.

use std::path::{Path, PathBuf};

use crate::resolver::errors::ResolveError;
use crate::resolver::host::{command_failed, spawn_failed, PackageInfo, PackageManager};
use crate::resolver::plan::Namespace;
use crate::util::fs::ensure_dir;
use crate::util::process::ProcessBuilder;

const NAME: &str = "apt";

/// Talks to `apt-cache`, `dpkg-query`, `apt-get` and `dpkg-deb`.
#[derive(Debug, Clone)]
pub struct AptManager {
    apt_get: PathBuf,
    apt_cache: PathBuf,
    dpkg_query: PathBuf,
    dpkg_deb: PathBuf,
}

impl AptManager {
    pub fn new() -> Self {
        AptManager {
            apt_get: PathBuf::from("apt-get"),
            apt_cache: PathBuf::from("apt-cache"),
            dpkg_query: PathBuf::from("dpkg-query"),
            dpkg_deb: PathBuf::from("dpkg-deb"),
        }
    }

    fn apt_get(&self) -> ProcessBuilder {
        ProcessBuilder::new(&self.apt_get)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .arg("--quiet")
    }
}

impl Default for AptManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageManager for AptManager {
    fn name(&self) -> &'static str {
        NAME
    }

    fn namespace(&self) -> Namespace {
        Namespace::Deb
    }

    fn query(&self, package: &str) -> Result<Option<PackageInfo>, ResolveError> {
        let output = ProcessBuilder::new(&self.apt_cache)
            .args(["show", "--no-all-versions", package])
            .exec()
            .map_err(|e| spawn_failed(NAME, e))?;

        // apt-cache exits 100 for unknown names, and 0 with empty output for
        // purely virtual ones.
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_show(&stdout).map(|version| PackageInfo {
            name: package.to_string(),
            version,
        }))
    }

    fn is_installed(&self, package: &str) -> Result<bool, ResolveError> {
        let output = ProcessBuilder::new(&self.dpkg_query)
            .args(["-W", "-f=${Status}", package])
            .exec()
            .map_err(|e| spawn_failed(NAME, e))?;
        Ok(output.status.success()
            && String::from_utf8_lossy(&output.stdout).contains("install ok installed"))
    }

    fn install(&self, packages: &[String]) -> Result<(), ResolveError> {
        if packages.is_empty() {
            return Ok(());
        }
        tracing::info!("installing {} with apt-get", packages.join(" "));

        let cmd = self
            .apt_get()
            .args(["install", "--yes", "--no-install-recommends"])
            .args(packages);
        let output = cmd.exec().map_err(|e| spawn_failed(NAME, e))?;
        if !output.status.success() {
            return Err(command_failed(NAME, &cmd.display_command(), &output));
        }
        Ok(())
    }

    fn unpack(&self, package: &str, dest: &Path) -> Result<(), ResolveError> {
        let download = tempfile::tempdir().map_err(|e| ResolveError::Backend {
            manager: NAME,
            message: format!("failed to create download directory: {}", e),
        })?;

        let cmd = self.apt_get().args(["download", package]).cwd(download.path());
        let output = cmd.exec().map_err(|e| spawn_failed(NAME, e))?;
        if !output.status.success() {
            return Err(command_failed(NAME, &cmd.display_command(), &output));
        }

        let deb = std::fs::read_dir(download.path())
            .ok()
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .find(|path| path.extension().is_some_and(|ext| ext == "deb"))
            .ok_or_else(|| ResolveError::Backend {
                manager: NAME,
                message: format!("`apt-get download {}` produced no .deb file", package),
            })?;

        ensure_dir(dest).map_err(|e| spawn_failed(NAME, e))?;
        let cmd = ProcessBuilder::new(&self.dpkg_deb).arg("-x").arg(&deb).arg(dest);
        let output = cmd.exec().map_err(|e| spawn_failed(NAME, e))?;
        if !output.status.success() {
            return Err(command_failed(NAME, &cmd.display_command(), &output));
        }

        tracing::debug!("unpacked {} into {}", package, dest.display());
        Ok(())
    }
}

/// Extract the version from `apt-cache show` output. `None` when the
/// output describes no real package.
fn parse_show(stdout: &str) -> Option<Option<String>> {
    if !stdout.lines().any(|l| l.starts_with("Package:")) {
        return None;
    }
    Some(
        stdout
            .lines()
            .find_map(|l| l.strip_prefix("Version:"))
            .map(|v| v.trim().to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_show() {
        let out = "Package: libssl-dev\nArchitecture: amd64\nVersion: 3.0.13-0ubuntu3\n";
        assert_eq!(parse_show(out), Some(Some("3.0.13-0ubuntu3".to_string())));
        assert_eq!(parse_show(""), None);
        assert_eq!(parse_show("N: Can't select versions from package 'x'\n"), None);
    }
}
