//! Checking an install plan against the host and carrying it out.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use crate::resolver::errors::ResolveError;
use crate::resolver::host::HostManagers;
use crate::resolver::plan::{InstallPlan, Namespace, Purpose};

/// A planned package confirmed to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPackage {
    pub namespace: Namespace,
    pub name: String,
    pub version: Option<String>,
    pub purposes: Vec<Purpose>,
    pub requested_by: Vec<String>,
}

/// The outcome of resolving a plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    pub packages: Vec<ResolvedPackage>,
    /// Build packages this run installed onto the host.
    pub installed: Vec<String>,
}

impl Resolution {
    pub fn get(&self, namespace: Namespace, name: &str) -> Option<&ResolvedPackage> {
        self.packages
            .iter()
            .find(|p| p.namespace == namespace && p.name == name)
    }
}

/// Drives the host package managers for one plan.
pub struct Resolver<'a> {
    managers: &'a HostManagers,
    /// Install missing build packages instead of failing.
    install: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(managers: &'a HostManagers) -> Self {
        Resolver {
            managers,
            install: false,
        }
    }

    pub fn allow_install(mut self, install: bool) -> Self {
        self.install = install;
        self
    }

    /// Confirm every planned package exists, then make sure build packages
    /// are present on the host. Each name is queried and installed once.
    pub fn resolve(&self, plan: &InstallPlan) -> Result<Resolution, ResolveError> {
        let mut resolution = Resolution::default();

        for namespace in Namespace::ALL {
            let mut packages = plan.packages(namespace).peekable();
            if packages.peek().is_none() {
                continue;
            }
            let manager = self.managers.get(namespace)?;

            for planned in packages {
                tracing::debug!("querying {} for `{}`", manager.name(), planned.name);
                let info = manager.query(&planned.name)?.ok_or_else(|| {
                    ResolveError::UnknownPackage {
                        namespace,
                        package: planned.name.clone(),
                        requested_by: planned.requested_by.iter().cloned().collect(),
                    }
                })?;
                resolution.packages.push(ResolvedPackage {
                    namespace,
                    name: planned.name.clone(),
                    version: info.version,
                    purposes: planned.purposes.iter().copied().collect(),
                    requested_by: planned.requested_by.iter().cloned().collect(),
                });
            }

            let mut missing = Vec::new();
            for name in plan.names_for(namespace, Purpose::Build) {
                if !manager.is_installed(&name)? {
                    missing.push(name);
                }
            }
            if missing.is_empty() {
                continue;
            }
            if !self.install {
                return Err(ResolveError::NotInstalled {
                    namespace,
                    packages: missing,
                });
            }
            manager.install(&missing)?;
            resolution.installed.extend(missing);
        }

        Ok(resolution)
    }

    /// Unpack every stage package into `<dest>/<name>/`.
    ///
    /// Returns the unpacked tree of each package, in plan order.
    pub fn unpack_stage_packages(
        &self,
        plan: &InstallPlan,
        dest: &Path,
    ) -> Result<IndexMap<String, PathBuf>, ResolveError> {
        let mut trees = IndexMap::new();
        let names = plan.names_for(Namespace::Deb, Purpose::Stage);
        if names.is_empty() {
            return Ok(trees);
        }

        let manager = self.managers.get(Namespace::Deb)?;
        for name in names {
            let tree = dest.join(&name);
            manager.unpack(&name, &tree)?;
            trees.insert(name, tree);
        }
        Ok(trees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::host::{DirectoryManager, PackageInfo, PackageManager};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records installs; knows the packages it was created with.
    struct Recording {
        known: Vec<&'static str>,
        installed: Mutex<Vec<String>>,
        install_calls: Mutex<Vec<Vec<String>>>,
    }

    impl Recording {
        fn new(known: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Recording {
                known,
                installed: Mutex::new(Vec::new()),
                install_calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl PackageManager for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn namespace(&self) -> Namespace {
            Namespace::Deb
        }

        fn query(&self, package: &str) -> Result<Option<PackageInfo>, ResolveError> {
            Ok(self.known.iter().any(|k| *k == package).then(|| PackageInfo {
                name: package.to_string(),
                version: Some("1.0".into()),
            }))
        }

        fn is_installed(&self, package: &str) -> Result<bool, ResolveError> {
            Ok(self.installed.lock().unwrap().iter().any(|p| p == package))
        }

        fn install(&self, packages: &[String]) -> Result<(), ResolveError> {
            self.install_calls.lock().unwrap().push(packages.to_vec());
            self.installed.lock().unwrap().extend(packages.iter().cloned());
            Ok(())
        }

        fn unpack(&self, _package: &str, dest: &Path) -> Result<(), ResolveError> {
            std::fs::create_dir_all(dest).unwrap();
            Ok(())
        }
    }

    fn two_parts_sharing_ssl() -> InstallPlan {
        let mut plan = InstallPlan::new();
        plan.add(Namespace::Deb, "libssl-dev", Purpose::Build, "zed");
        plan.add(Namespace::Deb, "cmake", Purpose::Build, "zed");
        plan.add(Namespace::Deb, "libssl-dev", Purpose::Build, "deps");
        plan
    }

    #[test]
    fn test_shared_build_package_installed_once() {
        let backend = Recording::new(vec!["libssl-dev", "cmake"]);
        let managers = HostManagers::new().with(backend.clone());

        let resolution = Resolver::new(&managers)
            .allow_install(true)
            .resolve(&two_parts_sharing_ssl())
            .unwrap();

        let calls = backend.install_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["libssl-dev", "cmake"]);
        assert_eq!(resolution.installed, vec!["libssl-dev", "cmake"]);

        let ssl = resolution.get(Namespace::Deb, "libssl-dev").unwrap();
        assert_eq!(ssl.requested_by, vec!["zed", "deps"]);
    }

    #[test]
    fn test_missing_build_packages_without_install() {
        let backend = Recording::new(vec!["libssl-dev", "cmake"]);
        let managers = HostManagers::new().with(backend.clone());

        let err = Resolver::new(&managers)
            .resolve(&two_parts_sharing_ssl())
            .unwrap_err();
        match err {
            ResolveError::NotInstalled { packages, .. } => {
                assert_eq!(packages, vec!["libssl-dev", "cmake"])
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(backend.install_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_package_is_fatal() {
        let backend = Recording::new(vec!["cmake"]);
        let managers = HostManagers::new().with(backend.clone());

        let err = Resolver::new(&managers)
            .allow_install(true)
            .resolve(&two_parts_sharing_ssl())
            .unwrap_err();
        match err {
            ResolveError::UnknownPackage {
                package,
                requested_by,
                ..
            } => {
                assert_eq!(package, "libssl-dev");
                assert_eq!(requested_by, vec!["zed", "deps"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(backend.install_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unpack_stage_packages_from_directory() {
        let repo = TempDir::new().unwrap();
        std::fs::create_dir_all(repo.path().join("libssl3/usr/lib")).unwrap();
        std::fs::write(repo.path().join("libssl3/usr/lib/libssl.so.3"), "x").unwrap();
        let managers = HostManagers::new().with(Arc::new(DirectoryManager::new(
            repo.path(),
            Namespace::Deb,
        )));

        let mut plan = InstallPlan::new();
        plan.add(Namespace::Deb, "libssl3", Purpose::Stage, "deps");

        let dest = TempDir::new().unwrap();
        let resolver = Resolver::new(&managers);
        resolver.resolve(&plan).unwrap();
        let trees = resolver.unpack_stage_packages(&plan, dest.path()).unwrap();
        assert_eq!(trees["libssl3"], dest.path().join("libssl3"));
        assert!(dest.path().join("libssl3/usr/lib/libssl.so.3").is_file());
    }

    #[test]
    fn test_snap_namespace_needs_backend() {
        let managers = HostManagers::new().with(Recording::new(vec![]));
        let mut plan = InstallPlan::new();
        plan.add(Namespace::Snap, "rustup", Purpose::Build, "zed");
        assert!(matches!(
            Resolver::new(&managers).resolve(&plan),
            Err(ResolveError::NoBackend { .. })
        ));
    }
}
