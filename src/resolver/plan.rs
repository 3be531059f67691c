//! Installation plans.
//!
//! An [`InstallPlan`] lists every package the build needs, per package
//! manager namespace, in first-request order. Each name appears once no
//! matter how many parts ask for it; the purposes and requesting parts are
//! merged onto the single entry.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::core::{Manifest, PluginId};

/// A package manager namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Deb,
    Snap,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Deb, Namespace::Snap];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Deb => "deb",
            Namespace::Snap => "snap",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a package is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    /// Installed on the build host.
    Build,
    /// Unpacked into the package.
    Stage,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Purpose::Build => f.write_str("build"),
            Purpose::Stage => f.write_str("stage"),
        }
    }
}

/// One planned package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPackage {
    pub name: String,
    pub purposes: BTreeSet<Purpose>,
    /// Parts that asked for the package, in request order.
    pub requested_by: IndexSet<String>,
}

impl PlannedPackage {
    pub fn is_for(&self, purpose: Purpose) -> bool {
        self.purposes.contains(&purpose)
    }
}

/// Deduplicated packages per namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallPlan {
    deb: IndexMap<String, PlannedPackage>,
    snap: IndexMap<String, PlannedPackage>,
}

impl InstallPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan every package named in `manifest`, plus what each part's plugin
    /// needs on the build host.
    ///
    /// Parts are visited in declaration order; within a part the order is
    /// build-packages, plugin packages, build-snaps, stage-packages.
    pub fn for_manifest<F>(manifest: &Manifest, plugin_packages: F) -> Self
    where
        F: Fn(PluginId) -> Vec<String>,
    {
        let mut plan = InstallPlan::new();

        for part in manifest.parts.values() {
            for name in &part.build_packages {
                plan.add(Namespace::Deb, name, Purpose::Build, &part.name);
            }
            if part.override_build.is_none() {
                for name in plugin_packages(part.plugin) {
                    plan.add(Namespace::Deb, &name, Purpose::Build, &part.name);
                }
            }
            for name in &part.build_snaps {
                plan.add(Namespace::Snap, name, Purpose::Build, &part.name);
            }
            for name in &part.stage_packages {
                plan.add(Namespace::Deb, name, Purpose::Stage, &part.name);
            }
        }

        plan
    }

    /// Record a request. Repeated requests merge into the first entry.
    pub fn add(&mut self, namespace: Namespace, name: &str, purpose: Purpose, part: &str) {
        let entry = self
            .packages_mut(namespace)
            .entry(name.to_string())
            .or_insert_with(|| PlannedPackage {
                name: name.to_string(),
                purposes: BTreeSet::new(),
                requested_by: IndexSet::new(),
            });
        entry.purposes.insert(purpose);
        entry.requested_by.insert(part.to_string());
    }

    fn packages_mut(&mut self, namespace: Namespace) -> &mut IndexMap<String, PlannedPackage> {
        match namespace {
            Namespace::Deb => &mut self.deb,
            Namespace::Snap => &mut self.snap,
        }
    }

    /// Packages of one namespace in first-request order.
    pub fn packages(&self, namespace: Namespace) -> impl Iterator<Item = &PlannedPackage> {
        match namespace {
            Namespace::Deb => self.deb.values(),
            Namespace::Snap => self.snap.values(),
        }
    }

    pub fn get(&self, namespace: Namespace, name: &str) -> Option<&PlannedPackage> {
        match namespace {
            Namespace::Deb => self.deb.get(name),
            Namespace::Snap => self.snap.get(name),
        }
    }

    /// Names in `namespace` needed for `purpose`.
    pub fn names_for(&self, namespace: Namespace, purpose: Purpose) -> Vec<String> {
        self.packages(namespace)
            .filter(|p| p.is_for(purpose))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Stage packages requested by one part.
    pub fn stage_packages_of(&self, part: &str) -> Vec<String> {
        self.deb
            .values()
            .filter(|p| p.is_for(Purpose::Stage) && p.requested_by.contains(part))
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.deb.len() + self.snap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
