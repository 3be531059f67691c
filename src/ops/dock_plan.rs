//! Implementation of `dock plan`: what a build would install and in which
//! order parts would run, without doing either.

use std::path::Path;

use serde::Serialize;

use crate::builder::PluginRegistry;
use crate::ops::dock_build::{install_plan, load_project, LifecycleError};
use crate::resolver::InstallPlan;
use crate::util::context::GlobalContext;

#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub name: String,
    pub version: String,
    /// Host packages, deduplicated across parts
    pub packages: InstallPlan,
    /// Parts grouped into waves that may build in parallel
    pub waves: Vec<Vec<String>>,
}

pub fn plan(
    gctx: &GlobalContext,
    manifest_path: Option<&Path>,
    strict: bool,
) -> Result<PlanReport, LifecycleError> {
    let project = load_project(gctx, manifest_path, strict)?;
    let manifest = &project.manifest;
    let graph = manifest.part_graph().map_err(anyhow::Error::new)?;
    let packages = install_plan(manifest, &PluginRegistry::new());

    Ok(PlanReport {
        name: manifest.name().to_string(),
        version: manifest.version().to_string(),
        packages,
        waves: graph.waves(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{Namespace, Purpose};
    use crate::test_support::{create_test_project, ManifestBuilder};

    #[test]
    fn test_shared_package_planned_once() {
        let manifest = ManifestBuilder::new("zed")
            .part(
                "zed",
                "plugin = \"rust\"\nsource = \".\"\nbuild-packages = [\"libssl-dev\", \"pkg-config\"]\n",
            )
            .part(
                "zed-cli",
                "plugin = \"nil\"\nstage-packages = [\"libssl-dev\"]\nafter = [\"zed\"]\n",
            )
            .build();
        let tmp = create_test_project(&manifest);
        let gctx = GlobalContext::with_cwd(tmp.path().to_path_buf());

        let report = plan(&gctx, None, false).unwrap();
        let deb: Vec<_> = report.packages.packages(Namespace::Deb).collect();
        let ssl: Vec<_> = deb.iter().filter(|p| p.name == "libssl-dev").collect();
        assert_eq!(ssl.len(), 1);
        assert!(ssl[0].is_for(Purpose::Build) && ssl[0].is_for(Purpose::Stage));
        assert_eq!(
            ssl[0].requested_by.iter().collect::<Vec<_>>(),
            ["zed", "zed-cli"]
        );
        assert!(deb.iter().any(|p| p.name == "cargo"));
        assert_eq!(report.waves, [vec!["zed".to_string()], vec!["zed-cli".to_string()]]);
    }
}
