//! Implementation of `dock validate`.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::ops::dock_build::{load_project, LifecycleError};
use crate::util::context::GlobalContext;

/// Summary of a manifest that passed validation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidateReport {
    pub manifest_path: PathBuf,
    pub name: String,
    pub version: String,
    pub parts: Vec<String>,
    pub apps: Vec<String>,
}

/// Parse and check the manifest without touching the work directory.
pub fn validate(
    gctx: &GlobalContext,
    manifest_path: Option<&Path>,
    strict: bool,
) -> Result<ValidateReport, LifecycleError> {
    let project = load_project(gctx, manifest_path, strict)?;
    let manifest = &project.manifest;
    Ok(ValidateReport {
        name: manifest.name().to_string(),
        version: manifest.version().to_string(),
        parts: manifest.parts.keys().cloned().collect(),
        apps: manifest.apps.keys().cloned().collect(),
        manifest_path: project.manifest_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_project, minimal_manifest};

    #[test]
    fn test_validate_ok() {
        let tmp = create_test_project(&minimal_manifest("zed"));
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        let gctx = GlobalContext::with_cwd(tmp.path().join("nested"));

        let report = validate(&gctx, None, true).unwrap();
        assert_eq!(report.name, "zed");
        assert_eq!(report.parts, ["zed"]);
        assert_eq!(report.manifest_path, tmp.path().join("dock.toml"));
    }

    #[test]
    fn test_validate_strict_rejects_unknown_keys() {
        let manifest = format!("flavour = \"mint\"\n{}", minimal_manifest("zed"));
        let tmp = create_test_project(&manifest);
        let gctx = GlobalContext::with_cwd(tmp.path().to_path_buf());

        assert!(validate(&gctx, None, false).is_ok());
        let err = validate(&gctx, None, true).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("flavour"));
    }

    #[test]
    fn test_validate_without_manifest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let gctx = GlobalContext::with_cwd(tmp.path().to_path_buf());

        let err = validate(&gctx, None, false).unwrap_err();
        assert!(matches!(err, LifecycleError::Locate(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
