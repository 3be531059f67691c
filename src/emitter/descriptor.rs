//! The package descriptor, `meta/package.json`.

use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::{App, Manifest};
use crate::emitter::errors::EntryPointError;
use crate::util::fs::{is_executable, write_string};

/// Descriptor location relative to the prime root.
pub const DESCRIPTOR_PATH: &str = "meta/package.json";

/// Directories searched for a bare command name.
const COMMAND_DIRS: &[&str] = &["", "bin", "usr/bin"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub confinement: String,
    pub grade: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    pub architecture: String,
    pub apps: IndexMap<String, DescriptorApp>,
}

/// An app bound to a file in the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorApp {
    /// Executable path relative to the package root
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop: Option<String>,
}

impl Descriptor {
    pub fn load(prime: &Path) -> anyhow::Result<Self> {
        let path = prime.join(DESCRIPTOR_PATH);
        let content = crate::util::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Resolve every app's executable inside `prime`.
pub fn resolve_apps(
    manifest: &Manifest,
    prime: &Path,
) -> Result<IndexMap<String, DescriptorApp>, EntryPointError> {
    manifest
        .apps
        .values()
        .map(|app| {
            let command = resolve_command(app, prime)?;
            Ok((
                app.name.clone(),
                DescriptorApp {
                    command: command.to_string_lossy().replace('\\', "/"),
                    args: app.args().into_iter().map(String::from).collect(),
                    environment: app.environment.clone(),
                    desktop: app.desktop.clone(),
                },
            ))
        })
        .collect()
}

fn resolve_command(app: &App, prime: &Path) -> Result<PathBuf, EntryPointError> {
    let executable = app.executable();
    if executable.is_empty() {
        return Err(EntryPointError::EmptyCommand {
            app: app.name.clone(),
        });
    }

    let command = Path::new(executable);
    let escapes = command.is_absolute()
        || command
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(EntryPointError::OutsidePackage {
            app: app.name.clone(),
            command: executable.to_string(),
        });
    }

    let candidates: Vec<PathBuf> = if command.components().count() > 1 {
        vec![command.to_path_buf()]
    } else {
        COMMAND_DIRS.iter().map(|dir| Path::new(dir).join(command)).collect()
    };

    let Some(found) = candidates.into_iter().find(|rel| prime.join(rel).exists()) else {
        return Err(EntryPointError::NotFound {
            app: app.name.clone(),
            command: executable.to_string(),
        });
    };

    let full = prime.join(&found);
    let target = full
        .canonicalize()
        .map_err(|e| EntryPointError::io(full.display(), e))?;
    let root = prime
        .canonicalize()
        .map_err(|e| EntryPointError::io(prime.display(), e))?;
    if !target.starts_with(&root) {
        return Err(EntryPointError::OutsidePackage {
            app: app.name.clone(),
            command: executable.to_string(),
        });
    }
    if !is_executable(&target) {
        return Err(EntryPointError::NotExecutable {
            app: app.name.clone(),
            path: found,
        });
    }

    Ok(found)
}

/// Bind the apps and write `meta/package.json` into `prime`.
///
/// Nothing is written when any app fails to resolve.
pub fn emit(
    manifest: &Manifest,
    version: &str,
    prime: &Path,
) -> Result<(Descriptor, PathBuf), EntryPointError> {
    let apps = resolve_apps(manifest, prime)?;
    let meta = &manifest.metadata;
    let descriptor = Descriptor {
        name: meta.name.clone(),
        version: version.to_string(),
        summary: meta.summary.clone(),
        description: meta.description.clone(),
        confinement: meta.confinement.as_str().to_string(),
        grade: meta.grade.as_str().to_string(),
        base: meta.base.clone(),
        architecture: std::env::consts::ARCH.to_string(),
        apps,
    };

    let json = serde_json::to_string_pretty(&descriptor)
        .map_err(|e| EntryPointError::io("failed to serialize descriptor", e))?;
    let path = prime.join(DESCRIPTOR_PATH);
    write_string(&path, &format!("{}\n", json))
        .map_err(|e| EntryPointError::io(path.display(), e))?;
    tracing::debug!("wrote {}", path.display());

    Ok((descriptor, path))
}
