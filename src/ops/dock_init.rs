//! Implementation of `dock init`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::core::grammar::check_package_name;
use crate::core::manifest::generate_manifest;
use crate::util::context::{MANIFEST_NAME, WORK_DIR_NAME};
use crate::util::fs::{set_executable, write_string};

/// Options for `dock init`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Package name (defaults to the directory name)
    pub name: Option<String>,
}

/// Write a starter `dock.toml` and a placeholder command into `path`.
///
/// Returns the manifest path.
pub fn init_project(path: &Path, opts: &InitOptions) -> Result<PathBuf> {
    let name = match &opts.name {
        Some(name) => name.clone(),
        None => default_name(path)?,
    };
    if let Err(reason) = check_package_name(&name) {
        bail!(
            "invalid package name `{}`: {}\n\
             \n\
             Use `dock init --name <name>` to choose another name.",
            name,
            reason
        );
    }

    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))?;
    let manifest_path = path.join(MANIFEST_NAME);
    if manifest_path.exists() {
        bail!("`{}` already exists in `{}`", MANIFEST_NAME, path.display());
    }
    write_string(&manifest_path, &generate_manifest(&name))?;

    let command = path.join("bin").join(&name);
    if !command.exists() {
        write_string(&command, &format!("#!/bin/sh\necho \"Hello from {}!\"\n", name))?;
        set_executable(&command)?;
    }

    ignore_work_dir(path)?;
    Ok(manifest_path)
}

fn default_name(path: &Path) -> Result<String> {
    let dir = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
        bail!("cannot infer a package name from `{}`; pass --name", path.display());
    };
    Ok(name.to_lowercase().replace(['_', ' ', '.'], "-"))
}

/// Add the work directory to `.gitignore` when the project is a git checkout.
fn ignore_work_dir(path: &Path) -> Result<()> {
    if !path.join(".git").exists() {
        return Ok(());
    }
    let gitignore = path.join(".gitignore");
    let entry = format!("/{}/", WORK_DIR_NAME);
    let existing = fs::read_to_string(&gitignore).unwrap_or_default();
    if existing.lines().any(|l| l.trim() == entry) {
        return Ok(());
    }
    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&entry);
    content.push('\n');
    write_string(&gitignore, &content)
}
