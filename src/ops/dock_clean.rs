//! Implementation of `dock clean`.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::util::context::ProjectLayout;
use crate::util::fs::remove_dir_all_if_exists;

/// Remove the work directory's build trees.
///
/// `.dock/config.toml` is kept unless `all` is set. Returns the removed
/// paths.
pub fn clean(manifest_path: &Path, all: bool) -> Result<Vec<PathBuf>> {
    let layout = ProjectLayout::for_manifest(manifest_path);
    let targets = if all {
        vec![layout.root().to_path_buf()]
    } else {
        layout.transient_dirs()
    };

    let mut removed = Vec::new();
    for dir in targets {
        if dir.exists() {
            remove_dir_all_if_exists(&dir)?;
            tracing::debug!("removed {}", dir.display());
            removed.push(dir);
        }
    }
    Ok(removed)
}
