//! `dock clean` command

use std::path::PathBuf;

use dock::ops::clean;
use dock::util::shell::Status;
use dock::util::Shell;

use super::{global_context, CliResult};
use crate::cli::CleanArgs;

pub fn execute(args: CleanArgs, manifest: Option<PathBuf>, shell: &Shell) -> CliResult {
    let gctx = global_context()?;
    let manifest_path = gctx
        .locate_manifest(manifest.as_deref())
        .map_err(dock::ops::LifecycleError::from)?;

    let removed = clean(&manifest_path, args.all)?;
    if removed.is_empty() {
        shell.verbose(Status::Skipped, "nothing to clean");
    }
    for dir in removed {
        shell.status(Status::Removed, dir.display());
    }
    Ok(())
}
