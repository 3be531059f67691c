//! `dock build` command

use std::path::PathBuf;

use dock::ops::build;
use dock::util::Shell;

use super::{global_context, lifecycle_options, CliResult};
use crate::cli::BuildArgs;

pub fn execute(args: BuildArgs, manifest: Option<PathBuf>, shell: &Shell) -> CliResult {
    let gctx = global_context()?;
    let opts = lifecycle_options(args, manifest);

    let report = build(&gctx, &opts, shell)?;
    if !shell.is_json() && !shell.is_quiet() {
        println!("{}", report.descriptor_path.display());
    }
    Ok(())
}
