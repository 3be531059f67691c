//! `dock pack` command

use std::path::PathBuf;

use dock::ops::{pack, PackOptions};
use dock::util::Shell;

use super::{global_context, lifecycle_options, CliResult};
use crate::cli::PackArgs;

pub fn execute(args: PackArgs, manifest: Option<PathBuf>, shell: &Shell) -> CliResult {
    let gctx = global_context()?;
    let opts = PackOptions {
        lifecycle: lifecycle_options(args.build, manifest),
        output: args.output,
    };

    let report = pack(&gctx, &opts, shell)?;
    if !shell.is_json() {
        println!("{}  {}", report.archive.sha256, report.archive.path.display());
    }
    Ok(())
}
