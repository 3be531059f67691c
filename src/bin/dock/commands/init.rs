//! `dock init` command

use anyhow::Context;

use dock::ops::{init_project, InitOptions};
use dock::util::shell::Status;
use dock::util::Shell;

use super::CliResult;
use crate::cli::InitArgs;

pub fn execute(args: InitArgs, shell: &Shell) -> CliResult {
    let path = match args.path {
        Some(path) => path,
        None => std::env::current_dir().context("failed to get current directory")?,
    };
    let opts = InitOptions { name: args.name };

    let manifest = init_project(&path, &opts)?;
    shell.status(Status::Created, manifest.display());
    Ok(())
}
