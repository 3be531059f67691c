//! Command implementations

pub mod build;
pub mod clean;
pub mod completions;
pub mod init;
pub mod pack;
pub mod plan;
pub mod validate;

use std::path::PathBuf;
use std::time::Duration;

use dock::ops::{LifecycleError, LifecycleFailure, LifecycleOptions};
use dock::util::diagnostic::Diagnostic;
use dock::util::{GlobalContext, Shell};

use crate::cli::BuildArgs;

/// Why a command failed.
pub enum CliError {
    /// A lifecycle run stopped partway
    Failure(LifecycleFailure),
    Lifecycle(LifecycleError),
    Other(anyhow::Error),
}

impl From<LifecycleFailure> for CliError {
    fn from(err: LifecycleFailure) -> Self {
        CliError::Failure(err)
    }
}

impl From<LifecycleError> for CliError {
    fn from(err: LifecycleError) -> Self {
        CliError::Lifecycle(err)
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Other(err)
    }
}

pub type CliResult = Result<(), CliError>;

/// The global context for the current directory, honouring `DOCK_CACHE_DIR`.
pub fn global_context() -> anyhow::Result<GlobalContext> {
    let gctx = GlobalContext::new()?;
    Ok(match std::env::var_os("DOCK_CACHE_DIR") {
        Some(dir) => gctx.with_cache_dir(dir.into()),
        None => gctx,
    })
}

pub fn lifecycle_options(args: BuildArgs, manifest: Option<PathBuf>) -> LifecycleOptions {
    LifecycleOptions {
        manifest_path: manifest,
        jobs: args.jobs,
        environment: args.env,
        strict: args.strict,
        timeout: args.timeout.map(Duration::from_secs),
    }
}

/// Print the error and return the process exit code.
pub fn report(err: CliError, shell: &Shell) -> i32 {
    match err {
        CliError::Failure(failure) => {
            let diag = failure.to_diagnostic();
            let code = failure.exit_code();
            render(failure.error, diag, shell);
            code
        }
        CliError::Lifecycle(error) => {
            let diag = error.to_diagnostic();
            let code = error.exit_code();
            render(error, diag, shell);
            code
        }
        CliError::Other(error) => {
            let diag = Diagnostic::error(format!("{:#}", error));
            if shell.is_json() {
                shell.error(&diag.message);
            } else {
                shell.block(diag.format(shell.use_color()));
            }
            1
        }
    }
}

/// Manifest errors render with their source line; everything else as a
/// diagnostic.
fn render(error: LifecycleError, diag: Diagnostic, shell: &Shell) {
    if shell.is_json() {
        shell.error(&diag.message);
        return;
    }
    match error {
        LifecycleError::Manifest(err) => {
            shell.block(format!("{:?}\n", miette::Report::new(err)));
            for context in &diag.context {
                shell.block(format!("  = {}\n", context));
            }
        }
        _ => shell.block(diag.format(shell.use_color())),
    }
}
