//! `dock validate` command

use std::path::PathBuf;

use dock::util::shell::Status;
use dock::util::Shell;

use super::{global_context, CliResult};
use crate::cli::CheckArgs;

pub fn execute(args: CheckArgs, manifest: Option<PathBuf>, shell: &Shell) -> CliResult {
    let gctx = global_context()?;
    let report = dock::ops::validate(&gctx, manifest.as_deref(), args.strict)?;

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "manifest-valid",
            "manifest": report,
        }));
    } else {
        shell.status(
            Status::Finished,
            format!(
                "{} {} is valid ({} part(s), {} app(s))",
                report.name,
                report.version,
                report.parts.len(),
                report.apps.len()
            ),
        );
    }
    Ok(())
}
