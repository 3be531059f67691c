//! `dock plan` command

use std::path::PathBuf;

use dock::resolver::Namespace;
use dock::util::Shell;

use super::{global_context, CliResult};
use crate::cli::CheckArgs;

pub fn execute(args: CheckArgs, manifest: Option<PathBuf>, shell: &Shell) -> CliResult {
    let gctx = global_context()?;
    let report = dock::ops::plan(&gctx, manifest.as_deref(), args.strict)?;

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "plan",
            "plan": report,
        }));
        return Ok(());
    }

    println!("{} {}", report.name, report.version);
    for namespace in Namespace::ALL {
        let packages: Vec<_> = report.packages.packages(namespace).collect();
        if packages.is_empty() {
            continue;
        }
        println!("\n{} packages:", namespace);
        for package in packages {
            let purposes = package
                .purposes
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let parts = package
                .requested_by
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            println!("  {} ({}) <- {}", package.name, purposes, parts);
        }
    }

    println!("\nbuild order:");
    for (idx, wave) in report.waves.iter().enumerate() {
        println!("  {}. {}", idx + 1, wave.join(", "));
    }
    Ok(())
}
