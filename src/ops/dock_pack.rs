//! Implementation of `dock pack`: build, then archive the primed tree.

use std::path::{Path, PathBuf};

use crate::builder::BuildEvent;
use crate::emitter::{self, PackedArchive};
use crate::ops::dock_build::{
    build, BuildReport, LifecycleError, LifecycleFailure, LifecycleOptions, Stage,
};
use crate::util::context::GlobalContext;
use crate::util::shell::{Shell, Status};

#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    pub lifecycle: LifecycleOptions,
    /// Directory for the archive (defaults to the project directory)
    pub output: Option<PathBuf>,
}

#[derive(Debug)]
pub struct PackReport {
    pub build: BuildReport,
    pub archive: PackedArchive,
}

pub fn pack(
    gctx: &GlobalContext,
    opts: &PackOptions,
    shell: &Shell,
) -> Result<PackReport, LifecycleFailure> {
    let report = build(gctx, &opts.lifecycle, shell)?;

    let out_dir = match &opts.output {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => gctx.cwd().join(dir),
        None => report
            .manifest_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf(),
    };

    shell.status(Status::Packing, emitter::archive_name(&report.descriptor));
    let archive = emitter::pack(&report.layout.prime_dir(), &report.descriptor, &out_dir).map_err(
        |e| LifecycleFailure {
            error: LifecycleError::Other(e),
            last_stage: Some(Stage::Emit),
            parts: Default::default(),
        },
    )?;

    shell.json_event(&BuildEvent::PackageEmitted {
        descriptor: report.descriptor_path.clone(),
        archive: Some(archive.path.clone()),
        sha256: Some(archive.sha256.clone()),
    });
    shell.status(
        Status::Packed,
        format!("{} (sha256 {})", archive.path.display(), archive.sha256),
    );

    Ok(PackReport {
        build: report,
        archive,
    })
}
