//! Implementation of `dock build`.
//!
//! Runs the whole lifecycle: load, resolve, pull and build every part,
//! stage, prime, then emit the descriptor. The first fatal error stops the
//! run; nothing is emitted after a failure.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::builder::{
    check_history, BuildError, BuildEvent, BuildExecutor, BuildOptions, PartState, PluginRegistry,
};
use crate::core::{Manifest, ManifestError, ParseOptions};
use crate::emitter::{self, Descriptor, EntryPointError};
use crate::resolver::{HostManagers, InstallPlan, ResolveError, Resolver};
use crate::sources::SourceCache;
use crate::stage::{Assembler, Assembly, AssemblyError};
use crate::util::config::{load_config, Config};
use crate::util::context::{GlobalContext, LocateError, ProjectLayout};
use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::util::fs::remove_dir_all_if_exists;
use crate::util::process::CancelToken;
use crate::util::shell::{format_duration, Shell, Status};

/// Lifecycle stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Resolve,
    Build,
    Stage,
    Prime,
    Emit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Resolve => "resolve",
            Stage::Build => "build",
            Stage::Stage => "stage",
            Stage::Prime => "prime",
            Stage::Emit => "emit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct LifecycleOptions {
    /// Explicit manifest path (otherwise searched upward)
    pub manifest_path: Option<PathBuf>,
    /// Parallel parts (overrides `build.jobs`)
    pub jobs: Option<usize>,
    /// `--env KEY=VALUE` overrides, applied after `[build.environment]`
    pub environment: Vec<(String, String)>,
    /// Reject unknown top-level manifest keys
    pub strict: bool,
    /// Per-command timeout (overrides `build.timeout-secs`)
    pub timeout: Option<Duration>,
}

/// Everything a successful build produced.
#[derive(Debug)]
pub struct BuildReport {
    pub manifest_path: PathBuf,
    pub layout: ProjectLayout,
    pub descriptor: Descriptor,
    pub descriptor_path: PathBuf,
    pub assembly: Assembly,
    pub revisions: IndexMap<String, String>,
    pub duration: Duration,
}

/// The first fatal error of a run.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    EntryPoint(#[from] EntryPointError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LifecycleError {
    /// Process exit code identifying the failing stage.
    pub fn exit_code(&self) -> i32 {
        match self {
            LifecycleError::Locate(_) | LifecycleError::Manifest(_) => 2,
            LifecycleError::Resolve(_) => 3,
            LifecycleError::Build(e) if e.is_fetch() => 4,
            LifecycleError::Build(_) => 5,
            LifecycleError::Assembly(_) => 6,
            LifecycleError::EntryPoint(_) => 7,
            LifecycleError::Other(_) => 1,
        }
    }

    /// The part the failure is attributed to, if any.
    pub fn part(&self) -> Option<&str> {
        match self {
            LifecycleError::Build(e) => Some(e.part()),
            LifecycleError::Assembly(e) => e.part(),
            _ => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            LifecycleError::Locate(e) => {
                Diagnostic::error(e.to_string()).with_suggestion(suggestions::NO_MANIFEST)
            }
            LifecycleError::Manifest(e) => Diagnostic::error(e.to_string()),
            LifecycleError::Resolve(e) => e.to_diagnostic(),
            LifecycleError::Build(e) => e.to_diagnostic(),
            LifecycleError::Assembly(e) => e.to_diagnostic(),
            LifecycleError::EntryPoint(e) => e.to_diagnostic(),
            LifecycleError::Other(e) => Diagnostic::error(format!("{:#}", e)),
        }
    }
}

/// A failed run: the error and how far the lifecycle got.
#[derive(Debug)]
pub struct LifecycleFailure {
    pub error: LifecycleError,
    /// Last stage that completed
    pub last_stage: Option<Stage>,
    /// State of every part at the time of failure
    pub parts: IndexMap<String, PartState>,
}

impl LifecycleFailure {
    fn new(error: impl Into<LifecycleError>, last_stage: Option<Stage>) -> Self {
        LifecycleFailure {
            error: error.into(),
            last_stage,
            parts: IndexMap::new(),
        }
    }

    fn with_parts(mut self, parts: IndexMap<String, PartState>) -> Self {
        self.parts = parts;
        self
    }

    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }

    /// The error's diagnostic, with the partial state appended as context.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = self.error.to_diagnostic();
        if let Some(stage) = self.last_stage {
            diag = diag.with_context(format!("last completed stage: {}", stage));
        }
        if !self.parts.is_empty() {
            let states = self
                .parts
                .iter()
                .map(|(part, state)| format!("{} ({})", part, state))
                .collect::<Vec<_>>()
                .join(", ");
            diag = diag.with_context(format!("parts: {}", states));
        }
        diag
    }
}

impl fmt::Display for LifecycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for LifecycleFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

/// Manifest, layout and merged configuration for one project.
#[derive(Debug)]
pub struct Project {
    pub manifest_path: PathBuf,
    pub manifest: Manifest,
    pub layout: ProjectLayout,
    pub config: Config,
}

impl Project {
    pub fn dir(&self) -> &Path {
        self.manifest_path.parent().unwrap_or(Path::new("."))
    }
}

/// Locate and parse the manifest, and merge configuration.
pub fn load_project(
    gctx: &GlobalContext,
    manifest_path: Option<&Path>,
    strict: bool,
) -> Result<Project, LifecycleError> {
    let manifest_path = gctx.locate_manifest(manifest_path)?;
    let layout = ProjectLayout::for_manifest(&manifest_path);
    let config = load_config(&gctx.config_path(), &layout.config_path());

    let options = ParseOptions {
        strict: strict || config.build.strict,
    };
    let manifest = Manifest::load(&manifest_path, options)?;
    tracing::debug!(
        "loaded {} ({} parts, {} apps)",
        manifest_path.display(),
        manifest.parts.len(),
        manifest.apps.len()
    );

    Ok(Project {
        manifest_path,
        manifest,
        layout,
        config,
    })
}

/// The host package plan for a manifest, including plugin packages.
pub fn install_plan(manifest: &Manifest, plugins: &PluginRegistry) -> InstallPlan {
    InstallPlan::for_manifest(manifest, |id| plugins.build_packages(id))
}

fn build_options(opts: &LifecycleOptions, config: &Config) -> BuildOptions {
    let mut environment = config.build.environment.clone();
    for (key, value) in &opts.environment {
        environment.insert(key.clone(), value.clone());
    }
    let defaults = BuildOptions::default();
    BuildOptions {
        jobs: opts.jobs.or(config.build.jobs).unwrap_or(defaults.jobs),
        timeout: opts
            .timeout
            .or(config.build.timeout_secs.map(Duration::from_secs)),
        net_timeout: config.net.timeout_secs.map(Duration::from_secs),
        environment,
        shell: config.tools.shell(),
    }
}

/// Run the lifecycle and emit the primed package.
pub fn build(
    gctx: &GlobalContext,
    opts: &LifecycleOptions,
    shell: &Shell,
) -> Result<BuildReport, LifecycleFailure> {
    let started = Instant::now();
    let result = run(gctx, opts, shell, started);

    let (success, last_stage) = match &result {
        Ok(_) => (true, Some(Stage::Emit)),
        Err(failure) => (false, failure.last_stage),
    };
    shell.json_event(&BuildEvent::finished(
        success,
        started.elapsed().as_millis() as u64,
        last_stage.map(|s| s.to_string()),
    ));
    result
}

fn run(
    gctx: &GlobalContext,
    opts: &LifecycleOptions,
    shell: &Shell,
    started: Instant,
) -> Result<BuildReport, LifecycleFailure> {
    let project = load_project(gctx, opts.manifest_path.as_deref(), opts.strict)
        .map_err(|e| LifecycleFailure::new(e, None))?;
    let manifest = &project.manifest;
    let layout = &project.layout;
    let config = &project.config;
    let pending = || -> IndexMap<String, PartState> {
        manifest
            .parts
            .keys()
            .map(|p| (p.clone(), PartState::Pending))
            .collect()
    };

    shell.json_event(&BuildEvent::BuildStarted {
        project: manifest.name().to_string(),
        version: manifest.version().to_string(),
        parts: manifest.parts.keys().cloned().collect(),
    });

    // Depth limits that make `git describe` impossible fail before any work.
    check_history(manifest)
        .map_err(|e| LifecycleFailure::new(e, Some(Stage::Load)).with_parts(pending()))?;
    let graph = manifest
        .part_graph()
        .map_err(|e| LifecycleFailure::new(anyhow::Error::new(e), Some(Stage::Load)))?;

    for dir in layout.transient_dirs() {
        remove_dir_all_if_exists(&dir).map_err(|e| LifecycleFailure::new(e, Some(Stage::Load)))?;
    }
    stage_done(shell, Stage::Load, started);

    // Resolve host packages.
    let stage_started = Instant::now();
    let plugins = PluginRegistry::new();
    let plan = install_plan(manifest, &plugins);
    shell.status(Status::Resolving, format!("{} host package(s)", plan.len()));
    let managers = HostManagers::from_config(&config.packages)
        .map_err(|e| LifecycleFailure::new(e, Some(Stage::Load)).with_parts(pending()))?;
    let resolver = Resolver::new(&managers).allow_install(config.packages.install);
    let resolution = resolver
        .resolve(&plan)
        .map_err(|e| LifecycleFailure::new(e, Some(Stage::Load)).with_parts(pending()))?;
    for name in &resolution.installed {
        shell.status(Status::Installing, name);
    }
    let packages = resolver
        .unpack_stage_packages(&plan, &layout.stage_packages_dir())
        .map_err(|e| LifecycleFailure::new(e, Some(Stage::Load)).with_parts(pending()))?;
    stage_done(shell, Stage::Resolve, stage_started);

    // Pull and build every part.
    let stage_started = Instant::now();
    let build_opts = build_options(opts, config);
    let cache = SourceCache::new(layout.downloads_dir(), config.net.effective_retries());
    let cancel = CancelToken::new();
    let executor = BuildExecutor::new(
        manifest,
        layout,
        project.dir(),
        &cache,
        &plugins,
        &build_opts,
        shell,
        &cancel,
    );
    let outcome = executor.execute(&graph).map_err(|e| {
        LifecycleFailure::new(e, Some(Stage::Resolve)).with_parts(executor.states().snapshot())
    })?;
    let parts = executor.states().snapshot();
    stage_done(shell, Stage::Build, stage_started);

    // Stage, prime and post-process.
    let stage_started = Instant::now();
    shell.status(Status::Staging, manifest.name());
    let assembler = Assembler::new(manifest, layout, &plan, &packages);
    let staged = assembler
        .stage()
        .map_err(|e| LifecycleFailure::new(e, Some(Stage::Build)).with_parts(parts.clone()))?;
    stage_done(shell, Stage::Stage, stage_started);

    let stage_started = Instant::now();
    shell.status(Status::Priming, manifest.name());
    let primed = assembler
        .prime(&staged)
        .and_then(|primed| {
            assembler.post_process(&primed, &config.tools)?;
            Ok(primed)
        })
        .map_err(|e| LifecycleFailure::new(e, Some(Stage::Stage)).with_parts(parts.clone()))?;
    stage_done(shell, Stage::Prime, stage_started);

    // Emit.
    let version = outcome
        .adopted_version
        .clone()
        .unwrap_or_else(|| manifest.version().to_string());
    let (descriptor, descriptor_path) = emitter::emit(manifest, &version, &layout.prime_dir())
        .map_err(|e| LifecycleFailure::new(e, Some(Stage::Prime)).with_parts(parts.clone()))?;
    shell.json_event(&BuildEvent::PackageEmitted {
        descriptor: descriptor_path.clone(),
        archive: None,
        sha256: None,
    });

    let duration = started.elapsed();
    shell.status(
        Status::Finished,
        format!(
            "{} {} ({} app(s)) in {}",
            descriptor.name,
            descriptor.version,
            descriptor.apps.len(),
            format_duration(duration)
        ),
    );

    Ok(BuildReport {
        manifest_path: project.manifest_path.clone(),
        layout: layout.clone(),
        descriptor,
        descriptor_path,
        assembly: Assembly { staged, primed },
        revisions: outcome.revisions,
        duration,
    })
}

fn stage_done(shell: &Shell, stage: Stage, started: Instant) {
    let elapsed = started.elapsed();
    tracing::debug!("stage {} finished in {}", stage, format_duration(elapsed));
    shell.json_event(&BuildEvent::stage_finished(
        stage.as_str(),
        elapsed.as_millis() as u64,
    ));
}
