//! Part build executor.
//!
//! Parts are built wave by wave: every part in a wave has all of its `after`
//! dependencies in earlier waves, so a wave's parts run in parallel on a
//! rayon pool. The first failure cancels the run. Parts that had not
//! started stay `pending`; in-flight parts have their process groups
//! killed.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::builder::environment::{BuildEnvironment, InjectedVars};
use crate::builder::errors::BuildError;
use crate::builder::events::BuildEvent;
use crate::builder::plugins::{BuildStep, PluginContext, PluginRegistry};
use crate::builder::state::{PartState, PartStates};
use crate::core::{Manifest, Part, PartGraph, SourceType};
use crate::sources::{describe, FetchContext, FetchError, SourceCache};
use crate::util::context::ProjectLayout;
use crate::util::fs::{copy_dir_all, ensure_dir};
use crate::util::process::{CancelToken, ProcessBuilder, ProcessError};
use crate::util::shell::{format_duration, Shell, Status};

/// Knobs for one build run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Parallel parts, also exported as `DOCK_PARALLEL_BUILD_COUNT`
    pub jobs: usize,
    /// Per-command limit
    pub timeout: Option<Duration>,
    /// Per-request network limit
    pub net_timeout: Option<Duration>,
    /// Global environment overlay: config first, then `--env`
    pub environment: IndexMap<String, String>,
    /// Interpreter for `override-build`
    pub shell: PathBuf,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            jobs: std::thread::available_parallelism().map_or(1, |n| n.get()),
            timeout: None,
            net_timeout: None,
            environment: IndexMap::new(),
            shell: PathBuf::from("/bin/sh"),
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    /// Fetched revision of each part with a source
    pub revisions: IndexMap<String, String>,
    /// Version described from the `adopt-info` part
    pub adopted_version: Option<String>,
}

pub struct BuildExecutor<'a> {
    manifest: &'a Manifest,
    layout: &'a ProjectLayout,
    project_dir: &'a Path,
    cache: &'a SourceCache,
    plugins: &'a PluginRegistry,
    options: &'a BuildOptions,
    shell: &'a Shell,
    states: PartStates,
    cancel: CancelToken,
    outcome: Mutex<BuildOutcome>,
}

impl<'a> BuildExecutor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manifest: &'a Manifest,
        layout: &'a ProjectLayout,
        project_dir: &'a Path,
        cache: &'a SourceCache,
        plugins: &'a PluginRegistry,
        options: &'a BuildOptions,
        shell: &'a Shell,
        cancel: &CancelToken,
    ) -> Self {
        BuildExecutor {
            manifest,
            layout,
            project_dir,
            cache,
            plugins,
            options,
            shell,
            states: PartStates::new(manifest.parts.keys().cloned()),
            cancel: cancel.child(),
            outcome: Mutex::new(BuildOutcome::default()),
        }
    }

    pub fn states(&self) -> &PartStates {
        &self.states
    }

    /// Build every part. Returns the first root-cause failure.
    pub fn execute(&self, graph: &PartGraph) -> Result<BuildOutcome, BuildError> {
        check_history(self.manifest)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs.max(1))
            .thread_name(|i| format!("dock-build-{}", i))
            .build()
            .map_err(|e| BuildError::io("*", e))?;

        let started = Instant::now();
        let progress = self
            .shell
            .progress(self.manifest.parts.len() as u64, "building parts");

        for wave in graph.waves() {
            if self.cancel.is_cancelled() {
                break;
            }
            let results: Vec<Result<(), BuildError>> = pool.install(|| {
                wave.par_iter()
                    .map(|name| {
                        let result = self.build_part(name);
                        if result.is_err() {
                            self.cancel.cancel();
                        }
                        progress.inc(1);
                        result
                    })
                    .collect()
            });

            let mut errors: Vec<BuildError> =
                results.into_iter().filter_map(Result::err).collect();
            if !errors.is_empty() {
                progress.finish();
                let root = errors
                    .iter()
                    .position(|e| !e.is_cancellation())
                    .unwrap_or(0);
                return Err(errors.swap_remove(root));
            }
        }
        progress.finish();

        self.shell.verbose(
            Status::Finished,
            format!(
                "{} part(s) in {}",
                self.manifest.parts.len(),
                format_duration(started.elapsed())
            ),
        );
        let outcome = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        Ok(outcome.clone())
    }

    fn build_part(&self, name: &str) -> Result<(), BuildError> {
        let part = self.manifest.part(name).ok_or_else(|| BuildError::Io {
            part: name.to_string(),
            message: "not declared in the manifest".to_string(),
        })?;
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled {
                part: name.to_string(),
            });
        }

        self.transition(name, PartState::Fetching);
        self.shell.status(Status::Pulling, name);
        if let Err(err) = self.pull(part) {
            return Err(self.fail(name, PartState::Fetching, err));
        }

        self.transition(name, PartState::Building);
        self.shell.status(Status::Building, name);
        if let Err(err) = self.run_build(part) {
            return Err(self.fail(name, PartState::Building, err));
        }

        self.transition(name, PartState::Built);
        Ok(())
    }

    fn pull(&self, part: &Part) -> Result<(), BuildError> {
        let src = self.layout.part_src(&part.name);
        let Some(source) = &part.source else {
            return ensure_dir(&src).map_err(|e| BuildError::io(&part.name, e));
        };

        let ctx = FetchContext {
            project_dir: self.project_dir,
            cancel: &self.cancel,
            timeout: self.options.net_timeout,
        };
        let fetch_err = |source: FetchError| BuildError::Fetch {
            part: part.name.clone(),
            source,
        };
        let fetched = self.cache.checkout(source, &src, &ctx).map_err(fetch_err)?;

        let adopted = if self.is_adopted(part) {
            let version = describe(&src, &source.location).map_err(fetch_err)?;
            self.shell.verbose(
                Status::Info,
                format!("adopted version {} from {}", version, part.name),
            );
            Some(version)
        } else {
            None
        };

        let mut outcome = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(revision) = fetched.revision {
            outcome.revisions.insert(part.name.clone(), revision);
        }
        if adopted.is_some() {
            outcome.adopted_version = adopted;
        }
        Ok(())
    }

    fn is_adopted(&self, part: &Part) -> bool {
        self.manifest.adopts_git_version()
            && self.manifest.metadata.adopt_info.as_deref() == Some(part.name.as_str())
    }

    fn run_build(&self, part: &Part) -> Result<(), BuildError> {
        let name = part.name.as_str();
        let src = self.layout.part_src(name);
        let build = self.layout.part_build(name);
        let install = self.layout.part_install(name);
        let stage = self.layout.stage_dir();

        copy_dir_all(&src, &build).map_err(|e| BuildError::io(name, e))?;
        ensure_dir(&install).map_err(|e| BuildError::io(name, e))?;

        let mut env = BuildEnvironment::ambient();
        env.inject(&InjectedVars {
            project_name: self.manifest.name(),
            project_version: self.manifest.version(),
            part_name: name,
            part_src: &src,
            part_build: &build,
            part_install: &install,
            stage: &stage,
            jobs: self.options.jobs,
        });
        env.overlay(&self.options.environment);
        env.apply_part(part);

        let steps = match &part.override_build {
            Some(script) => vec![BuildStep::run(
                &self.options.shell,
                ["-e".to_string(), "-c".to_string(), script.clone()],
                &build,
            )],
            None => {
                let plugin = self.plugins.get(part.plugin).ok_or_else(|| BuildError::Io {
                    part: name.to_string(),
                    message: format!("no `{}` plugin registered", part.plugin),
                })?;
                plugin.steps(
                    part,
                    &PluginContext {
                        src: &src,
                        build: &build,
                        install: &install,
                        jobs: self.options.jobs,
                    },
                )
            }
        };

        let log = self.layout.part_log(name);
        for step in &steps {
            self.run_step(name, step, &env, &log)?;
        }
        Ok(())
    }

    fn run_step(
        &self,
        part: &str,
        step: &BuildStep,
        env: &BuildEnvironment,
        log: &Path,
    ) -> Result<(), BuildError> {
        let command = step.describe();
        self.shell.verbose(Status::Info, format!("{}: {}", part, command));
        tracing::debug!("{}: running {}", part, command);

        match step {
            BuildStep::CopyTree { from, to } => {
                copy_dir_all(from, to).map_err(|e| BuildError::io(part, e))
            }
            BuildStep::Run { program, args, cwd } => {
                let output = ProcessBuilder::new(program)
                    .args(args)
                    .cwd(cwd)
                    .envs_exact(env.iter())
                    .run(&self.cancel, self.options.timeout)
                    .map_err(|e| process_error(part, e))?;

                append_log(log, &command, &output.stdout, &output.stderr)
                    .map_err(|e| BuildError::io(part, e))?;

                if output.status.success() {
                    Ok(())
                } else {
                    Err(BuildError::CommandFailed {
                        part: part.to_string(),
                        command,
                        code: output.status.code(),
                        log: log.to_path_buf(),
                    })
                }
            }
        }
    }

    fn transition(&self, part: &str, next: PartState) {
        if let Some(previous) = self.states.transition(part, next) {
            tracing::debug!("part {}: {} -> {}", part, previous, next);
            self.shell
                .json_event(&BuildEvent::part_state(part, previous, next));
        }
    }

    fn fail(&self, part: &str, from: PartState, err: BuildError) -> BuildError {
        if self.states.transition(part, PartState::Failed).is_some() {
            tracing::debug!("part {}: {} -> failed: {}", part, from, err);
            self.shell
                .json_event(&BuildEvent::part_failed(part, from, err.to_string()));
        }
        err
    }
}

/// Reject history-requiring steps on shallow sources before anything is
/// fetched.
pub fn check_history(manifest: &Manifest) -> Result<(), BuildError> {
    if !manifest.adopts_git_version() {
        return Ok(());
    }
    let Some(part) = manifest
        .metadata
        .adopt_info
        .as_deref()
        .and_then(|name| manifest.part(name))
    else {
        return Ok(());
    };

    match &part.source {
        Some(source) if source.kind == SourceType::Git => match source.depth {
            Some(depth) => Err(BuildError::Fetch {
                part: part.name.clone(),
                source: FetchError::ShallowHistory {
                    location: source.location.clone(),
                    depth,
                    operation: "`git describe` for `adopt-info`".to_string(),
                },
            }),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

fn process_error(part: &str, err: ProcessError) -> BuildError {
    match err {
        ProcessError::Cancelled { .. } => BuildError::Cancelled {
            part: part.to_string(),
        },
        ProcessError::TimedOut { command, timeout } => BuildError::TimedOut {
            part: part.to_string(),
            command,
            timeout,
        },
        ProcessError::Spawn { program, source } => BuildError::Spawn {
            part: part.to_string(),
            command: program,
            message: source.to_string(),
        },
        ProcessError::Wait { command, source } => BuildError::Spawn {
            part: part.to_string(),
            command,
            message: source.to_string(),
        },
    }
}

fn append_log(log: &Path, command: &str, stdout: &[u8], stderr: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(log)?;
    writeln!(file, "$ {}", command)?;
    file.write_all(stdout)?;
    file.write_all(stderr)?;
    Ok(())
}
