//! Build plugins.
//!
//! A plugin turns a part into a list of [`BuildStep`]s run inside the part's
//! build directory. The registry is keyed by [`PluginId`] and always holds
//! every built-in plugin; whether the tools a plugin shells out to are
//! present is the resolver's concern, via [`Plugin::build_packages`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::{Part, PluginId};

mod cmake;
mod dump;
mod make;
mod nil;
mod rust;

pub use cmake::CmakePlugin;
pub use dump::DumpPlugin;
pub use make::MakePlugin;
pub use nil::NilPlugin;
pub use rust::RustPlugin;

/// Directories a plugin works with.
#[derive(Debug, Clone)]
pub struct PluginContext<'a> {
    pub src: &'a Path,
    /// Working copy of the source; steps run here.
    pub build: &'a Path,
    pub install: &'a Path,
    pub jobs: usize,
}

/// One unit of plugin work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    Run {
        program: PathBuf,
        args: Vec<String>,
        cwd: PathBuf,
    },
    /// Copy every file under `from` into `to`.
    CopyTree { from: PathBuf, to: PathBuf },
}

impl BuildStep {
    pub fn run<I, S>(program: impl Into<PathBuf>, args: I, cwd: &Path) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BuildStep::Run {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: cwd.to_path_buf(),
        }
    }

    /// A short human-readable rendering, for logs and errors.
    pub fn describe(&self) -> String {
        match self {
            BuildStep::Run { program, args, .. } => {
                let mut words = vec![program.display().to_string()];
                words.extend(args.iter().cloned());
                words.join(" ")
            }
            BuildStep::CopyTree { from, to } => {
                format!("copy {} -> {}", from.display(), to.display())
            }
        }
    }
}

pub trait Plugin: Send + Sync {
    fn id(&self) -> PluginId;

    /// Host packages this plugin needs to build anything.
    fn build_packages(&self) -> Vec<String> {
        Vec::new()
    }

    fn steps(&self, part: &Part, ctx: &PluginContext<'_>) -> Vec<BuildStep>;
}

/// Registry of build plugins.
pub struct PluginRegistry {
    plugins: HashMap<PluginId, Box<dyn Plugin>>,
}

impl PluginRegistry {
    /// A registry holding every built-in plugin.
    pub fn new() -> Self {
        let mut registry = PluginRegistry {
            plugins: HashMap::new(),
        };
        registry.register(Box::new(NilPlugin));
        registry.register(Box::new(DumpPlugin));
        registry.register(Box::new(MakePlugin));
        registry.register(Box::new(CmakePlugin));
        registry.register(Box::new(RustPlugin));
        registry
    }

    /// Register a plugin, replacing any with the same id.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.insert(plugin.id(), plugin);
    }

    pub fn get(&self, id: PluginId) -> Option<&dyn Plugin> {
        self.plugins.get(&id).map(|p| p.as_ref())
    }

    /// Host packages required by a plugin; empty for unknown ids.
    pub fn build_packages(&self, id: PluginId) -> Vec<String> {
        self.get(id).map(|p| p.build_packages()).unwrap_or_default()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.plugins.keys().collect();
        ids.sort();
        f.debug_struct("PluginRegistry").field("plugins", &ids).finish()
    }
}
