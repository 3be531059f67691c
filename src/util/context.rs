//! Global context for Dock operations.
//!
//! Provides centralized access to paths and manifest discovery.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use thiserror::Error;

/// Canonical manifest file name.
pub const MANIFEST_NAME: &str = "dock.toml";

/// Name of the per-project work directory.
pub const WORK_DIR_NAME: &str = ".dock";

/// Project directories for Dock
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("dev", "dock", "dock"));

/// Error locating a manifest on disk.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("could not find `dock.toml` in `{}` or any parent directory", dir.display())]
    NotFound { dir: PathBuf },

    #[error("manifest path `{}` does not exist", path.display())]
    Missing { path: PathBuf },
}

/// Global context containing paths and environment.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global Dock data (~/.dock/)
    home: PathBuf,

    /// Cache directory for downloads shared across projects
    cache: PathBuf,
}

impl GlobalContext {
    /// Create a new GlobalContext rooted at the process working directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd))
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Self {
        let home = BaseDirs::new()
            .map(|b| b.home_dir().join(".dock"))
            .unwrap_or_else(|| PathBuf::from(".dock-home"));

        let cache = match PROJECT_DIRS.as_ref() {
            Some(dirs) => dirs.cache_dir().to_path_buf(),
            None => home.join("cache"),
        };

        GlobalContext { cwd, home, cache }
    }

    /// Override the shared cache directory (`DOCK_CACHE_DIR`).
    pub fn with_cache_dir(mut self, cache: PathBuf) -> Self {
        self.cache = cache;
        self
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the Dock home directory (~/.dock/).
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Get the global cache directory for downloaded sources and packages.
    pub fn cache_dir(&self) -> &Path {
        &self.cache
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Resolve the manifest path: an explicit path wins, otherwise search
    /// upward from the working directory.
    pub fn locate_manifest(&self, explicit: Option<&Path>) -> Result<PathBuf, LocateError> {
        match explicit {
            Some(path) => {
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.cwd.join(path)
                };
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(LocateError::Missing { path })
                }
            }
            None => self.find_manifest(),
        }
    }

    /// Find `dock.toml` starting from cwd and searching upward.
    pub fn find_manifest(&self) -> Result<PathBuf, LocateError> {
        let mut current = self.cwd.clone();
        loop {
            let candidate = current.join(MANIFEST_NAME);
            if candidate.is_file() {
                return Ok(candidate);
            }
            if !current.pop() {
                return Err(LocateError::NotFound {
                    dir: self.cwd.clone(),
                });
            }
        }
    }
}

/// The on-disk layout of one project's work directory.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    /// Layout for the project whose manifest lives at `manifest_path`.
    pub fn for_manifest(manifest_path: &Path) -> Self {
        let project = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        ProjectLayout {
            root: project.join(WORK_DIR_NAME),
        }
    }

    /// Layout rooted at an explicit work directory.
    pub fn at(root: PathBuf) -> Self {
        ProjectLayout { root }
    }

    /// The work directory itself (`.dock/`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project-local config file.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Directory holding all per-part trees.
    pub fn parts_dir(&self) -> PathBuf {
        self.root.join("parts")
    }

    /// Directory for one part.
    pub fn part_dir(&self, part: &str) -> PathBuf {
        self.parts_dir().join(part)
    }

    /// Fetched sources for a part.
    pub fn part_src(&self, part: &str) -> PathBuf {
        self.part_dir(part).join("src")
    }

    /// Scratch build directory for a part.
    pub fn part_build(&self, part: &str) -> PathBuf {
        self.part_dir(part).join("build")
    }

    /// Install tree produced by a part's build.
    pub fn part_install(&self, part: &str) -> PathBuf {
        self.part_dir(part).join("install")
    }

    /// Build log for a part.
    pub fn part_log(&self, part: &str) -> PathBuf {
        self.part_dir(part).join("build.log")
    }

    /// Unpacked stage-package trees.
    pub fn stage_packages_dir(&self) -> PathBuf {
        self.root.join("stage-packages")
    }

    /// Merged stage tree.
    pub fn stage_dir(&self) -> PathBuf {
        self.root.join("stage")
    }

    /// Final primed tree.
    pub fn prime_dir(&self) -> PathBuf {
        self.root.join("prime")
    }

    /// Per-invocation download cache for fetched sources.
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    /// Directories discarded at the start of every build.
    pub fn transient_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.downloads_dir(),
            self.parts_dir(),
            self.stage_packages_dir(),
            self.stage_dir(),
            self.prime_dir(),
        ]
    }
}
