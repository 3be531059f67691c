//! Configuration file support for Dock.
//!
//! Dock reads two configuration files:
//! - Global: `~/.dock/config.toml` - user-wide defaults
//! - Project: `.dock/config.toml` next to the manifest - project overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Upper bound for automatic fetch retries. Only transient network errors
/// are retried, and never more than once.
pub const MAX_FETCH_RETRIES: u32 = 1;

/// Dock configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Network settings
    pub net: NetConfig,

    /// Host package manager settings
    pub packages: PackagesConfig,

    /// External tool overrides
    pub tools: ToolsConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Number of parts built in parallel (None = number of CPUs)
    pub jobs: Option<usize>,

    /// Reject unknown top-level manifest keys
    pub strict: bool,

    /// Per-command build timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Global build-environment overlay applied to every part.
    pub environment: IndexMap<String, String>,
}

/// Network-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetConfig {
    /// Automatic retries for transient fetch errors (capped at 1)
    pub retries: u32,

    /// Network timeout in seconds for downloads and git fetches
    pub timeout_secs: Option<u64>,
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            retries: 1,
            timeout_secs: None,
        }
    }
}

impl NetConfig {
    /// Effective retry count after applying the hard cap.
    pub fn effective_retries(&self) -> u32 {
        self.retries.min(MAX_FETCH_RETRIES)
    }
}

/// Which host package manager backs the `deb` namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// dpkg/apt on the host
    #[default]
    Apt,
    /// An on-disk repository of prebuilt package trees
    Directory,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "apt" => Ok(BackendKind::Apt),
            "directory" | "dir" => Ok(BackendKind::Directory),
            _ => Err(format!(
                "invalid package backend '{}'; expected 'apt' or 'directory'",
                s
            )),
        }
    }
}

/// Host package manager configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PackagesConfig {
    /// Package manager backend
    pub backend: BackendKind,

    /// Repository root for the `directory` backend
    pub repository: Option<PathBuf>,

    /// Allow installing missing build packages onto the host
    pub install: bool,
}

/// Paths to external tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ToolsConfig {
    /// patchelf binary used by `enable-patchelf`
    pub patchelf: Option<PathBuf>,

    /// Shell used for `override-build` scripts
    pub shell: Option<PathBuf>,
}

impl ToolsConfig {
    /// The patchelf program to run.
    pub fn patchelf(&self) -> PathBuf {
        self.patchelf
            .clone()
            .unwrap_or_else(|| PathBuf::from("patchelf"))
    }

    /// The shell used for build scripts.
    pub fn shell(&self) -> PathBuf {
        self.shell.clone().unwrap_or_else(|| PathBuf::from("/bin/sh"))
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if the file is missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.strict {
            self.build.strict = true;
        }
        if other.build.timeout_secs.is_some() {
            self.build.timeout_secs = other.build.timeout_secs;
        }
        for (key, value) in other.build.environment {
            self.build.environment.insert(key, value);
        }

        let default_net = NetConfig::default();
        if other.net.retries != default_net.retries {
            self.net.retries = other.net.retries;
        }
        if other.net.timeout_secs.is_some() {
            self.net.timeout_secs = other.net.timeout_secs;
        }

        if other.packages.backend != BackendKind::default() {
            self.packages.backend = other.packages.backend;
        }
        if other.packages.repository.is_some() {
            self.packages.repository = other.packages.repository;
        }
        if other.packages.install {
            self.packages.install = true;
        }

        if other.tools.patchelf.is_some() {
            self.tools.patchelf = other.tools.patchelf;
        }
        if other.tools.shell.is_some() {
            self.tools.shell = other.tools.shell;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.dock/config.toml)
/// 2. Global config (~/.dock/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}
