//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell as CompletionShell;

use dock::util::shell::ColorChoice;

/// Dock - build parts from a manifest and bundle them into a package
#[derive(Parser)]
#[command(name = "dock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to dock.toml (default: search upward from the current directory)
    #[arg(long, global = true, env = "DOCK_MANIFEST", value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Print errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, default_value = "auto", value_parser = parse_color)]
    pub color: ColorChoice,

    /// Output format for lifecycle events
    #[arg(long, global = true, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every part and emit the primed package
    Build(BuildArgs),

    /// Build, then pack the primed tree into a .dock archive
    Pack(PackArgs),

    /// Show the host packages and build order without building
    Plan(CheckArgs),

    /// Check dock.toml without building
    Validate(CheckArgs),

    /// Create a dock.toml in an existing directory
    Init(InitArgs),

    /// Remove the work directory's build trees
    Clean(CleanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Clone)]
pub struct BuildArgs {
    /// Number of parts built in parallel
    #[arg(short, long, env = "DOCK_JOBS")]
    pub jobs: Option<usize>,

    /// Set a build environment variable for every part (KEY=VALUE)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Reject unknown top-level manifest keys
    #[arg(long)]
    pub strict: bool,

    /// Per-command build timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Args)]
pub struct PackArgs {
    #[command(flatten)]
    pub build: BuildArgs,

    /// Directory to write the archive into (default: project directory)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Reject unknown top-level manifest keys
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args)]
pub struct InitArgs {
    /// Package name (defaults to directory name)
    #[arg(long)]
    pub name: Option<String>,

    /// Directory to initialize (defaults to current directory)
    pub path: Option<PathBuf>,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Remove the whole work directory, including .dock/config.toml
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: CompletionShell,
}

fn parse_color(s: &str) -> Result<ColorChoice, String> {
    s.parse()
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))?;
    let valid = !key.is_empty()
        && key.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
        && !key.starts_with(|c: char| c.is_ascii_digit());
    if !valid {
        return Err(format!("invalid environment variable name `{}`", key));
    }
    Ok((key.to_string(), value.to_string()))
}
