//! Dock CLI - build and bundle parts described by dock.toml

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands, MessageFormat};
use dock::util::Shell;

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "dock=debug"
    } else if cli.quiet {
        "dock=error"
    } else {
        "dock=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let shell = Shell::from_flags(
        cli.quiet,
        cli.verbose,
        cli.color,
        cli.message_format == MessageFormat::Json,
    );

    let manifest = cli.manifest.clone();
    let result = match cli.command {
        Commands::Build(args) => commands::build::execute(args, manifest, &shell),
        Commands::Pack(args) => commands::pack::execute(args, manifest, &shell),
        Commands::Plan(args) => commands::plan::execute(args, manifest, &shell),
        Commands::Validate(args) => commands::validate::execute(args, manifest, &shell),
        Commands::Init(args) => commands::init::execute(args, &shell),
        Commands::Clean(args) => commands::clean::execute(args, manifest, &shell),
        Commands::Completions(args) => commands::completions::execute(args),
    };

    if let Err(err) = result {
        std::process::exit(commands::report(err, &shell));
    }
}
