use anyhow::Result;
use clap::Parser;
use repomap::cli::{AppContext, Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Map(args) => repomap::core::engine::run(args, &ctx),
        Commands::Init(args) => repomap::infra::config::init(args, &ctx),
        Commands::ClearCache(args) => repomap::core::engine::clear_cache_run(args, &ctx),
    }
}
