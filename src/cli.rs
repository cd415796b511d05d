use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::engine::RefreshMode;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,   // global --quiet
    pub verbose: bool, // global --verbose
}

#[derive(Parser)]
#[command(name = "repomap")]
#[command(
    about = "Rank the most relevant code in a repository and render it into a token-budgeted map"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Suppress progress output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Verbose diagnostics (also honors RUST_LOG)
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute and print the repository map for a set of chat files
    Map(MapArgs),

    /// Initialize a repomap.toml config file
    Init(InitArgs),

    /// Delete the persistent tag cache
    ClearCache(ClearCacheArgs),
}

#[derive(Parser, Debug)]
pub struct MapArgs {
    /// Repository root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Files currently in the chat; ranking is personalized toward what
    /// they reference (repeatable)
    #[arg(long = "chat-file", value_name = "FILE")]
    pub chat_files: Vec<PathBuf>,

    /// Files mentioned in conversation, boosted in ranking (repeatable)
    #[arg(long = "mention-file", value_name = "FILE")]
    pub mention_files: Vec<PathBuf>,

    /// Identifiers mentioned in conversation, boosted in ranking
    /// (repeatable)
    #[arg(long = "mention-ident", value_name = "IDENT")]
    pub mention_idents: Vec<String>,

    /// Token budget for the rendered map (default from config)
    #[arg(long)]
    pub map_tokens: Option<usize>,

    /// GPT model (gpt-4o, ...) or encoding (o200k_base, cl100k_base) for
    /// token counting
    #[arg(long)]
    pub model: Option<String>,

    /// Result-cache refresh policy
    #[arg(long, value_enum)]
    pub refresh: Option<RefreshArg>,

    /// Recompute even when the refresh policy would reuse a cached map
    #[arg(long)]
    pub force_refresh: bool,

    /// Write the map to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RefreshArg {
    /// Always recompute
    Always,
    /// Reuse when the file/token key matches
    Files,
    /// Reuse only after a slow (>1s) computation
    Auto,
    /// Reuse the last map unless --force-refresh
    Manual,
}

impl From<RefreshArg> for RefreshMode {
    fn from(arg: RefreshArg) -> Self {
        match arg {
            RefreshArg::Always => RefreshMode::Always,
            RefreshArg::Files => RefreshMode::Files,
            RefreshArg::Auto => RefreshMode::Auto,
            RefreshArg::Manual => RefreshMode::Manual,
        }
    }
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser)]
pub struct ClearCacheArgs {
    /// Repository root whose cache should be dropped
    #[arg(default_value = ".")]
    pub path: PathBuf,
}
