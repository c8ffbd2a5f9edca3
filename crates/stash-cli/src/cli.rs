use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stash", about = "Stash: content-addressed asset store", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file; `STASH_*` variables override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Store a file
    Put(PutArgs),
    /// Fetch an asset by file name or id
    Get(GetArgs),
    /// List assets, newest first
    Ls(LsArgs),
    /// Delete an asset
    Rm(RmArgs),
    /// Remove unreferenced backend objects and expire cache files
    Sweep(SweepArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Overrides `server.bind_addr`
    #[arg(long)]
    pub bind: Option<std::net::SocketAddr>,
}

#[derive(Args)]
pub struct PutArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct GetArgs {
    pub name: String,
    /// Output file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(short = 'n', long, default_value = "100")]
    pub limit: usize,
    #[arg(long, default_value = "0")]
    pub offset: usize,
}

#[derive(Args)]
pub struct RmArgs {
    pub id: String,
}

#[derive(Args)]
pub struct SweepArgs {
    /// Only sweep the local cache
    #[arg(long)]
    pub cache_only: bool,
}
