//! vcs-miner CLI - command line entry to the history miner
//!
//! Provides:
//! - Ingestion of a repository's commit history
//! - Attribution of history and current content to developers
//! - Project size history
//! - Store statistics

mod commands;
mod helpers;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use miner_db::Store;
use std::path::PathBuf;

use commands::{cmd_attribute, cmd_history, cmd_ingest, cmd_owned, cmd_stats};
use helpers::load_config;

#[derive(Parser)]
#[command(name = "vcs-miner")]
#[command(about = "Mines version-control history into per-developer statistics", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the database
    #[arg(short, long, default_value = "./vcs-miner.db")]
    database: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingests every commit of a repository not stored yet
    Ingest {
        /// Path to the local repository
        #[arg(short, long)]
        repo: PathBuf,

        /// Project name (default: repository directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Number of worker threads (default: from config, else CPU cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Attributes history and current content to developers
    Attribute {
        /// Path to the local repository
        #[arg(short, long)]
        repo: PathBuf,

        /// Project name (default: repository directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Only consider paths under this prefix (e.g. "src/")
        #[arg(short, long)]
        scope: Option<String>,

        /// Number of worker threads (default: from config, else CPU cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Maximum number of files to display
        #[arg(short = 'l', long, default_value = "20")]
        limit: usize,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Lists the lines a developer owns in a file at HEAD
    Owned {
        /// Path to the local repository
        #[arg(short, long)]
        repo: PathBuf,

        /// Project name (default: repository directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// File path relative to the repository root
        path: String,

        /// Author email
        email: String,
    },

    /// Shows project size and stability per ingested commit
    History {
        /// Path to the local repository
        #[arg(short, long)]
        repo: PathBuf,

        /// Project name (default: repository directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Only list commits touching paths under this prefix
        #[arg(short, long)]
        scope: Option<String>,
    },

    /// Show database statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level)).init();

    let config = load_config(cli.config.as_deref())?;

    let store = Store::open(&cli.database, config.store_options())
        .with_context(|| format!("Failed to open database at {:?}", cli.database))?;

    match cli.command {
        Commands::Ingest { repo, name, threads } => {
            cmd_ingest(&store, repo, name, threads, config)?;
        }
        Commands::Attribute { repo, name, scope, threads, limit, json } => {
            cmd_attribute(&store, repo, name, scope, threads, limit, json, config)?;
        }
        Commands::Owned { repo, name, path, email } => {
            cmd_owned(&store, repo, name, &path, &email, config)?;
        }
        Commands::History { repo, name, scope } => {
            cmd_history(&store, repo, name, scope)?;
        }
        Commands::Stats => {
            cmd_stats(&store)?;
        }
    }

    Ok(())
}
