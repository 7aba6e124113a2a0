//! Helper functions for CLI operations

use anyhow::{Context, Result};
use miner_core::Project;
use miner_db::Store;
use miner_index::{register_project, MinerConfig};
use std::path::Path;

/// Loads the configuration file, or the defaults when none is given
pub fn load_config(path: Option<&Path>) -> Result<MinerConfig> {
    match path {
        Some(path) => MinerConfig::from_file(path).context("Failed to load configuration"),
        None => Ok(MinerConfig::default()),
    }
}

/// Applies the `--threads` override
pub fn with_threads(mut config: MinerConfig, threads: Option<usize>) -> MinerConfig {
    if let Some(threads) = threads {
        config.workers = threads;
    }
    config
}

/// Registers the repository as a project, returning the existing one when known
pub fn open_project(store: &Store, repo: &Path, name: Option<&str>) -> Result<Project> {
    register_project(store, repo, name).with_context(|| format!("Failed to register repository at {:?}", repo))
}

/// Shortens a full commit hash for display
pub fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

/// Formats a 0..=1 ratio as a percentage
pub fn format_percent(part: u64, total: u64) -> String {
    if total == 0 {
        return "-".to_string();
    }
    format!("{:.1}%", part as f64 * 100.0 / total as f64)
}
