//! Ingest command implementation

use anyhow::{Context, Result};
use colored::Colorize;
use miner_db::Store;
use miner_index::formatting::{format_duration, format_number, format_unix_timestamp};
use miner_index::{Ingestor, MinerConfig};
use std::path::PathBuf;

use crate::helpers::{open_project, with_threads};

/// Ingests the repository history into the store
pub fn cmd_ingest(
    store: &Store,
    repo: PathBuf,
    name: Option<String>,
    threads: Option<usize>,
    config: MinerConfig,
) -> Result<()> {
    let config = with_threads(config, threads);
    let project = open_project(store, &repo, name.as_deref())?;

    log::info!("Starting ingestion of {} at {:?}", project.name, project.root);
    log::info!("Using {} worker threads", config.worker_count());

    let stats = Ingestor::new(store.path(), config)
        .ingest(&project)
        .with_context(|| format!("Failed to ingest {:?}", repo))?;

    println!("{} {}", "📦 Project:".bright_cyan(), project.name.bold());
    println!("{}", "━".repeat(60).bright_black());
    println!("  {}  {}", "Commits listed:".bright_yellow(), format_number(stats.total).bold());
    println!("  {}     {}", "Ingested now:".bright_yellow(), format_number(stats.processed).bold());
    println!("  {}   {}", "Already stored:".bright_yellow(), format_number(stats.skipped_existing));
    println!("  {}   {}", "Merges skipped:".bright_yellow(), format_number(stats.skipped_merges));
    println!("  {}     {}", "Branch links:".bright_yellow(), format_number(stats.branch_links));
    println!("  {}          {}", "Elapsed:".bright_yellow(), format_duration(stats.elapsed));

    let newest = store.commits(project.id)?.into_iter().map(|c| c.date).max();
    if let Some(date) = newest {
        println!("  {}    {}", "Newest commit:".bright_yellow(), format_unix_timestamp(date));
    }

    if stats.errors > 0 {
        println!(
            "\n{} {} commits failed; run again to retry them",
            "⚠️".yellow(),
            format_number(stats.errors).bold()
        );
    }
    Ok(())
}
