//! Attribute command implementation

use anyhow::{Context, Result};
use colored::Colorize;
use miner_db::Store;
use miner_index::formatting::{format_bytes, format_number};
use miner_index::{Attribution, Attributor, MinerConfig};
use std::path::PathBuf;
use tabled::settings::object::Rows;
use tabled::settings::{Color, Modify, Style};
use tabled::Table;

use crate::helpers::{format_percent, open_project, short_hash, with_threads};
use crate::output::{DeveloperRow, FileRow};

/// Attributes the repository to its developers and prints the result
#[allow(clippy::too_many_arguments)]
pub fn cmd_attribute(
    store: &Store,
    repo: PathBuf,
    name: Option<String>,
    scope: Option<String>,
    threads: Option<usize>,
    limit: usize,
    json: bool,
    config: MinerConfig,
) -> Result<()> {
    let config = with_threads(config, threads);
    let project = open_project(store, &repo, name.as_deref())?;

    let attribution = Attributor::new(store.path(), config)
        .attribute(&project, scope.as_deref())
        .with_context(|| format!("Failed to attribute {:?}", repo))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&attribution)?);
        return Ok(());
    }

    print_developers(&project.name, &attribution);
    print_files(&attribution, limit);

    if attribution.stats.commits_missing > 0 {
        println!(
            "\n{} {} commits in scope are not ingested; run {} first",
            "💡".yellow(),
            format_number(attribution.stats.commits_missing).bold(),
            "ingest".bright_cyan()
        );
    }
    Ok(())
}

fn print_developers(project: &str, attribution: &Attribution) {
    let total_lines = attribution.total_lines_owned();

    println!(
        "\n{} {} at {}",
        "👥".bright_cyan(),
        project.bold().bright_white(),
        short_hash(&attribution.head).bright_black()
    );
    println!("{}", "━".repeat(60).bright_black());

    if attribution.developers.is_empty() {
        println!("{} No developers found", "❌".red());
        return;
    }

    let mut developers: Vec<_> = attribution.developers.values().collect();
    developers.sort_by(|a, b| {
        b.lines_owned
            .cmp(&a.lines_owned)
            .then_with(|| b.commit_count().cmp(&a.commit_count()))
            .then_with(|| a.email.cmp(&b.email))
    });

    let rows: Vec<DeveloperRow> = developers
        .iter()
        .map(|dev| DeveloperRow {
            developer: format!("{} <{}>", dev.name, dev.email),
            commits: format_number(dev.commit_count() as u64),
            added: format_number(dev.stats.lines_added),
            deleted: format_number(dev.stats.lines_deleted),
            modified: format_number(dev.stats.lines_modified),
            lines_owned: format_number(dev.lines_owned),
            share: format_percent(dev.lines_owned, total_lines),
            files_owned: dev.owned_files.len(),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Color::FG_BRIGHT_CYAN));
    println!("{}", table);
}

fn print_files(attribution: &Attribution, limit: usize) {
    if attribution.files.is_empty() {
        return;
    }

    let mut files: Vec<_> = attribution.files.iter().collect();
    files.sort_by(|a, b| b.total_lines.cmp(&a.total_lines).then_with(|| a.path.cmp(&b.path)));
    let shown = limit.min(files.len());

    println!("\n{} {}", "📄".bright_cyan(), "Largest files".bold());

    let rows: Vec<FileRow> = files
        .iter()
        .take(shown)
        .map(|file| FileRow {
            path: file.path.clone(),
            owner: file.owner_email.clone().unwrap_or_else(|| "-".to_string()),
            owner_lines: format_percent(file.owner_lines, file.total_lines),
            total_lines: format_number(file.total_lines),
            size: format_bytes(file.total_bytes),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Color::FG_BRIGHT_CYAN));
    println!("{}", table);

    if shown < files.len() {
        println!(
            "\n  {} and {} more files (use {} to see more)",
            "...".dimmed(),
            format_number((files.len() - shown) as u64).bold(),
            "-l".bright_cyan()
        );
    }
}
