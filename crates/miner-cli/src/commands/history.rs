//! History command implementation

use anyhow::{Context, Result};
use colored::Colorize;
use miner_db::Store;
use miner_index::formatting::{format_bytes, format_number, format_unix_timestamp};
use std::path::PathBuf;
use tabled::settings::object::Rows;
use tabled::settings::{Color, Modify, Style};
use tabled::Table;

use crate::helpers::{open_project, short_hash};
use crate::output::HistoryRow;

/// Prints project size and stability per ingested commit, oldest first
pub fn cmd_history(store: &Store, repo: PathBuf, name: Option<String>, scope: Option<String>) -> Result<()> {
    let project = open_project(store, &repo, name.as_deref())?;
    let history = store
        .commit_size_history(project.id, scope.as_deref())
        .with_context(|| format!("Failed to read history of {}", project.name))?;

    if history.is_empty() {
        println!(
            "{} No ingested commits for {}; run {} first",
            "ℹ️".bright_blue(),
            project.name.bold(),
            "ingest".bright_cyan()
        );
        return Ok(());
    }

    println!(
        "\n{} {} ({} commits)",
        "📈".bright_cyan(),
        project.name.bold().bright_white(),
        format_number(history.len() as u64)
    );

    let rows: Vec<HistoryRow> = history
        .iter()
        .map(|c| HistoryRow {
            date: format_unix_timestamp(c.date),
            commit: short_hash(&c.hash).to_string(),
            author: c.author_email.clone(),
            size: format_bytes(c.project_size),
            stability: format!("{:.2}", c.stability),
            lines: format!("+{} -{} ~{}", c.stats.lines_added, c.stats.lines_deleted, c.stats.lines_modified),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Color::FG_BRIGHT_CYAN));
    println!("{}", table);
    Ok(())
}
