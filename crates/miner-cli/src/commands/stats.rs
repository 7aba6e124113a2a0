//! Stats command implementation

use anyhow::Result;
use colored::Colorize;
use miner_db::Store;
use miner_index::formatting::{format_bytes, format_number};
use tabled::settings::Style;
use tabled::Table;

use crate::output::CountRow;

/// Displays database statistics
pub fn cmd_stats(store: &Store) -> Result<()> {
    let counts = store.table_counts()?;

    println!("{}", "Database Statistics:".bright_cyan().bold());
    println!("  {}: {}", "Path".bright_yellow(), store.path().display());
    if let Ok(meta) = std::fs::metadata(store.path()) {
        println!("  {}: {}", "Size".bright_yellow(), format_bytes(meta.len()).bold());
    }

    let rows = vec![
        CountRow { table: "projects", rows: format_number(counts.projects) },
        CountRow { table: "authors", rows: format_number(counts.authors) },
        CountRow { table: "commits", rows: format_number(counts.commits) },
        CountRow { table: "commit messages", rows: format_number(counts.commit_messages) },
        CountRow { table: "file paths", rows: format_number(counts.file_paths) },
        CountRow { table: "files", rows: format_number(counts.files) },
        CountRow { table: "blame files", rows: format_number(counts.blame_files) },
        CountRow { table: "blames", rows: format_number(counts.blames) },
        CountRow { table: "branches", rows: format_number(counts.branches) },
        CountRow { table: "branch commits", rows: format_number(counts.branch_commits) },
    ];

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
    Ok(())
}
