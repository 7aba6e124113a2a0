//! Owned command implementation

use anyhow::{Context, Result};
use colored::Colorize;
use miner_db::Store;
use miner_index::{Attributor, MinerConfig};
use std::path::PathBuf;

use crate::helpers::open_project;

/// Prints the 1-based line numbers `email` owns in `path`
pub fn cmd_owned(
    store: &Store,
    repo: PathBuf,
    name: Option<String>,
    path: &str,
    email: &str,
    config: MinerConfig,
) -> Result<()> {
    let project = open_project(store, &repo, name.as_deref())?;

    let lines = Attributor::new(store.path(), config)
        .owned_lines(&project, path, email)
        .with_context(|| format!("Failed to read ownership of {}", path))?;

    match lines {
        Some(lines) => {
            println!("{} {} in {}", "📝".bright_cyan(), email.bold(), path.bold());
            println!("{}", "━".repeat(60).bright_black());
            for range in line_ranges(&lines) {
                println!("  {}", range);
            }
            println!("\n  {} {}", "Total:".bright_yellow(), lines.len().to_string().bold());
        }
        None => {
            eprintln!(
                "{} No snapshot ownership for {} in {}; run {} first",
                "❌".red(),
                email.bold(),
                path.bold(),
                "attribute".bright_cyan()
            );
            std::process::exit(1);
        }
    }
    Ok(())
}

/// Collapses sorted 0-based indices into 1-based "a-b" ranges
fn line_ranges(lines: &[u32]) -> Vec<String> {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for &line in lines {
        match ranges.last_mut() {
            Some(last) if last.1 + 1 == line => last.1 = line,
            _ => ranges.push((line, line)),
        }
    }
    ranges
        .into_iter()
        .map(|(start, end)| {
            if start == end {
                format!("{}", start + 1)
            } else {
                format!("{}-{}", start + 1, end + 1)
            }
        })
        .collect()
}
