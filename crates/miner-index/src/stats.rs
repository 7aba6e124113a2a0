//! Run statistics

use std::fmt;
use std::time::Duration;

use crate::formatting::{format_duration, format_number};

/// Outcome of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Commits listed across all refs
    pub total: u64,

    /// Already persisted before this run
    pub skipped_existing: u64,

    /// Merge commits, never ingested
    pub skipped_merges: u64,

    /// Commits written by this run
    pub processed: u64,

    /// Commits another writer persisted first
    pub raced: u64,

    /// Units that failed and were skipped
    pub errors: u64,

    /// Units not started because the run was cancelled
    pub cancelled: u64,

    /// New branch membership links
    pub branch_links: u64,

    pub elapsed: Duration,
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Commits: {} listed, {} ingested, {} already stored, {} merges skipped, {} errors | Branch links: {} | Time: {}",
            format_number(self.total),
            format_number(self.processed),
            format_number(self.skipped_existing + self.raced),
            format_number(self.skipped_merges),
            self.errors,
            format_number(self.branch_links),
            format_duration(self.elapsed)
        )
    }
}

/// Outcome of one attribution run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributionStats {
    /// Commits folded into developer totals
    pub commits_folded: u64,

    /// Commits in scope that had not been ingested
    pub commits_missing: u64,

    /// Merge commits in scope, never folded
    pub merges_skipped: u64,

    /// Blobs at HEAD in scope
    pub files_total: u64,

    /// Files whose HEAD snapshot already existed
    pub files_cached: u64,

    /// Files blamed by this run
    pub files_blamed: u64,

    /// Files left out because their path is not valid UTF-8
    pub files_unreadable: u64,

    pub errors: u64,

    pub elapsed: Duration,
}

impl fmt::Display for AttributionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Commits: {} folded ({} not ingested, {} merges skipped) | Files: {} at HEAD, {} blamed, {} cached, {} unreadable, {} errors | Time: {}",
            format_number(self.commits_folded),
            format_number(self.commits_missing),
            format_number(self.merges_skipped),
            format_number(self.files_total),
            format_number(self.files_blamed),
            format_number(self.files_cached),
            format_number(self.files_unreadable),
            self.errors,
            format_duration(self.elapsed)
        )
    }
}
