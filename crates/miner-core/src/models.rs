//! Core data models for the miner

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// One tracked repository instance, as registered in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub root: PathBuf,
}

/// A commit as seen by the backend adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Full hex object id
    pub hash: String,

    /// Parent hashes, first parent first
    pub parents: Vec<String>,

    pub author_name: String,
    pub author_email: String,

    /// Committer time (Unix epoch seconds)
    pub time: i64,

    /// First line of the message
    pub summary: String,

    /// Full message
    pub message: String,
}

impl CommitInfo {
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(8)]
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }
}

/// How a path changed between two revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    Other,
}

/// Classification of a single edit span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Insert,
    Delete,
    Replace,
    Empty,
}

/// One edit span of a file diff.
///
/// `[begin_a, end_a)` is the affected range in the old file and
/// `[begin_b, end_b)` the range in the new file, both 0-based line indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub begin_a: u32,
    pub end_a: u32,
    pub begin_b: u32,
    pub end_b: u32,
}

impl Edit {
    pub fn new(begin_a: u32, end_a: u32, begin_b: u32, end_b: u32) -> Self {
        Self { begin_a, end_a, begin_b, end_b }
    }

    pub fn length_a(&self) -> u32 {
        self.end_a - self.begin_a
    }

    pub fn length_b(&self) -> u32 {
        self.end_b - self.begin_b
    }

    pub fn kind(&self) -> EditKind {
        match (self.length_a(), self.length_b()) {
            (0, 0) => EditKind::Empty,
            (0, _) => EditKind::Insert,
            (_, 0) => EditKind::Delete,
            _ => EditKind::Replace,
        }
    }
}

/// Changes to one path in a diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Path on the new side (the old path for deletions)
    pub path: String,

    /// Path on the old side when it differs (renames, copies)
    pub old_path: Option<String>,

    pub kind: ChangeKind,

    pub edits: Vec<Edit>,

    /// Size of the rendered patch text for this path
    pub patch_bytes: u64,
}

impl FileChange {
    /// True when this change touches `path` on either side
    pub fn touches(&self, path: &str) -> bool {
        self.path == path || self.old_path.as_deref() == Some(path)
    }
}

/// Aggregated line and file change counts.
///
/// Pure inserts count as added lines, pure deletions as deleted lines and
/// replacements count both of their sides as modified lines. `changes` is
/// the total of all three. A renamed path counts as modified, a copy as added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStats {
    pub files_added: u64,
    pub files_deleted: u64,
    pub files_modified: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub lines_modified: u64,
    pub changes: u64,
    pub changes_size: u64,
}

impl ChangeStats {
    /// Computes the stats contributed by a single file change
    pub fn from_change(change: &FileChange) -> Self {
        let mut stats = ChangeStats::default();
        match change.kind {
            ChangeKind::Added => stats.files_added = 1,
            ChangeKind::Deleted => stats.files_deleted = 1,
            ChangeKind::Modified | ChangeKind::Renamed => stats.files_modified = 1,
            ChangeKind::Copied => stats.files_added = 1,
            ChangeKind::Other => {}
        }

        for edit in &change.edits {
            let (a, b) = (u64::from(edit.length_a()), u64::from(edit.length_b()));
            match edit.kind() {
                EditKind::Insert => stats.lines_added += b,
                EditKind::Delete => stats.lines_deleted += a,
                EditKind::Replace => stats.lines_modified += a + b,
                EditKind::Empty => {}
            }
            stats.changes += a + b;
        }

        stats.changes_size = change.patch_bytes;
        stats
    }

    pub fn add(&mut self, other: &ChangeStats) {
        self.files_added += other.files_added;
        self.files_deleted += other.files_deleted;
        self.files_modified += other.files_modified;
        self.lines_added += other.lines_added;
        self.lines_deleted += other.lines_deleted;
        self.lines_modified += other.lines_modified;
        self.changes += other.changes;
        self.changes_size += other.changes_size;
    }

    pub fn files_touched(&self) -> u64 {
        self.files_added + self.files_deleted + self.files_modified
    }
}

impl<'a> std::iter::Sum<&'a ChangeStats> for ChangeStats {
    fn sum<I: Iterator<Item = &'a ChangeStats>>(iter: I) -> Self {
        iter.fold(ChangeStats::default(), |mut acc, s| {
            acc.add(s);
            acc
        })
    }
}

/// A commit row read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub hash: String,
    pub author_id: i64,
    pub author_name: String,
    pub author_email: String,

    /// Committer time (Unix epoch seconds)
    pub date: i64,

    /// Total blob bytes of the commit tree
    pub project_size: u64,

    pub stability: f64,
    pub stats: ChangeStats,
}

/// Blame attribution of one line at a revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameLine {
    pub author_email: String,
    pub author_name: String,
    pub commit_hash: String,

    /// Byte length of the line content, without its terminator
    pub byte_len: u64,
}

/// Per-developer rollup produced by attribution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeveloperInfo {
    pub name: String,
    pub email: String,

    /// Hashes of the commits folded into `stats`
    pub commits: BTreeSet<String>,

    pub stats: ChangeStats,

    /// Lines currently attributed to this developer by blame
    pub lines_owned: u64,

    /// Bytes of those lines
    pub bytes_owned: u64,

    /// Files where this developer holds the largest line share
    pub owned_files: Vec<String>,
}

impl DeveloperInfo {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    /// Adds a commit's stats unless it was already folded.
    /// Returns whether the commit was new.
    pub fn fold_commit(&mut self, commit: &CommitRecord) -> bool {
        if !self.commits.insert(commit.hash.clone()) {
            return false;
        }
        self.stats.add(&commit.stats);
        true
    }

    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }
}

impl fmt::Display for DeveloperInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}>: {} commits, +{} -{} ~{}, owns {} lines",
            self.name,
            self.email,
            self.commit_count(),
            self.stats.lines_added,
            self.stats.lines_deleted,
            self.stats.lines_modified,
            self.lines_owned
        )
    }
}

/// Ownership summary of one file in a blame snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOwnership {
    pub path: String,

    /// Author with the largest line share, if the file has any lines
    pub owner_email: Option<String>,

    pub owner_lines: u64,
    pub total_lines: u64,
    pub total_bytes: u64,
}
