//! Tests for core data models

use miner_core::{ChangeKind, ChangeStats, CommitRecord, DeveloperInfo, Edit, EditKind, FileChange};

// ── fixtures ─────────────────────────────────────────────────────────────────

fn change(kind: ChangeKind, edits: Vec<Edit>) -> FileChange {
    FileChange {
        path: "src/lib.rs".to_string(),
        old_path: None,
        kind,
        edits,
        patch_bytes: 120,
    }
}

fn record(hash: &str, lines_added: u64) -> CommitRecord {
    CommitRecord {
        hash: hash.to_string(),
        author_id: 1,
        author_name: "Ada".to_string(),
        author_email: "ada@example.com".to_string(),
        date: 1_700_000_000,
        project_size: 2048,
        stability: 1.0,
        stats: ChangeStats {
            lines_added,
            files_modified: 1,
            changes: lines_added,
            ..Default::default()
        },
    }
}

// ── edits ────────────────────────────────────────────────────────────────────

#[test]
fn test_edit_kinds() {
    assert_eq!(Edit::new(3, 3, 3, 5).kind(), EditKind::Insert);
    assert_eq!(Edit::new(3, 6, 3, 3).kind(), EditKind::Delete);
    assert_eq!(Edit::new(3, 4, 3, 4).kind(), EditKind::Replace);
    assert_eq!(Edit::new(3, 3, 3, 3).kind(), EditKind::Empty);
}

// ── change stats ─────────────────────────────────────────────────────────────

#[test]
fn test_stats_from_added_file() {
    let stats = ChangeStats::from_change(&change(ChangeKind::Added, vec![Edit::new(0, 0, 0, 10)]));
    assert_eq!(stats.files_added, 1);
    assert_eq!(stats.lines_added, 10);
    assert_eq!(stats.changes, 10);
    assert_eq!(stats.changes_size, 120);
}

#[test]
fn test_stats_from_modification_counts_replace_both_sides() {
    let edits = vec![
        Edit::new(0, 2, 0, 0), // delete 2
        Edit::new(5, 6, 3, 5), // replace 1 -> 2
        Edit::new(9, 9, 8, 9), // insert 1
    ];
    let stats = ChangeStats::from_change(&change(ChangeKind::Modified, edits));
    assert_eq!(stats.files_modified, 1);
    assert_eq!(stats.lines_deleted, 2);
    assert_eq!(stats.lines_modified, 3);
    assert_eq!(stats.lines_added, 1);
    assert_eq!(stats.changes, 6);
}

#[test]
fn test_renames_count_as_modified_and_copies_as_added() {
    let renamed = ChangeStats::from_change(&change(ChangeKind::Renamed, vec![]));
    assert_eq!(renamed.files_modified, 1);
    assert_eq!(renamed.files_touched(), 1);

    let copied = ChangeStats::from_change(&change(ChangeKind::Copied, vec![Edit::new(0, 0, 0, 2)]));
    assert_eq!(copied.files_added, 1);
    assert_eq!(copied.files_modified, 0);
    assert_eq!(copied.lines_added, 2);

    let other = ChangeStats::from_change(&change(ChangeKind::Other, vec![]));
    assert_eq!(other.files_touched(), 0);
}

#[test]
fn test_stats_sum() {
    let a = ChangeStats { lines_added: 3, changes_size: 10, ..Default::default() };
    let b = ChangeStats { lines_deleted: 2, changes_size: 5, ..Default::default() };
    let total: ChangeStats = [a, b].iter().sum();
    assert_eq!(total.lines_added, 3);
    assert_eq!(total.lines_deleted, 2);
    assert_eq!(total.changes_size, 15);
}

// ── developer fold ───────────────────────────────────────────────────────────

#[test]
fn test_fold_skips_already_folded_commit() {
    let mut dev = DeveloperInfo::new("Ada", "ada@example.com");
    assert!(dev.fold_commit(&record("c1", 4)));
    assert!(dev.fold_commit(&record("c2", 6)));
    assert!(!dev.fold_commit(&record("c1", 4)));

    assert_eq!(dev.commit_count(), 2);
    assert_eq!(dev.stats.lines_added, 10);
    assert_eq!(dev.stats.files_modified, 2);
}

#[test]
fn test_display_mentions_email_and_ownership() {
    let mut dev = DeveloperInfo::new("Ada", "ada@example.com");
    dev.lines_owned = 42;
    let s = dev.to_string();
    assert!(s.contains("ada@example.com"));
    assert!(s.contains("42"));
}
