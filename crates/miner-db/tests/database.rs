//! Tests for the SQLite store

use anyhow::Result;
use miner_core::ChangeStats;
use miner_db::{DbError, NewBlame, NewCommit, RetryPolicy, Store, StoreOptions};
use std::thread;
use tempfile::TempDir;

// ── fixtures ─────────────────────────────────────────────────────────────────

const C1: &str = "1111111111111111111111111111111111111111";
const C2: &str = "2222222222222222222222222222222222222222";

fn open(tmp: &TempDir) -> Result<Store> {
    Ok(Store::open(tmp.path().join("miner.db"), StoreOptions::default())?)
}

fn stats(lines_added: u64) -> ChangeStats {
    ChangeStats {
        files_added: 1,
        lines_added,
        changes: lines_added,
        changes_size: 64,
        ..Default::default()
    }
}

fn commit<'a>(hash: &'a str, author_id: i64, stats: &'a ChangeStats, paths: &'a [i64]) -> NewCommit<'a> {
    NewCommit {
        hash,
        author_id,
        date: 1_700_000_000,
        project_size: 512,
        stability: 0.75,
        stats,
        summary: "Add parser",
        message: "Add parser\n\nWith tests.",
        file_path_ids: paths,
    }
}

// ── open ─────────────────────────────────────────────────────────────────────

#[test]
fn test_open_creates_empty_store() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = open(&tmp)?;
    let counts = store.table_counts()?;
    assert_eq!(counts.commits, 0);
    assert_eq!(counts.projects, 0);
    Ok(())
}

#[test]
fn test_reopen_keeps_data() -> Result<()> {
    let tmp = TempDir::new()?;
    let project = open(&tmp)?.ensure_project("demo", "/src/demo")?;

    let store = open(&tmp)?;
    assert_eq!(store.project_id("demo", "/src/demo")?, Some(project));
    Ok(())
}

// ── interning ────────────────────────────────────────────────────────────────

#[test]
fn test_insert_or_ignore_returns_surviving_ids() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = open(&tmp)?;
    let project = store.ensure_project("demo", "/src/demo")?;
    assert_eq!(store.ensure_project("demo", "/src/demo")?, project);

    let ada = store.insert_author(project, "Ada", "ada@example.com")?;
    assert_eq!(store.insert_author(project, "Ada L.", "ada@example.com")?, ada);
    assert_eq!(store.author_id(project, "ada@example.com")?, Some(ada));
    assert_eq!(store.author_id(project, "bob@example.com")?, None);

    let path = store.insert_file_path(project, "src/lib.rs")?;
    assert_eq!(store.insert_file_path(project, "src/lib.rs")?, path);
    assert_eq!(store.file_paths(project)?.get("src/lib.rs"), Some(&path));

    assert_eq!(store.table_counts()?.authors, 1);
    assert_eq!(store.table_counts()?.file_paths, 1);
    Ok(())
}

#[test]
fn test_same_email_in_two_projects_gets_two_ids() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = open(&tmp)?;
    let a = store.ensure_project("a", "/a")?;
    let b = store.ensure_project("b", "/b")?;

    let in_a = store.insert_author(a, "Ada", "ada@example.com")?;
    let in_b = store.insert_author(b, "Ada", "ada@example.com")?;
    assert_ne!(in_a, in_b);
    Ok(())
}

// ── commits ──────────────────────────────────────────────────────────────────

#[test]
fn test_record_commit_is_idempotent() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = open(&tmp)?;
    let project = store.ensure_project("demo", "/src/demo")?;
    let ada = store.insert_author(project, "Ada", "ada@example.com")?;
    let path = store.insert_file_path(project, "src/lib.rs")?;
    let stats = stats(10);

    assert!(store.record_commit(project, &commit(C1, ada, &stats, &[path]))?);
    assert!(!store.record_commit(project, &commit(C1, ada, &stats, &[path]))?);

    let counts = store.table_counts()?;
    assert_eq!(counts.commits, 1);
    assert_eq!(counts.commit_messages, 1);
    assert_eq!(counts.files, 1);
    assert!(store.commit_exists(project, C1)?);
    assert!(!store.commit_exists(project, C2)?);
    Ok(())
}

#[test]
fn test_get_commit_reads_back_stats() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = open(&tmp)?;
    let project = store.ensure_project("demo", "/src/demo")?;
    let ada = store.insert_author(project, "Ada", "ada@example.com")?;
    let path = store.insert_file_path(project, "src/lib.rs")?;
    let stats = stats(10);
    store.record_commit(project, &commit(C1, ada, &stats, &[path]))?;

    let record = store.get_commit(project, C1)?.expect("commit stored");
    assert_eq!(record.author_email, "ada@example.com");
    assert_eq!(record.project_size, 512);
    assert_eq!(record.stats, stats);
    assert!((record.stability - 0.75).abs() < f64::EPSILON);

    let (summary, message) = store.commit_message(project, C1)?.expect("message stored");
    assert_eq!(summary, "Add parser");
    assert!(message.ends_with("With tests."));

    assert_eq!(store.commit_files(project, C1)?, vec!["src/lib.rs".to_string()]);
    assert_eq!(store.get_commit(project, C2)?, None);
    Ok(())
}

#[test]
fn test_commit_with_unknown_author_is_rejected() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = open(&tmp)?;
    let project = store.ensure_project("demo", "/src/demo")?;
    let stats = stats(1);

    let result = store.record_commit(project, &commit(C1, 9999, &stats, &[]));
    assert!(matches!(result, Err(DbError::Sqlite { .. })));
    assert_eq!(store.table_counts()?.commits, 0);
    Ok(())
}

#[test]
fn test_commit_size_history() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = open(&tmp)?;
    let project = store.ensure_project("demo", "/src/demo")?;
    let ada = store.insert_author(project, "Ada", "ada@example.com")?;
    let bob = store.insert_author(project, "Bob", "bob@example.com")?;
    let lib = store.insert_file_path(project, "src/lib.rs")?;
    let readme = store.insert_file_path(project, "README.md")?;
    let stats = stats(3);

    // C2 is older but recorded second
    let newer_files = [lib, readme];
    let older_files = [readme];
    let newer = NewCommit { project_size: 900, stability: 1.0, ..commit(C1, ada, &stats, &newer_files) };
    let older = NewCommit { date: 1_600_000_000, ..commit(C2, bob, &stats, &older_files) };
    store.record_commit(project, &newer)?;
    store.record_commit(project, &older)?;

    let all = store.commit_size_history(project, None)?;
    let rows: Vec<(&str, &str, u64)> =
        all.iter().map(|c| (c.hash.as_str(), c.author_email.as_str(), c.project_size)).collect();
    assert_eq!(rows, vec![(C2, "bob@example.com", 512), (C1, "ada@example.com", 900)]);
    assert_eq!(all[0].date, 1_600_000_000);
    assert_eq!(all[1].stability, 1.0);
    assert_eq!(all[1].stats, stats);

    let src = store.commit_size_history(project, Some("src/"))?;
    assert_eq!(src.len(), 1);
    assert_eq!(src[0].hash, C1);
    assert_eq!(store.commit_size_history(project, Some(""))?.len(), 2);
    assert!(store.commit_size_history(project, Some("docs/"))?.is_empty());

    assert_eq!(store.file_commit_span(project, "README.md")?, Some((C2.to_string(), C1.to_string())));
    assert_eq!(store.file_commit_span(project, "src/lib.rs")?, Some((C1.to_string(), C1.to_string())));
    assert_eq!(store.file_commit_span(project, "missing.rs")?, None);
    Ok(())
}

// ── branches ─────────────────────────────────────────────────────────────────

#[test]
fn test_branch_membership() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = open(&tmp)?;
    let project = store.ensure_project("demo", "/src/demo")?;
    let ada = store.insert_author(project, "Ada", "ada@example.com")?;
    let stats = stats(1);
    store.record_commit(project, &commit(C1, ada, &stats, &[]))?;
    store.record_commit(project, &commit(C2, ada, &stats, &[]))?;

    let main = store.ensure_branch(project, "main")?;
    assert_eq!(store.branch_id(project, "main")?, Some(main));

    let hashes = vec![C1.to_string(), C2.to_string()];
    assert_eq!(store.record_branch_commits(project, main, &hashes)?, 2);
    assert_eq!(store.record_branch_commits(project, main, &hashes)?, 0);
    assert_eq!(store.branch_commits(project, main)?, hashes);
    Ok(())
}

// ── blame ────────────────────────────────────────────────────────────────────

#[test]
fn test_blame_snapshot_written_once() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = open(&tmp)?;
    let project = store.ensure_project("demo", "/src/demo")?;
    let ada = store.insert_author(project, "Ada", "ada@example.com")?;
    let bob = store.insert_author(project, "Bob", "bob@example.com")?;
    let path = store.insert_file_path(project, "src/lib.rs")?;

    let blames = vec![
        NewBlame { author_id: ada, lines: vec![0, 1, 2], byte_size: 30 },
        NewBlame { author_id: bob, lines: vec![3], byte_size: 4 },
    ];

    let id = store.record_blame(project, path, C2, &blames)?;
    assert!(id.is_some());
    assert_eq!(store.blame_file_id(project, path, C2)?, id);
    assert_eq!(store.record_blame(project, path, C2, &blames)?, None);

    let counts = store.table_counts()?;
    assert_eq!(counts.blame_files, 1);
    assert_eq!(counts.blames, 2);

    assert_eq!(store.blame_lines(project, path, C2, ada)?, Some(vec![0, 1, 2]));
    assert_eq!(store.blame_lines(project, path, C1, ada)?, None);
    Ok(())
}

#[test]
fn test_blame_rollup_filters_by_revision_and_prefix() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = open(&tmp)?;
    let project = store.ensure_project("demo", "/src/demo")?;
    let ada = store.insert_author(project, "Ada", "ada@example.com")?;
    let lib = store.insert_file_path(project, "src/lib.rs")?;
    let readme = store.insert_file_path(project, "README.md")?;
    let empty = store.insert_file_path(project, "src/empty.rs")?;

    let owned = |n: u32| NewBlame { author_id: ada, lines: (0..n).collect(), byte_size: u64::from(n) * 10 };
    store.record_blame(project, lib, C2, &[owned(5)])?;
    store.record_blame(project, readme, C2, &[owned(2)])?;
    store.record_blame(project, empty, C2, &[])?;
    store.record_blame(project, lib, C1, &[owned(3)])?;

    let all = store.blame_rollup(project, C2, None)?;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].path, "README.md");

    let src = store.blame_rollup(project, C2, Some("src/"))?;
    assert_eq!(src.len(), 2);
    let empty_row = src.iter().find(|s| s.path == "src/empty.rs").expect("empty file row");
    assert_eq!(empty_row.author_id, None);
    assert_eq!(empty_row.line_count, 0);

    let lib_row = src.iter().find(|s| s.path == "src/lib.rs").expect("lib row");
    assert_eq!(lib_row.author_email.as_deref(), Some("ada@example.com"));
    assert_eq!(lib_row.line_count, 5);
    assert_eq!(lib_row.line_size, 50);
    Ok(())
}

// ── concurrency ──────────────────────────────────────────────────────────────

#[test]
fn test_concurrent_handles_converge() -> Result<()> {
    let tmp = TempDir::new()?;
    let db_path = tmp.path().join("miner.db");
    let project = Store::open(&db_path, StoreOptions::default())?.ensure_project("demo", "/src/demo")?;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let db_path = db_path.clone();
            thread::spawn(move || -> Result<()> {
                let store = Store::open(&db_path, StoreOptions::default())?;
                for i in 0..20 {
                    let email = format!("dev{}@example.com", i % 5);
                    let author = store.insert_author(project, "Dev", &email)?;
                    let hash = format!("{:040x}", i);
                    let stats = stats(1);
                    store.record_commit(project, &commit(&hash, author, &stats, &[]))?;
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread panicked")?;
    }

    let counts = open(&tmp)?.table_counts()?;
    assert_eq!(counts.authors, 5);
    assert_eq!(counts.commits, 20);
    Ok(())
}

#[test]
fn test_held_write_lock_surfaces_as_contention() -> Result<()> {
    let tmp = TempDir::new()?;
    let options = StoreOptions {
        retry: RetryPolicy { max_attempts: 3, backoff_ms: 1 },
        busy_timeout_ms: 0,
        ..Default::default()
    };
    let store = Store::open(tmp.path().join("miner.db"), options)?;

    let blocker = rusqlite::Connection::open(tmp.path().join("miner.db"))?;
    blocker.execute_batch("BEGIN IMMEDIATE")?;

    let result = store.ensure_project("demo", "/src/demo");
    assert!(matches!(result, Err(DbError::Contention { attempts: 3, .. })));

    blocker.execute_batch("ROLLBACK")?;
    assert!(store.ensure_project("demo", "/src/demo").is_ok());
    Ok(())
}
