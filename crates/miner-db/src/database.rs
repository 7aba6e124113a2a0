//! Database operations and management

use crate::error::{DbError, DbResult};
use crate::lines;
use crate::retry::{with_retry, RetryPolicy};
use crate::schema::SCHEMA;
use miner_core::{ChangeStats, CommitRecord};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection-level settings shared by every handle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub retry: RetryPolicy,

    /// SQLite's own lock wait before a busy error reaches the retry loop
    pub busy_timeout_ms: u64,

    /// Line sets larger than this are zstd-compressed
    pub compress_threshold: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            busy_timeout_ms: 250,
            compress_threshold: 64,
        }
    }
}

/// A commit ready to be written, with its message and touched paths
#[derive(Debug, Clone)]
pub struct NewCommit<'a> {
    pub hash: &'a str,
    pub author_id: i64,
    pub date: i64,
    pub project_size: u64,
    pub stability: f64,
    pub stats: &'a ChangeStats,
    pub summary: &'a str,
    pub message: &'a str,
    pub file_path_ids: &'a [i64],
}

/// One author's share of a file in a blame snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlame {
    pub author_id: i64,

    /// 0-based indices of the owned lines
    pub lines: Vec<u32>,

    /// Total bytes of the owned lines
    pub byte_size: u64,
}

/// Row of the ownership rollup: one (file, author) pair of a snapshot.
///
/// Snapshots of empty files yield a single row without an author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameShare {
    pub file_path_id: i64,
    pub path: String,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub line_count: u64,
    pub line_size: u64,
}

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub projects: u64,
    pub authors: u64,
    pub commits: u64,
    pub commit_messages: u64,
    pub file_paths: u64,
    pub files: u64,
    pub blame_files: u64,
    pub blames: u64,
    pub branches: u64,
    pub branch_commits: u64,
}

impl fmt::Display for TableCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects={} authors={} commits={} messages={} paths={} files={} blame_files={} blames={} branches={} branch_commits={}",
            self.projects,
            self.authors,
            self.commits,
            self.commit_messages,
            self.file_paths,
            self.files,
            self.blame_files,
            self.blames,
            self.branches,
            self.branch_commits
        )
    }
}

/// One handle to the store.
///
/// Handles are cheap to open and are never shared between concurrent
/// writers: every worker opens its own.
pub struct Store {
    conn: Connection,
    options: StoreOptions,
    path: PathBuf,
}

impl Store {
    /// Opens or creates the store at the specified location
    pub fn open<P: AsRef<Path>>(path: P, options: StoreOptions) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|e| DbError::sqlite("open database", e))?;

        conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))
            .map_err(|e| DbError::sqlite("set busy timeout", e))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| DbError::sqlite("enable foreign keys", e))?;

        let store = Self { conn, options, path };

        store.run("enable WAL", || store.conn.pragma_update(None, "journal_mode", "WAL"))?;
        store.run("create schema", || {
            let tx = store.begin()?;
            tx.execute_batch(SCHEMA)?;
            tx.commit()
        })?;

        log::debug!("Opened store at {:?}", store.path);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn run<T, F>(&self, operation: &str, op: F) -> DbResult<T>
    where
        F: FnMut() -> rusqlite::Result<T>,
    {
        with_retry(&self.options.retry, operation, op)
    }

    /// Starts a write transaction that takes the lock up front
    fn begin(&self) -> rusqlite::Result<Transaction<'_>> {
        Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
    }

    // ── projects ─────────────────────────────────────────────────────────────

    /// Returns the project id, registering the project on first sight
    pub fn ensure_project(&self, name: &str, root: &str) -> DbResult<i64> {
        self.run("insert project", || {
            self.conn.execute(
                "INSERT OR IGNORE INTO projects (name, root) VALUES (?1, ?2)",
                params![name, root],
            )
        })?;
        self.project_id(name, root)?
            .ok_or_else(|| DbError::Codec(format!("project {} vanished after insert", name)))
    }

    pub fn project_id(&self, name: &str, root: &str) -> DbResult<Option<i64>> {
        self.run("select project", || {
            self.conn
                .query_row(
                    "SELECT id FROM projects WHERE name = ?1 AND root = ?2",
                    params![name, root],
                    |row| row.get(0),
                )
                .optional()
        })
    }

    // ── authors ──────────────────────────────────────────────────────────────

    pub fn author_id(&self, project_id: i64, email: &str) -> DbResult<Option<i64>> {
        self.run("select author", || {
            self.conn
                .query_row(
                    "SELECT id FROM authors WHERE project_id = ?1 AND email = ?2",
                    params![project_id, email],
                    |row| row.get(0),
                )
                .optional()
        })
    }

    /// Inserts the author unless present and returns the surviving id.
    ///
    /// A writer that loses the race to another connection reads back the
    /// winner's row.
    pub fn insert_author(&self, project_id: i64, name: &str, email: &str) -> DbResult<i64> {
        self.run("insert author", || {
            self.conn.execute(
                "INSERT OR IGNORE INTO authors (project_id, name, email) VALUES (?1, ?2, ?3)",
                params![project_id, name, email],
            )?;
            self.conn.query_row(
                "SELECT id FROM authors WHERE project_id = ?1 AND email = ?2",
                params![project_id, email],
                |row| row.get(0),
            )
        })
    }

    /// Maps every author email of the project to its id
    pub fn authors(&self, project_id: i64) -> DbResult<HashMap<String, i64>> {
        self.run("select authors", || {
            let mut stmt = self
                .conn
                .prepare_cached("SELECT email, id FROM authors WHERE project_id = ?1")?;
            let rows = stmt.query_map(params![project_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
    }

    // ── file paths ───────────────────────────────────────────────────────────

    pub fn file_path_id(&self, project_id: i64, path: &str) -> DbResult<Option<i64>> {
        self.run("select file path", || {
            self.conn
                .query_row(
                    "SELECT id FROM file_paths WHERE project_id = ?1 AND path = ?2",
                    params![project_id, path],
                    |row| row.get(0),
                )
                .optional()
        })
    }

    /// Inserts the path unless present and returns the surviving id
    pub fn insert_file_path(&self, project_id: i64, path: &str) -> DbResult<i64> {
        self.run("insert file path", || {
            self.conn.execute(
                "INSERT OR IGNORE INTO file_paths (project_id, path) VALUES (?1, ?2)",
                params![project_id, path],
            )?;
            self.conn.query_row(
                "SELECT id FROM file_paths WHERE project_id = ?1 AND path = ?2",
                params![project_id, path],
                |row| row.get(0),
            )
        })
    }

    /// Maps every known path of the project to its id
    pub fn file_paths(&self, project_id: i64) -> DbResult<HashMap<String, i64>> {
        self.run("select file paths", || {
            let mut stmt = self
                .conn
                .prepare_cached("SELECT path, id FROM file_paths WHERE project_id = ?1")?;
            let rows = stmt.query_map(params![project_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
    }

    // ── commits ──────────────────────────────────────────────────────────────

    pub fn commit_exists(&self, project_id: i64, hash: &str) -> DbResult<bool> {
        self.run("check commit", || {
            self.conn
                .query_row(
                    "SELECT 1 FROM commits WHERE project_id = ?1 AND hash = ?2",
                    params![project_id, hash],
                    |_| Ok(()),
                )
                .optional()
                .map(|found| found.is_some())
        })
    }

    /// Hashes of every commit already stored for the project
    pub fn persisted_commits(&self, project_id: i64) -> DbResult<HashSet<String>> {
        self.run("select commit hashes", || {
            let mut stmt = self
                .conn
                .prepare_cached("SELECT hash FROM commits WHERE project_id = ?1")?;
            let rows = stmt.query_map(params![project_id], |row| row.get(0))?;
            rows.collect()
        })
    }

    /// Writes a commit, its message and its file-history rows in one transaction.
    ///
    /// Returns `false` without touching anything else when the commit row was
    /// already present.
    pub fn record_commit(&self, project_id: i64, commit: &NewCommit<'_>) -> DbResult<bool> {
        let stats = commit.stats;
        self.run("record commit", || {
            let tx = self.begin()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO commits (
                    project_id, hash, author_id, date, project_size, stability,
                    files_added, files_deleted, files_modified,
                    lines_added, lines_deleted, lines_modified, changes, changes_size
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    project_id,
                    commit.hash,
                    commit.author_id,
                    commit.date,
                    commit.project_size as i64,
                    commit.stability,
                    stats.files_added as i64,
                    stats.files_deleted as i64,
                    stats.files_modified as i64,
                    stats.lines_added as i64,
                    stats.lines_deleted as i64,
                    stats.lines_modified as i64,
                    stats.changes as i64,
                    stats.changes_size as i64,
                ],
            )?;
            if inserted == 0 {
                return Ok(false);
            }

            tx.execute(
                "INSERT OR IGNORE INTO commit_messages (project_id, hash, summary, message)
                 VALUES (?1, ?2, ?3, ?4)",
                params![project_id, commit.hash, commit.summary, commit.message],
            )?;

            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO files (project_id, file_path_id, commit_hash, date)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for file_path_id in commit.file_path_ids {
                    stmt.execute(params![project_id, file_path_id, commit.hash, commit.date])?;
                }
            }

            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_commit(&self, project_id: i64, hash: &str) -> DbResult<Option<CommitRecord>> {
        self.run("select commit", || {
            self.conn
                .query_row(
                    &format!("{} WHERE c.project_id = ?1 AND c.hash = ?2", COMMIT_SELECT),
                    params![project_id, hash],
                    commit_from_row,
                )
                .optional()
        })
    }

    /// Every stored commit of the project, newest first
    pub fn commits(&self, project_id: i64) -> DbResult<Vec<CommitRecord>> {
        self.run("select commits", || {
            let mut stmt = self.conn.prepare_cached(&format!(
                "{} WHERE c.project_id = ?1 ORDER BY c.date DESC, c.hash",
                COMMIT_SELECT
            ))?;
            let rows = stmt.query_map(params![project_id], commit_from_row)?;
            rows.collect()
        })
    }

    /// Returns `(summary, full message)` of a stored commit
    pub fn commit_message(&self, project_id: i64, hash: &str) -> DbResult<Option<(String, String)>> {
        self.run("select commit message", || {
            self.conn
                .query_row(
                    "SELECT summary, message FROM commit_messages WHERE project_id = ?1 AND hash = ?2",
                    params![project_id, hash],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
        })
    }

    /// Paths recorded as touched by a stored commit, sorted
    pub fn commit_files(&self, project_id: i64, hash: &str) -> DbResult<Vec<String>> {
        self.run("select commit files", || {
            let mut stmt = self.conn.prepare_cached(
                "SELECT fp.path FROM files f
                 JOIN file_paths fp ON fp.id = f.file_path_id
                 WHERE f.project_id = ?1 AND f.commit_hash = ?2
                 ORDER BY fp.path",
            )?;
            let rows = stmt.query_map(params![project_id, hash], |row| row.get(0))?;
            rows.collect()
        })
    }

    /// Size and stability of the project over time, oldest first.
    ///
    /// With a `path_prefix`, only commits that touched a path under it are
    /// returned. `project_size` stays the whole-tree size of each commit.
    pub fn commit_size_history(&self, project_id: i64, path_prefix: Option<&str>) -> DbResult<Vec<CommitRecord>> {
        let prefix = path_prefix.unwrap_or("");
        self.run("select commit size history", || {
            let mut stmt = self.conn.prepare_cached(&format!(
                "{} WHERE c.project_id = ?1
                   AND (?2 = '' OR EXISTS (
                       SELECT 1 FROM files f
                       JOIN file_paths fp ON fp.id = f.file_path_id
                       WHERE f.project_id = c.project_id AND f.commit_hash = c.hash
                         AND substr(fp.path, 1, length(?2)) = ?2))
                 ORDER BY c.date, c.hash",
                COMMIT_SELECT
            ))?;
            let rows = stmt.query_map(params![project_id, prefix], commit_from_row)?;
            rows.collect()
        })
    }

    /// Hashes of the earliest and latest stored commits that touched `path`
    pub fn file_commit_span(&self, project_id: i64, path: &str) -> DbResult<Option<(String, String)>> {
        self.run("select file commit span", || {
            let mut stmt = self.conn.prepare_cached(
                "SELECT c.hash FROM files f
                 JOIN file_paths fp ON fp.id = f.file_path_id
                 JOIN commits c ON c.project_id = f.project_id AND c.hash = f.commit_hash
                 WHERE f.project_id = ?1 AND fp.path = ?2
                 ORDER BY c.date, c.hash",
            )?;
            let hashes = stmt
                .query_map(params![project_id, path], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(hashes.first().cloned().zip(hashes.last().cloned()))
        })
    }

    // ── branches ─────────────────────────────────────────────────────────────

    pub fn branch_id(&self, project_id: i64, name: &str) -> DbResult<Option<i64>> {
        self.run("select branch", || {
            self.conn
                .query_row(
                    "SELECT id FROM branches WHERE project_id = ?1 AND name = ?2",
                    params![project_id, name],
                    |row| row.get(0),
                )
                .optional()
        })
    }

    /// Returns the branch id, registering the branch on first sight
    pub fn ensure_branch(&self, project_id: i64, name: &str) -> DbResult<i64> {
        self.run("insert branch", || {
            self.conn.execute(
                "INSERT OR IGNORE INTO branches (project_id, name) VALUES (?1, ?2)",
                params![project_id, name],
            )?;
            self.conn.query_row(
                "SELECT id FROM branches WHERE project_id = ?1 AND name = ?2",
                params![project_id, name],
                |row| row.get(0),
            )
        })
    }

    /// Records branch membership. Returns how many new links were written.
    pub fn record_branch_commits(
        &self,
        project_id: i64,
        branch_id: i64,
        hashes: &[String],
    ) -> DbResult<usize> {
        self.run("record branch commits", || {
            let tx = self.begin()?;
            let mut written = 0;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO branch_commit_map (project_id, branch_id, commit_hash)
                     VALUES (?1, ?2, ?3)",
                )?;
                for hash in hashes {
                    written += stmt.execute(params![project_id, branch_id, hash])?;
                }
            }
            tx.commit()?;
            Ok(written)
        })
    }

    pub fn branch_commits(&self, project_id: i64, branch_id: i64) -> DbResult<Vec<String>> {
        self.run("select branch commits", || {
            let mut stmt = self.conn.prepare_cached(
                "SELECT commit_hash FROM branch_commit_map
                 WHERE project_id = ?1 AND branch_id = ?2
                 ORDER BY commit_hash",
            )?;
            let rows = stmt.query_map(params![project_id, branch_id], |row| row.get(0))?;
            rows.collect()
        })
    }

    // ── blame ────────────────────────────────────────────────────────────────

    pub fn blame_file_id(
        &self,
        project_id: i64,
        file_path_id: i64,
        revision: &str,
    ) -> DbResult<Option<i64>> {
        self.run("select blame file", || {
            self.conn
                .query_row(
                    "SELECT id FROM blame_files
                     WHERE project_id = ?1 AND file_path_id = ?2 AND revision = ?3",
                    params![project_id, file_path_id, revision],
                    |row| row.get(0),
                )
                .optional()
        })
    }

    /// Writes a blame snapshot: the BlameFile row and one Blame row per author.
    ///
    /// All rows land in one transaction, so an existing snapshot is always
    /// complete. Returns the new snapshot id, or `None` if the snapshot
    /// already existed.
    pub fn record_blame(
        &self,
        project_id: i64,
        file_path_id: i64,
        revision: &str,
        blames: &[NewBlame],
    ) -> DbResult<Option<i64>> {
        let encoded = blames
            .iter()
            .map(|blame| lines::encode(&blame.lines, self.options.compress_threshold))
            .collect::<DbResult<Vec<_>>>()?;
        let total_size: u64 = blames.iter().map(|b| b.byte_size).sum();

        self.run("record blame", || {
            let tx = self.begin()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO blame_files (project_id, file_path_id, revision, line_size)
                 VALUES (?1, ?2, ?3, ?4)",
                params![project_id, file_path_id, revision, total_size as i64],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            let blame_file_id = tx.last_insert_rowid();

            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO blames
                        (project_id, author_id, blame_file_id, line_count, line_size, line_ids)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (blame, line_ids) in blames.iter().zip(&encoded) {
                    stmt.execute(params![
                        project_id,
                        blame.author_id,
                        blame_file_id,
                        blame.lines.len() as i64,
                        blame.byte_size as i64,
                        line_ids,
                    ])?;
                }
            }

            tx.commit()?;
            Ok(Some(blame_file_id))
        })
    }

    /// Ownership rows of every snapshot taken at `revision`, optionally
    /// restricted to paths under `path_prefix`. Sorted by path, then author id.
    pub fn blame_rollup(
        &self,
        project_id: i64,
        revision: &str,
        path_prefix: Option<&str>,
    ) -> DbResult<Vec<BlameShare>> {
        let prefix = path_prefix.unwrap_or("");
        self.run("select blame rollup", || {
            let mut stmt = self.conn.prepare_cached(
                "SELECT fp.id, fp.path, a.id, a.name, a.email, b.line_count, b.line_size
                 FROM blame_files bf
                 JOIN file_paths fp ON fp.id = bf.file_path_id
                 LEFT JOIN blames b ON b.blame_file_id = bf.id
                 LEFT JOIN authors a ON a.id = b.author_id
                 WHERE bf.project_id = ?1 AND bf.revision = ?2
                   AND substr(fp.path, 1, length(?3)) = ?3
                 ORDER BY fp.path, a.id",
            )?;
            let rows = stmt.query_map(params![project_id, revision, prefix], |row| {
                Ok(BlameShare {
                    file_path_id: row.get(0)?,
                    path: row.get(1)?,
                    author_id: row.get(2)?,
                    author_name: row.get(3)?,
                    author_email: row.get(4)?,
                    line_count: row.get::<_, Option<i64>>(5)?.unwrap_or(0) as u64,
                    line_size: row.get::<_, Option<i64>>(6)?.unwrap_or(0) as u64,
                })
            })?;
            rows.collect()
        })
    }

    /// Line indices owned by an author in one snapshot
    pub fn blame_lines(
        &self,
        project_id: i64,
        file_path_id: i64,
        revision: &str,
        author_id: i64,
    ) -> DbResult<Option<Vec<u32>>> {
        let encoded: Option<Vec<u8>> = self.run("select blame lines", || {
            self.conn
                .query_row(
                    "SELECT b.line_ids FROM blames b
                     JOIN blame_files bf ON bf.id = b.blame_file_id
                     WHERE b.project_id = ?1 AND bf.file_path_id = ?2
                       AND bf.revision = ?3 AND b.author_id = ?4",
                    params![project_id, file_path_id, revision, author_id],
                    |row| row.get(0),
                )
                .optional()
        })?;

        encoded.map(|bytes| lines::decode(&bytes)).transpose()
    }

    // ── statistics ───────────────────────────────────────────────────────────

    fn count(&self, table: &str) -> DbResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let n: i64 = self.run("count rows", || self.conn.query_row(&sql, [], |row| row.get(0)))?;
        Ok(n as u64)
    }

    /// Row counts of every table
    pub fn table_counts(&self) -> DbResult<TableCounts> {
        Ok(TableCounts {
            projects: self.count("projects")?,
            authors: self.count("authors")?,
            commits: self.count("commits")?,
            commit_messages: self.count("commit_messages")?,
            file_paths: self.count("file_paths")?,
            files: self.count("files")?,
            blame_files: self.count("blame_files")?,
            blames: self.count("blames")?,
            branches: self.count("branches")?,
            branch_commits: self.count("branch_commit_map")?,
        })
    }
}

const COMMIT_SELECT: &str = "SELECT c.hash, c.author_id, a.name, a.email, c.date, c.project_size,
        c.stability, c.files_added, c.files_deleted, c.files_modified,
        c.lines_added, c.lines_deleted, c.lines_modified, c.changes, c.changes_size
    FROM commits c JOIN authors a ON a.id = c.author_id";

fn commit_from_row(row: &Row<'_>) -> rusqlite::Result<CommitRecord> {
    let count = |idx: usize| -> rusqlite::Result<u64> { Ok(row.get::<_, i64>(idx)? as u64) };
    Ok(CommitRecord {
        hash: row.get(0)?,
        author_id: row.get(1)?,
        author_name: row.get(2)?,
        author_email: row.get(3)?,
        date: row.get(4)?,
        project_size: count(5)?,
        stability: row.get(6)?,
        stats: ChangeStats {
            files_added: count(7)?,
            files_deleted: count(8)?,
            files_modified: count(9)?,
            lines_added: count(10)?,
            lines_deleted: count(11)?,
            lines_modified: count(12)?,
            changes: count(13)?,
            changes_size: count(14)?,
        },
    })
}
