//! Blame attribution pipeline
//!
//! Folds the ingested commit rows of a scope into per-developer totals while,
//! in parallel, blaming every file at HEAD that has no snapshot yet. Once the
//! snapshots are written the per-author ownership is rolled up from the store.

use miner_core::{CommitInfo, CommitRecord, DeveloperInfo, FileOwnership, MinerError, Project};
use miner_db::{BlameShare, NewBlame, Store};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::backend::{CommitScope, GitBackend, VcsBackend};
use crate::cancel::CancelToken;
use crate::config::MinerConfig;
use crate::interner::Interner;
use crate::stats::AttributionStats;
use crate::Result;

const CHUNKS_PER_WORKER: usize = 4;

/// Result of one attribution run
#[derive(Debug, Clone, Serialize)]
pub struct Attribution {
    /// Revision the ownership was computed at
    pub head: String,

    /// Keyed by author email
    pub developers: BTreeMap<String, DeveloperInfo>,

    /// Every snapshotted file in scope, sorted by path
    pub files: Vec<FileOwnership>,

    #[serde(skip)]
    pub stats: AttributionStats,
}

impl Attribution {
    pub fn total_lines_owned(&self) -> u64 {
        self.developers.values().map(|d| d.lines_owned).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Blamed,
    Raced,
    Failed,
    Cancelled,
}

/// A file at HEAD still lacking its snapshot
struct PendingFile {
    path: String,
    file_path_id: i64,
}

pub struct Attributor<B: VcsBackend = GitBackend> {
    db_path: PathBuf,
    config: MinerConfig,
    cancel: CancelToken,
    backend: PhantomData<fn() -> B>,
}

impl Attributor<GitBackend> {
    pub fn new<P: AsRef<Path>>(db_path: P, config: MinerConfig) -> Self {
        Self::with_backend(db_path, config)
    }
}

impl<B: VcsBackend> Attributor<B> {
    pub fn with_backend<P: AsRef<Path>>(db_path: P, config: MinerConfig) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            config,
            cancel: CancelToken::new(),
            backend: PhantomData,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn open_store(&self) -> Result<Store> {
        Ok(Store::open(&self.db_path, self.config.store_options())?)
    }

    fn head(backend: &B) -> Result<String> {
        backend.resolve_head()?.ok_or_else(|| MinerError::MalformedHistory {
            commit: "HEAD".to_string(),
            reason: "repository has no commits".to_string(),
        })
    }

    /// Attributes the project's history and current content to its developers.
    ///
    /// `scope` restricts both the commits and the files to a path prefix.
    pub fn attribute(&self, project: &Project, scope: Option<&str>) -> Result<Attribution> {
        let started = Instant::now();
        let backend = B::open(&project.root)?;
        let store = self.open_store()?;
        let head = Self::head(&backend)?;

        // merges are never ingested, so they are not expected in the store
        let (merges, commits): (Vec<CommitInfo>, Vec<CommitInfo>) = backend
            .list_commits(&CommitScope::for_prefix(scope))?
            .into_iter()
            .partition(CommitInfo::is_merge);
        let interner = Interner::new(project.id);
        interner.preload_file_paths(&store)?;

        let mut stats = AttributionStats {
            merges_skipped: merges.len() as u64,
            ..Default::default()
        };
        let pending = self.pending_files(&backend, &store, &interner, &head, scope, &mut stats)?;

        log::info!(
            "📊 {} at {}: {} commits in scope, {} files to blame ({} cached)",
            project.name,
            &head[..head.len().min(12)],
            commits.len(),
            pending.len(),
            stats.files_cached
        );

        let pool = self
            .config
            .thread_pool()
            .map_err(|e| MinerError::WorkerPool(e.to_string()))?;

        let workers = pool.current_num_threads();

        let (records, outcomes) = pool.install(|| {
            rayon::join(
                || self.read_commits(workers, project.id, &commits),
                || self.blame_files(workers, project, &interner, &head, &pending),
            )
        });

        for outcome in outcomes {
            match outcome {
                FileOutcome::Blamed => stats.files_blamed += 1,
                FileOutcome::Raced => stats.files_cached += 1,
                FileOutcome::Failed => stats.errors += 1,
                FileOutcome::Cancelled => return Err(MinerError::Cancelled),
            }
        }

        let mut developers: BTreeMap<String, DeveloperInfo> = BTreeMap::new();
        for record in records? {
            match record {
                Some(record) => {
                    let dev = developers
                        .entry(record.author_email.clone())
                        .or_insert_with(|| DeveloperInfo::new(&record.author_name, &record.author_email));
                    if dev.fold_commit(&record) {
                        stats.commits_folded += 1;
                    }
                }
                None => stats.commits_missing += 1,
            }
        }
        if stats.commits_missing > 0 {
            log::warn!(
                "{} commits in scope are not ingested yet; run ingestion first for complete totals",
                stats.commits_missing
            );
        }

        let shares = store.blame_rollup(project.id, &head, scope)?;
        let files = rollup(&shares, &mut developers);

        stats.elapsed = started.elapsed();
        log::info!("✅ Attribution completed: {}", stats);

        Ok(Attribution {
            head,
            developers,
            files,
            stats,
        })
    }

    /// Line indices `author_email` owns in the HEAD snapshot of `path`
    pub fn owned_lines(&self, project: &Project, path: &str, author_email: &str) -> Result<Option<Vec<u32>>> {
        let backend = B::open(&project.root)?;
        let head = Self::head(&backend)?;
        let store = self.open_store()?;

        let Some(file_path_id) = store.file_path_id(project.id, path)? else {
            return Ok(None);
        };
        let Some(author_id) = store.author_id(project.id, author_email)? else {
            return Ok(None);
        };
        Ok(store.blame_lines(project.id, file_path_id, &head, author_id)?)
    }

    /// Interns every HEAD blob in scope and keeps the ones without a snapshot
    fn pending_files(
        &self,
        backend: &B,
        store: &Store,
        interner: &Interner,
        head: &str,
        scope: Option<&str>,
        stats: &mut AttributionStats,
    ) -> Result<Vec<PendingFile>> {
        let mut pending = Vec::new();

        for entry in backend.walk_tree(head)? {
            if !scope.map_or(true, |prefix| entry.path.starts_with(prefix)) {
                continue;
            }
            if self.config.is_skipped(&entry.path) {
                log::debug!("Skipping {}", entry.path);
                continue;
            }
            if entry.lossy_path {
                log::debug!("Skipping {}: path is not valid UTF-8", entry.path);
                stats.files_unreadable += 1;
                continue;
            }

            stats.files_total += 1;
            let file_path_id = interner.resolve_file_path(store, &entry.path)?;
            if store.blame_file_id(interner.project_id(), file_path_id, head)?.is_some() {
                stats.files_cached += 1;
            } else {
                pending.push(PendingFile {
                    path: entry.path,
                    file_path_id,
                });
            }
        }

        Ok(pending)
    }

    /// Reads the ingested row of every commit, `None` for commits not stored
    fn read_commits(
        &self,
        workers: usize,
        project_id: i64,
        commits: &[CommitInfo],
    ) -> Result<Vec<Option<CommitRecord>>> {
        let chunk_size = commits.len().div_ceil(workers * CHUNKS_PER_WORKER).max(1);

        let chunks = commits
            .par_chunks(chunk_size)
            .map(|chunk| -> Result<Vec<Option<CommitRecord>>> {
                let store = self.open_store()?;
                chunk
                    .iter()
                    .map(|commit| Ok(store.get_commit(project_id, &commit.hash)?))
                    .collect()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(chunks.into_iter().flatten().collect())
    }

    /// Blames the pending files, one backend and store handle per chunk
    fn blame_files(
        &self,
        workers: usize,
        project: &Project,
        interner: &Interner,
        head: &str,
        pending: &[PendingFile],
    ) -> Vec<FileOutcome> {
        let chunk_size = pending.len().div_ceil(workers * CHUNKS_PER_WORKER).max(1);

        pending
            .par_chunks(chunk_size)
            .flat_map_iter(|chunk| {
                let handles = B::open(&project.root).and_then(|backend| Ok((backend, self.open_store()?)));
                let (backend, store) = match handles {
                    Ok(handles) => handles,
                    Err(e) => {
                        log::warn!("Failed to open worker handles, skipping {} files: {}", chunk.len(), e);
                        return vec![FileOutcome::Failed; chunk.len()];
                    }
                };

                chunk
                    .iter()
                    .map(|file| {
                        if self.cancel.is_cancelled() {
                            return FileOutcome::Cancelled;
                        }
                        match blame_file(&backend, &store, interner, head, file) {
                            Ok(true) => FileOutcome::Blamed,
                            Ok(false) => FileOutcome::Raced,
                            Err(e) => {
                                log::warn!("Failed to blame {}: {}", file.path, e);
                                FileOutcome::Failed
                            }
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

/// Blames one file and writes its snapshot. Returns whether this call wrote it.
fn blame_file<B: VcsBackend>(
    backend: &B,
    store: &Store,
    interner: &Interner,
    head: &str,
    file: &PendingFile,
) -> Result<bool> {
    let lines = backend.blame(&file.path, head)?;

    // email -> (name, owned line indices, owned bytes)
    let mut by_author: BTreeMap<&str, (&str, Vec<u32>, u64)> = BTreeMap::new();
    for (idx, line) in lines.iter().enumerate() {
        let owned = by_author
            .entry(line.author_email.as_str())
            .or_insert_with(|| (line.author_name.as_str(), Vec::new(), 0));
        owned.1.push(idx as u32);
        owned.2 += line.byte_len;
    }

    let blames = by_author
        .into_iter()
        .map(|(email, (name, lines, byte_size))| {
            Ok(NewBlame {
                author_id: interner.resolve_author(store, email, name)?,
                lines,
                byte_size,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let written = store.record_blame(interner.project_id(), file.file_path_id, head, &blames)?;
    log::debug!("Blamed {} ({} lines, {} authors)", file.path, lines.len(), blames.len());
    Ok(written.is_some())
}

/// Sums ownership per author and picks each file's owner.
///
/// `shares` must be sorted by path, then author id. The owner is the author
/// with the most lines; on a tie the lowest author id wins.
fn rollup(shares: &[BlameShare], developers: &mut BTreeMap<String, DeveloperInfo>) -> Vec<FileOwnership> {
    let mut files: Vec<FileOwnership> = Vec::new();

    for file_shares in shares.chunk_by(|a, b| a.file_path_id == b.file_path_id) {
        let mut ownership = FileOwnership {
            path: file_shares[0].path.clone(),
            owner_email: None,
            owner_lines: 0,
            total_lines: 0,
            total_bytes: 0,
        };

        for share in file_shares {
            let (Some(email), Some(name)) = (&share.author_email, &share.author_name) else {
                continue;
            };
            let dev = developers
                .entry(email.clone())
                .or_insert_with(|| DeveloperInfo::new(name, email));
            dev.lines_owned += share.line_count;
            dev.bytes_owned += share.line_size;

            ownership.total_lines += share.line_count;
            ownership.total_bytes += share.line_size;
            if share.line_count > ownership.owner_lines {
                ownership.owner_lines = share.line_count;
                ownership.owner_email = Some(email.clone());
            }
        }

        if let Some(owner) = &ownership.owner_email {
            if let Some(dev) = developers.get_mut(owner) {
                dev.owned_files.push(ownership.path.clone());
            }
        }
        files.push(ownership);
    }

    files
}
