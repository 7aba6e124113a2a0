//! Commit ingestion pipeline
//!
//! Lists every non-merge commit reachable from any ref, skips the ones
//! already stored and ingests the rest as independent units over a bounded
//! worker pool. Each worker chunk opens its own backend and store handle.

use dashmap::DashMap;
use miner_core::{CommitInfo, MinerError, Project};
use miner_db::{NewCommit, Store};
use rayon::prelude::*;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::backend::{CommitScope, GitBackend, VcsBackend};
use crate::cancel::CancelToken;
use crate::config::MinerConfig;
use crate::formatting::{format_duration, format_number};
use crate::interner::Interner;
use crate::stability;
use crate::stats::IngestStats;
use crate::Result;

const PROGRESS_INTERVAL: u64 = 100;

/// Chunks per worker; more than one keeps the pool busy when chunks differ in cost
const CHUNKS_PER_WORKER: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitOutcome {
    Written,
    Raced,
    Failed,
    Cancelled,
}

/// State shared by the units of one run
struct IngestRun<'a> {
    project: &'a Project,
    commits: &'a [CommitInfo],
    interner: Interner,
    blob_sizes: DashMap<String, u64>,
    done: AtomicU64,
    pending: u64,
    started: Instant,
}

pub struct Ingestor<B: VcsBackend = GitBackend> {
    db_path: PathBuf,
    config: MinerConfig,
    cancel: CancelToken,
    backend: PhantomData<fn() -> B>,
}

impl Ingestor<GitBackend> {
    pub fn new<P: AsRef<Path>>(db_path: P, config: MinerConfig) -> Self {
        Self::with_backend(db_path, config)
    }
}

impl<B: VcsBackend> Ingestor<B> {
    pub fn with_backend<P: AsRef<Path>>(db_path: P, config: MinerConfig) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            config,
            cancel: CancelToken::new(),
            backend: PhantomData,
        }
    }

    /// Uses `cancel` instead of the run's private token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn open_store(&self) -> Result<Store> {
        Ok(Store::open(&self.db_path, self.config.store_options())?)
    }

    /// Ingests every commit of the project not yet stored.
    ///
    /// Re-running resumes where an earlier run stopped; already stored commits
    /// are never rewritten.
    pub fn ingest(&self, project: &Project) -> Result<IngestStats> {
        let started = Instant::now();
        let backend = B::open(&project.root)?;
        let store = self.open_store()?;

        let commits = backend.list_commits(&CommitScope::AllRefs)?;
        let persisted = store.persisted_commits(project.id)?;

        let mut stats = IngestStats {
            total: commits.len() as u64,
            ..Default::default()
        };
        let mut pending = Vec::new();
        for (idx, commit) in commits.iter().enumerate() {
            if commit.is_merge() {
                stats.skipped_merges += 1;
            } else if persisted.contains(&commit.hash) {
                stats.skipped_existing += 1;
            } else {
                pending.push(idx);
            }
        }

        log::info!(
            "📊 {}: {} commits listed, {} to ingest ({} stored, {} merges skipped)",
            project.name,
            format_number(stats.total),
            format_number(pending.len() as u64),
            format_number(stats.skipped_existing),
            format_number(stats.skipped_merges)
        );

        let run = IngestRun {
            project,
            commits: &commits,
            interner: Interner::new(project.id),
            blob_sizes: DashMap::new(),
            done: AtomicU64::new(0),
            pending: pending.len() as u64,
            started,
        };

        let pool = self
            .config
            .thread_pool()
            .map_err(|e| MinerError::WorkerPool(e.to_string()))?;
        let workers = pool.current_num_threads();
        let chunk_size = pending.len().div_ceil(workers * CHUNKS_PER_WORKER).max(1);

        let outcomes: Vec<UnitOutcome> = pool.install(|| {
            pending
                .par_chunks(chunk_size)
                .flat_map_iter(|chunk| self.run_chunk(&run, chunk))
                .collect()
        });

        for outcome in outcomes {
            match outcome {
                UnitOutcome::Written => stats.processed += 1,
                UnitOutcome::Raced => stats.raced += 1,
                UnitOutcome::Failed => stats.errors += 1,
                UnitOutcome::Cancelled => stats.cancelled += 1,
            }
        }

        if stats.cancelled > 0 {
            stats.elapsed = started.elapsed();
            log::warn!("Ingestion cancelled: {}", stats);
            return Err(MinerError::Cancelled);
        }

        stats.branch_links = self.record_branches(&backend, &store, project, &mut stats.errors)?;
        stats.elapsed = started.elapsed();

        log::info!("✅ Ingestion completed: {}", stats);
        log::debug!(
            "Interned {} authors, {} paths; measured {} blobs",
            run.interner.author_count(),
            run.interner.path_count(),
            run.blob_sizes.len()
        );
        Ok(stats)
    }

    /// Processes one chunk with a single backend and store handle
    fn run_chunk(&self, run: &IngestRun<'_>, chunk: &[usize]) -> Vec<UnitOutcome> {
        let handles = B::open(&run.project.root).and_then(|backend| Ok((backend, self.open_store()?)));
        let (backend, store) = match handles {
            Ok(handles) => handles,
            Err(e) => {
                log::warn!("Failed to open worker handles, skipping {} commits: {}", chunk.len(), e);
                return vec![UnitOutcome::Failed; chunk.len()];
            }
        };

        chunk
            .iter()
            .map(|&idx| {
                if self.cancel.is_cancelled() {
                    return UnitOutcome::Cancelled;
                }

                let commit = &run.commits[idx];
                let outcome = match self.ingest_commit(&backend, &store, run, idx) {
                    Ok(true) => UnitOutcome::Written,
                    Ok(false) => {
                        log::debug!("Commit {} was stored by another writer", commit.short_hash());
                        UnitOutcome::Raced
                    }
                    Err(e) => {
                        log::warn!("Failed to ingest commit {}: {}", commit.short_hash(), e);
                        UnitOutcome::Failed
                    }
                };

                let done = run.done.fetch_add(1, Ordering::Relaxed) + 1;
                if done % PROGRESS_INTERVAL == 0 {
                    let elapsed = run.started.elapsed();
                    log::info!(
                        "⚡ Commits: {}/{} | Speed: {:.1} commits/s | Elapsed: {}",
                        format_number(done),
                        format_number(run.pending),
                        done as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
                        format_duration(elapsed)
                    );
                }
                outcome
            })
            .collect()
    }

    /// One unit of work. Returns whether this call wrote the commit row.
    fn ingest_commit(&self, backend: &B, store: &Store, run: &IngestRun<'_>, idx: usize) -> Result<bool> {
        let commit = &run.commits[idx];
        log::debug!("Processing commit {}", commit.short_hash());

        let diff = backend.diff(commit.first_parent(), &commit.hash)?;
        let stats = diff.stats();

        let author_id = run
            .interner
            .resolve_author(store, &commit.author_email, &commit.author_name)?;
        let file_path_ids = diff
            .touched_paths()
            .map(|path| run.interner.resolve_file_path(store, path))
            .collect::<Result<Vec<_>>>()?;

        let project_size = self.tree_size(backend, run, &commit.hash)?;

        let stability = match stability::find_horizon(run.commits, idx, self.config.window_months) {
            Some(h) => stability::score_against(backend, commit, &run.commits[h], &diff)?,
            None => 1.0,
        };

        let written = store.record_commit(
            run.project.id,
            &NewCommit {
                hash: &commit.hash,
                author_id,
                date: commit.time,
                project_size,
                stability,
                stats: &stats,
                summary: &commit.summary,
                message: &commit.message,
                file_path_ids: &file_path_ids,
            },
        )?;
        Ok(written)
    }

    /// Total blob bytes of a commit tree, memoised by blob hash for the run
    fn tree_size(&self, backend: &B, run: &IngestRun<'_>, rev: &str) -> Result<u64> {
        let mut total = 0u64;
        for entry in backend.walk_tree(rev)? {
            let cached = run.blob_sizes.get(&entry.blob).map(|size| *size);
            let size = match cached {
                Some(size) => size,
                None => {
                    let size = backend.blob_size(&entry.blob)?;
                    run.blob_sizes.insert(entry.blob, size);
                    size
                }
            };
            total += size;
        }
        Ok(total)
    }

    /// Links every branch to its stored commits. Returns the new link count.
    fn record_branches(
        &self,
        backend: &B,
        store: &Store,
        project: &Project,
        errors: &mut u64,
    ) -> Result<u64> {
        let persisted = store.persisted_commits(project.id)?;
        let mut links = 0u64;

        for branch in backend.list_branches()? {
            let recorded = backend.ancestry(&branch.target).and_then(|reachable| {
                let members: Vec<String> = reachable
                    .into_iter()
                    .filter(|hash| persisted.contains(hash))
                    .collect();
                let branch_id = store.ensure_branch(project.id, &branch.name)?;
                Ok(store.record_branch_commits(project.id, branch_id, &members)? as u64)
            });

            match recorded {
                Ok(n) => {
                    log::debug!("Branch {}: {} new links", branch.name, n);
                    links += n;
                }
                Err(e) => {
                    log::warn!("Failed to record branch {}: {}", branch.name, e);
                    *errors += 1;
                }
            }
        }

        Ok(links)
    }
}
