//! Shared fixtures: throwaway git repositories built commit by commit

#![allow(dead_code)]

use anyhow::Result;
use git2::build::TreeUpdateBuilder;
use git2::{FileMode, Oid, Repository, Signature, Time};
use miner_core::Project;
use miner_db::{RetryPolicy, Store, StoreOptions};
use miner_index::{register_project, MinerConfig};
use std::path::PathBuf;
use tempfile::TempDir;

pub const ADA: (&str, &str) = ("Ada", "ada@example.com");
pub const BOB: (&str, &str) = ("Bob", "bob@example.com");

/// 2023-11-14T22:13:20Z
pub const T0: i64 = 1_700_000_000;
pub const DAY: i64 = 86_400;

pub struct TestRepo {
    _dir: TempDir,
    pub root: PathBuf,
    pub db: PathBuf,
    pub repo: Repository,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let root = dir.path().join("repo");
        let db = dir.path().join("miner.db");
        let repo = Repository::init(&root)?;
        Ok(Self {
            _dir: dir,
            root,
            db,
            repo,
        })
    }

    /// Commits `changes` on top of HEAD. `None` content deletes the path.
    pub fn commit(
        &self,
        author: (&str, &str),
        time: i64,
        message: &str,
        changes: &[(&str, Option<&str>)],
    ) -> Result<String> {
        let parents = match self.repo.head() {
            Ok(head) => vec![head.peel_to_commit()?.id().to_string()],
            Err(_) => Vec::new(),
        };
        let parents: Vec<&str> = parents.iter().map(String::as_str).collect();
        self.commit_on("HEAD", &parents, author, time, message, changes)
    }

    /// Commits on `update_ref` with explicit parents; the tree starts from the first parent's
    pub fn commit_on(
        &self,
        update_ref: &str,
        parents: &[&str],
        author: (&str, &str),
        time: i64,
        message: &str,
        changes: &[(&str, Option<&str>)],
    ) -> Result<String> {
        let parents = parents
            .iter()
            .map(|p| Ok(self.repo.find_commit(Oid::from_str(p)?)?))
            .collect::<Result<Vec<_>>>()?;

        let base = match parents.first() {
            Some(parent) => parent.tree()?,
            None => {
                let empty = self.repo.treebuilder(None)?.write()?;
                self.repo.find_tree(empty)?
            }
        };

        let mut update = TreeUpdateBuilder::new();
        for (path, content) in changes {
            match content {
                Some(content) => {
                    let blob = self.repo.blob(content.as_bytes())?;
                    update.upsert(*path, blob, FileMode::Blob);
                }
                None => {
                    update.remove(*path);
                }
            }
        }
        let tree = self.repo.find_tree(update.create_updated(&self.repo, &base)?)?;

        let sig = Signature::new(author.0, author.1, &Time::new(time, 0))?;
        let parent_refs: Vec<_> = parents.iter().collect();
        let oid = self
            .repo
            .commit(Some(update_ref), &sig, &sig, message, &tree, &parent_refs)?;
        Ok(oid.to_string())
    }

    /// Commits a hand-built tree on top of HEAD
    pub fn commit_tree(&self, author: (&str, &str), time: i64, message: &str, tree: Oid) -> Result<String> {
        let parents = match self.repo.head() {
            Ok(head) => vec![head.peel_to_commit()?],
            Err(_) => Vec::new(),
        };
        let parent_refs: Vec<_> = parents.iter().collect();
        let tree = self.repo.find_tree(tree)?;
        let sig = Signature::new(author.0, author.1, &Time::new(time, 0))?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)?;
        Ok(oid.to_string())
    }

    /// Tree holding `ok.txt`, a file whose name is not UTF-8 and a non UTF-8
    /// directory with `inner.txt`
    pub fn non_utf8_tree(&self) -> Result<Oid> {
        let ok = self.repo.blob(b"fine\n")?;
        let other = self.repo.blob(b"bytes\n")?;

        let mut dir = self.repo.treebuilder(None)?;
        dir.insert("inner.txt", other, 0o100644)?;
        let dir = dir.write()?;

        let mut root = self.repo.treebuilder(None)?;
        root.insert("ok.txt", ok, 0o100644)?;
        root.insert(b"bad\xff.txt".to_vec(), other, 0o100644)?;
        root.insert(b"dir\xfe".to_vec(), dir, 0o040000)?;
        Ok(root.write()?)
    }

    /// Full name of the branch HEAD points at
    pub fn head_branch(&self) -> Result<String> {
        Ok(self.repo.head()?.name().unwrap_or_default().to_string())
    }

    pub fn open_store(&self) -> Result<Store> {
        Ok(Store::open(&self.db, store_options())?)
    }

    pub fn project(&self) -> Result<Project> {
        let store = self.open_store()?;
        Ok(register_project(&store, &self.root, Some("demo"))?)
    }
}

pub fn store_options() -> StoreOptions {
    config().store_options()
}

pub fn config() -> MinerConfig {
    MinerConfig {
        workers: 2,
        retry: RetryPolicy {
            max_attempts: 50,
            backoff_ms: 20,
        },
        ..Default::default()
    }
}
