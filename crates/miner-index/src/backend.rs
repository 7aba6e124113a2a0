//! Repository backend adapter
//!
//! The pipelines only talk to history through [`VcsBackend`]. The git
//! implementation wraps `git2`; a handle is opened once per worker chunk and
//! never crosses threads.

use git2::{
    BlameOptions, Commit, Delta, DiffFindOptions, DiffOptions, ErrorCode, ObjectType, Oid, Patch,
    Repository, Sort, Tree,
};
use miner_core::{BlameLine, ChangeKind, ChangeStats, CommitInfo, Edit, FileChange, MinerError};
use std::path::{Path, PathBuf};

use crate::Result;

const CONTEXT_LINES: u32 = 3;

/// Which part of the history a commit listing covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitScope {
    /// Every commit reachable from any ref (and a detached HEAD)
    AllRefs,

    /// Every commit reachable from HEAD
    Head,

    /// The first-parent chain of HEAD
    FirstParent,

    /// Commits reachable from HEAD whose first-parent diff touches the prefix
    PathPrefix(String),
}

impl CommitScope {
    /// `PathPrefix` for a non-empty scope, `Head` otherwise
    pub fn for_prefix(prefix: Option<&str>) -> Self {
        match prefix {
            Some(p) if !p.is_empty() => CommitScope::PathPrefix(p.to_string()),
            _ => CommitScope::Head,
        }
    }
}

/// Per-path changes between two revisions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitDiff {
    pub files: Vec<FileChange>,
}

impl CommitDiff {
    /// Sum of the per-path stats
    pub fn stats(&self) -> ChangeStats {
        self.files.iter().map(ChangeStats::from_change).fold(
            ChangeStats::default(),
            |mut acc, s| {
                acc.add(&s);
                acc
            },
        )
    }

    /// Paths touched on the new side (old side for deletions), in diff order
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A blob reachable from a revision's tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub blob: String,

    /// Some path component is not valid UTF-8, so `path` is a lossy rendering
    /// that cannot be used to look the blob up again
    pub lossy_path: bool,
}

/// A named ref and the commit it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefTarget {
    pub name: String,
    pub target: String,
}

/// Read access to a repository's history
pub trait VcsBackend: Sized {
    fn open(root: &Path) -> Result<Self>;

    /// Current HEAD commit, `None` when HEAD is unborn
    fn resolve_head(&self) -> Result<Option<String>>;

    /// Commits in scope, newest first by commit time
    fn list_commits(&self, scope: &CommitScope) -> Result<Vec<CommitInfo>>;

    fn find_commit(&self, hash: &str) -> Result<Option<CommitInfo>>;

    /// Hashes of every commit reachable from `rev`, including itself
    fn ancestry(&self, rev: &str) -> Result<Vec<String>>;

    /// Diffs `base` against `rev`; `None` diffs against the empty tree
    fn diff(&self, base: Option<&str>, rev: &str) -> Result<CommitDiff>;

    /// One entry per line of `path` at `rev`
    fn blame(&self, path: &str, rev: &str) -> Result<Vec<BlameLine>>;

    fn walk_tree(&self, rev: &str) -> Result<Vec<TreeEntry>>;

    /// Content size of a blob, read from the object header only
    fn blob_size(&self, blob: &str) -> Result<u64>;

    fn list_branches(&self) -> Result<Vec<RefTarget>>;

    fn list_tags(&self) -> Result<Vec<RefTarget>>;

    fn commit_for_tag(&self, name: &str) -> Result<Option<String>>;
}

/// `git2`-backed implementation
pub struct GitBackend {
    repo: Repository,
    root: PathBuf,
}

impl GitBackend {
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn oid(hash: &str) -> Result<Oid> {
        Oid::from_str(hash).map_err(|e| MinerError::MalformedHistory {
            commit: hash.to_string(),
            reason: e.message().to_string(),
        })
    }

    fn commit(&self, rev: &str) -> Result<Commit<'_>> {
        self.repo
            .find_commit(Self::oid(rev)?)
            .map_err(|e| MinerError::backend(format!("commit {}: {}", rev, e)))
    }

    fn tree(&self, rev: &str) -> Result<Tree<'_>> {
        self.commit(rev)?
            .tree()
            .map_err(|e| MinerError::backend(format!("tree of {}: {}", rev, e)))
    }

    fn push_head(&self, revwalk: &mut git2::Revwalk<'_>) -> Result<bool> {
        match revwalk.push_head() {
            Ok(()) => Ok(true),
            Err(e) if is_missing(&e) => Ok(false),
            Err(e) => Err(MinerError::backend(e)),
        }
    }

    /// Pre-order walk over `tree`. Names are read as bytes so a non UTF-8
    /// directory does not abort the walk.
    fn collect_blobs(
        &self,
        tree: &Tree<'_>,
        prefix: &str,
        lossy: bool,
        entries: &mut Vec<TreeEntry>,
    ) -> Result<()> {
        for entry in tree.iter() {
            let (name, lossy) = match entry.name() {
                Some(name) => (name.to_string(), lossy),
                None => {
                    let name = String::from_utf8_lossy(entry.name_bytes()).into_owned();
                    log::debug!("Non UTF-8 path {}{}", prefix, name);
                    (name, true)
                }
            };
            let path = format!("{}{}", prefix, name);

            match entry.kind() {
                Some(ObjectType::Blob) => entries.push(TreeEntry {
                    path,
                    blob: entry.id().to_string(),
                    lossy_path: lossy,
                }),
                Some(ObjectType::Tree) => {
                    let subtree = self.repo.find_tree(entry.id()).map_err(MinerError::backend)?;
                    self.collect_blobs(&subtree, &format!("{}/", path), lossy, entries)?;
                }
                // submodule commits
                _ => {}
            }
        }
        Ok(())
    }

    fn touches_prefix(&self, commit: &Commit<'_>, prefix: &str) -> Result<bool> {
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree().map_err(MinerError::backend)?),
            Err(_) => None,
        };
        let tree = commit.tree().map_err(MinerError::backend)?;
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
            .map_err(MinerError::backend)?;

        let under = |p: Option<&Path>| {
            p.map(|p| p.to_string_lossy().starts_with(prefix))
                .unwrap_or(false)
        };
        Ok(diff
            .deltas()
            .any(|d| under(d.new_file().path()) || under(d.old_file().path())))
    }
}

fn is_missing(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::NotFound | ErrorCode::UnbornBranch)
}

fn commit_info(commit: &Commit<'_>) -> CommitInfo {
    let author = commit.author();
    CommitInfo {
        hash: commit.id().to_string(),
        parents: commit.parent_ids().map(|id| id.to_string()).collect(),
        author_name: author.name().unwrap_or("").to_string(),
        author_email: author.email().unwrap_or("").to_string(),
        time: commit.time().seconds(),
        summary: commit.summary().unwrap_or("").to_string(),
        message: commit.message().unwrap_or("").to_string(),
    }
}

fn change_kind(status: Delta) -> ChangeKind {
    match status {
        Delta::Added => ChangeKind::Added,
        Delta::Deleted => ChangeKind::Deleted,
        Delta::Modified => ChangeKind::Modified,
        Delta::Renamed => ChangeKind::Renamed,
        Delta::Copied => ChangeKind::Copied,
        _ => ChangeKind::Other,
    }
}

/// Rebuilds edit spans from the patch hunks.
///
/// Runs of removed and added lines between context lines form one edit;
/// coordinates are 0-based on both sides.
fn edits_from_patch(patch: &Patch<'_>) -> Result<Vec<Edit>> {
    let mut edits = Vec::new();

    for h in 0..patch.num_hunks() {
        let (hunk, _) = patch.hunk(h).map_err(MinerError::backend)?;
        let mut a = hunk.old_start().saturating_sub(u32::from(hunk.old_lines() != 0));
        let mut b = hunk.new_start().saturating_sub(u32::from(hunk.new_lines() != 0));
        let mut current: Option<Edit> = None;

        for l in 0..patch.num_lines_in_hunk(h).map_err(MinerError::backend)? {
            let line = patch.line_in_hunk(h, l).map_err(MinerError::backend)?;
            match line.origin() {
                ' ' => {
                    edits.extend(current.take());
                    a += 1;
                    b += 1;
                }
                '-' => {
                    current.get_or_insert(Edit::new(a, a, b, b)).end_a += 1;
                    a += 1;
                }
                '+' => {
                    current.get_or_insert(Edit::new(a, a, b, b)).end_b += 1;
                    b += 1;
                }
                _ => {}
            }
        }
        edits.extend(current.take());
    }

    Ok(edits)
}

/// Splits content into lines, dropping `\n` / `\r\n` terminators
fn split_lines(content: &[u8]) -> Vec<&[u8]> {
    if content.is_empty() {
        return Vec::new();
    }
    let body = content.strip_suffix(b"\n").unwrap_or(content);
    body.split(|&byte| byte == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect()
}

impl VcsBackend for GitBackend {
    fn open(root: &Path) -> Result<Self> {
        let repo = Repository::open(root).map_err(|e| {
            MinerError::backend(format!("cannot open repository at {:?}: {}", root, e))
        })?;
        Ok(Self {
            repo,
            root: root.to_path_buf(),
        })
    }

    fn resolve_head(&self) -> Result<Option<String>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(MinerError::backend)?;
                Ok(Some(commit.id().to_string()))
            }
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(MinerError::backend(e)),
        }
    }

    fn list_commits(&self, scope: &CommitScope) -> Result<Vec<CommitInfo>> {
        let mut revwalk = self.repo.revwalk().map_err(MinerError::backend)?;
        revwalk.set_sorting(Sort::TIME).map_err(MinerError::backend)?;

        let has_start = match scope {
            CommitScope::AllRefs => {
                revwalk.push_glob("*").map_err(MinerError::backend)?;
                self.push_head(&mut revwalk)?;
                true
            }
            CommitScope::Head | CommitScope::PathPrefix(_) => self.push_head(&mut revwalk)?,
            CommitScope::FirstParent => {
                revwalk.simplify_first_parent().map_err(MinerError::backend)?;
                self.push_head(&mut revwalk)?
            }
        };
        if !has_start {
            return Ok(Vec::new());
        }

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid.map_err(MinerError::backend)?;
            let commit = self.repo.find_commit(oid).map_err(MinerError::backend)?;

            if let CommitScope::PathPrefix(prefix) = scope {
                if !self.touches_prefix(&commit, prefix)? {
                    continue;
                }
            }
            commits.push(commit_info(&commit));
        }

        log::debug!("Listed {} commits ({:?})", commits.len(), scope);
        Ok(commits)
    }

    fn find_commit(&self, hash: &str) -> Result<Option<CommitInfo>> {
        match self.repo.find_commit(Self::oid(hash)?) {
            Ok(commit) => Ok(Some(commit_info(&commit))),
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(MinerError::backend(e)),
        }
    }

    fn ancestry(&self, rev: &str) -> Result<Vec<String>> {
        let mut revwalk = self.repo.revwalk().map_err(MinerError::backend)?;
        revwalk.push(Self::oid(rev)?).map_err(MinerError::backend)?;
        revwalk
            .map(|oid| oid.map(|o| o.to_string()).map_err(MinerError::backend))
            .collect()
    }

    fn diff(&self, base: Option<&str>, rev: &str) -> Result<CommitDiff> {
        let new_tree = self.tree(rev)?;
        let old_tree = base.map(|b| self.tree(b)).transpose()?;

        let mut opts = DiffOptions::new();
        opts.context_lines(CONTEXT_LINES);
        let mut diff = self
            .repo
            .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), Some(&mut opts))
            .map_err(MinerError::backend)?;

        let mut find = DiffFindOptions::new();
        find.renames(true);
        diff.find_similar(Some(&mut find)).map_err(MinerError::backend)?;

        let mut files = Vec::with_capacity(diff.deltas().len());
        for (idx, delta) in diff.deltas().enumerate() {
            let kind = change_kind(delta.status());
            let path_of = |p: Option<&Path>| p.map(|p| p.to_string_lossy().into_owned());
            let new_path = path_of(delta.new_file().path());
            let old_path = path_of(delta.old_file().path());

            let path = match (kind, &new_path, &old_path) {
                (ChangeKind::Deleted, _, Some(old)) => old.clone(),
                (_, Some(new), _) => new.clone(),
                (_, None, Some(old)) => old.clone(),
                (_, None, None) => {
                    return Err(MinerError::MalformedHistory {
                        commit: rev.to_string(),
                        reason: "diff entry without a path".to_string(),
                    })
                }
            };
            let old_path = old_path.filter(|old| *old != path);

            let (edits, patch_bytes) = match Patch::from_diff(&diff, idx).map_err(MinerError::backend)? {
                Some(mut patch) => {
                    let edits = edits_from_patch(&patch)?;
                    let bytes = patch.to_buf().map_err(MinerError::backend)?.len() as u64;
                    (edits, bytes)
                }
                None => (Vec::new(), 0),
            };

            files.push(FileChange {
                path,
                old_path,
                kind,
                edits,
                patch_bytes,
            });
        }

        Ok(CommitDiff { files })
    }

    fn blame(&self, path: &str, rev: &str) -> Result<Vec<BlameLine>> {
        let commit = self.commit(rev)?;
        let blob = commit
            .tree()
            .and_then(|tree| tree.get_path(Path::new(path)))
            .and_then(|entry| entry.to_object(&self.repo))
            .and_then(|object| object.peel_to_blob())
            .map_err(|e| MinerError::backend(format!("{} at {}: {}", path, rev, e)))?;
        let lines = split_lines(blob.content());

        let mut opts = BlameOptions::new();
        opts.newest_commit(commit.id());
        let blame = self
            .repo
            .blame_file(Path::new(path), Some(&mut opts))
            .map_err(|e| MinerError::backend(format!("blame {} at {}: {}", path, rev, e)))?;

        let mut owners: Vec<Option<(String, String, String)>> = vec![None; lines.len()];
        for hunk in blame.iter() {
            let sig = hunk.final_signature();
            let owner = (
                sig.email().unwrap_or("").to_string(),
                sig.name().unwrap_or("").to_string(),
                hunk.final_commit_id().to_string(),
            );
            let start = hunk.final_start_line().saturating_sub(1);
            for slot in owners.iter_mut().skip(start).take(hunk.lines_in_hunk()) {
                *slot = Some(owner.clone());
            }
        }

        lines
            .iter()
            .zip(owners)
            .enumerate()
            .map(|(idx, (line, owner))| {
                let (author_email, author_name, commit_hash) =
                    owner.ok_or_else(|| MinerError::MalformedHistory {
                        commit: rev.to_string(),
                        reason: format!("{}:{} has no blame entry", path, idx + 1),
                    })?;
                Ok(BlameLine {
                    author_email,
                    author_name,
                    commit_hash,
                    byte_len: line.len() as u64,
                })
            })
            .collect()
    }

    fn walk_tree(&self, rev: &str) -> Result<Vec<TreeEntry>> {
        let tree = self.tree(rev)?;
        let mut entries = Vec::new();
        self.collect_blobs(&tree, "", false, &mut entries)?;
        Ok(entries)
    }

    fn blob_size(&self, blob: &str) -> Result<u64> {
        let odb = self.repo.odb().map_err(MinerError::backend)?;
        let (size, _) = odb.read_header(Self::oid(blob)?).map_err(MinerError::backend)?;
        Ok(size as u64)
    }

    fn list_branches(&self) -> Result<Vec<RefTarget>> {
        let mut branches = Vec::new();
        for item in self.repo.branches(None).map_err(MinerError::backend)? {
            let (branch, _) = item.map_err(MinerError::backend)?;
            let reference = branch.get();
            let Some(name) = reference.name() else {
                continue;
            };
            if reference.is_remote() && name.ends_with("/HEAD") {
                continue;
            }
            let target = reference.peel_to_commit().map_err(MinerError::backend)?;
            branches.push(RefTarget {
                name: name.to_string(),
                target: target.id().to_string(),
            });
        }
        Ok(branches)
    }

    fn list_tags(&self) -> Result<Vec<RefTarget>> {
        let names = self.repo.tag_names(None).map_err(MinerError::backend)?;
        let mut tags = Vec::new();
        for name in names.iter().flatten() {
            if let Some(target) = self.commit_for_tag(name)? {
                tags.push(RefTarget {
                    name: name.to_string(),
                    target,
                });
            }
        }
        Ok(tags)
    }

    fn commit_for_tag(&self, name: &str) -> Result<Option<String>> {
        let reference = match self.repo.find_reference(&format!("refs/tags/{}", name)) {
            Ok(r) => r,
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(MinerError::backend(e)),
        };
        // Tags on trees or blobs have no commit
        Ok(reference.peel_to_commit().ok().map(|c| c.id().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines_drops_terminators() {
        assert_eq!(split_lines(b"a\r\nbb\nccc\n"), vec![&b"a"[..], b"bb", b"ccc"]);
        assert_eq!(split_lines(b"no newline"), vec![&b"no newline"[..]]);
        assert_eq!(split_lines(b"\n"), vec![&b""[..]]);
        assert!(split_lines(b"").is_empty());
    }

    #[test]
    fn test_scope_for_prefix() {
        assert_eq!(CommitScope::for_prefix(None), CommitScope::Head);
        assert_eq!(CommitScope::for_prefix(Some("")), CommitScope::Head);
        assert_eq!(
            CommitScope::for_prefix(Some("src/")),
            CommitScope::PathPrefix("src/".to_string())
        );
    }
}
