//! Commit stability analysis
//!
//! Stability is the share of a commit's new lines that are still untouched by
//! the latest commit landing within the look-ahead window (the horizon):
//!
//!   stability = 1 - |AB ∩ BC| / |AB|
//!
//! where AB is the commit's own diff (new-side ranges) and BC the diff from the
//! commit to its horizon (old-side ranges). Both live in the commit's line
//! coordinates, so the overlap is a plain interval intersection.

use chrono::{DateTime, Months, Utc};
use miner_core::{CommitInfo, FileChange, MinerError};

use crate::backend::{CommitDiff, VcsBackend};
use crate::Result;

/// Index of the horizon commit for `commits[index]`.
///
/// `commits` is newest-first, so only `commits[..index]` can be later. The
/// horizon is the latest of those strictly after the target and strictly
/// before target + `window_months`; ties go to the lower index.
pub fn find_horizon(commits: &[CommitInfo], index: usize, window_months: u32) -> Option<usize> {
    let target = commits.get(index)?;
    let window_end = DateTime::<Utc>::from_timestamp(target.time, 0)?
        .checked_add_months(Months::new(window_months))?
        .timestamp();

    let mut horizon: Option<usize> = None;
    for (i, candidate) in commits[..index].iter().enumerate() {
        if candidate.time <= target.time || candidate.time >= window_end {
            continue;
        }
        match horizon {
            Some(best) if commits[best].time >= candidate.time => {}
            _ => horizon = Some(i),
        }
    }
    horizon
}

/// Sorts and coalesces half-open ranges; touching ranges are joined
pub fn merge_ranges(mut ranges: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
    ranges.sort_unstable();
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Length of the intersection of two half-open ranges
pub fn overlap_len(a: (u32, u32), b: (u32, u32)) -> u32 {
    a.1.min(b.1).saturating_sub(a.0.max(b.0))
}

/// `1 - intersection / ab_size`, 1.0 for an empty or degenerate ratio
pub fn stability_score(ab_size: u64, intersection: u64) -> f64 {
    if ab_size == 0 {
        return 1.0;
    }
    let score = 1.0 - intersection as f64 / ab_size as f64;
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

/// Returns `(ab_size, intersection)` for one file
fn file_overlap(ab: &FileChange, bc: &FileChange) -> (u64, u64) {
    let ab_size = ab.edits.iter().map(|e| u64::from(e.length_b())).sum();

    let bc_ranges = merge_ranges(bc.edits.iter().map(|e| (e.begin_a, e.end_a)).collect());
    let intersection = ab
        .edits
        .iter()
        .map(|e| {
            bc_ranges
                .iter()
                .map(|&range| u64::from(overlap_len((e.begin_b, e.end_b), range)))
                .sum::<u64>()
        })
        .sum();

    (ab_size, intersection)
}

/// Scores a commit diff against the diff to its horizon
pub fn score_diffs(ab: &CommitDiff, bc: &CommitDiff) -> f64 {
    let mut ab_size = 0u64;
    let mut intersection = 0u64;

    for ab_file in &ab.files {
        let Some(bc_file) = bc.files.iter().find(|f| f.touches(&ab_file.path)) else {
            continue;
        };
        if ab_file.edits.is_empty() || bc_file.edits.is_empty() {
            continue;
        }
        let (size, inter) = file_overlap(ab_file, bc_file);
        ab_size += size;
        intersection += inter;
    }

    stability_score(ab_size, intersection)
}

/// Scores a commit whose own diff is already known against its horizon
pub fn score_against<B: VcsBackend>(
    backend: &B,
    target: &CommitInfo,
    horizon: &CommitInfo,
    ab: &CommitDiff,
) -> Result<f64> {
    let bc = backend.diff(Some(&target.hash), &horizon.hash)?;
    let score = score_diffs(ab, &bc);

    log::debug!(
        "Stability of {} against {}: {:.3}",
        target.short_hash(),
        horizon.short_hash(),
        score
    );
    Ok(score)
}

/// Stability of `commits[index]` against the rest of the newest-first list
pub fn analyze_commit<B: VcsBackend>(
    backend: &B,
    commits: &[CommitInfo],
    index: usize,
    window_months: u32,
) -> Result<f64> {
    let target = commits.get(index).ok_or_else(|| MinerError::MalformedHistory {
        commit: format!("#{}", index),
        reason: "commit index out of range".to_string(),
    })?;

    let Some(h) = find_horizon(commits, index, window_months) else {
        return Ok(1.0);
    };

    let ab = backend.diff(target.first_parent(), &target.hash)?;
    score_against(backend, target, &commits[h], &ab)
}
