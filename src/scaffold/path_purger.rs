//! Scaffold path deduplication
//!
//! Paths found from different start vertices describe overlapping pieces of
//! the same scaffold. Contained paths are removed and overlapping ones are
//! merged until no path contains or overlaps another, in either orientation.

use tracing::debug;

use crate::core::data_structures::{OrientedContig, ScaffoldPath};

#[derive(Debug, Clone, Copy, Default)]
pub struct PathPurger;

impl PathPurger {
    pub fn new() -> Self {
        Self
    }

    /// Purge `paths` in place to a fixed point; returns how many were removed
    pub fn purge(&self, paths: &mut Vec<ScaffoldPath>) -> usize {
        let before = paths.len();
        paths.retain(|p| !p.is_empty());

        loop {
            if remove_contained(paths) {
                continue;
            }
            if !merge_first_overlap(paths) {
                break;
            }
        }

        let removed = before - paths.len();
        debug!("Path purger kept {} of {} paths", paths.len(), before);
        removed
    }
}

/// `small` appears as a contiguous run of `big` read either way
pub fn is_contained(small: &ScaffoldPath, big: &ScaffoldPath) -> bool {
    if small.is_empty() {
        return true;
    }
    if small.len() > big.len() {
        return false;
    }
    let needle = small.oriented_contigs();
    [big.oriented_contigs(), big.reversed().oriented_contigs()]
        .iter()
        .any(|hay| hay.windows(needle.len()).any(|w| w == needle.as_slice()))
}

fn remove_contained(paths: &mut Vec<ScaffoldPath>) -> bool {
    let n = paths.len();
    let mut keep = vec![true; n];
    for i in 0..n {
        if !keep[i] {
            continue;
        }
        for j in 0..n {
            if i == j || !keep[j] {
                continue;
            }
            // identical paths: the earlier one already dropped this one
            if j < i && paths[j].len() == paths[i].len() {
                continue;
            }
            if is_contained(&paths[j], &paths[i]) {
                keep[j] = false;
            }
        }
    }

    if keep.iter().all(|&k| k) {
        return false;
    }
    let mut flags = keep.into_iter();
    paths.retain(|_| flags.next().unwrap_or(true));
    true
}

/// Longest proper overlap where the tail of `left` equals the head of `right`
fn overlap_len(left: &[OrientedContig], right: &[OrientedContig]) -> usize {
    let limit = left.len().min(right.len()).saturating_sub(1);
    (1..=limit)
        .rev()
        .find(|&ov| left[left.len() - ov..] == right[..ov])
        .unwrap_or(0)
}

/// Best merge of two paths, if they overlap in some orientation
fn merge(earlier: &ScaffoldPath, later: &ScaffoldPath) -> Option<ScaffoldPath> {
    let first = earlier.oriented_contigs();
    let mut best: Option<(usize, ScaffoldPath)> = None;

    for candidate in [later.clone(), later.reversed()] {
        let second = candidate.oriented_contigs();

        let tail = overlap_len(&first, &second);
        if tail > 0 && best.as_ref().map_or(true, |(ov, _)| tail > *ov) {
            let mut merged = earlier.clone();
            merged.steps.extend_from_slice(&candidate.steps[tail..]);
            best = Some((tail, merged));
        }

        let head = overlap_len(&second, &first);
        if head > 0 && best.as_ref().map_or(true, |(ov, _)| head > *ov) {
            let mut merged = candidate.clone();
            merged.steps.extend_from_slice(&earlier.steps[head..]);
            best = Some((head, merged));
        }
    }
    best.map(|(_, merged)| merged)
}

fn merge_first_overlap(paths: &mut Vec<ScaffoldPath>) -> bool {
    for i in 0..paths.len() {
        for j in i + 1..paths.len() {
            let Some(merged) = merge(&paths[i], &paths[j]) else {
                continue;
            };
            if merged.is_simple() {
                paths[i] = merged;
                paths.remove(j);
            } else if paths[i].len() < paths[j].len() {
                paths.remove(i);
            } else {
                paths.remove(j);
            }
            return true;
        }
    }
    false
}
