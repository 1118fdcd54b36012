//! Lane-ordering choice by dynamic programming.
//!
//! Every pack may materialize its lanes in any order; a consumer whose
//! operand lanes arrive out of position pays a shuffle. Packs are processed
//! in reverse topological order (sinks first), so when a pack is costed
//! under a candidate ordering, the best achievable cost of every consumer
//! is already known:
//!
//! dp[v][x] = Σ over consumers u of min over orderings y of
//!            (edge shuffle cost from v-under-x to u-under-y + dp[u][y])
//!
//! The candidate ordering set is all w! permutations up to a configurable
//! width and just the identity above it; memory packs are pinned to the
//! identity regardless of width, because the emitter materializes wide
//! loads and stores straight from the contiguous slot run and would never
//! realize another ordering. Final orderings are extracted
//! top-down in forward topological order: each pack commits to the ordering
//! minimizing the shuffle cost of its already-committed producer edges plus
//! its own dp value, so producer and consumer choices stay coordinated.
//! Ties resolve to the first minimal index, which keeps the identity
//! whenever it is as good as anything else.

use super::candidates::CandidateSet;
use super::cost::CostEstimator;
use super::graph::PackGraph;
use crate::ir::Function;
use smallvec::SmallVec;

/// A lane ordering: entry `i` names the original lane materialized at
/// vector position `i`.
pub type Perm = SmallVec<[u8; 8]>;

/// Identity ordering of a width.
pub fn identity_perm(width: usize) -> Perm {
    (0..width as u8).collect()
}

/// Advance to the next lexicographic permutation in place. Returns false
/// after wrapping back to the first.
fn next_permutation(p: &mut [u8]) -> bool {
    if p.len() < 2 {
        return false;
    }
    let mut i = p.len() - 1;
    while i > 0 && p[i - 1] >= p[i] {
        i -= 1;
    }
    if i == 0 {
        p.reverse();
        return false;
    }
    let mut j = p.len() - 1;
    while p[j] <= p[i - 1] {
        j -= 1;
    }
    p.swap(i - 1, j);
    p[i..].reverse();
    true
}

/// Candidate orderings for a pack width: all permutations in lexicographic
/// order when `width ≤ max_width`, identity only above.
pub fn generate_perms(width: usize, max_width: usize) -> Vec<Perm> {
    if width == 0 {
        return Vec::new();
    }
    let mut perms = vec![identity_perm(width)];
    if width <= max_width {
        let mut p = identity_perm(width);
        while next_permutation(&mut p) {
            perms.push(p.clone());
        }
    }
    perms
}

/// Choose a lane ordering for every candidate pack. Packs left out of the
/// topological order keep the identity.
pub fn choose_permutations(
    f: &Function,
    set: &CandidateSet,
    graph: &PackGraph,
    est: &CostEstimator,
    max_width: usize,
) -> Vec<Perm> {
    let n = set.len();
    if n == 0 {
        return Vec::new();
    }

    let candidates: Vec<Vec<Perm>> = set
        .packs()
        .iter()
        .map(|p| {
            if p.is_memory(f) {
                vec![identity_perm(p.width())]
            } else {
                generate_perms(p.width(), max_width)
            }
        })
        .collect();
    let mut dp: Vec<Vec<f32>> = candidates.iter().map(|c| vec![0.0; c.len()]).collect();

    let order = graph.topological_order();
    for &v in order.iter().rev() {
        let succs = graph.successors(v);
        if succs.is_empty() {
            continue;
        }
        let src = set.pack(v);

        for x in 0..candidates[v as usize].len() {
            let src_perm = candidates[v as usize][x].clone();
            let mut total = 0.0f32;

            for &u in succs {
                let dst = set.pack(u);
                let mut best: Option<f32> = None;
                for (y, dst_perm) in candidates[u as usize].iter().enumerate() {
                    let edge = est.shuffle_cost_permuted(f, src, dst, &src_perm, dst_perm);
                    let cand = edge + dp[u as usize][y];
                    if best.is_none_or(|b| cand < b) {
                        best = Some(cand);
                    }
                }
                total += best.unwrap_or(0.0);
            }
            dp[v as usize][x] = total;
        }
    }

    // Top-down extraction: commit each pack to the ordering minimizing
    // committed-producer edge costs plus its dp value.
    let mut chosen: Vec<Perm> = set
        .packs()
        .iter()
        .map(|p| identity_perm(p.width()))
        .collect();
    let mut committed = vec![false; n];

    for &v in &order {
        let mut best_idx = 0usize;
        let mut best_cost = f32::INFINITY;
        for (x, perm) in candidates[v as usize].iter().enumerate() {
            let mut cost = dp[v as usize][x];
            for &p in graph.predecessors(v) {
                if committed[p as usize] {
                    cost += est.shuffle_cost_permuted(
                        f,
                        set.pack(p),
                        set.pack(v),
                        &chosen[p as usize],
                        perm,
                    );
                }
            }
            if cost < best_cost {
                best_cost = cost;
                best_idx = x;
            }
        }
        chosen[v as usize] = candidates[v as usize][best_idx].clone();
        committed[v as usize] = true;
    }

    chosen
}

// =============================================================================
// Tests
// =============================================================================
