//! Exact pack selection by branch-and-bound.
//!
//! Minimize the sum of chosen pack costs subject to exclusivity: no scalar
//! instruction may be claimed by two chosen packs. The empty selection
//! (cost 0) is always feasible and the search never returns worse.
//!
//! Packs are visited in ascending cost order so good solutions appear early
//! and the suffix bound bites sooner. The suffix bound at position `i` is
//! the sum of all remaining negative costs from `i` on: no feasible
//! completion can improve the objective by more, because non-negative packs
//! never help. The incumbent is seeded by a greedy conflict-avoiding pass,
//! so a time-boxed search always returns a usable feasible solution.

use super::candidates::CandidateSet;
use crate::ir::InstId;
use rustc_hash::FxHashSet;
use std::time::{Duration, Instant};

/// Result of pack selection.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Chosen flag per pack, indexed like the candidate list.
    pub chosen: Vec<bool>,

    /// Total cost of the chosen packs (≤ 0).
    pub total_cost: f32,

    /// False when the wall-clock budget truncated the search before the
    /// tree was exhausted.
    pub optimal: bool,
}

impl Selection {
    fn empty(n: usize) -> Self {
        Selection {
            chosen: vec![false; n],
            total_cost: 0.0,
            optimal: true,
        }
    }

    /// Number of chosen packs.
    pub fn count(&self) -> usize {
        self.chosen.iter().filter(|&&c| c).count()
    }
}

struct Search<'a> {
    set: &'a CandidateSet,
    costs: &'a [f32],
    /// Pack indices in ascending cost order.
    order: Vec<u32>,
    /// Remaining possible improvement from position i on.
    suffix_neg: Vec<f32>,

    cur: Vec<bool>,
    cur_cost: f32,
    claimed: FxHashSet<InstId>,

    best: Vec<bool>,
    best_cost: f32,

    deadline: Instant,
    timed_out: bool,
}

/// Select a cost-minimal conflict-free subset of packs.
pub fn select(set: &CandidateSet, costs: &[f32], budget: Duration) -> Selection {
    let n = set.len();
    debug_assert_eq!(costs.len(), n);
    if n == 0 {
        return Selection::empty(0);
    }

    let mut order: Vec<u32> = (0..n as u32).collect();
    order.sort_by(|&a, &b| {
        costs[a as usize]
            .partial_cmp(&costs[b as usize])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut suffix_neg = vec![0.0f32; n + 1];
    for i in (0..n).rev() {
        let c = costs[order[i] as usize];
        suffix_neg[i] = suffix_neg[i + 1] + if c < 0.0 { c } else { 0.0 };
    }

    let mut search = Search {
        set,
        costs,
        order,
        suffix_neg,
        cur: vec![false; n],
        cur_cost: 0.0,
        claimed: FxHashSet::default(),
        best: vec![false; n],
        best_cost: 0.0,
        deadline: Instant::now() + budget,
        timed_out: false,
    };

    search.seed_greedy();
    search.dfs(0);

    Selection {
        chosen: search.best,
        total_cost: search.best_cost,
        optimal: !search.timed_out,
    }
}

impl Search<'_> {
    /// Seed the incumbent: walk packs in cost order, taking every
    /// negative-cost pack that conflicts with nothing taken so far.
    fn seed_greedy(&mut self) {
        let mut claimed: FxHashSet<InstId> = FxHashSet::default();
        let mut cost = 0.0f32;
        let mut chosen = vec![false; self.costs.len()];

        for &idx in &self.order {
            let c = self.costs[idx as usize];
            if c >= 0.0 {
                break;
            }
            let pack = self.set.pack(idx);
            if pack.lanes.iter().any(|l| claimed.contains(l)) {
                continue;
            }
            for &lane in &pack.lanes {
                claimed.insert(lane);
            }
            chosen[idx as usize] = true;
            cost += c;
        }

        if cost < self.best_cost {
            self.best_cost = cost;
            self.best = chosen;
        }
    }

    fn dfs(&mut self, pos: usize) {
        if self.timed_out {
            return;
        }
        if Instant::now() > self.deadline {
            self.timed_out = true;
            return;
        }

        if pos == self.order.len() {
            // Only complete conflict-free assignments become the incumbent.
            if self.cur_cost < self.best_cost {
                self.best_cost = self.cur_cost;
                self.best.copy_from_slice(&self.cur);
            }
            return;
        }

        if self.cur_cost + self.suffix_neg[pos] >= self.best_cost {
            return;
        }

        let idx = self.order[pos];
        let cost = self.costs[idx as usize];
        let conflict = self
            .set
            .pack(idx)
            .lanes
            .iter()
            .any(|l| self.claimed.contains(l));

        // Beneficial packs are tried take-first to tighten the bound early.
        if cost < 0.0 && !conflict {
            self.take(pos, idx, cost);
            self.dfs(pos + 1);
        } else {
            self.dfs(pos + 1);
            if !conflict {
                self.take(pos, idx, cost);
            }
        }
    }

    fn take(&mut self, pos: usize, idx: u32, cost: f32) {
        let lanes = self.set.pack(idx).lanes.clone();
        let mut newly: Vec<InstId> = Vec::with_capacity(lanes.len());
        for &lane in &lanes {
            if self.claimed.insert(lane) {
                newly.push(lane);
            }
        }
        self.cur[idx as usize] = true;
        self.cur_cost += cost;

        self.dfs(pos + 1);

        self.cur_cost -= cost;
        self.cur[idx as usize] = false;
        for lane in newly {
            self.claimed.remove(&lane);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
