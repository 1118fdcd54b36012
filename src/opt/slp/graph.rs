//! Producer/consumer graph over candidate packs.
//!
//! Pack A has an edge to pack B when some lane of A is a value operand of
//! some lane of B. Edge multiplicity is tolerated; consumers only walk
//! successors and cost individual operand positions. Acyclicity follows
//! from acyclic value dependence in the source IR and is not independently
//! verified; the topological order simply omits any node on a cycle.

use super::candidates::{CandidateSet, PackId};
use crate::ir::Function;
use std::collections::VecDeque;

/// Directed graph with packs as nodes.
#[derive(Debug, Default)]
pub struct PackGraph {
    succs: Vec<Vec<PackId>>,
    preds: Vec<Vec<PackId>>,
}

impl PackGraph {
    /// Build the graph from lane-level def-use edges.
    pub fn build(f: &Function, set: &CandidateSet) -> Self {
        let n = set.len();
        let mut graph = PackGraph {
            succs: vec![Vec::new(); n],
            preds: vec![Vec::new(); n],
        };

        for (producer, pack) in set.iter() {
            for &lane in &pack.lanes {
                for &user in f.users(lane) {
                    for &consumer in set.packs_of(user) {
                        if consumer != producer {
                            graph.succs[producer as usize].push(consumer);
                            graph.preds[consumer as usize].push(producer);
                        }
                    }
                }
            }
        }

        graph
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.succs.len()
    }

    /// Consumer packs of a pack (with multiplicity).
    #[inline]
    pub fn successors(&self, pack: PackId) -> &[PackId] {
        &self.succs[pack as usize]
    }

    /// Producer packs of a pack (with multiplicity).
    #[inline]
    pub fn predecessors(&self, pack: PackId) -> &[PackId] {
        &self.preds[pack as usize]
    }

    /// Kahn topological order (producers before consumers).
    ///
    /// Nodes on a directed cycle never reach in-degree zero and are left
    /// out of the returned order.
    pub fn topological_order(&self) -> Vec<PackId> {
        let n = self.node_count();
        let mut indegree: Vec<usize> = self.preds.iter().map(|p| p.len()).collect();
        let mut order = Vec::with_capacity(n);
        let mut ready: VecDeque<PackId> = (0..n as PackId)
            .filter(|&v| indegree[v as usize] == 0)
            .collect();

        while let Some(v) = ready.pop_front() {
            order.push(v);
            for &u in &self.succs[v as usize] {
                indegree[u as usize] -= 1;
                if indegree[u as usize] == 0 {
                    ready.push_back(u);
                }
            }
        }

        order
    }

    /// Kahn topological order over the subgraph induced by `keep`.
    ///
    /// Edges touching unkept packs are ignored, so a cycle among unkept
    /// candidates never hides kept packs downstream of it. Kept packs on a
    /// directed cycle among themselves are still left out.
    pub fn topological_order_of(&self, keep: &[bool]) -> Vec<PackId> {
        let n = self.node_count();
        debug_assert_eq!(keep.len(), n);

        let mut indegree = vec![0usize; n];
        for v in 0..n {
            if !keep[v] {
                continue;
            }
            for &u in &self.succs[v] {
                if keep[u as usize] {
                    indegree[u as usize] += 1;
                }
            }
        }

        let mut order = Vec::new();
        let mut ready: VecDeque<PackId> = (0..n as PackId)
            .filter(|&v| keep[v as usize] && indegree[v as usize] == 0)
            .collect();
        while let Some(v) = ready.pop_front() {
            order.push(v);
            for &u in &self.succs[v as usize] {
                if keep[u as usize] {
                    indegree[u as usize] -= 1;
                    if indegree[u as usize] == 0 {
                        ready.push_back(u);
                    }
                }
            }
        }

        order
    }

    /// Check whether the graph has no directed cycle.
    pub fn is_acyclic(&self) -> bool {
        self.topological_order().len() == self.node_count()
    }
}

// =============================================================================
// Tests
// =============================================================================
