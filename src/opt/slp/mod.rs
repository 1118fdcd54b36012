//! Superword-level parallelism: packing isomorphic scalar statements into
//! vector instructions.
//!
//! The pipeline runs per function, to a fixed point:
//!
//! 1. [`legality`]: pairwise packing oracle (isomorphism, independence,
//!    memory adjacency)
//! 2. [`candidates`]: bounded pair discovery plus iterative widening
//! 3. [`graph`]: producer/consumer edges between packs
//! 4. [`cost`]: net pack costs against a target model
//! 5. [`select`]: exact conflict-free subset selection
//! 6. [`permute`]: lane-ordering choice to minimize inter-pack shuffles
//! 7. [`emit`]: rewriting chosen packs into vector instructions
//!
//! Each iteration starts from a fresh analysis snapshot of the rewritten
//! function, so later rounds can pack values the previous round produced.
//! Every bounding constant lives in [`SlpConfig`].

pub mod candidates;
pub mod cost;
pub mod emit;
pub mod graph;
pub mod legality;
pub mod permute;
pub mod select;

pub use candidates::{CandidateSet, Pack, PackId};
pub use cost::{CostEstimator, OpCost, SimdLevel, TargetCostModel};
pub use emit::EmitResult;
pub use graph::PackGraph;
pub use permute::Perm;
pub use select::Selection;

use crate::analysis::{AliasOracle, MemoryDeps};
use crate::ir::Function;
use crate::opt::OptimizationPass;
use crate::trace::{NullSink, TraceEvent, TraceSink};
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Tuning knobs for the vectorizer. Every search and set-size bound is
/// explicit here; nothing is hard-coded in the pipeline stages.
#[derive(Debug, Clone)]
pub struct SlpConfig {
    /// Pair discovery considers candidates at most this many candidate
    /// statements apart.
    pub neighbor_distance: usize,

    /// Pairwise candidate set size cap before widening.
    pub candidate_ceiling: usize,

    /// Maximum number of widening merges per collection.
    pub merge_budget: usize,

    /// Two packs may merge when the gap between them, in candidate
    /// statements, is at most this.
    pub gap_window: usize,

    /// Widest pack widening may build, in lanes.
    pub max_pack_width: usize,

    /// Candidate set size cap after widening.
    pub widened_ceiling: usize,

    /// Full lane-ordering enumeration up to this pack width; wider packs
    /// keep the identity ordering.
    pub max_permute_width: usize,

    /// Wall-clock budget for exact pack selection. When exceeded, the
    /// search returns its best feasible incumbent.
    pub select_budget: Duration,

    /// Cap on outer vectorize-and-retry iterations.
    pub max_iterations: usize,
}

impl Default for SlpConfig {
    fn default() -> Self {
        SlpConfig {
            neighbor_distance: 1,
            candidate_ceiling: 64,
            merge_budget: 128,
            gap_window: 3,
            max_pack_width: 32,
            widened_ceiling: 128,
            max_permute_width: 4,
            select_budget: Duration::from_millis(100),
            max_iterations: 8,
        }
    }
}

impl SlpConfig {
    /// Larger search bounds for offline compilation.
    pub fn aggressive() -> Self {
        SlpConfig {
            neighbor_distance: 3,
            candidate_ceiling: 256,
            merge_budget: 512,
            gap_window: 7,
            widened_ceiling: 512,
            max_permute_width: 5,
            select_budget: Duration::from_secs(2),
            ..Self::default()
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Counters accumulated across all iterations of one pass run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlpStats {
    /// Candidate packs surviving collection and widening.
    pub candidates: usize,

    /// Packs chosen by selection.
    pub selected: usize,

    /// Packs rewritten into vector instructions.
    pub emitted: usize,

    /// Chosen packs the emitter abandoned.
    pub skipped: usize,

    /// Scalar instructions erased.
    pub scalars_erased: usize,

    /// Outer iterations executed.
    pub iterations: usize,
}

impl SlpStats {
    fn absorb(&mut self, result: &EmitResult) {
        self.emitted += result.vector_ops;
        self.skipped += result.packs_skipped;
        self.scalars_erased += result.scalars_erased;
    }
}

// =============================================================================
// Pass
// =============================================================================

/// The SLP vectorization pass.
pub struct SlpVectorize {
    config: SlpConfig,
    estimator: CostEstimator,
    stats: SlpStats,
}

impl SlpVectorize {
    pub fn new(config: SlpConfig) -> Self {
        SlpVectorize {
            config,
            estimator: CostEstimator::default(),
            stats: SlpStats::default(),
        }
    }

    /// Use a specific target cost model instead of the default.
    pub fn with_model(mut self, model: TargetCostModel) -> Self {
        self.estimator = CostEstimator::new(model);
        self
    }

    /// Counters from the most recent run.
    pub fn stats(&self) -> &SlpStats {
        &self.stats
    }

    /// Run the pass, reporting decisions to `sink`. Returns true when the
    /// function was modified.
    pub fn run_with_sink(&mut self, f: &mut Function, sink: &mut dyn TraceSink) -> bool {
        self.stats = SlpStats::default();
        let mut any_changed = false;

        for iteration in 0..self.config.max_iterations {
            self.stats.iterations = iteration + 1;
            let changed = self.run_one_iteration(f, sink);
            sink.event(TraceEvent::IterationFinished { iteration, changed });
            if !changed {
                break;
            }
            any_changed = true;
        }

        any_changed
    }

    /// One collect/select/emit round over a fresh analysis snapshot.
    fn run_one_iteration(&mut self, f: &mut Function, sink: &mut dyn TraceSink) -> bool {
        let alias = AliasOracle::new();
        let deps = MemoryDeps::build(f, &alias);

        let set = candidates::collect(f, &alias, &deps, &self.config, sink);
        self.stats.candidates += set.len();
        if set.len() == 0 {
            return false;
        }

        let graph = PackGraph::build(f, &set);
        let costs = self.estimator.all_pack_costs(f, &set);
        let selection = select::select(&set, &costs, self.config.select_budget);
        sink.event(TraceEvent::SelectionFinished {
            chosen: selection.count(),
            total_cost: selection.total_cost,
            optimal: selection.optimal,
        });
        self.stats.selected += selection.count();
        if selection.count() == 0 {
            return false;
        }

        let perms = permute::choose_permutations(
            f,
            &set,
            &graph,
            &self.estimator,
            self.config.max_permute_width,
        );
        let result = emit::emit(f, &alias, &set, &selection, &perms, &graph, sink);
        self.stats.absorb(&result);
        result.changed
    }
}

impl OptimizationPass for SlpVectorize {
    fn name(&self) -> &'static str {
        "slp-vectorize"
    }

    fn run(&mut self, f: &mut Function) -> bool {
        self.run_with_sink(f, &mut NullSink)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Opcode, ScalarType};
    use crate::trace::RecordingSink;

    fn unrolled_add(f: &mut Function, lanes: i64) {
        let bb = f.entry_block();
        let a = f.param(0);
        let b = f.param(1);
        let c = f.param(2);
        for i in 0..lanes {
            let pa = f.ptr_offset(a, i * 4);
            let pb = f.ptr_offset(b, i * 4);
            let pc = f.ptr_offset(c, i * 4);
            let la = f.load(bb, pa, ScalarType::F32);
            let lb = f.load(bb, pb, ScalarType::F32);
            let sum = f.binary(bb, BinOp::Add, la, lb);
            f.store(bb, pc, sum);
        }
    }

    fn count_placed(f: &Function, pred: impl Fn(&Opcode) -> bool) -> usize {
        (0..f.block_count() as u32)
            .flat_map(|b| f.block_insts(b).iter().copied().collect::<Vec<_>>())
            .filter(|&id| pred(f.opcode(id)))
            .count()
    }

    #[test]
    fn test_pass_vectorizes_unrolled_loop() {
        let mut f = Function::new();
        unrolled_add(&mut f, 4);

        let mut pass = SlpVectorize::new(SlpConfig::default());
        assert!(pass.run(&mut f));
        assert!(pass.stats().emitted >= 3);
        assert_eq!(count_placed(&f, |op| matches!(op, Opcode::Store)), 0);
        assert_eq!(count_placed(&f, |op| matches!(op, Opcode::VecStore)), 1);
    }

    #[test]
    fn test_pass_is_idempotent() {
        let mut f = Function::new();
        unrolled_add(&mut f, 4);

        let mut pass = SlpVectorize::new(SlpConfig::default());
        assert!(pass.run(&mut f));
        let after_first: Vec<_> = f.block_insts(f.entry_block()).to_vec();

        // A second run finds nothing left to pack.
        assert!(!pass.run(&mut f));
        assert_eq!(f.block_insts(f.entry_block()), after_first.as_slice());
    }

    #[test]
    fn test_pass_leaves_scalar_code_alone() {
        // A lone dependent chain has no isomorphic independent statements.
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let l = f.load(bb, p, ScalarType::F32);
        let d = f.binary(bb, BinOp::Mul, l, l);
        let e = f.binary(bb, BinOp::Add, d, l);
        f.store(bb, p, e);

        let mut pass = SlpVectorize::new(SlpConfig::default());
        assert!(!pass.run(&mut f));
        assert_eq!(pass.stats().emitted, 0);
    }

    #[test]
    fn test_trace_reports_pipeline_stages() {
        let mut f = Function::new();
        unrolled_add(&mut f, 2);

        let mut pass = SlpVectorize::new(SlpConfig::default());
        let mut sink = RecordingSink::new();
        assert!(pass.run_with_sink(&mut f, &mut sink));

        assert!(sink.count(|e| matches!(e, TraceEvent::CandidatesCollected { .. })) >= 1);
        assert!(sink.count(|e| matches!(e, TraceEvent::SelectionFinished { .. })) >= 1);
        assert!(sink.count(|e| matches!(e, TraceEvent::PackEmitted { .. })) >= 3);
        // The final iteration reports no change.
        assert!(sink.count(|e| matches!(
            e,
            TraceEvent::IterationFinished { changed: false, .. }
        )) == 1);
    }

    #[test]
    fn test_iteration_cap_respected() {
        let mut f = Function::new();
        unrolled_add(&mut f, 4);

        let config = SlpConfig {
            max_iterations: 1,
            ..SlpConfig::default()
        };
        let mut pass = SlpVectorize::new(config);
        pass.run(&mut f);
        assert_eq!(pass.stats().iterations, 1);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut f = Function::new();
        unrolled_add(&mut f, 2);

        let mut pass = SlpVectorize::new(SlpConfig::default());
        pass.run(&mut f);
        let stats = *pass.stats();
        assert!(stats.candidates >= 4);
        assert!(stats.selected >= 4);
        assert_eq!(stats.emitted, 4);
        assert_eq!(stats.scalars_erased, 8);
    }
}
