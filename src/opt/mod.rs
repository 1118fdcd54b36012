//! Optimization passes over the scalar IR.

pub mod slp;

use crate::ir::Function;

/// A function-level optimization pass.
pub trait OptimizationPass {
    /// Pass name for diagnostics.
    fn name(&self) -> &'static str;

    /// Run the pass. Returns true if the function was modified.
    fn run(&mut self, f: &mut Function) -> bool;
}

/// Run a sequence of passes until none of them changes the function, with an
/// iteration cap.
pub fn run_to_fixpoint(
    passes: &mut [Box<dyn OptimizationPass>],
    f: &mut Function,
    max_iterations: usize,
) -> bool {
    let mut any_changed = false;
    for _ in 0..max_iterations {
        let mut changed = false;
        for pass in passes.iter_mut() {
            changed |= pass.run(f);
        }
        any_changed |= changed;
        if !changed {
            break;
        }
    }
    any_changed
}
