//! Memory-dependence oracle.
//!
//! A per-function snapshot relating memory accesses to the writes that
//! define the memory they observe:
//!
//! - For each access, its **immediate clobbering write**: the nearest
//!   preceding store in the same block that may alias it.
//! - The inverse: for each write, the accesses whose immediate clobbering
//!   write it is.
//!
//! The snapshot is built once per optimization iteration and is only valid
//! until the function is next mutated.

use super::alias::AliasOracle;
use crate::ir::{Function, InstId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Immediate-clobber relation over one function snapshot.
#[derive(Debug, Default)]
pub struct MemoryDeps {
    /// access -> nearest preceding may-aliasing store.
    clobbering: FxHashMap<InstId, InstId>,

    /// store -> accesses it is the immediate clobber of.
    clobbered: FxHashMap<InstId, SmallVec<[InstId; 4]>>,
}

impl MemoryDeps {
    /// Build the relation for every block of a function.
    pub fn build(f: &Function, alias: &AliasOracle) -> Self {
        let mut deps = MemoryDeps::default();

        for block in 0..f.block_count() as u32 {
            let mut prior_stores: Vec<InstId> = Vec::new();

            for &id in f.block_insts(block) {
                let op = f.opcode(id);
                if !op.is_memory_access() {
                    continue;
                }

                // Nearest preceding store that may alias this access.
                for &store in prior_stores.iter().rev() {
                    if !alias.no_alias(f, store, id) {
                        deps.clobbering.insert(id, store);
                        deps.clobbered.entry(store).or_default().push(id);
                        break;
                    }
                }

                if op.is_store() {
                    prior_stores.push(id);
                }
            }
        }

        deps
    }

    /// The immediate clobbering write of an access, if any.
    #[inline]
    pub fn immediate_clobber(&self, access: InstId) -> Option<InstId> {
        self.clobbering.get(&access).copied()
    }

    /// The accesses a write immediately clobbers.
    #[inline]
    pub fn clobbered_accesses(&self, write: InstId) -> &[InstId] {
        self.clobbered.get(&write).map_or(&[], |v| v.as_slice())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ScalarType;

    #[test]
    fn test_load_sees_prior_store() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let c = f.const_int(7, ScalarType::I32);
        let s = f.store(bb, p, c);
        let l = f.load(bb, p, ScalarType::I32);

        let deps = MemoryDeps::build(&f, &AliasOracle::new());
        assert_eq!(deps.immediate_clobber(l), Some(s));
        assert_eq!(deps.clobbered_accesses(s), &[l]);
    }

    #[test]
    fn test_disjoint_store_not_clobbering() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let a8 = f.ptr_offset(p, 8);
        let c = f.const_int(7, ScalarType::I32);
        let s = f.store(bb, a8, c);
        let l = f.load(bb, p, ScalarType::I32);

        let deps = MemoryDeps::build(&f, &AliasOracle::new());
        assert_eq!(deps.immediate_clobber(l), None);
        assert!(deps.clobbered_accesses(s).is_empty());
    }

    #[test]
    fn test_nearest_store_wins() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let c = f.const_int(1, ScalarType::I32);
        let s1 = f.store(bb, p, c);
        let s2 = f.store(bb, p, c);
        let l = f.load(bb, p, ScalarType::I32);

        let deps = MemoryDeps::build(&f, &AliasOracle::new());
        assert_eq!(deps.immediate_clobber(l), Some(s2));
        // s2 itself is clobbered by s1 (store-after-store).
        assert_eq!(deps.immediate_clobber(s2), Some(s1));
    }

    #[test]
    fn test_independent_loads_unclobbered() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let l1 = f.load(bb, p, ScalarType::F64);
        let l2 = f.load(bb, p, ScalarType::F64);

        let deps = MemoryDeps::build(&f, &AliasOracle::new());
        assert_eq!(deps.immediate_clobber(l1), None);
        assert_eq!(deps.immediate_clobber(l2), None);
    }
}
