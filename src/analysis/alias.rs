//! Alias oracle over constant-offset addressing.
//!
//! Answers exactly one question: are two memory accesses provably disjoint?
//! Everything unproven is `MayAlias`. The proof discipline is:
//!
//! - Addresses decompose into a root object plus a constant byte offset by
//!   stripping `PtrOffset` chains.
//! - Distinct function parameters are distinct root objects and never
//!   overlap.
//! - The same root object aliases itself unless the constant byte ranges of
//!   the two accesses are provably non-overlapping.

use crate::ir::{Function, InstId, Opcode};

/// Result of an alias query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasResult {
    /// Provably disjoint.
    NoAlias,
    /// Overlap cannot be ruled out.
    MayAlias,
}

/// Stateless alias oracle.
#[derive(Debug, Clone, Copy, Default)]
pub struct AliasOracle;

impl AliasOracle {
    pub fn new() -> Self {
        AliasOracle
    }

    /// Decompose an address into its root object and accumulated constant
    /// byte offset, stripping `PtrOffset` chains.
    pub fn base_and_offset(&self, f: &Function, mut addr: InstId) -> (InstId, i64) {
        let mut offset = 0i64;
        while let Opcode::PtrOffset(delta) = *f.opcode(addr) {
            offset = offset.wrapping_add(delta);
            match f.inst(addr).operands.get(0) {
                Some(base) => addr = base,
                None => break,
            }
        }
        (addr, offset)
    }

    /// Alias query between two memory accesses.
    ///
    /// Non-memory instructions conservatively `MayAlias`.
    pub fn alias(&self, f: &Function, a: InstId, b: InstId) -> AliasResult {
        let (Some(addr_a), Some(addr_b)) = (f.inst(a).address(), f.inst(b).address()) else {
            return AliasResult::MayAlias;
        };

        let (root_a, off_a) = self.base_and_offset(f, addr_a);
        let (root_b, off_b) = self.base_and_offset(f, addr_b);

        if root_a != root_b {
            // Only parameters are known-distinct root objects.
            let distinct_roots = matches!(f.opcode(root_a), Opcode::Param(_))
                && matches!(f.opcode(root_b), Opcode::Param(_));
            return if distinct_roots {
                AliasResult::NoAlias
            } else {
                AliasResult::MayAlias
            };
        }

        // Same root: compare constant byte ranges.
        let size_a = f
            .access_ty(a)
            .and_then(|ty| f.layout().store_size(ty));
        let size_b = f
            .access_ty(b)
            .and_then(|ty| f.layout().store_size(ty));
        let (Some(size_a), Some(size_b)) = (size_a, size_b) else {
            return AliasResult::MayAlias;
        };

        let end_a = off_a.saturating_add(size_a as i64);
        let end_b = off_b.saturating_add(size_b as i64);
        if end_a <= off_b || end_b <= off_a {
            AliasResult::NoAlias
        } else {
            AliasResult::MayAlias
        }
    }

    /// Convenience predicate: proven no-alias.
    #[inline]
    pub fn no_alias(&self, f: &Function, a: InstId, b: InstId) -> bool {
        self.alias(f, a, b) == AliasResult::NoAlias
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
    fn test_distinct_params_no_alias() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let q = f.param(1);
        let la = f.load(bb, p, ScalarType::F32);
        let lb = f.load(bb, q, ScalarType::F32);

        let aa = AliasOracle::new();
        assert_eq!(aa.alias(&f, la, lb), AliasResult::NoAlias);
    }

    #[test]
    fn test_same_root_disjoint_offsets() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let a0 = f.ptr_offset(p, 0);
        let a8 = f.ptr_offset(p, 8);
        let la = f.load(bb, a0, ScalarType::F32);
        let lb = f.load(bb, a8, ScalarType::F32);

        let aa = AliasOracle::new();
        assert_eq!(aa.alias(&f, la, lb), AliasResult::NoAlias);
    }

    #[test]
    fn test_same_root_overlapping_offsets() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let a0 = f.ptr_offset(p, 0);
        let a2 = f.ptr_offset(p, 2);
        let la = f.load(bb, a0, ScalarType::F32);
        let lb = f.load(bb, a2, ScalarType::F32);

        let aa = AliasOracle::new();
        assert_eq!(aa.alias(&f, la, lb), AliasResult::MayAlias);
    }

    #[test]
    fn test_adjacent_ranges_touch_but_disjoint() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let a0 = f.ptr_offset(p, 0);
        let a4 = f.ptr_offset(p, 4);
        let la = f.load(bb, a0, ScalarType::F32);
        let lb = f.load(bb, a4, ScalarType::F32);

        let aa = AliasOracle::new();
        assert_eq!(aa.alias(&f, la, lb), AliasResult::NoAlias);
    }

    #[test]
    fn test_chained_offsets_accumulate() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let a = f.ptr_offset(p, 16);
        let b = f.ptr_offset(a, -16);
        let la = f.load(bb, p, ScalarType::I64);
        let lb = f.load(bb, b, ScalarType::I64);

        let aa = AliasOracle::new();
        // Both resolve to (p, 0).
        assert_eq!(aa.base_and_offset(&f, b), (p, 0));
        assert_eq!(aa.alias(&f, la, lb), AliasResult::MayAlias);
    }

    #[test]
    fn test_store_uses_stored_value_size() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let a0 = f.ptr_offset(p, 0);
        let a4 = f.ptr_offset(p, 4);
        let c = f.const_int(1, ScalarType::I32);
        let s = f.store(bb, a0, c);
        let l = f.load(bb, a4, ScalarType::I32);

        let aa = AliasOracle::new();
        assert_eq!(aa.alias(&f, s, l), AliasResult::NoAlias);
    }
}
