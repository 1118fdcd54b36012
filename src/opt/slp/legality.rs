//! Legality predicates for pack formation.
//!
//! Pure predicates over instructions: candidate classification, isomorphism,
//! memory adjacency, dependence-freedom, schedulability. Absence of proof is
//! always treated as illegality; no predicate panics or guesses.

use crate::analysis::{AliasOracle, MemoryDeps};
use crate::ir::{BinOp, Function, InstId, Opcode, ValueType};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

// =============================================================================
// Classification
// =============================================================================

/// Opcode group a candidate statement belongs to.
///
/// Fused multiply-add is its own group: it must never pair with plain
/// multiplies or adds even though it subsumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpGroup {
    Load,
    Store,
    Binary(BinOp),
    Fma,
}

/// The opcode group of an instruction, if it is groupable at all.
pub fn op_group(f: &Function, id: InstId) -> Option<OpGroup> {
    match *f.opcode(id) {
        Opcode::Load => Some(OpGroup::Load),
        Opcode::Store => Some(OpGroup::Store),
        Opcode::Binary(op) => Some(OpGroup::Binary(op)),
        Opcode::FusedMulAdd => Some(OpGroup::Fma),
        _ => None,
    }
}

fn is_packable_ty(ty: ValueType) -> bool {
    ty.elem_and_lanes().is_some()
}

/// Check whether an instruction can ever be a pack lane.
///
/// Loads and stores of sized scalar-or-vector numeric types, binary
/// arithmetic, and fused multiply-add qualify; everything else (addressing,
/// constants, already-vectorized glue) does not. Volatile accesses are never
/// candidates.
pub fn is_candidate(f: &Function, id: InstId) -> bool {
    if f.is_erased(id) {
        return false;
    }
    let inst = f.inst(id);
    match inst.op {
        Opcode::Load | Opcode::Store => {
            !inst.is_volatile()
                && f
                    .access_ty(id)
                    .is_some_and(|ty| is_packable_ty(ty) && f.layout().store_size(ty).is_some())
        }
        Opcode::Binary(_) | Opcode::FusedMulAdd => is_packable_ty(inst.ty),
        _ => false,
    }
}

// =============================================================================
// Isomorphism
// =============================================================================

/// Check whether two statements are structurally compatible for packing:
/// same opcode group, same value type moved or produced, same arity.
pub fn are_isomorphic(f: &Function, a: InstId, b: InstId) -> bool {
    let (Some(ga), Some(gb)) = (op_group(f, a), op_group(f, b)) else {
        return false;
    };
    if ga != gb {
        return false;
    }
    if f.inst(a).operands.len() != f.inst(b).operands.len() {
        return false;
    }
    match ga {
        OpGroup::Load | OpGroup::Store => f.access_ty(a) == f.access_ty(b),
        OpGroup::Binary(_) | OpGroup::Fma => {
            if f.value_ty(a) != f.value_ty(b) {
                return false;
            }
            // Operand types must match position-wise.
            let na = f.inst(a).operands.len();
            (0..na).all(|i| {
                match (f.inst(a).operands.get(i), f.inst(b).operands.get(i)) {
                    (Some(oa), Some(ob)) => f.value_ty(oa) == f.value_ty(ob),
                    _ => false,
                }
            })
        }
    }
}

// =============================================================================
// Memory adjacency
// =============================================================================

/// Decompose a memory access's address into (root object, signed byte
/// offset). Fails when the accessed type has no fixed size.
pub fn address_base_and_offset(
    f: &Function,
    alias: &AliasOracle,
    id: InstId,
) -> Option<(InstId, i64)> {
    let addr = f.inst(id).address()?;
    f.layout().store_size(f.access_ty(id)?)?;
    Some(alias.base_and_offset(f, addr))
}

/// Check whether two accesses move equivalent values: same type, same
/// alignment, both non-volatile.
pub fn are_equivalent_accesses(f: &Function, a: InstId, b: InstId) -> bool {
    if f.inst(a).is_volatile() || f.inst(b).is_volatile() {
        return false;
    }
    f.access_ty(a) == f.access_ty(b) && f.inst(a).align == f.inst(b).align
}

/// Check whether `b` accesses memory exactly one element after `a`.
///
/// Both must be loads or both stores, equivalent, with the same root object
/// and an offset delta of exactly one element's store size. Requiring the
/// same root is deliberately permissive about overlap: same-object accesses
/// are exactly the contiguous-run patterns unrolled loops produce, while
/// provably distinct objects can never form one contiguous run.
pub fn are_adjacent(f: &Function, alias: &AliasOracle, a: InstId, b: InstId) -> bool {
    let both_loads = f.opcode(a).is_load() && f.opcode(b).is_load();
    let both_stores = f.opcode(a).is_store() && f.opcode(b).is_store();
    if !(both_loads || both_stores) {
        return false;
    }
    if !are_equivalent_accesses(f, a, b) {
        return false;
    }
    let Some((root_a, off_a)) = address_base_and_offset(f, alias, a) else {
        return false;
    };
    let Some((root_b, off_b)) = address_base_and_offset(f, alias, b) else {
        return false;
    };
    if root_a != root_b {
        return false;
    }
    let Some(size) = f.access_ty(a).and_then(|ty| f.layout().store_size(ty)) else {
        return false;
    };
    off_b.wrapping_sub(off_a) == size as i64
}

// =============================================================================
// Dependence
// =============================================================================

/// Check whether `to` is reachable from `from` in the dependence graph:
/// value def-use edges, plus memory edges from a write to every access it
/// immediately clobbers. Breadth-first, bounded by the instruction count.
pub fn is_transitively_dependent(
    f: &Function,
    deps: &MemoryDeps,
    from: InstId,
    to: InstId,
) -> bool {
    if from == to {
        return true;
    }
    let limit = f.inst_count();
    let mut visited: FxHashSet<InstId> = FxHashSet::default();
    let mut queue: VecDeque<InstId> = VecDeque::new();
    visited.insert(from);
    queue.push_back(from);

    while let Some(cur) = queue.pop_front() {
        if visited.len() > limit {
            // Walk exceeded the function size; treat as dependent.
            return true;
        }
        let mut visit = |next: InstId, queue: &mut VecDeque<InstId>| -> bool {
            if next == to {
                return true;
            }
            if visited.insert(next) {
                queue.push_back(next);
            }
            false
        };
        for user in f.users(cur).to_vec() {
            if visit(user, &mut queue) {
                return true;
            }
        }
        if f.opcode(cur).is_store() {
            for &access in deps.clobbered_accesses(cur) {
                if visit(access, &mut queue) {
                    return true;
                }
            }
        }
    }
    false
}

/// Check that neither statement depends on the other.
pub fn are_independent(f: &Function, deps: &MemoryDeps, a: InstId, b: InstId) -> bool {
    if a == b {
        return false;
    }
    !is_transitively_dependent(f, deps, a, b) && !is_transitively_dependent(f, deps, b, a)
}

/// Check whether two statements share a basic block.
pub fn are_schedulable_together(f: &Function, a: InstId, b: InstId) -> bool {
    match (f.block_of(a), f.block_of(b)) {
        (Some(ba), Some(bb)) => ba == bb,
        _ => false,
    }
}

/// The full pairing conjunction used when forming 2-lane packs.
pub fn can_pack_pair(
    f: &Function,
    alias: &AliasOracle,
    deps: &MemoryDeps,
    a: InstId,
    b: InstId,
) -> bool {
    if !is_candidate(f, a) || !is_candidate(f, b) {
        return false;
    }
    if !are_isomorphic(f, a, b) {
        return false;
    }
    if !are_schedulable_together(f, a, b) {
        return false;
    }
    if !are_independent(f, deps, a, b) {
        return false;
    }
    if f.opcode(a).is_memory_access() {
        are_adjacent(f, alias, a, b) || are_adjacent(f, alias, b, a)
    } else {
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
