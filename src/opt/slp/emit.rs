//! Rewriting chosen packs into vector instructions.
//!
//! Emission is mechanical: every decision was already made by selection and
//! permutation choice. Per pack kind:
//!
//! - **Load packs**: one wide load at the earliest lane's position, then one
//!   extract per lane with remaining users. Lanes whose element type is
//!   itself a vector are extracted with a slot-range shuffle instead.
//! - **Store packs**: an insert prologue assembling the stored values, then
//!   one wide store at the latest lane's position.
//! - **Arithmetic packs**: insert prologues for each operand position, the
//!   lane-wise vector op, then an extract epilogue, all at the latest
//!   lane's position.
//!
//! Before any memory pack is rewritten its lanes must pass the contiguous
//! run check: offsets from the minimum must hit every slot 0..w exactly
//! once. Packs that fail a structural check are skipped, never repaired.

use super::candidates::{CandidateSet, Pack};
use super::graph::PackGraph;
use super::permute::Perm;
use super::select::Selection;
use crate::analysis::AliasOracle;
use crate::ir::{
    Function, Inst, InstId, Opcode, OperandList, ScalarType, ShuffleMask, ValueType,
};
use crate::trace::{SkipReason, TraceEvent, TraceSink};
use smallvec::SmallVec;

/// Outcome of one emission round.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmitResult {
    pub changed: bool,
    pub vector_ops: usize,
    pub scalars_erased: usize,
    pub packs_skipped: usize,
}

/// Validate a memory pack's lanes as one complete contiguous run.
///
/// Returns, per lane, its slot in the run: `(offset - min) / elem_size`.
/// Fails when roots differ, offsets are not multiples of the element size,
/// or any slot is missing or duplicated.
pub fn good_mem_ops(f: &Function, alias: &AliasOracle, pack: &Pack) -> Option<Vec<usize>> {
    let w = pack.width();
    let elem_size = f.layout().store_size(f.access_ty(pack.first())?)?;
    if elem_size == 0 {
        return None;
    }

    let mut decomposed: SmallVec<[(InstId, i64); 8]> = SmallVec::with_capacity(w);
    for &lane in &pack.lanes {
        let addr = f.inst(lane).address()?;
        decomposed.push(alias.base_and_offset(f, addr));
    }

    let root = decomposed[0].0;
    if decomposed.iter().any(|&(r, _)| r != root) {
        return None;
    }

    let min = decomposed.iter().map(|&(_, off)| off).min()?;
    let mut slots = vec![usize::MAX; w];
    let mut used = vec![false; w];
    for (lane, &(_, off)) in decomposed.iter().enumerate() {
        let delta = off - min;
        if delta < 0 || delta % elem_size as i64 != 0 {
            return None;
        }
        let slot = (delta / elem_size as i64) as usize;
        if slot >= w || used[slot] {
            return None;
        }
        used[slot] = true;
        slots[lane] = slot;
    }
    Some(slots)
}

/// Rewrite every chosen pack, consumers before producers.
///
/// The rewrite order is a topological order of the chosen packs alone;
/// unchosen candidates (which may overlap each other into dependence
/// cycles) play no part in it. Consumer-first order matters: rewriting a
/// consumer pack moves its operand glue (inserts) down to the consumer's
/// own insertion point, so a producer pack emitted afterwards no longer
/// sees scalar users ahead of its anchor. Producer-first order would
/// abandon most arithmetic packs in interleaved unrolled loops.
pub fn emit(
    f: &mut Function,
    alias: &AliasOracle,
    set: &CandidateSet,
    selection: &Selection,
    perms: &[Perm],
    graph: &PackGraph,
    sink: &mut dyn TraceSink,
) -> EmitResult {
    let mut result = EmitResult::default();
    let order = graph.topological_order_of(&selection.chosen);

    for &id in order.iter().rev() {
        let pack = set.pack(id).clone();
        let emitted = if pack.is_memory(f) {
            if pack.is_store(f) {
                emit_store_pack(f, alias, &pack, sink)
            } else {
                emit_load_pack(f, alias, &pack, sink)
            }
        } else {
            emit_arith_pack(f, &pack, &perms[id as usize], sink)
        };

        if emitted {
            result.changed = true;
            result.vector_ops += 1;
            result.scalars_erased += pack.width();
            sink.event(TraceEvent::PackEmitted {
                width: pack.width(),
            });
        } else {
            result.packs_skipped += 1;
        }
    }

    // Chosen packs left out of the order sit on a cycle among themselves
    // and stay scalar.
    let mut in_order = vec![false; set.len()];
    for &id in &order {
        in_order[id as usize] = true;
    }
    for (id, &chosen) in selection.chosen.iter().enumerate() {
        if chosen && !in_order[id] {
            result.packs_skipped += 1;
            sink.event(TraceEvent::PackSkipped {
                width: set.pack(id as u32).width(),
                reason: SkipReason::DependenceCycle,
            });
        }
    }

    result
}

/// Element scalar type and per-lane sub-width of a memory pack.
fn mem_elem(f: &Function, pack: &Pack) -> Option<(ScalarType, usize)> {
    let (elem, sub) = f.access_ty(pack.first())?.elem_and_lanes()?;
    Some((elem, sub as usize))
}

/// Lane whose run slot is zero; its address is the base of the wide access.
fn base_lane(pack: &Pack, slots: &[usize]) -> InstId {
    let lane = slots.iter().position(|&s| s == 0).unwrap_or(0);
    pack.lanes[lane]
}

/// Earliest/latest lane in program order.
fn extreme_lane(f: &Function, pack: &Pack, latest: bool) -> InstId {
    let mut best = pack.first();
    for &lane in &pack.lanes[1..] {
        let after = f.comes_before(best, lane);
        if after == latest {
            best = lane;
        }
    }
    best
}

/// Zero seed vector for an insert chain; every lane is overwritten.
fn seed_vector(f: &mut Function, elem: ScalarType, lanes: usize) -> InstId {
    f.create_floating(Inst::new(
        Opcode::ConstInt(0),
        OperandList::empty(),
        ValueType::Vector(elem, lanes as u8),
    ))
}

fn emit_load_pack(
    f: &mut Function,
    alias: &AliasOracle,
    pack: &Pack,
    sink: &mut dyn TraceSink,
) -> bool {
    let Some(slots) = good_mem_ops(f, alias, pack) else {
        sink.event(TraceEvent::PackSkipped {
            width: pack.width(),
            reason: SkipReason::NonContiguousLanes,
        });
        return false;
    };
    let Some((elem, sub)) = mem_elem(f, pack) else {
        sink.event(TraceEvent::PackSkipped {
            width: pack.width(),
            reason: SkipReason::UnsupportedShape,
        });
        return false;
    };

    let total = pack.width() * sub;
    let vec_ty = ValueType::Vector(elem, total as u8);
    let addr = f.inst(base_lane(pack, &slots)).address().unwrap_or_default();
    let anchor = extreme_lane(f, pack, false);

    let mut wide = Inst::new(Opcode::VecLoad, OperandList::Single(addr), vec_ty);
    wide.align = f.layout().preferred_align(ValueType::Scalar(elem)) as u32;
    let wide = f.create_before(anchor, wide);

    // Extract each lane's value for its remaining users.
    let mut cursor = wide;
    for (lane_idx, &lane) in pack.lanes.iter().enumerate() {
        if !f.users(lane).is_empty() {
            let slot = slots[lane_idx];
            let lane_ty = f.value_ty(lane);
            let extract = if sub == 1 {
                Inst::new(
                    Opcode::Extract(slot as u8),
                    OperandList::Single(wide),
                    lane_ty,
                )
            } else {
                // Sub-vector lane: select its slot range out of the wide
                // vector.
                let mask: SmallVec<[u8; 8]> =
                    (0..sub).map(|i| (slot * sub + i) as u8).collect();
                Inst::new(
                    Opcode::Shuffle(ShuffleMask(mask)),
                    OperandList::Single(wide),
                    lane_ty,
                )
            };
            let extract = f.create_after(cursor, extract);
            cursor = extract;
            f.replace_all_uses(lane, extract);
        }
    }

    for &lane in &pack.lanes {
        f.erase(lane);
    }
    true
}

fn emit_store_pack(
    f: &mut Function,
    alias: &AliasOracle,
    pack: &Pack,
    sink: &mut dyn TraceSink,
) -> bool {
    let Some(slots) = good_mem_ops(f, alias, pack) else {
        sink.event(TraceEvent::PackSkipped {
            width: pack.width(),
            reason: SkipReason::NonContiguousLanes,
        });
        return false;
    };
    let Some((elem, sub)) = mem_elem(f, pack) else {
        sink.event(TraceEvent::PackSkipped {
            width: pack.width(),
            reason: SkipReason::UnsupportedShape,
        });
        return false;
    };
    if sub != 1 {
        // Assembling sub-vector lanes would need lane-merging shuffles.
        sink.event(TraceEvent::PackSkipped {
            width: pack.width(),
            reason: SkipReason::UnsupportedShape,
        });
        return false;
    }

    let w = pack.width();
    let vec_ty = ValueType::Vector(elem, w as u8);
    let addr = f.inst(base_lane(pack, &slots)).address().unwrap_or_default();
    let anchor = extreme_lane(f, pack, true);

    // Assemble stored values in slot order.
    let mut vec = seed_vector(f, elem, w);
    for slot in 0..w {
        let lane_idx = slots.iter().position(|&s| s == slot).unwrap_or(0);
        let value = f.inst(pack.lanes[lane_idx]).stored_value().unwrap_or_default();
        vec = f.create_before(
            anchor,
            Inst::new(
                Opcode::Insert(slot as u8),
                OperandList::Pair(vec, value),
                vec_ty,
            ),
        );
    }

    let mut wide = Inst::new(Opcode::VecStore, OperandList::Pair(addr, vec), ValueType::Void);
    wide.align = f.layout().preferred_align(ValueType::Scalar(elem)) as u32;
    f.create_before(anchor, wide);

    for &lane in &pack.lanes {
        f.erase(lane);
    }
    true
}

fn emit_arith_pack(f: &mut Function, pack: &Pack, perm: &Perm, sink: &mut dyn TraceSink) -> bool {
    let w = pack.width();
    let Some((elem, sub)) = f.value_ty(pack.first()).elem_and_lanes() else {
        sink.event(TraceEvent::PackSkipped {
            width: w,
            reason: SkipReason::UnsupportedShape,
        });
        return false;
    };
    if sub != 1 {
        sink.event(TraceEvent::PackSkipped {
            width: w,
            reason: SkipReason::UnsupportedShape,
        });
        return false;
    }

    let anchor = extreme_lane(f, pack, true);

    // Every lane's users must come after the vector op's position;
    // otherwise the extract feeding them would not dominate. A user that
    // is itself a lane always violates this: the extract replacing the
    // producer lane lands after the vector op, below the consumer's
    // operand glue. Such packs are abandoned rather than have their users
    // moved.
    for &lane in &pack.lanes {
        for &user in f.users(lane) {
            if pack.contains(user) || f.comes_before(user, anchor) {
                sink.event(TraceEvent::PackSkipped {
                    width: w,
                    reason: SkipReason::UserPrecedesInsertion,
                });
                return false;
            }
        }
    }

    let vec_ty = ValueType::Vector(elem, w as u8);
    let arity = f.inst(pack.first()).operands.len();

    // One insert prologue per operand position, lanes in permuted order.
    let mut operand_vecs: SmallVec<[InstId; 4]> = SmallVec::new();
    for op_idx in 0..arity {
        let mut vec = seed_vector(f, elem, w);
        for pos in 0..w {
            let lane = pack.lanes[perm[pos] as usize];
            let value = f.inst(lane).operands.get(op_idx).unwrap_or_default();
            vec = f.create_before(
                anchor,
                Inst::new(
                    Opcode::Insert(pos as u8),
                    OperandList::Pair(vec, value),
                    vec_ty,
                ),
            );
        }
        operand_vecs.push(vec);
    }

    let vec_op = match *f.opcode(pack.first()) {
        Opcode::Binary(op) => Opcode::VecBinary(op),
        Opcode::FusedMulAdd => Opcode::VecFusedMulAdd,
        _ => {
            sink.event(TraceEvent::PackSkipped {
                width: w,
                reason: SkipReason::UnsupportedShape,
            });
            return false;
        }
    };
    let wide = f.create_before(
        anchor,
        Inst::new(vec_op, OperandList::from_slice(&operand_vecs), vec_ty),
    );

    // Extract epilogue, again in permuted order.
    let mut cursor = wide;
    for pos in 0..w {
        let lane = pack.lanes[perm[pos] as usize];
        if !f.users(lane).is_empty() {
            let extract = f.create_after(
                cursor,
                Inst::new(
                    Opcode::Extract(pos as u8),
                    OperandList::Single(wide),
                    ValueType::Scalar(elem),
                ),
            );
            cursor = extract;
            f.replace_all_uses(lane, extract);
        }
    }

    for &lane in &pack.lanes {
        f.erase(lane);
    }
    true
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MemoryDeps;
    use crate::ir::BinOp;
    use crate::opt::slp::graph::PackGraph;
    use crate::opt::slp::{candidates, cost, permute, select, SlpConfig};
    use crate::trace::{NullSink, RecordingSink};
    use std::time::Duration;

    fn run_pipeline(f: &mut Function, sink: &mut dyn TraceSink) -> EmitResult {
        let alias = AliasOracle::new();
        let deps = MemoryDeps::build(f, &alias);
        let config = SlpConfig::default();
        let set = candidates::collect(f, &alias, &deps, &config, sink);
        let graph = PackGraph::build(f, &set);
        let est = cost::CostEstimator::default();
        let costs = est.all_pack_costs(f, &set);
        let selection = select::select(&set, &costs, Duration::from_secs(5));
        let perms = permute::choose_permutations(f, &set, &graph, &est, 4);
        emit(f, &alias, &set, &selection, &perms, &graph, sink)
    }

    fn count_opcode(f: &Function, pred: impl Fn(&Opcode) -> bool) -> usize {
        (0..f.block_count() as u32)
            .flat_map(|b| f.block_insts(b).iter().copied().collect::<Vec<_>>())
            .filter(|&id| pred(f.opcode(id)))
            .count()
    }

    #[test]
    fn test_good_mem_ops_accepts_contiguous() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let a0 = f.ptr_offset(p, 0);
        let a4 = f.ptr_offset(p, 4);
        let l0 = f.load(bb, a0, ScalarType::F32);
        let l1 = f.load(bb, a4, ScalarType::F32);
        let pack = Pack::pair(l0, l1);

        let slots = good_mem_ops(&f, &AliasOracle::new(), &pack).unwrap();
        assert_eq!(slots, vec![0, 1]);
    }

    #[test]
    fn test_good_mem_ops_rejects_gap() {
        // Offsets 0 and 8 for element size 4: slot 1 missing.
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let a0 = f.ptr_offset(p, 0);
        let a8 = f.ptr_offset(p, 8);
        let l0 = f.load(bb, a0, ScalarType::F32);
        let l1 = f.load(bb, a8, ScalarType::F32);
        let pack = Pack::pair(l0, l1);

        assert!(good_mem_ops(&f, &AliasOracle::new(), &pack).is_none());
    }

    #[test]
    fn test_good_mem_ops_rejects_duplicate_offsets() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let l0 = f.load(bb, p, ScalarType::F32);
        let l1 = f.load(bb, p, ScalarType::F32);
        let pack = Pack::pair(l0, l1);

        assert!(good_mem_ops(&f, &AliasOracle::new(), &pack).is_none());
    }

    #[test]
    fn test_unrolled_add_becomes_vector_code() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let a = f.param(0);
        let b = f.param(1);
        let c = f.param(2);
        for i in 0..4i64 {
            let pa = f.ptr_offset(a, i * 4);
            let pb = f.ptr_offset(b, i * 4);
            let pc = f.ptr_offset(c, i * 4);
            let la = f.load(bb, pa, ScalarType::F32);
            let lb = f.load(bb, pb, ScalarType::F32);
            let sum = f.binary(bb, BinOp::Add, la, lb);
            f.store(bb, pc, sum);
        }

        let result = run_pipeline(&mut f, &mut NullSink);
        assert!(result.changed);
        assert!(result.vector_ops >= 3);

        // All scalar memory ops and adds are gone.
        assert_eq!(count_opcode(&f, |op| matches!(op, Opcode::Load)), 0);
        assert_eq!(count_opcode(&f, |op| matches!(op, Opcode::Store)), 0);
        assert_eq!(
            count_opcode(&f, |op| matches!(op, Opcode::Binary(_))),
            0
        );
        assert!(count_opcode(&f, |op| matches!(op, Opcode::VecLoad)) >= 2);
        assert_eq!(count_opcode(&f, |op| matches!(op, Opcode::VecStore)), 1);
        assert_eq!(
            count_opcode(&f, |op| matches!(op, Opcode::VecBinary(_))),
            1
        );
    }

    #[test]
    fn test_fma_pack_emitted() {
        let mut f = Function::new();
        let bb = f.entry_block();
        let a = f.param(0);
        let d = f.param(1);
        for i in 0..2i64 {
            let pa = f.ptr_offset(a, i * 4);
            let pd = f.ptr_offset(d, i * 4);
            let x = f.load(bb, pa, ScalarType::F32);
            let y = f.load(bb, pd, ScalarType::F32);
            let m = f.fma(bb, x, y, y);
            let po = f.ptr_offset(d, 64 + i * 4);
            f.store(bb, po, m);
        }

        let result = run_pipeline(&mut f, &mut NullSink);
        assert!(result.changed);
        assert_eq!(
            count_opcode(&f, |op| matches!(op, Opcode::VecFusedMulAdd)),
            1
        );
        assert_eq!(count_opcode(&f, |op| matches!(op, Opcode::FusedMulAdd)), 0);
    }

    #[test]
    fn test_skip_reported_for_noncontiguous_chosen_pack() {
        // Hand-built pack with a gap, fed straight to the emitter.
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let a0 = f.ptr_offset(p, 0);
        let a8 = f.ptr_offset(p, 8);
        let l0 = f.load(bb, a0, ScalarType::F32);
        let l1 = f.load(bb, a8, ScalarType::F32);
        f.binary(bb, BinOp::Add, l0, l1);

        let set = CandidateSet::from_packs(vec![Pack::pair(l0, l1)]);
        let graph = PackGraph::build(&f, &set);
        let selection = Selection {
            chosen: vec![true],
            total_cost: -1.0,
            optimal: true,
        };
        let perms = vec![permute::identity_perm(2)];
        let mut sink = RecordingSink::new();
        let result = emit(
            &mut f,
            &AliasOracle::new(),
            &set,
            &selection,
            &perms,
            &graph,
            &mut sink,
        );

        assert!(!result.changed);
        assert_eq!(result.packs_skipped, 1);
        assert_eq!(
            sink.count(|e| matches!(
                e,
                TraceEvent::PackSkipped {
                    reason: SkipReason::NonContiguousLanes,
                    ..
                }
            )),
            1
        );
        // The scalar code is untouched.
        assert_eq!(count_opcode(&f, |op| matches!(op, Opcode::Load)), 2);
    }

    #[test]
    fn test_extracts_feed_scalar_users() {
        // One load pair with a scalar consumer that stays scalar.
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let a0 = f.ptr_offset(p, 0);
        let a4 = f.ptr_offset(p, 4);
        let l0 = f.load(bb, a0, ScalarType::F32);
        let l1 = f.load(bb, a4, ScalarType::F32);
        let sum = f.binary(bb, BinOp::Add, l0, l1);

        let set = CandidateSet::from_packs(vec![Pack::pair(l0, l1)]);
        let graph = PackGraph::build(&f, &set);
        let selection = Selection {
            chosen: vec![true],
            total_cost: -1.0,
            optimal: true,
        };
        let perms = vec![permute::identity_perm(2)];
        let result = emit(
            &mut f,
            &AliasOracle::new(),
            &set,
            &selection,
            &perms,
            &graph,
            &mut NullSink,
        );

        assert!(result.changed);
        // The add now consumes two extracts of the wide load.
        let op0 = f.inst(sum).operands.get(0).unwrap();
        let op1 = f.inst(sum).operands.get(1).unwrap();
        assert!(matches!(f.opcode(op0), Opcode::Extract(0)));
        assert!(matches!(f.opcode(op1), Opcode::Extract(1)));
        assert!(f.is_erased(l0) && f.is_erased(l1));
    }

    #[test]
    fn test_user_before_insertion_point_abandons_pack() {
        // t1's user sits between t0 and t1, before the vector op's anchor.
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let x = f.load(bb, p, ScalarType::I32);
        let t0 = f.binary(bb, BinOp::Add, x, x);
        let early_user = f.binary(bb, BinOp::Mul, t0, t0);
        let t1 = f.binary(bb, BinOp::Add, x, x);
        let _ = early_user;

        let set = CandidateSet::from_packs(vec![Pack::pair(t0, t1)]);
        let graph = PackGraph::build(&f, &set);
        let selection = Selection {
            chosen: vec![true],
            total_cost: -1.0,
            optimal: true,
        };
        let perms = vec![permute::identity_perm(2)];
        let mut sink = RecordingSink::new();
        let result = emit(
            &mut f,
            &AliasOracle::new(),
            &set,
            &selection,
            &perms,
            &graph,
            &mut sink,
        );

        assert!(!result.changed);
        assert_eq!(
            sink.count(|e| matches!(
                e,
                TraceEvent::PackSkipped {
                    reason: SkipReason::UserPrecedesInsertion,
                    ..
                }
            )),
            1
        );
    }

    #[test]
    fn test_candidate_cycle_does_not_block_chosen_packs() {
        // Overlapping unchosen candidates ({a,b,c,d} and {b,c}) feed each
        // other's lanes and form a graph cycle that hides everything
        // downstream of it; the chosen store pack must still be rewritten.
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let q = f.param(1);
        let r = f.param(2);
        let x = f.load(bb, p, ScalarType::I32);
        let y = f.load(bb, q, ScalarType::I32);
        let a = f.binary(bb, BinOp::Add, x, y);
        let b = f.binary(bb, BinOp::Add, x, y);
        let c = f.binary(bb, BinOp::Add, a, y);
        let d = f.binary(bb, BinOp::Add, b, y);
        let r0 = f.ptr_offset(r, 0);
        let r4 = f.ptr_offset(r, 4);
        let s0 = f.store(bb, r0, c);
        let s1 = f.store(bb, r4, d);

        let wide = Pack {
            lanes: SmallVec::from_slice(&[a, b, c, d]),
        };
        let set = CandidateSet::from_packs(vec![
            wide,
            Pack::pair(b, c),
            Pack::pair(c, d),
            Pack::pair(s0, s1),
        ]);
        let graph = PackGraph::build(&f, &set);
        // The full candidate order never reaches the store pack.
        assert!(!graph.topological_order().contains(&3));

        let selection = Selection {
            chosen: vec![false, false, false, true],
            total_cost: -1.0,
            optimal: true,
        };
        let perms = vec![
            permute::identity_perm(4),
            permute::identity_perm(2),
            permute::identity_perm(2),
            permute::identity_perm(2),
        ];
        let result = emit(
            &mut f,
            &AliasOracle::new(),
            &set,
            &selection,
            &perms,
            &graph,
            &mut NullSink,
        );

        assert!(result.changed);
        assert_eq!(result.packs_skipped, 0);
        assert_eq!(count_opcode(&f, |op| matches!(op, Opcode::VecStore)), 1);
        assert_eq!(count_opcode(&f, |op| matches!(op, Opcode::Store)), 0);
    }

    #[test]
    fn test_chosen_cycle_reported_as_skipped() {
        // Two disjoint pairs feeding each other crosswise: neither can be
        // rewritten first, so both stay scalar and are reported.
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let x = f.load(bb, p, ScalarType::I32);
        let a0 = f.binary(bb, BinOp::Add, x, x);
        let b0 = f.binary(bb, BinOp::Mul, a0, x);
        let b1 = f.binary(bb, BinOp::Mul, x, x);
        let a1 = f.binary(bb, BinOp::Add, b1, x);

        let set = CandidateSet::from_packs(vec![Pack::pair(a0, a1), Pack::pair(b0, b1)]);
        let graph = PackGraph::build(&f, &set);
        let selection = Selection {
            chosen: vec![true, true],
            total_cost: -1.0,
            optimal: true,
        };
        let perms = vec![permute::identity_perm(2), permute::identity_perm(2)];
        let mut sink = RecordingSink::new();
        let result = emit(
            &mut f,
            &AliasOracle::new(),
            &set,
            &selection,
            &perms,
            &graph,
            &mut sink,
        );

        assert!(!result.changed);
        assert_eq!(result.packs_skipped, 2);
        assert_eq!(
            sink.count(|e| matches!(
                e,
                TraceEvent::PackSkipped {
                    reason: SkipReason::DependenceCycle,
                    ..
                }
            )),
            2
        );
        assert_eq!(count_opcode(&f, |op| matches!(op, Opcode::Binary(_))), 4);
    }

    #[test]
    fn test_dependent_lanes_abandon_pack() {
        // Lane c consumes lane a: its operand glue would end up reading an
        // extract emitted below it, so the pack must stay scalar.
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let x = f.load(bb, p, ScalarType::I32);
        let a = f.binary(bb, BinOp::Add, x, x);
        let b = f.binary(bb, BinOp::Add, x, x);
        let c = f.binary(bb, BinOp::Add, a, x);
        let d = f.binary(bb, BinOp::Add, b, x);

        let set = CandidateSet::from_packs(vec![Pack {
            lanes: SmallVec::from_slice(&[a, b, c, d]),
        }]);
        let graph = PackGraph::build(&f, &set);
        let selection = Selection {
            chosen: vec![true],
            total_cost: -1.0,
            optimal: true,
        };
        let perms = vec![permute::identity_perm(4)];
        let mut sink = RecordingSink::new();
        let result = emit(
            &mut f,
            &AliasOracle::new(),
            &set,
            &selection,
            &perms,
            &graph,
            &mut sink,
        );

        assert!(!result.changed);
        assert_eq!(result.packs_skipped, 1);
        assert_eq!(
            sink.count(|e| matches!(
                e,
                TraceEvent::PackSkipped {
                    reason: SkipReason::UserPrecedesInsertion,
                    ..
                }
            )),
            1
        );
        // The scalar code is untouched and every definition still precedes
        // its uses.
        assert_eq!(count_opcode(&f, |op| matches!(op, Opcode::Binary(_))), 4);
        for &id in f.block_insts(bb) {
            for op in f.inst(id).operands.clone().iter() {
                assert!(f.comes_before(op, id));
            }
        }
    }

    #[test]
    fn test_subvector_load_lanes_use_shuffles() {
        // Two adjacent loads of <2 x f32> widen to one <4 x f32> load with
        // shuffle extraction per lane.
        let mut f = Function::new();
        let bb = f.entry_block();
        let p = f.param(0);
        let a0 = f.ptr_offset(p, 0);
        let a8 = f.ptr_offset(p, 8);
        let ty = ValueType::Vector(ScalarType::F32, 2);
        let align = f.layout().preferred_align(ty) as u32;
        let mut l0 = Inst::new(Opcode::Load, OperandList::Single(a0), ty);
        l0.align = align;
        let l0 = f.create(bb, l0);
        let mut l1 = Inst::new(Opcode::Load, OperandList::Single(a8), ty);
        l1.align = align;
        let l1 = f.create(bb, l1);
        // Keep both lanes alive with vector stores.
        let o0 = f.ptr_offset(p, 64);
        let o8 = f.ptr_offset(p, 72);
        let s0 = Inst::new(Opcode::Store, OperandList::Pair(o0, l0), ValueType::Void);
        f.create(bb, s0);
        let s1 = Inst::new(Opcode::Store, OperandList::Pair(o8, l1), ValueType::Void);
        f.create(bb, s1);

        let set = CandidateSet::from_packs(vec![Pack::pair(l0, l1)]);
        let graph = PackGraph::build(&f, &set);
        let selection = Selection {
            chosen: vec![true],
            total_cost: -1.0,
            optimal: true,
        };
        let perms = vec![permute::identity_perm(2)];
        let result = emit(
            &mut f,
            &AliasOracle::new(),
            &set,
            &selection,
            &perms,
            &graph,
            &mut NullSink,
        );

        assert!(result.changed);
        assert_eq!(count_opcode(&f, |op| matches!(op, Opcode::VecLoad)), 1);
        assert_eq!(
            count_opcode(&f, |op| matches!(op, Opcode::Shuffle(_))),
            2
        );
        // The wide load covers four scalar lanes.
        let wide = (0..f.block_insts(bb).len())
            .map(|i| f.block_insts(bb)[i])
            .find(|&id| matches!(f.opcode(id), Opcode::VecLoad))
            .unwrap();
        assert_eq!(f.value_ty(wide), ValueType::Vector(ScalarType::F32, 4));
    }
}
