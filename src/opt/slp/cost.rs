//! Target cost oracle and pack cost estimation.
//!
//! Two layers:
//!
//! - [`TargetCostModel`]: primitive per-operation costs (insert, extract,
//!   shuffle, memory, arithmetic) for a SIMD capability level. Returns
//!   `None` where it has no estimate, e.g. for vectors wider than the
//!   target's registers.
//! - [`CostEstimator`]: composes primitives into per-pack quantities: the
//!   cost to assemble a pack's scalars into a vector, the cost to extract
//!   lanes back out for still-scalar consumers, the shuffle cost of passing
//!   lanes between packs under a pair of lane orderings, and the net pack
//!   cost that drives selection (negative = beneficial).

use super::candidates::{CandidateSet, Pack};
use super::legality::{op_group, OpGroup};
use crate::ir::{BinOp, Function, ScalarType, ValueType};
use smallvec::SmallVec;

// =============================================================================
// SIMD Level
// =============================================================================

/// Target SIMD capability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SimdLevel {
    /// 128-bit vectors.
    Sse42,
    /// 256-bit floating-point, 128-bit integer.
    Avx,
    /// Full 256-bit support with FMA.
    Avx2,
    /// 512-bit vectors.
    Avx512,
}

impl SimdLevel {
    /// Maximum vector width in bytes.
    pub const fn max_vector_bytes(self) -> u64 {
        match self {
            SimdLevel::Sse42 => 16,
            SimdLevel::Avx | SimdLevel::Avx2 => 32,
            SimdLevel::Avx512 => 64,
        }
    }

    /// Check if this level has a fused multiply-add instruction.
    pub const fn has_fma(self) -> bool {
        matches!(self, SimdLevel::Avx2 | SimdLevel::Avx512)
    }
}

impl Default for SimdLevel {
    fn default() -> Self {
        SimdLevel::Avx2
    }
}

// =============================================================================
// Operation Cost
// =============================================================================

/// Cost of a single operation: latency plus reciprocal throughput.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpCost {
    /// Latency in cycles from input to output.
    pub latency: u8,

    /// Reciprocal throughput (cycles per operation).
    pub throughput: f32,
}

impl OpCost {
    pub const fn new(latency: u8, throughput: f32) -> Self {
        Self {
            latency,
            throughput,
        }
    }

    pub const fn trivial() -> Self {
        Self::new(1, 0.33)
    }

    pub const fn alu() -> Self {
        Self::new(1, 1.0)
    }

    pub const fn mul() -> Self {
        Self::new(3, 1.0)
    }

    pub const fn div() -> Self {
        Self::new(14, 6.0)
    }

    pub const fn load() -> Self {
        Self::new(5, 0.5)
    }

    pub const fn store() -> Self {
        Self::new(4, 1.0)
    }

    pub const fn shuffle() -> Self {
        Self::new(1, 1.0)
    }

    pub const fn cross_lane() -> Self {
        Self::new(3, 1.0)
    }

    /// Combine costs of dependent operations.
    pub fn chain(self, other: Self) -> Self {
        Self {
            latency: self.latency.saturating_add(other.latency),
            throughput: self.throughput + other.throughput,
        }
    }

    /// Collapse to a single comparable number. Throughput is weighted more
    /// than latency for straight-line code.
    pub fn total_cost(&self) -> f32 {
        self.throughput + self.latency as f32 * 0.2
    }
}

// =============================================================================
// Target Cost Model
// =============================================================================

/// Primitive cost oracle for a SIMD capability level.
#[derive(Debug, Clone, Copy)]
pub struct TargetCostModel {
    level: SimdLevel,
}

impl TargetCostModel {
    pub fn new(level: SimdLevel) -> Self {
        TargetCostModel { level }
    }

    pub fn level(&self) -> SimdLevel {
        self.level
    }

    fn fits(&self, elem: ScalarType, lanes: usize) -> bool {
        elem.size_bytes() * lanes as u64 <= self.level.max_vector_bytes()
    }

    /// Cost of inserting a scalar into a vector lane.
    pub fn insert_cost(&self, _elem: ScalarType, _lane: usize) -> OpCost {
        OpCost::trivial()
    }

    /// Cost of extracting a scalar from a vector lane.
    pub fn extract_cost(&self, _elem: ScalarType, lane: usize) -> OpCost {
        if lane == 0 {
            // The low lane is readable directly.
            OpCost::new(0, 0.1)
        } else {
            OpCost::trivial()
        }
    }

    /// Cost of a single-source lane permutation over `lanes` lanes, if the
    /// target can do it in one shuffle.
    pub fn shuffle_cost(&self, elem: ScalarType, lanes: usize) -> Option<OpCost> {
        if !self.fits(elem, lanes) {
            return None;
        }
        // Permutes crossing a 128-bit boundary are slower.
        if elem.size_bytes() * lanes as u64 > 16 {
            Some(OpCost::cross_lane())
        } else {
            Some(OpCost::shuffle())
        }
    }

    /// Cost of one scalar operation of a group.
    pub fn scalar_op_cost(&self, group: OpGroup) -> OpCost {
        match group {
            OpGroup::Load => OpCost::load(),
            OpGroup::Store => OpCost::store(),
            OpGroup::Binary(BinOp::Mul) => OpCost::mul(),
            OpGroup::Binary(BinOp::Div) => OpCost::div(),
            OpGroup::Binary(_) => OpCost::alu(),
            OpGroup::Fma => OpCost::new(4, 1.0),
        }
    }

    /// Cost of one vector operation of a group over `lanes` lanes, or
    /// `None` when the target has no estimate for that shape.
    pub fn vector_op_cost(&self, group: OpGroup, elem: ScalarType, lanes: usize) -> Option<OpCost> {
        if lanes < 2 || !self.fits(elem, lanes) {
            return None;
        }
        let cost = match group {
            OpGroup::Load => OpCost::load(),
            OpGroup::Store => OpCost::store(),
            OpGroup::Binary(BinOp::Mul) => OpCost::mul(),
            OpGroup::Binary(BinOp::Div) => {
                if lanes <= 4 {
                    OpCost::div()
                } else {
                    OpCost::new(14, 9.0)
                }
            }
            OpGroup::Binary(_) => OpCost::alu(),
            OpGroup::Fma => {
                if self.level.has_fma() {
                    OpCost::new(4, 0.5)
                } else {
                    OpCost::mul().chain(OpCost::alu())
                }
            }
        };
        Some(cost)
    }
}

impl Default for TargetCostModel {
    fn default() -> Self {
        Self::new(SimdLevel::default())
    }
}

// =============================================================================
// Lane Maps
// =============================================================================

/// Per-destination-lane source lane, or `None` when the operand at this
/// position does not come from the source pack.
pub type LaneMap = SmallVec<[Option<u8>; 8]>;

/// Check whether a lane map has at least one mapping.
pub fn has_mapping(map: &LaneMap) -> bool {
    map.iter().any(|m| m.is_some())
}

/// Check whether a lane map requires any rearrangement.
pub fn needs_shuffle(map: &LaneMap) -> bool {
    map.iter()
        .enumerate()
        .any(|(i, m)| m.is_some_and(|s| s as usize != i))
}

// =============================================================================
// Cost Estimator
// =============================================================================

/// Pack-level cost composition over a [`TargetCostModel`].
#[derive(Debug, Clone, Copy)]
pub struct CostEstimator {
    model: TargetCostModel,

    /// Benefit assumed per lane when the oracle yields no clear benefit, so
    /// selection is not starved by an uninformative cost model.
    fallback_benefit_per_lane: f32,
}

impl CostEstimator {
    pub fn new(model: TargetCostModel) -> Self {
        CostEstimator {
            model,
            fallback_benefit_per_lane: 0.1,
        }
    }

    pub fn model(&self) -> &TargetCostModel {
        &self.model
    }

    /// Element type the pack operates on.
    fn elem_ty(&self, f: &Function, pack: &Pack) -> Option<ScalarType> {
        let ty = if pack.is_memory(f) {
            f.access_ty(pack.first())?
        } else {
            f.value_ty(pack.first())
        };
        ty.elem_and_lanes().map(|(elem, _)| elem)
    }

    /// Effective scalar lane count: pack width times the per-lane vector
    /// width for memory packs whose element type is itself a vector.
    fn effective_lanes(&self, f: &Function, pack: &Pack) -> usize {
        let sub = match pack.is_memory(f) {
            true => f
                .access_ty(pack.first())
                .and_then(ValueType::elem_and_lanes)
                .map_or(1, |(_, n)| n as usize),
            false => 1,
        };
        pack.width() * sub
    }

    /// Cost of assembling the pack's scalar values into a vector.
    pub fn pack_cost(&self, f: &Function, pack: &Pack) -> f32 {
        let Some(elem) = self.elem_ty(f, pack) else {
            return 0.0;
        };
        (0..pack.width())
            .map(|lane| self.model.insert_cost(elem, lane).total_cost())
            .sum()
    }

    /// Cost of extracting lanes back out for users that are not a lane of
    /// any candidate pack.
    pub fn unpack_cost(&self, f: &Function, set: &CandidateSet, pack: &Pack) -> f32 {
        let Some(elem) = self.elem_ty(f, pack) else {
            return 0.0;
        };
        let mut cost = 0.0;
        for (lane, &inst) in pack.lanes.iter().enumerate() {
            for &user in f.users(inst) {
                if set.packs_of(user).is_empty() {
                    cost += self.model.extract_cost(elem, lane).total_cost();
                }
            }
        }
        cost
    }

    /// Lane map from `src` to `dst` at one operand position, under identity
    /// lane orderings.
    pub fn lane_map(
        &self,
        f: &Function,
        src: &Pack,
        dst: &Pack,
        operand_idx: usize,
    ) -> LaneMap {
        let mut map: LaneMap = SmallVec::with_capacity(dst.width());
        for &dst_inst in &dst.lanes {
            let operand = f.inst(dst_inst).operands.get(operand_idx);
            let src_lane = operand.and_then(|op| {
                src.lanes
                    .iter()
                    .position(|&s| s == op)
                    .map(|p| p as u8)
            });
            map.push(src_lane);
        }
        map
    }

    /// Lane map from `src` to `dst` at one operand position when `src` and
    /// `dst` materialize their lanes in the given orders.
    ///
    /// A permutation maps vector position to original lane index.
    pub fn lane_map_permuted(
        &self,
        f: &Function,
        src: &Pack,
        dst: &Pack,
        operand_idx: usize,
        src_perm: &[u8],
        dst_perm: &[u8],
    ) -> LaneMap {
        debug_assert_eq!(src_perm.len(), src.width());
        debug_assert_eq!(dst_perm.len(), dst.width());

        // Vector position of each original src lane.
        let mut src_pos = [0u8; 32];
        for (pos, &lane) in src_perm.iter().enumerate() {
            src_pos[lane as usize] = pos as u8;
        }

        let identity = self.lane_map(f, src, dst, operand_idx);
        let mut map: LaneMap = SmallVec::with_capacity(dst.width());
        for &dst_lane in dst_perm {
            let src_lane = identity[dst_lane as usize];
            map.push(src_lane.map(|s| src_pos[s as usize]));
        }
        map
    }

    /// Shuffle cost between two packs under a pair of lane orderings:
    /// for every operand position connecting them, one single-source
    /// permute over the source width when the lane map is non-identity.
    /// Operand positions are costed independently.
    pub fn shuffle_cost_permuted(
        &self,
        f: &Function,
        src: &Pack,
        dst: &Pack,
        src_perm: &[u8],
        dst_perm: &[u8],
    ) -> f32 {
        let Some(elem) = self.elem_ty(f, src) else {
            return 0.0;
        };
        let arity = dst
            .lanes
            .iter()
            .map(|&l| f.inst(l).operands.len())
            .max()
            .unwrap_or(0);

        let mut total = 0.0;
        for operand_idx in 0..arity {
            let map = self.lane_map_permuted(f, src, dst, operand_idx, src_perm, dst_perm);
            if has_mapping(&map) && needs_shuffle(&map) {
                match self.model.shuffle_cost(elem, src.width()) {
                    Some(c) => total += c.total_cost(),
                    // No estimate: charge a pessimistic per-lane rebuild.
                    None => {
                        total += src.width() as f32
                            * self.model.insert_cost(elem, 0).total_cost()
                    }
                }
            }
        }
        total
    }

    /// Shuffle cost under identity orderings on both sides.
    pub fn shuffle_cost(&self, f: &Function, src: &Pack, dst: &Pack) -> f32 {
        let w_src: Vec<u8> = (0..src.width() as u8).collect();
        let w_dst: Vec<u8> = (0..dst.width() as u8).collect();
        self.shuffle_cost_permuted(f, src, dst, &w_src, &w_dst)
    }

    /// Estimated benefit of replacing the pack's scalars with one vector
    /// op. Falls back to a small positive constant per lane when the oracle
    /// has no estimate or no clear benefit.
    pub fn vectorization_benefit(&self, f: &Function, pack: &Pack) -> f32 {
        let fallback = self.fallback_benefit_per_lane * pack.width() as f32;
        let Some(group) = op_group(f, pack.first()) else {
            return fallback;
        };
        let Some(elem) = self.elem_ty(f, pack) else {
            return fallback;
        };
        let lanes = self.effective_lanes(f, pack);
        let Some(vector) = self.model.vector_op_cost(group, elem, lanes) else {
            return fallback;
        };
        let scalar = self.model.scalar_op_cost(group);
        let benefit = scalar.total_cost() * pack.width() as f32 - vector.total_cost();
        if benefit > 0.0 {
            benefit
        } else {
            fallback
        }
    }

    /// Net pack cost used by selection: pack + unpack minus benefit.
    /// Negative means choosing the pack is expected to win.
    pub fn net_pack_cost(&self, f: &Function, set: &CandidateSet, pack: &Pack) -> f32 {
        self.pack_cost(f, pack) + self.unpack_cost(f, set, pack)
            - self.vectorization_benefit(f, pack)
    }

    /// Net cost for every pack in a candidate set, indexed by pack id.
    pub fn all_pack_costs(&self, f: &Function, set: &CandidateSet) -> Vec<f32> {
        set.packs()
            .iter()
            .map(|p| self.net_pack_cost(f, set, p))
            .collect()
    }
}

impl Default for CostEstimator {
    fn default() -> Self {
        Self::new(TargetCostModel::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
