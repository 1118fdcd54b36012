//! Candidate pack discovery and iterative widening.
//!
//! Three pairing strategies run per block, each targeting a different shape
//! of parallelism:
//!
//! 1. **Neighbor pairs**: candidate statements within a bounded distance of
//!    each other in program order.
//! 2. **Opcode groups**: consecutive same-opcode statements even when other
//!    instructions are interleaved between them.
//! 3. **Contiguous memory runs**: loads (and separately stores) sorted by
//!    (base, offset), pairing entries exactly one element apart.
//!
//! The pair set is clamped to a hard ceiling, then same-width packs are
//! iteratively merged into wider packs up to a width and budget limit. A
//! statement may appear in several candidate packs; selection disambiguates.

use super::legality;
use super::SlpConfig;
use crate::analysis::{AliasOracle, MemoryDeps};
use crate::ir::{Function, InstId};
use crate::trace::{TraceEvent, TraceSink};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

// =============================================================================
// Pack
// =============================================================================

/// Index of a pack in a [`CandidateSet`].
pub type PackId = u32;

/// An ordered group of isomorphic scalar statements (one per lane).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pack {
    pub lanes: SmallVec<[InstId; 8]>,
}

impl Pack {
    pub fn pair(a: InstId, b: InstId) -> Self {
        Pack {
            lanes: SmallVec::from_slice(&[a, b]),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.lanes.len()
    }

    #[inline]
    pub fn first(&self) -> InstId {
        self.lanes[0]
    }

    #[inline]
    pub fn last(&self) -> InstId {
        self.lanes[self.lanes.len() - 1]
    }

    #[inline]
    pub fn contains(&self, id: InstId) -> bool {
        self.lanes.contains(&id)
    }

    /// Check whether this pack's lanes access memory.
    pub fn is_memory(&self, f: &Function) -> bool {
        f.opcode(self.first()).is_memory_access()
    }

    /// Check whether this pack's lanes are stores.
    pub fn is_store(&self, f: &Function) -> bool {
        f.opcode(self.first()).is_store()
    }
}

// =============================================================================
// Candidate Set
// =============================================================================

/// The global candidate pack list plus the instruction-to-packs index.
#[derive(Debug, Default)]
pub struct CandidateSet {
    packs: Vec<Pack>,
    inst_packs: FxHashMap<InstId, SmallVec<[PackId; 4]>>,
}

impl CandidateSet {
    /// Build a set from explicit packs.
    pub fn from_packs(packs: Vec<Pack>) -> Self {
        let mut set = CandidateSet::default();
        for pack in packs {
            set.push(pack);
        }
        set
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.packs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    #[inline]
    pub fn pack(&self, id: PackId) -> &Pack {
        &self.packs[id as usize]
    }

    #[inline]
    pub fn packs(&self) -> &[Pack] {
        &self.packs
    }

    pub fn iter(&self) -> impl Iterator<Item = (PackId, &Pack)> {
        self.packs
            .iter()
            .enumerate()
            .map(|(i, p)| (i as PackId, p))
    }

    /// Candidate packs containing an instruction as a lane.
    pub fn packs_of(&self, id: InstId) -> &[PackId] {
        self.inst_packs.get(&id).map_or(&[], |v| v.as_slice())
    }

    fn push(&mut self, pack: Pack) -> PackId {
        let id = self.packs.len() as PackId;
        for &lane in &pack.lanes {
            self.inst_packs.entry(lane).or_default().push(id);
        }
        self.packs.push(pack);
        id
    }

    fn truncate(&mut self, len: usize) {
        if self.packs.len() > len {
            self.packs.truncate(len);
            self.rebuild_index();
        }
    }

    fn rebuild_index(&mut self) {
        self.inst_packs.clear();
        for (i, pack) in self.packs.iter().enumerate() {
            for &lane in &pack.lanes {
                self.inst_packs
                    .entry(lane)
                    .or_default()
                    .push(i as PackId);
            }
        }
    }
}

// =============================================================================
// Collection
// =============================================================================

/// Collect and widen candidate packs for every block of a function.
pub fn collect(
    f: &Function,
    alias: &AliasOracle,
    deps: &MemoryDeps,
    config: &SlpConfig,
    sink: &mut dyn TraceSink,
) -> CandidateSet {
    let mut set = CandidateSet::default();
    let mut seen: FxHashSet<(InstId, InstId)> = FxHashSet::default();
    // Candidate-statement position within its block, for the widening gap
    // window.
    let mut cand_pos: FxHashMap<InstId, usize> = FxHashMap::default();

    for block in 0..f.block_count() as u32 {
        let cands: Vec<InstId> = f
            .block_insts(block)
            .iter()
            .copied()
            .filter(|&id| legality::is_candidate(f, id))
            .collect();
        for (pos, &id) in cands.iter().enumerate() {
            cand_pos.insert(id, pos);
        }
        if cands.len() < 2 {
            continue;
        }

        let try_pair = |set: &mut CandidateSet, seen: &mut FxHashSet<_>, a: InstId, b: InstId| {
            if a == b || seen.contains(&(a, b)) || seen.contains(&(b, a)) {
                return;
            }
            if legality::can_pack_pair(f, alias, deps, a, b) {
                let (lo, hi) = order_lanes(f, alias, a, b);
                seen.insert((lo, hi));
                set.push(Pack::pair(lo, hi));
            }
        };

        // Strategy 1: bounded-distance neighbors in candidate order.
        for i in 0..cands.len() {
            for d in 1..=config.neighbor_distance {
                if i + d < cands.len() {
                    try_pair(&mut set, &mut seen, cands[i], cands[i + d]);
                }
            }
        }

        // Strategy 2: consecutive statements within each opcode group.
        let mut groups: FxHashMap<legality::OpGroup, Vec<InstId>> = FxHashMap::default();
        for &id in &cands {
            if let Some(g) = legality::op_group(f, id) {
                groups.entry(g).or_default().push(id);
            }
        }
        let mut group_lists: Vec<_> = groups.into_iter().collect();
        group_lists.sort_by_key(|(_, list)| list[0]);
        for (_, list) in &group_lists {
            for w in list.windows(2) {
                try_pair(&mut set, &mut seen, w[0], w[1]);
            }
        }

        // Strategy 3: contiguous (base, offset) runs of loads and stores.
        for want_store in [false, true] {
            let mut mem: Vec<(InstId, i64, InstId)> = cands
                .iter()
                .copied()
                .filter(|&id| f.opcode(id).is_memory_access() && f.opcode(id).is_store() == want_store)
                .filter_map(|id| {
                    let (root, off) = legality::address_base_and_offset(f, alias, id)?;
                    Some((root, off, id))
                })
                .collect();
            mem.sort_by_key(|&(root, off, id)| (root, off, id));
            for w in mem.windows(2) {
                let (root_a, _, a) = w[0];
                let (root_b, _, b) = w[1];
                if root_a == root_b && legality::are_adjacent(f, alias, a, b) {
                    try_pair(&mut set, &mut seen, a, b);
                }
            }
        }
    }

    sink.event(TraceEvent::CandidatesCollected { pairs: set.len() });

    if set.len() > config.candidate_ceiling {
        let before = set.len();
        set.truncate(config.candidate_ceiling);
        sink.event(TraceEvent::CandidatesClamped {
            before,
            after: set.len(),
        });
    }

    let merged = widen(f, alias, &mut set, &cand_pos, config);
    sink.event(TraceEvent::PacksWidened {
        merged,
        total: set.len(),
    });

    if set.len() > config.widened_ceiling {
        let before = set.len();
        set.truncate(config.widened_ceiling);
        sink.event(TraceEvent::CandidatesClamped {
            before,
            after: set.len(),
        });
    }

    set
}

/// Normalize lane order for a fresh pair: memory pairs by ascending offset,
/// everything else by program order.
fn order_lanes(f: &Function, alias: &AliasOracle, a: InstId, b: InstId) -> (InstId, InstId) {
    if f.opcode(a).is_memory_access() {
        if legality::are_adjacent(f, alias, a, b) {
            return (a, b);
        }
        return (b, a);
    }
    if f.comes_before(a, b) {
        (a, b)
    } else {
        (b, a)
    }
}

// =============================================================================
// Widening
// =============================================================================

/// Iteratively merge same-width packs into double-width packs. Returns the
/// number of merges performed.
fn widen(
    f: &Function,
    alias: &AliasOracle,
    set: &mut CandidateSet,
    cand_pos: &FxHashMap<InstId, usize>,
    config: &SlpConfig,
) -> usize {
    let mut merges = 0usize;
    let mut attempted: FxHashSet<(PackId, PackId)> = FxHashSet::default();

    loop {
        let mut merged_this_round = false;
        let n = set.len();

        'outer: for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let (i, j) = (i as PackId, j as PackId);
                if attempted.contains(&(i, j)) {
                    continue;
                }
                attempted.insert((i, j));

                if !can_merge(f, alias, set, cand_pos, config, i, j) {
                    continue;
                }

                let mut lanes = set.pack(i).lanes.clone();
                lanes.extend_from_slice(&set.pack(j).lanes);
                set.push(Pack { lanes });
                merges += 1;
                merged_this_round = true;

                if merges >= config.merge_budget || set.len() >= config.widened_ceiling {
                    return merges;
                }
                // New packs joined the list; restart the scan.
                break 'outer;
            }
        }

        if !merged_this_round {
            return merges;
        }
    }
}

/// Check whether pack `j` can be appended to pack `i` as its upper lanes.
fn can_merge(
    f: &Function,
    alias: &AliasOracle,
    set: &CandidateSet,
    cand_pos: &FxHashMap<InstId, usize>,
    config: &SlpConfig,
    i: PackId,
    j: PackId,
) -> bool {
    let p1 = set.pack(i);
    let p2 = set.pack(j);

    if p1.width() != p2.width() || p1.width() * 2 > config.max_pack_width {
        return false;
    }
    if !legality::are_schedulable_together(f, p1.first(), p2.first()) {
        return false;
    }

    // Lane-wise isomorphic and distinct, no shared lanes.
    for k in 0..p1.width() {
        let (a, b) = (p1.lanes[k], p2.lanes[k]);
        if a == b || !legality::are_isomorphic(f, a, b) {
            return false;
        }
    }
    if p1.lanes.iter().any(|l| p2.contains(*l)) {
        return false;
    }

    // Boundary lanes must be close in candidate order.
    let (Some(&end1), Some(&start2)) = (cand_pos.get(&p1.last()), cand_pos.get(&p2.first()))
    else {
        return false;
    };
    if start2 < end1 || start2 - end1 > config.gap_window + 1 {
        return false;
    }

    // Memory packs additionally need boundary adjacency.
    let mem1 = f.opcode(p1.last()).is_memory_access();
    let mem2 = f.opcode(p2.first()).is_memory_access();
    if mem1 != mem2 {
        return false;
    }
    if mem1 {
        if !legality::are_isomorphic(f, p1.first(), p2.first()) {
            return false;
        }
        if !legality::are_adjacent(f, alias, p1.last(), p2.first()) {
            return false;
        }
    }

    true
}

// =============================================================================
// Tests
// =============================================================================
