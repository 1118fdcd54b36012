//! Function container: instruction arena, block layout, def/use chains.
//!
//! A function owns:
//! - An [`Arena`] of instructions (the only owner; everything else is ids)
//! - Basic blocks as ordered instruction lists (program order within a block)
//! - Use chains: for every instruction, the list of instructions using it
//!
//! Program-order queries (`comes_before`) are answered from a per-instruction
//! position index kept in sync on every insert/erase, so mutation is O(block)
//! and queries are O(1). Erased instructions stay in the arena as `DEAD`
//! tombstones; the arena never shrinks.

use super::arena::{Arena, SecondaryMap};
use super::inst::{BinOp, Inst, InstFlags, InstId, Opcode, OperandList};
use super::types::{DataLayout, ScalarType, ValueType};
use smallvec::SmallVec;

// =============================================================================
// Blocks
// =============================================================================

/// Block identifier (index into the function's block list).
pub type BlockId = u32;

#[derive(Debug, Clone, Default)]
struct Block {
    insts: Vec<InstId>,
}

// =============================================================================
// Function
// =============================================================================

/// A single function over the scalar IR.
#[derive(Debug, Clone)]
pub struct Function {
    insts: Arena<Inst>,
    blocks: Vec<Block>,

    /// Block containing each instruction (`u32::MAX` for free-floating
    /// definitions like params and constants).
    inst_block: Vec<u32>,

    /// Position of each instruction within its block.
    inst_pos: Vec<u32>,

    /// Use chains: users of each instruction.
    uses: SecondaryMap<Inst, SmallVec<[InstId; 4]>>,

    layout: DataLayout,
}

const NO_BLOCK: u32 = u32::MAX;

impl Function {
    /// Create a function with a single empty entry block.
    pub fn new() -> Self {
        Function {
            insts: Arena::new(),
            blocks: vec![Block::default()],
            inst_block: Vec::new(),
            inst_pos: Vec::new(),
            uses: SecondaryMap::new(),
            layout: DataLayout::new(),
        }
    }

    /// The target data layout.
    #[inline]
    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// The entry block.
    #[inline]
    pub fn entry_block(&self) -> BlockId {
        0
    }

    /// Append a new empty block.
    pub fn add_block(&mut self) -> BlockId {
        self.blocks.push(Block::default());
        (self.blocks.len() - 1) as BlockId
    }

    /// Number of blocks.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Instructions of a block in program order.
    #[inline]
    pub fn block_insts(&self, block: BlockId) -> &[InstId] {
        &self.blocks[block as usize].insts
    }

    /// Total number of instruction slots allocated (including tombstones).
    #[inline]
    pub fn inst_count(&self) -> usize {
        self.insts.len()
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// The instruction record for an id.
    #[inline]
    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id]
    }

    /// The opcode of an instruction.
    #[inline]
    pub fn opcode(&self, id: InstId) -> &Opcode {
        &self.insts[id].op
    }

    /// The result type of an instruction.
    #[inline]
    pub fn value_ty(&self, id: InstId) -> ValueType {
        self.insts[id].ty
    }

    /// Users of an instruction's value.
    #[inline]
    pub fn users(&self, id: InstId) -> &[InstId] {
        &self.uses[id]
    }

    /// Block containing an instruction, if it is placed in one.
    #[inline]
    pub fn block_of(&self, id: InstId) -> Option<BlockId> {
        let b = self.inst_block[id.as_usize()];
        (b != NO_BLOCK).then_some(b)
    }

    /// Position of an instruction within its block.
    #[inline]
    pub fn position_of(&self, id: InstId) -> Option<u32> {
        self.block_of(id)?;
        Some(self.inst_pos[id.as_usize()])
    }

    /// Check whether `a` executes strictly before `b`.
    ///
    /// Both must be placed in the same block; free-floating definitions
    /// (params, constants) count as preceding everything placed.
    pub fn comes_before(&self, a: InstId, b: InstId) -> bool {
        match (self.block_of(a), self.block_of(b)) {
            (Some(ba), Some(bb)) if ba == bb => {
                self.inst_pos[a.as_usize()] < self.inst_pos[b.as_usize()]
            }
            (None, Some(_)) => true,
            _ => false,
        }
    }

    /// Type of the value a memory access moves: result type for loads,
    /// stored-value type for stores.
    pub fn access_ty(&self, id: InstId) -> Option<ValueType> {
        let inst = &self.insts[id];
        match inst.op {
            Opcode::Load | Opcode::VecLoad => Some(inst.ty),
            Opcode::Store | Opcode::VecStore => {
                let v = inst.stored_value()?;
                Some(self.insts[v].ty)
            }
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    fn alloc(&mut self, inst: Inst) -> InstId {
        let id = self.insts.alloc(inst);
        self.inst_block.push(NO_BLOCK);
        self.inst_pos.push(0);
        self.uses.resize(self.insts.len());
        for op in self.insts[id].operands.clone().iter() {
            self.uses[op].push(id);
        }
        id
    }

    fn place(&mut self, id: InstId, block: BlockId) {
        let pos = self.blocks[block as usize].insts.len() as u32;
        self.blocks[block as usize].insts.push(id);
        self.inst_block[id.as_usize()] = block;
        self.inst_pos[id.as_usize()] = pos;
    }

    /// Create a free-floating definition (not placed in any block).
    pub fn create_floating(&mut self, inst: Inst) -> InstId {
        self.alloc(inst)
    }

    /// Create an instruction at the end of a block.
    pub fn create(&mut self, block: BlockId, inst: Inst) -> InstId {
        let id = self.alloc(inst);
        self.place(id, block);
        id
    }

    /// Create an instruction immediately before another placed instruction.
    pub fn create_before(&mut self, before: InstId, inst: Inst) -> InstId {
        let block = self.inst_block[before.as_usize()];
        debug_assert_ne!(block, NO_BLOCK);
        let id = self.alloc(inst);
        let at = self.inst_pos[before.as_usize()] as usize;
        self.blocks[block as usize].insts.insert(at, id);
        self.inst_block[id.as_usize()] = block;
        self.renumber_from(block, at);
        id
    }

    /// Create an instruction immediately after another placed instruction.
    pub fn create_after(&mut self, after: InstId, inst: Inst) -> InstId {
        let block = self.inst_block[after.as_usize()];
        debug_assert_ne!(block, NO_BLOCK);
        let id = self.alloc(inst);
        let at = self.inst_pos[after.as_usize()] as usize + 1;
        self.blocks[block as usize].insts.insert(at, id);
        self.inst_block[id.as_usize()] = block;
        self.renumber_from(block, at);
        id
    }

    fn renumber_from(&mut self, block: BlockId, from: usize) {
        let insts = &self.blocks[block as usize].insts;
        for (pos, &id) in insts.iter().enumerate().skip(from) {
            self.inst_pos[id.as_usize()] = pos as u32;
        }
    }

    // -------------------------------------------------------------------------
    // Builder helpers
    // -------------------------------------------------------------------------

    /// Function parameter (free-floating pointer root).
    pub fn param(&mut self, index: u16) -> InstId {
        self.create_floating(Inst::new(
            Opcode::Param(index),
            OperandList::empty(),
            ValueType::Ptr,
        ))
    }

    /// Integer constant.
    pub fn const_int(&mut self, value: i64, ty: ScalarType) -> InstId {
        self.create_floating(Inst::new(
            Opcode::ConstInt(value),
            OperandList::empty(),
            ValueType::Scalar(ty),
        ))
    }

    /// Floating-point constant.
    pub fn const_float(&mut self, value: f64, ty: ScalarType) -> InstId {
        self.create_floating(Inst::new(
            Opcode::ConstFloat(value.to_bits()),
            OperandList::empty(),
            ValueType::Scalar(ty),
        ))
    }

    /// Pointer plus constant byte offset (free-floating addressing).
    pub fn ptr_offset(&mut self, base: InstId, offset: i64) -> InstId {
        self.create_floating(Inst::new(
            Opcode::PtrOffset(offset),
            OperandList::Single(base),
            ValueType::Ptr,
        ))
    }

    /// Scalar load with natural alignment.
    pub fn load(&mut self, block: BlockId, addr: InstId, ty: ScalarType) -> InstId {
        let vty = ValueType::Scalar(ty);
        let align = self.layout.preferred_align(vty) as u32;
        let mut inst = Inst::new(Opcode::Load, OperandList::Single(addr), vty);
        inst.align = align;
        self.create(block, inst)
    }

    /// Scalar store with natural alignment.
    pub fn store(&mut self, block: BlockId, addr: InstId, value: InstId) -> InstId {
        let align = self.layout.preferred_align(self.insts[value].ty) as u32;
        let mut inst = Inst::new(Opcode::Store, OperandList::Pair(addr, value), ValueType::Void);
        inst.align = align;
        self.create(block, inst)
    }

    /// Scalar binary arithmetic.
    pub fn binary(&mut self, block: BlockId, op: BinOp, lhs: InstId, rhs: InstId) -> InstId {
        let ty = self.insts[lhs].ty;
        self.create(block, Inst::new(Opcode::Binary(op), OperandList::Pair(lhs, rhs), ty))
    }

    /// Fused multiply-add `a * b + c`.
    pub fn fma(&mut self, block: BlockId, a: InstId, b: InstId, c: InstId) -> InstId {
        let ty = self.insts[a].ty;
        self.create(
            block,
            Inst::new(Opcode::FusedMulAdd, OperandList::Triple(a, b, c), ty),
        )
    }

    /// Mark a memory access volatile.
    pub fn set_volatile(&mut self, id: InstId) {
        self.insts[id].flags |= InstFlags::VOLATILE;
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Rewrite every use of `old` to use `new` instead.
    pub fn replace_all_uses(&mut self, old: InstId, new: InstId) {
        let users = std::mem::take(&mut self.uses[old]);
        for &user in &users {
            let n = self.insts[user].operands.len();
            for i in 0..n {
                if self.insts[user].operands.get(i) == Some(old) {
                    self.insts[user].operands.set(i, new);
                }
            }
            self.uses[new].push(user);
        }
    }

    /// Erase an instruction: tombstone it, unlink it from its block and
    /// remove it from its operands' use chains.
    ///
    /// The caller must ensure the instruction has no remaining users.
    pub fn erase(&mut self, id: InstId) {
        debug_assert!(self.uses[id].is_empty());
        let operands: SmallVec<[InstId; 4]> = self.insts[id].operands.iter().collect();
        for op in operands {
            self.uses[op].retain(|u| *u != id);
        }
        self.insts[id].operands = OperandList::empty();
        self.insts[id].flags |= InstFlags::DEAD;

        let block = self.inst_block[id.as_usize()];
        if block != NO_BLOCK {
            let at = self.inst_pos[id.as_usize()] as usize;
            self.blocks[block as usize].insts.remove(at);
            self.inst_block[id.as_usize()] = NO_BLOCK;
            self.renumber_from(block, at);
        }
    }

    /// Check whether an instruction has been erased.
    #[inline]
    pub fn is_erased(&self, id: InstId) -> bool {
        self.insts[id].is_dead()
    }
}

impl Default for Function {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
