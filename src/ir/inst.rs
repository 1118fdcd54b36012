//! Instruction definitions for the scalar IR.
//!
//! Instructions are records in a typed arena; all edges between them are
//! `InstId` handles. Each instruction has:
//! - **Opcode**: What the instruction computes (with immediate payloads)
//! - **Operands**: Value dependencies (use-def edges)
//! - **Result type**: Declared type of the produced value
//! - **Flags / alignment**: Memory attributes the vectorizer must respect
//!
//! The scalar subset (`Param` through `FusedMulAdd`) is what input functions
//! are built from. The vector subset (`VecLoad` through `Shuffle`) is only
//! ever produced by the vectorizer's emitter.

use super::arena::Id;
use super::types::ValueType;
use bitflags::bitflags;
use smallvec::SmallVec;

// =============================================================================
// Instruction ID
// =============================================================================

/// Unique identifier for an instruction in a function.
pub type InstId = Id<Inst>;

// =============================================================================
// Binary Operations
// =============================================================================

/// Binary arithmetic operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Min,
    Max,
}

impl BinOp {
    /// Check if the operation commutes.
    #[inline]
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Xor | BinOp::Min | BinOp::Max
        )
    }
}

// =============================================================================
// Shuffle Mask
// =============================================================================

/// Lane-selection mask for `Shuffle`.
///
/// Entry `i` names the source lane whose value lands in result lane `i`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShuffleMask(pub SmallVec<[u8; 8]>);

impl ShuffleMask {
    pub fn from_slice(lanes: &[u8]) -> Self {
        ShuffleMask(SmallVec::from_slice(lanes))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// Opcode
// =============================================================================

/// Instruction opcode with immediate payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    /// Function parameter (by index). Parameters are distinct root objects
    /// for aliasing purposes.
    Param(u16),

    /// Integer constant.
    ConstInt(i64),

    /// Floating-point constant (bit pattern, so the opcode stays `Eq`-like).
    ConstFloat(u64),

    /// Pointer plus constant byte offset.
    PtrOffset(i64),

    /// Scalar load: operand 0 is the address.
    Load,

    /// Scalar store: operand 0 is the address, operand 1 the value.
    Store,

    /// Scalar binary arithmetic: operands 0 and 1.
    Binary(BinOp),

    /// Fused multiply-add: `op0 * op1 + op2`.
    FusedMulAdd,

    /// Wide load: operand 0 is the address.
    VecLoad,

    /// Wide store: operand 0 is the address, operand 1 the vector value.
    VecStore,

    /// Lane-wise binary arithmetic on vectors.
    VecBinary(BinOp),

    /// Lane-wise fused multiply-add on vectors.
    VecFusedMulAdd,

    /// Insert scalar into lane: operand 0 the vector, operand 1 the scalar.
    Insert(u8),

    /// Extract scalar from lane: operand 0 the vector.
    Extract(u8),

    /// Permute/select lanes of a vector: operand 0 the source.
    Shuffle(ShuffleMask),
}

impl Opcode {
    /// Check if this opcode reads or writes memory.
    #[inline]
    pub fn is_memory_access(&self) -> bool {
        matches!(
            self,
            Opcode::Load | Opcode::Store | Opcode::VecLoad | Opcode::VecStore
        )
    }

    /// Check if this opcode writes memory.
    #[inline]
    pub fn is_store(&self) -> bool {
        matches!(self, Opcode::Store | Opcode::VecStore)
    }

    /// Check if this opcode reads memory.
    #[inline]
    pub fn is_load(&self) -> bool {
        matches!(self, Opcode::Load | Opcode::VecLoad)
    }

    /// Check if this opcode has any side effect beyond its result value.
    #[inline]
    pub fn has_side_effect(&self) -> bool {
        self.is_store()
    }
}

// =============================================================================
// Operand List
// =============================================================================

/// Compact operand list optimized for small arity.
///
/// Every opcode here has at most three operands, so the common cases are
/// stored inline; `Many` exists for forward compatibility only.
#[derive(Clone, PartialEq)]
pub enum OperandList {
    Empty,
    Single(InstId),
    Pair(InstId, InstId),
    Triple(InstId, InstId, InstId),
    Many(SmallVec<[InstId; 4]>),
}

impl OperandList {
    pub const fn empty() -> Self {
        OperandList::Empty
    }

    pub fn from_slice(operands: &[InstId]) -> Self {
        match operands.len() {
            0 => OperandList::Empty,
            1 => OperandList::Single(operands[0]),
            2 => OperandList::Pair(operands[0], operands[1]),
            3 => OperandList::Triple(operands[0], operands[1], operands[2]),
            _ => OperandList::Many(SmallVec::from_slice(operands)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OperandList::Empty => 0,
            OperandList::Single(_) => 1,
            OperandList::Pair(..) => 2,
            OperandList::Triple(..) => 3,
            OperandList::Many(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, OperandList::Empty)
    }

    pub fn get(&self, index: usize) -> Option<InstId> {
        match self {
            OperandList::Empty => None,
            OperandList::Single(a) => (index == 0).then_some(*a),
            OperandList::Pair(a, b) => match index {
                0 => Some(*a),
                1 => Some(*b),
                _ => None,
            },
            OperandList::Triple(a, b, c) => match index {
                0 => Some(*a),
                1 => Some(*b),
                2 => Some(*c),
                _ => None,
            },
            OperandList::Many(v) => v.get(index).copied(),
        }
    }

    pub fn set(&mut self, index: usize, value: InstId) {
        match self {
            OperandList::Single(a) if index == 0 => *a = value,
            OperandList::Pair(a, b) => match index {
                0 => *a = value,
                1 => *b = value,
                _ => {}
            },
            OperandList::Triple(a, b, c) => match index {
                0 => *a = value,
                1 => *b = value,
                2 => *c = value,
                _ => {}
            },
            OperandList::Many(v) => {
                if index < v.len() {
                    v[index] = value;
                }
            }
            _ => {}
        }
    }

    pub fn iter(&self) -> OperandIter<'_> {
        OperandIter {
            list: self,
            index: 0,
        }
    }
}

impl Default for OperandList {
    fn default() -> Self {
        OperandList::Empty
    }
}

impl std::fmt::Debug for OperandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, id) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id:?}")?;
        }
        write!(f, "]")
    }
}

/// Iterator over an operand list.
pub struct OperandIter<'a> {
    list: &'a OperandList,
    index: usize,
}

impl Iterator for OperandIter<'_> {
    type Item = InstId;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.list.get(self.index);
        self.index += 1;
        result
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.list.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for OperandIter<'_> {}

// =============================================================================
// Instruction Flags
// =============================================================================

bitflags! {
    /// Per-instruction attribute flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InstFlags: u8 {
        /// Volatile memory access; never reordered, merged or removed.
        const VOLATILE = 1 << 0;

        /// Erased instruction (arena tombstone).
        const DEAD = 1 << 1;
    }
}

// =============================================================================
// Instruction
// =============================================================================

/// An instruction record.
#[derive(Debug, Clone)]
pub struct Inst {
    /// The operation this instruction performs.
    pub op: Opcode,

    /// Value operands (use-def edges).
    pub operands: OperandList,

    /// Result type (`Void` for stores).
    pub ty: ValueType,

    /// Alignment in bytes for memory accesses, 0 otherwise.
    pub align: u32,

    /// Attribute flags.
    pub flags: InstFlags,
}

impl Inst {
    /// Create an instruction with no memory attributes.
    pub fn new(op: Opcode, operands: OperandList, ty: ValueType) -> Self {
        Inst {
            op,
            operands,
            ty,
            align: 0,
            flags: InstFlags::empty(),
        }
    }

    /// Check if this instruction is an arena tombstone.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.flags.contains(InstFlags::DEAD)
    }

    /// Check if this instruction is a volatile memory access.
    #[inline]
    pub fn is_volatile(&self) -> bool {
        self.flags.contains(InstFlags::VOLATILE)
    }

    /// Address operand of a memory access.
    #[inline]
    pub fn address(&self) -> Option<InstId> {
        if self.op.is_memory_access() {
            self.operands.get(0)
        } else {
            None
        }
    }

    /// Stored value of a store.
    #[inline]
    pub fn stored_value(&self) -> Option<InstId> {
        if self.op.is_store() {
            self.operands.get(1)
        } else {
            None
        }
    }

    /// Type of the value the access moves: result type for loads, stored
    /// value type for stores (the function resolves the latter).
    #[inline]
    pub fn result_ty(&self) -> ValueType {
        self.ty
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::ScalarType;

    #[test]
    fn test_operand_list_from_slice() {
        let ids: Vec<InstId> = (0..5).map(InstId::new).collect();

        assert_eq!(OperandList::from_slice(&[]).len(), 0);
        assert_eq!(OperandList::from_slice(&ids[..1]).len(), 1);
        assert_eq!(OperandList::from_slice(&ids[..3]).len(), 3);
        assert_eq!(OperandList::from_slice(&ids).len(), 5);
    }

    #[test]
    fn test_operand_list_get_set() {
        let a = InstId::new(1);
        let b = InstId::new(2);
        let mut ops = OperandList::Pair(a, b);

        assert_eq!(ops.get(0), Some(a));
        assert_eq!(ops.get(1), Some(b));
        assert_eq!(ops.get(2), None);

        ops.set(1, InstId::new(9));
        assert_eq!(ops.get(1), Some(InstId::new(9)));
    }

    #[test]
    fn test_operand_iter() {
        let ids: Vec<InstId> = (0..3).map(InstId::new).collect();
        let ops = OperandList::from_slice(&ids);
        let collected: Vec<InstId> = ops.iter().collect();
        assert_eq!(collected, ids);
    }

    #[test]
    fn test_opcode_classification() {
        assert!(Opcode::Load.is_memory_access());
        assert!(Opcode::Store.is_store());
        assert!(!Opcode::Store.is_load());
        assert!(Opcode::VecLoad.is_load());
        assert!(!Opcode::Binary(BinOp::Add).is_memory_access());
        assert!(Opcode::VecStore.has_side_effect());
    }

    #[test]
    fn test_inst_flags() {
        let mut inst = Inst::new(
            Opcode::Load,
            OperandList::Single(InstId::new(0)),
            ValueType::Scalar(ScalarType::F32),
        );
        assert!(!inst.is_volatile());

        inst.flags |= InstFlags::VOLATILE;
        assert!(inst.is_volatile());
        assert!(!inst.is_dead());
    }

    #[test]
    fn test_inst_accessors() {
        let addr = InstId::new(0);
        let val = InstId::new(1);
        let store = Inst::new(
            Opcode::Store,
            OperandList::Pair(addr, val),
            ValueType::Void,
        );
        assert_eq!(store.address(), Some(addr));
        assert_eq!(store.stored_value(), Some(val));

        let add = Inst::new(
            Opcode::Binary(BinOp::Add),
            OperandList::Pair(addr, val),
            ValueType::Scalar(ScalarType::I32),
        );
        assert_eq!(add.address(), None);
    }

    #[test]
    fn test_binop_commutativity() {
        assert!(BinOp::Add.is_commutative());
        assert!(BinOp::Mul.is_commutative());
        assert!(!BinOp::Sub.is_commutative());
        assert!(!BinOp::Div.is_commutative());
    }
}
