//! Arena-based scalar IR: instructions, types, functions.

pub mod arena;
pub mod function;
pub mod inst;
pub mod types;

pub use arena::{Arena, Id, SecondaryMap};
pub use function::{BlockId, Function};
pub use inst::{BinOp, Inst, InstFlags, InstId, Opcode, OperandList, ShuffleMask};
pub use types::{DataLayout, ScalarType, ValueType};
