//! Value types and data layout.
//!
//! The type system is deliberately small: scalar numerics, fixed-width
//! vectors of scalars, and pointers. The vectorizer only ever converts
//! scalar-typed instructions into vector-typed ones, so the classification
//! helpers here answer exactly the questions the pass asks:
//!
//! - **Sized?**: whether a type has a fixed in-memory store size
//! - **Vectorizable element?**: scalar numeric, never pointer or vector
//! - **Layout**: store size and preferred alignment per type

use std::fmt;

// =============================================================================
// Scalar Types
// =============================================================================

/// Scalar numeric type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ScalarType {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ScalarType {
    /// Store size in bytes.
    #[inline]
    pub const fn size_bytes(self) -> u64 {
        match self {
            ScalarType::I8 => 1,
            ScalarType::I16 => 2,
            ScalarType::I32 => 4,
            ScalarType::I64 => 8,
            ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }

    /// Check if this is a floating-point type.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    /// Check if this is an integer type.
    #[inline]
    pub const fn is_int(self) -> bool {
        !self.is_float()
    }
}

impl fmt::Debug for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::I8 => write!(f, "i8"),
            ScalarType::I16 => write!(f, "i16"),
            ScalarType::I32 => write!(f, "i32"),
            ScalarType::I64 => write!(f, "i64"),
            ScalarType::F32 => write!(f, "f32"),
            ScalarType::F64 => write!(f, "f64"),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Value Types
// =============================================================================

/// Type of an IR value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Scalar numeric value.
    Scalar(ScalarType),

    /// Fixed-width vector of scalars.
    Vector(ScalarType, u8),

    /// Pointer (opaque, no pointee type).
    Ptr,

    /// No value (stores).
    Void,
}

impl ValueType {
    /// Element type and lane count, treating scalars as 1-lane.
    ///
    /// Returns `None` for pointers and void.
    #[inline]
    pub fn elem_and_lanes(self) -> Option<(ScalarType, u8)> {
        match self {
            ValueType::Scalar(s) => Some((s, 1)),
            ValueType::Vector(s, n) => Some((s, n)),
            ValueType::Ptr | ValueType::Void => None,
        }
    }

    /// Check if this is a scalar numeric type.
    #[inline]
    pub const fn is_scalar(self) -> bool {
        matches!(self, ValueType::Scalar(_))
    }

    /// Check if this is a vector type.
    #[inline]
    pub const fn is_vector(self) -> bool {
        matches!(self, ValueType::Vector(_, _))
    }

    /// Check if this is a pointer.
    #[inline]
    pub const fn is_ptr(self) -> bool {
        matches!(self, ValueType::Ptr)
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Scalar(s) => write!(f, "{s:?}"),
            ValueType::Vector(s, n) => write!(f, "<{n} x {s:?}>"),
            ValueType::Ptr => write!(f, "ptr"),
            ValueType::Void => write!(f, "void"),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Default for ValueType {
    fn default() -> Self {
        ValueType::Void
    }
}

// =============================================================================
// Data Layout
// =============================================================================

/// Target data layout: store sizes and preferred alignments.
///
/// `store_size` returns `None` for types with no fixed in-memory size
/// (pointers are target-width here, so only `Void` is unsized).
#[derive(Debug, Clone, Copy, Default)]
pub struct DataLayout {
    _private: (),
}

impl DataLayout {
    pub fn new() -> Self {
        DataLayout { _private: () }
    }

    /// In-memory store size of a type in bytes, if it has one.
    pub fn store_size(&self, ty: ValueType) -> Option<u64> {
        match ty {
            ValueType::Scalar(s) => Some(s.size_bytes()),
            ValueType::Vector(s, n) => Some(s.size_bytes() * n as u64),
            ValueType::Ptr => Some(8),
            ValueType::Void => None,
        }
    }

    /// Preferred (natural) alignment of a type in bytes.
    pub fn preferred_align(&self, ty: ValueType) -> u64 {
        match ty {
            ValueType::Scalar(s) => s.size_bytes(),
            // Vectors align to the element, not the full width; wide vector
            // memory ops are emitted as unaligned accesses.
            ValueType::Vector(s, _) => s.size_bytes(),
            ValueType::Ptr => 8,
            ValueType::Void => 1,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_sizes() {
        assert_eq!(ScalarType::I8.size_bytes(), 1);
        assert_eq!(ScalarType::I32.size_bytes(), 4);
        assert_eq!(ScalarType::F64.size_bytes(), 8);
    }

    #[test]
    fn test_scalar_classification() {
        assert!(ScalarType::F32.is_float());
        assert!(!ScalarType::F32.is_int());
        assert!(ScalarType::I64.is_int());
    }

    #[test]
    fn test_elem_and_lanes() {
        assert_eq!(
            ValueType::Scalar(ScalarType::F32).elem_and_lanes(),
            Some((ScalarType::F32, 1))
        );
        assert_eq!(
            ValueType::Vector(ScalarType::I32, 4).elem_and_lanes(),
            Some((ScalarType::I32, 4))
        );
        assert_eq!(ValueType::Ptr.elem_and_lanes(), None);
    }

    #[test]
    fn test_store_size() {
        let dl = DataLayout::new();
        assert_eq!(dl.store_size(ValueType::Scalar(ScalarType::I32)), Some(4));
        assert_eq!(
            dl.store_size(ValueType::Vector(ScalarType::F32, 4)),
            Some(16)
        );
        assert_eq!(dl.store_size(ValueType::Ptr), Some(8));
        assert_eq!(dl.store_size(ValueType::Void), None);
    }

    #[test]
    fn test_type_display() {
        assert_eq!(
            format!("{}", ValueType::Vector(ScalarType::F32, 4)),
            "<4 x f32>"
        );
        assert_eq!(format!("{}", ValueType::Scalar(ScalarType::I64)), "i64");
    }
}
