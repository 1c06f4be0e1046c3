//! Instruction operands and constants

use serde::{Deserialize, Serialize};

use super::types::{ScalarKind, Type};

/// SSA value identifier, dense and unique within a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id(pub u32);

impl Id {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A constant value embedded in an instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// Integer bits, zero-extended from `bits`
    Int { bits: u32, value: u64 },
    Float { bits: u32, value: f64 },
    /// Vector of scalar constants
    Vector(Vec<Constant>),
    /// Struct or array constant
    Aggregate { ty: Type, members: Vec<Constant> },
    /// Zero initializer of any type
    Zero(Type),
}

impl Constant {
    pub fn int(bits: u32, value: i64) -> Self {
        let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
        Constant::Int { bits, value: (value as u64) & mask }
    }

    pub fn i32(value: i32) -> Self {
        Constant::int(32, value as i64)
    }

    pub fn u32(value: u32) -> Self {
        Constant::Int { bits: 32, value: value as u64 }
    }

    pub fn i64(value: i64) -> Self {
        Constant::int(64, value)
    }

    pub fn bool(value: bool) -> Self {
        Constant::Int { bits: 1, value: value as u64 }
    }

    pub fn f32(value: f32) -> Self {
        Constant::Float { bits: 32, value: value as f64 }
    }

    pub fn f64(value: f64) -> Self {
        Constant::Float { bits: 64, value }
    }

    /// Type of the constant
    pub fn ty(&self) -> Type {
        match self {
            Constant::Int { bits, .. } => Type::Scalar { kind: ScalarKind::Int, bits: *bits },
            Constant::Float { bits, .. } => Type::Scalar { kind: ScalarKind::Float, bits: *bits },
            Constant::Vector(elems) => {
                let elem = elems.first().map(Constant::ty).unwrap_or(Type::Void);
                Type::vector(elem, elems.len() as u32)
            }
            Constant::Aggregate { ty, .. } | Constant::Zero(ty) => ty.clone(),
        }
    }

    /// Integer payload of a scalar constant
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Constant::Int { value, .. } => Some(*value),
            Constant::Zero(ty) if ty.is_int() => Some(0),
            _ => None,
        }
    }
}

/// An instruction operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Reference to an SSA definition, global variable or argument
    Id(Id),
    Const(Constant),
    /// Basic block label
    Block(u32),
    Undef(Type),
}

impl Operand {
    pub fn id(&self) -> Option<Id> {
        match self {
            Operand::Id(id) => Some(*id),
            _ => None,
        }
    }

    pub fn block(&self) -> Option<u32> {
        match self {
            Operand::Block(b) => Some(*b),
            _ => None,
        }
    }

    pub fn constant(&self) -> Option<&Constant> {
        match self {
            Operand::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Operand::Undef(_))
    }
}

impl From<Id> for Operand {
    fn from(id: Id) -> Self {
        Operand::Id(id)
    }
}

impl From<Constant> for Operand {
    fn from(c: Constant) -> Self {
        Operand::Const(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_constant_masks_to_width() {
        assert_eq!(Constant::i32(-3), Constant::Int { bits: 32, value: 0xFFFF_FFFD });
        assert_eq!(Constant::int(8, -1).as_u64(), Some(0xFF));
        assert_eq!(Constant::i64(-1).as_u64(), Some(u64::MAX));
    }

    #[test]
    fn test_constant_types() {
        let v = Constant::Vector(vec![Constant::f32(1.0), Constant::f32(2.0)]);
        assert_eq!(v.ty(), Type::vector(Type::f32(), 2));
        assert_eq!(Constant::bool(true).ty(), Type::bool());
        assert_eq!(Constant::Zero(Type::i32()).as_u64(), Some(0));
    }
}
