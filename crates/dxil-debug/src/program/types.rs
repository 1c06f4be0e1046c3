//! Program model types
//!
//! Types are structural: two types compare equal when their shape matches.
//! Byte sizes follow the declared element widths with no padding.

use serde::{Deserialize, Serialize};

use crate::shader::VarType;

/// Scalar category (integers are signless, operations pick the signedness)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Int,
    Float,
}

/// Pointer address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressSpace {
    /// Function-local stack memory
    #[default]
    Local,
    /// Device memory
    Device,
    /// Constant buffer memory
    Constant,
    /// Workgroup shared memory
    GroupShared,
}

/// A type in the program model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    Label,
    Scalar { kind: ScalarKind, bits: u32 },
    Vector { elem: Box<Type>, count: u32 },
    Array { elem: Box<Type>, count: u32 },
    Struct { name: String, members: Vec<Type> },
    Pointer { pointee: Box<Type>, space: AddressSpace },
    /// Opaque resource / sampler / constant block handle
    Handle,
}

impl Type {
    pub fn int(bits: u32) -> Self {
        Type::Scalar { kind: ScalarKind::Int, bits }
    }

    pub fn float(bits: u32) -> Self {
        Type::Scalar { kind: ScalarKind::Float, bits }
    }

    pub fn bool() -> Self {
        Type::int(1)
    }

    pub fn i32() -> Self {
        Type::int(32)
    }

    pub fn i64() -> Self {
        Type::int(64)
    }

    pub fn f32() -> Self {
        Type::float(32)
    }

    pub fn f64() -> Self {
        Type::float(64)
    }

    pub fn vector(elem: Type, count: u32) -> Self {
        Type::Vector { elem: Box::new(elem), count }
    }

    pub fn array(elem: Type, count: u32) -> Self {
        Type::Array { elem: Box::new(elem), count }
    }

    pub fn structure(name: impl Into<String>, members: Vec<Type>) -> Self {
        Type::Struct { name: name.into(), members }
    }

    pub fn pointer(pointee: Type) -> Self {
        Type::Pointer { pointee: Box::new(pointee), space: AddressSpace::Local }
    }

    pub fn pointer_in(pointee: Type, space: AddressSpace) -> Self {
        Type::Pointer { pointee: Box::new(pointee), space }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Scalar { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self.scalar(), Some(Type::Scalar { kind: ScalarKind::Float, .. }))
    }

    pub fn is_int(&self) -> bool {
        matches!(self.scalar(), Some(Type::Scalar { kind: ScalarKind::Int, .. }))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    /// The scalar of a scalar or vector type
    pub fn scalar(&self) -> Option<&Type> {
        match self {
            Type::Scalar { .. } => Some(self),
            Type::Vector { elem, .. } => elem.scalar(),
            _ => None,
        }
    }

    /// Bit width of the scalar element, 0 for non-numeric types
    pub fn scalar_bits(&self) -> u32 {
        match self.scalar() {
            Some(Type::Scalar { bits, .. }) => *bits,
            _ => 0,
        }
    }

    /// Number of vector lanes, 1 for everything else
    pub fn element_count(&self) -> u32 {
        match self {
            Type::Vector { count, .. } => *count,
            _ => 1,
        }
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer { pointee, .. } => Some(pointee),
            _ => None,
        }
    }

    pub fn struct_members(&self) -> Option<&[Type]> {
        match self {
            Type::Struct { members, .. } => Some(members),
            _ => None,
        }
    }

    /// Size in bytes of a value of this type
    pub fn byte_size(&self) -> usize {
        match self {
            Type::Void | Type::Label | Type::Handle => 0,
            Type::Scalar { bits, .. } => (*bits as usize).div_ceil(8),
            Type::Vector { elem, count } | Type::Array { elem, count } => {
                elem.byte_size() * *count as usize
            }
            Type::Struct { members, .. } => members.iter().map(Type::byte_size).sum(),
            // Pointers are tracked out of band, their value is the pointee
            Type::Pointer { pointee, .. } => pointee.byte_size(),
        }
    }

    /// Shader variable type carried by values of this type
    pub fn var_type(&self) -> VarType {
        match self {
            Type::Struct { .. } => VarType::Struct,
            Type::Vector { elem, .. } | Type::Array { elem, .. } => elem.var_type(),
            Type::Pointer { pointee, .. } => pointee.var_type(),
            Type::Scalar { kind: ScalarKind::Int, bits } => match bits {
                1 => VarType::Bool,
                8 => VarType::SByte,
                16 => VarType::SShort,
                32 => VarType::SInt,
                64 => VarType::SLong,
                _ => VarType::Unknown,
            },
            Type::Scalar { kind: ScalarKind::Float, bits } => match bits {
                16 => VarType::Half,
                32 => VarType::Float,
                64 => VarType::Double,
                _ => VarType::Unknown,
            },
            Type::Void | Type::Label | Type::Handle => VarType::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_sizes() {
        assert_eq!(Type::i32().byte_size(), 4);
        assert_eq!(Type::bool().byte_size(), 1);
        assert_eq!(Type::vector(Type::float(16), 4).byte_size(), 8);
        assert_eq!(Type::array(Type::f64(), 3).byte_size(), 24);
        let s = Type::structure("S", vec![Type::i32(), Type::vector(Type::f32(), 3), Type::int(8)]);
        assert_eq!(s.byte_size(), 17);
        assert_eq!(Type::pointer(s).byte_size(), 17);
    }

    #[test]
    fn test_var_types() {
        assert_eq!(Type::i32().var_type(), VarType::SInt);
        assert_eq!(Type::bool().var_type(), VarType::Bool);
        assert_eq!(Type::vector(Type::float(16), 2).var_type(), VarType::Half);
        assert_eq!(Type::array(Type::i64(), 2).var_type(), VarType::SLong);
        assert_eq!(Type::pointer(Type::f32()).var_type(), VarType::Float);
        assert_eq!(Type::structure("S", vec![]).var_type(), VarType::Struct);
        assert_eq!(Type::Handle.var_type(), VarType::Unknown);
    }

    #[test]
    fn test_scalar_queries() {
        let v = Type::vector(Type::f32(), 4);
        assert!(v.is_float());
        assert!(!v.is_scalar());
        assert_eq!(v.scalar_bits(), 32);
        assert_eq!(v.element_count(), 4);
        assert_eq!(Type::array(Type::i32(), 3).scalar_bits(), 0);
    }
}
