//! Shader values and variables
//!
//! A `ShaderValue` holds up to 16 components. Every component is stored as the
//! zero-extended bit pattern of its element type, so a `Half` component keeps
//! its 16 raw bits and an `SInt` component keeps 32 bits with no sign
//! extension. Typed accessors reinterpret the bits on the way out.

use serde::{Deserialize, Serialize};

use super::binding::BindingSlot;
use super::numeric::{f16_to_f32, f32_to_f16, mask};
use crate::program::Type;

/// Maximum number of components in a flat value
pub const MAX_COMPONENTS: usize = 16;

/// Variable element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VarType {
    #[default]
    Unknown,
    Bool,
    SByte,
    UByte,
    SShort,
    UShort,
    SInt,
    UInt,
    SLong,
    ULong,
    Half,
    Float,
    Double,
    Struct,
    GPUPointer,
    ReadOnlyResource,
    ReadWriteResource,
    Sampler,
    ConstantBlock,
}

impl VarType {
    /// Byte size of one element
    pub fn byte_size(self) -> usize {
        match self {
            VarType::Double | VarType::SLong | VarType::ULong | VarType::GPUPointer => 8,
            VarType::Half | VarType::SShort | VarType::UShort => 2,
            VarType::Bool | VarType::SByte | VarType::UByte => 1,
            _ => 4,
        }
    }

    /// Bit width of one element
    pub fn bits(self) -> u32 {
        match self {
            VarType::Bool => 1,
            other => other.byte_size() as u32 * 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, VarType::Half | VarType::Float | VarType::Double)
    }

    pub fn is_signed(self) -> bool {
        matches!(self, VarType::SByte | VarType::SShort | VarType::SInt | VarType::SLong)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            VarType::Bool
                | VarType::SByte
                | VarType::UByte
                | VarType::SShort
                | VarType::UShort
                | VarType::SInt
                | VarType::UInt
                | VarType::SLong
                | VarType::ULong
        )
    }

    /// Opaque handle types
    pub fn is_handle(self) -> bool {
        matches!(
            self,
            VarType::ReadOnlyResource
                | VarType::ReadWriteResource
                | VarType::Sampler
                | VarType::ConstantBlock
        )
    }
}

/// Flat component storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShaderValue {
    comps: [u64; MAX_COMPONENTS],
}

impl ShaderValue {
    #[inline]
    pub fn get(&self, c: usize) -> u64 {
        self.comps.get(c).copied().unwrap_or(0)
    }

    #[inline]
    pub fn set(&mut self, c: usize, bits: u64) {
        if let Some(slot) = self.comps.get_mut(c) {
            *slot = bits;
        }
    }

    pub fn u32v(&self, c: usize) -> u32 {
        self.get(c) as u32
    }

    pub fn s32v(&self, c: usize) -> i32 {
        self.get(c) as u32 as i32
    }

    pub fn u64v(&self, c: usize) -> u64 {
        self.get(c)
    }

    pub fn f32v(&self, c: usize) -> f32 {
        f32::from_bits(self.get(c) as u32)
    }

    pub fn f64v(&self, c: usize) -> f64 {
        f64::from_bits(self.get(c))
    }

    pub fn set_u32(&mut self, c: usize, v: u32) {
        self.set(c, v as u64);
    }

    pub fn set_s32(&mut self, c: usize, v: i32) {
        self.set(c, v as u32 as u64);
    }

    pub fn set_f32(&mut self, c: usize, v: f32) {
        self.set(c, v.to_bits() as u64);
    }

    pub fn set_f64(&mut self, c: usize, v: f64) {
        self.set(c, v.to_bits());
    }
}

/// A named, typed value
///
/// Struct and array values keep their elements in `members`; everything else
/// uses the flat `value` with `rows * columns` components.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShaderVariable {
    pub name: String,
    pub ty: VarType,
    pub rows: u8,
    pub columns: u8,
    pub value: ShaderValue,
    pub members: Vec<ShaderVariable>,
    /// Binding of a resource handle
    pub binding: Option<BindingSlot>,
}

impl ShaderVariable {
    pub fn new(name: impl Into<String>, ty: VarType, rows: u8, columns: u8) -> Self {
        ShaderVariable {
            name: name.into(),
            ty,
            rows,
            columns,
            ..Default::default()
        }
    }

    /// A 1x1 variable holding raw component bits
    pub fn scalar(name: impl Into<String>, ty: VarType, bits: u64) -> Self {
        let mut var = ShaderVariable::new(name, ty, 1, 1);
        var.value.set(0, bits & mask(ty.bits()));
        var
    }

    pub fn from_u32s(name: impl Into<String>, values: &[u32]) -> Self {
        let mut var = ShaderVariable::new(name, VarType::UInt, 1, values.len() as u8);
        for (c, v) in values.iter().enumerate() {
            var.value.set_u32(c, *v);
        }
        var
    }

    pub fn from_i32s(name: impl Into<String>, values: &[i32]) -> Self {
        let mut var = ShaderVariable::new(name, VarType::SInt, 1, values.len() as u8);
        for (c, v) in values.iter().enumerate() {
            var.value.set_s32(c, *v);
        }
        var
    }

    pub fn from_f32s(name: impl Into<String>, values: &[f32]) -> Self {
        let mut var = ShaderVariable::new(name, VarType::Float, 1, values.len() as u8);
        for (c, v) in values.iter().enumerate() {
            var.value.set_f32(c, *v);
        }
        var
    }

    /// A named list of members
    pub fn aggregate(name: impl Into<String>, members: Vec<ShaderVariable>) -> Self {
        ShaderVariable {
            name: name.into(),
            ty: VarType::Struct,
            members,
            ..Default::default()
        }
    }

    /// Zero value shaped like `ty`
    ///
    /// Pointers take the shape of their pointee. Arrays become one member per
    /// element named `name[i]`, structs one member per field.
    pub fn zeroed_for_type(name: impl Into<String>, ty: &Type) -> Self {
        let name = name.into();
        match ty {
            Type::Pointer { pointee, .. } => ShaderVariable::zeroed_for_type(name, pointee),
            Type::Struct { members, .. } => {
                let members = members
                    .iter()
                    .enumerate()
                    .map(|(i, m)| ShaderVariable::zeroed_for_type(format!("_child{}", i), m))
                    .collect();
                ShaderVariable::aggregate(name, members)
            }
            Type::Array { elem, count } => {
                let members = (0..*count)
                    .map(|i| ShaderVariable::zeroed_for_type(format!("{}[{}]", name, i), elem))
                    .collect();
                ShaderVariable {
                    name,
                    ty: elem.var_type(),
                    rows: *count as u8,
                    columns: 1,
                    members,
                    ..Default::default()
                }
            }
            Type::Vector { elem, count } => {
                ShaderVariable::new(name, elem.var_type(), 1, *count as u8)
            }
            Type::Handle => ShaderVariable::new(name, VarType::Unknown, 1, 1),
            _ => ShaderVariable::new(name, ty.var_type(), 1, 1),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        !self.members.is_empty() || self.ty == VarType::Struct
    }

    /// Number of flat components
    pub fn component_count(&self) -> usize {
        self.rows as usize * self.columns as usize
    }

    /// Component reinterpreted as f64 regardless of float width
    pub fn float_comp(&self, c: usize) -> f64 {
        let bits = self.value.get(c);
        match self.ty {
            VarType::Half => f16_to_f32(bits as u16) as f64,
            VarType::Double => f64::from_bits(bits),
            _ => f32::from_bits(bits as u32) as f64,
        }
    }

    /// Store a float component rounded to this variable's float width
    pub fn set_float_comp(&mut self, c: usize, v: f64) {
        let bits = match self.ty {
            VarType::Half => f32_to_f16(v as f32) as u64,
            VarType::Double => v.to_bits(),
            _ => (v as f32).to_bits() as u64,
        };
        self.value.set(c, bits);
    }

    /// Component sign-extended to 64 bits
    pub fn int_comp(&self, c: usize) -> i64 {
        super::numeric::sext(self.value.get(c), self.ty.bits())
    }

    /// Store an integer component truncated to this variable's width
    pub fn set_int_comp(&mut self, c: usize, v: u64) {
        self.value.set(c, v & mask(self.ty.bits()));
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Find a direct member by name
    pub fn member(&self, name: &str) -> Option<&ShaderVariable> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Per-lane builtin input values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderBuiltin {
    DispatchThreadIndex,
    GroupIndex,
    GroupThreadIndex,
    GroupFlatIndex,
    PrimitiveIndex,
    ViewIndex,
    InstanceIndex,
    SampleIndex,
    MSAACoverage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_for_array_type() {
        let var = ShaderVariable::zeroed_for_type("arr", &Type::pointer(Type::array(Type::i32(), 2)));
        assert_eq!(var.rows, 2);
        assert_eq!(var.columns, 1);
        assert_eq!(var.members.len(), 2);
        assert_eq!(var.members[1].name, "arr[1]");
        assert_eq!(var.members[1].ty, VarType::SInt);
    }

    #[test]
    fn test_zeroed_for_struct_type() {
        let ty = Type::structure("S", vec![Type::f32(), Type::vector(Type::i32(), 3)]);
        let var = ShaderVariable::zeroed_for_type("s", &ty);
        assert_eq!(var.ty, VarType::Struct);
        assert_eq!(var.rows, 0);
        assert_eq!(var.members.len(), 2);
        assert_eq!(var.members[1].columns, 3);
        assert!(var.is_aggregate());
    }

    #[test]
    fn test_scalar_masks_bits() {
        let var = ShaderVariable::scalar("x", VarType::SShort, u64::MAX);
        assert_eq!(var.value.get(0), 0xFFFF);
        assert_eq!(var.int_comp(0), -1);
    }

    #[test]
    fn test_float_component_widths() {
        let mut h = ShaderVariable::new("h", VarType::Half, 1, 1);
        h.set_float_comp(0, 1.5);
        assert_eq!(h.value.get(0), 0x3E00);
        assert_eq!(h.float_comp(0), 1.5);

        let mut d = ShaderVariable::new("d", VarType::Double, 1, 1);
        d.set_float_comp(0, 0.1);
        assert_eq!(d.value.f64v(0), 0.1);
    }
}
