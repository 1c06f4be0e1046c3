//! Resource binding descriptions

use serde::{Deserialize, Serialize};

use super::variable::VarType;

/// Which descriptor heap a direct-heap binding indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HeapDescriptorType {
    #[default]
    NoHeap,
    CbvSrvUav,
    Sampler,
}

/// A (register, space) binding, or an index into a descriptor heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BindingSlot {
    pub register: u32,
    pub space: u32,
    pub heap: HeapDescriptorType,
    pub heap_index: u32,
}

impl BindingSlot {
    pub fn new(register: u32, space: u32) -> Self {
        BindingSlot { register, space, heap: HeapDescriptorType::NoHeap, heap_index: 0 }
    }

    pub fn heap(heap: HeapDescriptorType, heap_index: u32) -> Self {
        BindingSlot { register: 0, space: 0, heap, heap_index }
    }
}

/// Resource class, numbered as in the bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceClass {
    Srv = 0,
    Uav = 1,
    CBuffer = 2,
    Sampler = 3,
}

impl ResourceClass {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => ResourceClass::Srv,
            1 => ResourceClass::Uav,
            2 => ResourceClass::CBuffer,
            3 => ResourceClass::Sampler,
            _ => return None,
        })
    }

    /// Variable type of a handle of this class
    pub fn var_type(self) -> VarType {
        match self {
            ResourceClass::Srv => VarType::ReadOnlyResource,
            ResourceClass::Uav => VarType::ReadWriteResource,
            ResourceClass::CBuffer => VarType::ConstantBlock,
            ResourceClass::Sampler => VarType::Sampler,
        }
    }

    pub fn category(self) -> DescriptorCategory {
        match self {
            ResourceClass::Srv => DescriptorCategory::ReadOnlyResource,
            ResourceClass::Uav => DescriptorCategory::ReadWriteResource,
            ResourceClass::CBuffer => DescriptorCategory::ConstantBlock,
            ResourceClass::Sampler => DescriptorCategory::Sampler,
        }
    }
}

/// Descriptor category used by direct heap access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorCategory {
    ReadOnlyResource,
    ReadWriteResource,
    ConstantBlock,
    Sampler,
}

/// Resource shape, numbered as in the bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResourceKind {
    #[default]
    Invalid = 0,
    Texture1D = 1,
    Texture2D = 2,
    Texture2DMS = 3,
    Texture3D = 4,
    TextureCube = 5,
    Texture1DArray = 6,
    Texture2DArray = 7,
    Texture2DMSArray = 8,
    TextureCubeArray = 9,
    TypedBuffer = 10,
    RawBuffer = 11,
    StructuredBuffer = 12,
    CBuffer = 13,
    Sampler = 14,
    StructuredBufferWithCounter = 17,
}

impl ResourceKind {
    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => ResourceKind::Texture1D,
            2 => ResourceKind::Texture2D,
            3 => ResourceKind::Texture2DMS,
            4 => ResourceKind::Texture3D,
            5 => ResourceKind::TextureCube,
            6 => ResourceKind::Texture1DArray,
            7 => ResourceKind::Texture2DArray,
            8 => ResourceKind::Texture2DMSArray,
            9 => ResourceKind::TextureCubeArray,
            10 => ResourceKind::TypedBuffer,
            11 => ResourceKind::RawBuffer,
            12 => ResourceKind::StructuredBuffer,
            13 => ResourceKind::CBuffer,
            14 => ResourceKind::Sampler,
            17 => ResourceKind::StructuredBufferWithCounter,
            _ => ResourceKind::Invalid,
        }
    }

    pub fn is_structured(self) -> bool {
        matches!(self, ResourceKind::StructuredBuffer | ResourceKind::StructuredBufferWithCounter)
    }

    /// Textures and typed buffers carry a component type and count
    pub fn is_typed(self) -> bool {
        matches!(
            self,
            ResourceKind::Texture1D
                | ResourceKind::Texture2D
                | ResourceKind::Texture2DMS
                | ResourceKind::Texture3D
                | ResourceKind::TextureCube
                | ResourceKind::Texture1DArray
                | ResourceKind::Texture2DArray
                | ResourceKind::Texture2DMSArray
                | ResourceKind::TextureCubeArray
                | ResourceKind::TypedBuffer
        )
    }
}

/// Element component type, numbered as in the bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ComponentType {
    #[default]
    Invalid = 0,
    I1 = 1,
    I16 = 2,
    U16 = 3,
    I32 = 4,
    U32 = 5,
    I64 = 6,
    U64 = 7,
    F16 = 8,
    F32 = 9,
    F64 = 10,
    SNormF16 = 11,
    UNormF16 = 12,
    SNormF32 = 13,
    UNormF32 = 14,
    SNormF64 = 15,
    UNormF64 = 16,
}

impl ComponentType {
    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => ComponentType::I1,
            2 => ComponentType::I16,
            3 => ComponentType::U16,
            4 => ComponentType::I32,
            5 => ComponentType::U32,
            6 => ComponentType::I64,
            7 => ComponentType::U64,
            8 => ComponentType::F16,
            9 => ComponentType::F32,
            10 => ComponentType::F64,
            11 => ComponentType::SNormF16,
            12 => ComponentType::UNormF16,
            13 => ComponentType::SNormF32,
            14 => ComponentType::UNormF32,
            15 => ComponentType::SNormF64,
            16 => ComponentType::UNormF64,
            _ => ComponentType::Invalid,
        }
    }

    pub fn var_type(self) -> VarType {
        match self {
            ComponentType::I1 => VarType::Bool,
            ComponentType::I16 => VarType::SShort,
            ComponentType::U16 => VarType::UShort,
            ComponentType::I32 => VarType::SInt,
            ComponentType::U32 => VarType::UInt,
            ComponentType::I64 => VarType::SLong,
            ComponentType::U64 => VarType::ULong,
            ComponentType::F16 | ComponentType::SNormF16 | ComponentType::UNormF16 => {
                VarType::Half
            }
            ComponentType::F32 | ComponentType::SNormF32 | ComponentType::UNormF32 => {
                VarType::Float
            }
            ComponentType::F64 | ComponentType::SNormF64 | ComponentType::UNormF64 => {
                VarType::Double
            }
            ComponentType::Invalid => VarType::Unknown,
        }
    }
}

/// Sampler comparison mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SamplerMode {
    #[default]
    Default,
    Comparison,
    Mono,
}

/// View metadata of a read-only resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SrvInfo {
    pub kind: ResourceKind,
    pub sample_count: u32,
    pub comp_type: ComponentType,
}

/// A resolved resource handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReferenceInfo {
    pub class: ResourceClass,
    pub category: DescriptorCategory,
    pub binding: BindingSlot,
    pub srv: SrvInfo,
    pub sampler_mode: SamplerMode,
    /// Variable type of the handle
    pub var_type: VarType,
}

impl ResourceReferenceInfo {
    pub fn new(class: ResourceClass, binding: BindingSlot) -> Self {
        ResourceReferenceInfo {
            class,
            category: class.category(),
            binding,
            srv: SrvInfo::default(),
            sampler_mode: SamplerMode::Default,
            var_type: class.var_type(),
        }
    }
}

/// Opaque token describing a direct heap access, produced by the API wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ShaderDirectAccess {
    pub descriptor_store: u64,
    pub byte_offset: u32,
    pub byte_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytecode_numbering() {
        assert_eq!(ResourceClass::from_u32(1), Some(ResourceClass::Uav));
        assert_eq!(ResourceClass::from_u32(7), None);
        assert_eq!(ResourceKind::from_u32(12), ResourceKind::StructuredBuffer);
        assert!(ResourceKind::from_u32(17).is_structured());
        assert_eq!(ComponentType::from_u32(9).var_type(), VarType::Float);
    }

    #[test]
    fn test_heap_slot_differs_from_register_slot() {
        let a = BindingSlot::new(0, 0);
        let b = BindingSlot::heap(HeapDescriptorType::CbvSrvUav, 0);
        assert_ne!(a, b);
    }
}
