//! Shader values, variables and per-step debug state

mod binding;
pub mod numeric;
mod state;
mod variable;

pub use binding::{
    BindingSlot, ComponentType, DescriptorCategory, HeapDescriptorType, ResourceClass,
    ResourceKind, ResourceReferenceInfo, SamplerMode, ShaderDirectAccess, SrvInfo,
};
pub use state::{ShaderDebugState, ShaderEvents, ShaderVariableChange};
pub use variable::{ShaderBuiltin, ShaderValue, ShaderVariable, VarType, MAX_COMPONENTS};
