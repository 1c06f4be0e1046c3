//! Boundary to the host graphics API
//!
//! The interpreter never touches a GPU. Resource contents, filtered texture
//! operations, bit-exact transcendental math and resource metadata all come
//! through [`DebugApiWrapper`], implemented by the embedding application.

use serde::{Deserialize, Serialize};

use crate::error::{DebugError, DebugResult};
use crate::global_state::{SrvData, UavData};
use crate::program::{DxOp, ShaderStage};
use crate::shader::{
    BindingSlot, ComponentType, DescriptorCategory, ResourceClass, ResourceKind,
    ResourceReferenceInfo, SamplerMode, ShaderDirectAccess, ShaderVariable, VarType,
};

/// Channel read by a gather
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GatherChannel {
    #[default]
    Red = 0,
    Green = 1,
    Blue = 2,
    Alpha = 3,
}

impl GatherChannel {
    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => GatherChannel::Green,
            2 => GatherChannel::Blue,
            3 => GatherChannel::Alpha,
            _ => GatherChannel::Red,
        }
    }
}

/// Texture side of a sample or gather
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SampleGatherResourceData {
    pub kind: ResourceKind,
    pub comp_type: ComponentType,
    pub sample_count: u32,
    pub binding: BindingSlot,
}

/// Sampler side of a sample or gather; absent for texture loads
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleGatherSamplerData {
    pub mode: SamplerMode,
    pub bias: f32,
    pub binding: BindingSlot,
}

/// Everything needed to evaluate one filtered texture operation
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGatherRequest<'a> {
    pub op: DxOp,
    pub resource: SampleGatherResourceData,
    pub sampler: Option<SampleGatherSamplerData>,
    /// Coordinates: float for samples, integer texels for loads
    pub uv: ShaderVariable,
    pub ddx: ShaderVariable,
    pub ddy: ShaderVariable,
    pub texel_offsets: [i8; 3],
    pub multisample_index: i32,
    pub lod: f32,
    pub compare: f32,
    pub swizzle: [u8; 4],
    pub gather_channel: GatherChannel,
    pub stage: ShaderStage,
    /// Index of the instruction within its function
    pub instruction: u32,
    pub op_name: &'a str,
}

/// Capabilities the interpreter consumes from the host
pub trait DebugApiWrapper {
    /// Snapshot of a read-only resource, `None` when nothing is bound
    fn fetch_srv(&mut self, slot: BindingSlot) -> Option<SrvData>;

    /// Snapshot of a read-write resource, `None` when nothing is bound
    fn fetch_uav(&mut self, slot: BindingSlot) -> Option<UavData>;

    /// Evaluate a transcendental op bit-exactly
    ///
    /// Returns the primary result and a secondary one for ops that produce
    /// two; single-result ops leave the second default.
    fn calculate_math_intrinsic(
        &mut self,
        op: DxOp,
        input: &ShaderVariable,
    ) -> DebugResult<(ShaderVariable, ShaderVariable)>;

    /// Evaluate a filtered texture operation; the result holds four components
    fn calculate_sample_gather(
        &mut self,
        request: &SampleGatherRequest<'_>,
    ) -> DebugResult<ShaderVariable>;

    /// Dimensions of a resource at `mip`, and how many dimensions it has
    fn get_resource_info(
        &mut self,
        class: ResourceClass,
        slot: BindingSlot,
        mip: u32,
        stage: ShaderStage,
    ) -> (ShaderVariable, u32);

    /// Sample count of a multisampled resource, in component 0
    fn get_sample_info(
        &mut self,
        class: ResourceClass,
        slot: BindingSlot,
        stage: ShaderStage,
        op_name: &str,
    ) -> ShaderVariable;

    /// Sample count of the bound render target, in component 0
    fn get_render_target_sample_info(&mut self, stage: ShaderStage, op_name: &str)
        -> ShaderVariable;

    /// Resolve a descriptor-heap binding
    fn get_resource_reference_info(&mut self, slot: BindingSlot) -> ResourceReferenceInfo;

    fn get_shader_direct_access(
        &mut self,
        category: DescriptorCategory,
        slot: BindingSlot,
    ) -> ShaderDirectAccess;
}

/// Host with nothing bound
///
/// Every resource reads as unbound, math intrinsics are evaluated on the CPU
/// in single precision and filtered operations fail. Counts fetches so tests
/// can observe caching.
#[derive(Debug, Default)]
pub struct NullApiWrapper {
    pub srv_fetches: usize,
    pub uav_fetches: usize,
}

impl DebugApiWrapper for NullApiWrapper {
    fn fetch_srv(&mut self, _slot: BindingSlot) -> Option<SrvData> {
        self.srv_fetches += 1;
        None
    }

    fn fetch_uav(&mut self, _slot: BindingSlot) -> Option<UavData> {
        self.uav_fetches += 1;
        None
    }

    fn calculate_math_intrinsic(
        &mut self,
        op: DxOp,
        input: &ShaderVariable,
    ) -> DebugResult<(ShaderVariable, ShaderVariable)> {
        let f: fn(f32) -> f32 = match op {
            DxOp::Cos => f32::cos,
            DxOp::Sin => f32::sin,
            DxOp::Tan => f32::tan,
            DxOp::Acos => f32::acos,
            DxOp::Asin => f32::asin,
            DxOp::Atan => f32::atan,
            DxOp::Hcos => f32::cosh,
            DxOp::Hsin => f32::sinh,
            DxOp::Htan => f32::tanh,
            DxOp::Exp => f32::exp2,
            DxOp::Log => f32::log2,
            DxOp::Sqrt => f32::sqrt,
            DxOp::Rsqrt => |x| 1.0 / x.sqrt(),
            other => return Err(DebugError::Api(format!("no math intrinsic {:?}", other))),
        };
        let mut out = input.clone();
        out.ty = VarType::Float;
        for c in 0..input.component_count() {
            out.value.set_f32(c, f(input.float_comp(c) as f32));
        }
        Ok((out, ShaderVariable::default()))
    }

    fn calculate_sample_gather(
        &mut self,
        request: &SampleGatherRequest<'_>,
    ) -> DebugResult<ShaderVariable> {
        Err(DebugError::Api(format!("{} needs a GPU", request.op_name)))
    }

    fn get_resource_info(
        &mut self,
        _class: ResourceClass,
        _slot: BindingSlot,
        _mip: u32,
        _stage: ShaderStage,
    ) -> (ShaderVariable, u32) {
        (ShaderVariable::from_u32s("", &[0, 0, 0, 0]), 0)
    }

    fn get_sample_info(
        &mut self,
        _class: ResourceClass,
        _slot: BindingSlot,
        _stage: ShaderStage,
        _op_name: &str,
    ) -> ShaderVariable {
        ShaderVariable::from_u32s("", &[1, 0, 0, 0])
    }

    fn get_render_target_sample_info(
        &mut self,
        _stage: ShaderStage,
        _op_name: &str,
    ) -> ShaderVariable {
        ShaderVariable::from_u32s("", &[1, 0, 0, 0])
    }

    fn get_resource_reference_info(&mut self, slot: BindingSlot) -> ResourceReferenceInfo {
        ResourceReferenceInfo::new(ResourceClass::Srv, slot)
    }

    fn get_shader_direct_access(
        &mut self,
        _category: DescriptorCategory,
        slot: BindingSlot,
    ) -> ShaderDirectAccess {
        ShaderDirectAccess { descriptor_store: 0, byte_offset: slot.heap_index, byte_size: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_wrapper_math() {
        let mut api = NullApiWrapper::default();
        let input = ShaderVariable::from_f32s("x", &[4.0, 16.0]);
        let (out, _) = api.calculate_math_intrinsic(DxOp::Sqrt, &input).unwrap();
        assert_eq!(out.value.f32v(0), 2.0);
        assert_eq!(out.value.f32v(1), 4.0);
        assert!(api.calculate_math_intrinsic(DxOp::FAbs, &input).is_err());
    }

    #[test]
    fn test_gather_channel_from_index() {
        assert_eq!(GatherChannel::from_u32(2), GatherChannel::Blue);
        assert_eq!(GatherChannel::from_u32(9), GatherChannel::Red);
    }
}
