//! Shared helpers for integration tests

#![allow(dead_code)]

use dxil_debug::api::{DebugApiWrapper, NullApiWrapper, SampleGatherRequest};
use dxil_debug::program::{Constant, DxOp, Id, Operand, ResourceDecl, ShaderStage, Type};
use dxil_debug::shader::{
    BindingSlot, ComponentType, DescriptorCategory, ResourceClass, ResourceKind,
    ResourceReferenceInfo, SamplerMode, ShaderDirectAccess, ShaderVariable,
};
use dxil_debug::{
    Debugger, DebuggerConfig, DebugResult, GlobalState, LaneInit, Program, ShaderDebugState,
    SrvData, UavData,
};
use rustc_hash::FxHashMap;

/// Host with configurable resources
///
/// Filtered operations return `sample_result` and remember the last request.
#[derive(Debug, Default)]
pub struct MockApi {
    pub srvs: FxHashMap<BindingSlot, SrvData>,
    pub uavs: FxHashMap<BindingSlot, UavData>,
    pub heap: FxHashMap<BindingSlot, ResourceReferenceInfo>,
    pub dimensions: [u32; 4],
    pub sample_result: [f32; 4],
    pub last_uv: Option<[f32; 4]>,
    pub last_op: Option<DxOp>,
    pub fetches: usize,
    pub math: NullApiWrapper,
}

impl DebugApiWrapper for MockApi {
    fn fetch_srv(&mut self, slot: BindingSlot) -> Option<SrvData> {
        self.fetches += 1;
        self.srvs.get(&slot).cloned()
    }

    fn fetch_uav(&mut self, slot: BindingSlot) -> Option<UavData> {
        self.fetches += 1;
        self.uavs.get(&slot).cloned()
    }

    fn calculate_math_intrinsic(
        &mut self,
        op: DxOp,
        input: &ShaderVariable,
    ) -> DebugResult<(ShaderVariable, ShaderVariable)> {
        self.math.calculate_math_intrinsic(op, input)
    }

    fn calculate_sample_gather(
        &mut self,
        request: &SampleGatherRequest<'_>,
    ) -> DebugResult<ShaderVariable> {
        self.last_op = Some(request.op);
        self.last_uv = Some([
            request.uv.value.f32v(0),
            request.uv.value.f32v(1),
            request.uv.value.f32v(2),
            request.uv.value.f32v(3),
        ]);
        Ok(ShaderVariable::from_f32s("sample", &self.sample_result))
    }

    fn get_resource_info(
        &mut self,
        _class: ResourceClass,
        _slot: BindingSlot,
        _mip: u32,
        _stage: ShaderStage,
    ) -> (ShaderVariable, u32) {
        (ShaderVariable::from_u32s("dims", &self.dimensions), 2)
    }

    fn get_sample_info(
        &mut self,
        _class: ResourceClass,
        _slot: BindingSlot,
        _stage: ShaderStage,
        _op_name: &str,
    ) -> ShaderVariable {
        ShaderVariable::from_u32s("", &[4, 0, 0, 0])
    }

    fn get_render_target_sample_info(
        &mut self,
        _stage: ShaderStage,
        _op_name: &str,
    ) -> ShaderVariable {
        ShaderVariable::from_u32s("", &[4, 0, 0, 0])
    }

    fn get_resource_reference_info(&mut self, slot: BindingSlot) -> ResourceReferenceInfo {
        self.heap
            .get(&slot)
            .copied()
            .unwrap_or_else(|| ResourceReferenceInfo::new(ResourceClass::Srv, slot))
    }

    fn get_shader_direct_access(
        &mut self,
        _category: DescriptorCategory,
        slot: BindingSlot,
    ) -> ShaderDirectAccess {
        ShaderDirectAccess { descriptor_store: 1, byte_offset: slot.heap_index * 32, byte_size: 32 }
    }
}

/// A resource declaration with a single register
pub fn decl(name: &str, class: ResourceClass, range_id: u32, kind: ResourceKind) -> ResourceDecl {
    ResourceDecl {
        name: name.to_string(),
        class,
        range_id,
        register_base: range_id,
        register_count: 1,
        space: 0,
        kind,
        component_type: ComponentType::F32,
        sample_count: 0,
        sampler_mode: SamplerMode::Default,
        struct_stride: 0,
    }
}

/// Operands of `CreateHandle` for a register of `class`
pub fn create_handle_args(class: ResourceClass, range_id: u32) -> Vec<Operand> {
    vec![
        Constant::u32(class as u32).into(),
        Constant::u32(range_id).into(),
        Constant::u32(range_id).into(),
        Constant::bool(false).into(),
    ]
}

/// `{ elem x4, i32 }`, the result of a resource load or sample
pub fn res_ret(elem: Type) -> Type {
    Type::structure(
        "dx.types.ResRet",
        vec![elem.clone(), elem.clone(), elem.clone(), elem, Type::i32()],
    )
}

pub fn undef_i32() -> Operand {
    Operand::Undef(Type::i32())
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn u32_bytes(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Run a single-lane session to completion, returning every reported state
pub fn run_single(
    program: Program,
    global: GlobalState,
    init: LaneInit,
    api: &mut dyn DebugApiWrapper,
) -> (Debugger, Vec<ShaderDebugState>) {
    run_lanes(program, global, vec![init], 0, api)
}

pub fn run_lanes(
    program: Program,
    global: GlobalState,
    lanes: Vec<LaneInit>,
    active_lane: usize,
    api: &mut dyn DebugApiWrapper,
) -> (Debugger, Vec<ShaderDebugState>) {
    let mut debugger =
        Debugger::new(program, global, lanes, active_lane, DebuggerConfig::default()).unwrap();
    let mut states = debugger.continue_debug(api).unwrap();
    loop {
        let more = debugger.continue_debug(api).unwrap();
        if more.is_empty() {
            break;
        }
        states.extend(more);
    }
    (debugger, states)
}

/// Value of `id` in the reporting lane
pub fn value_of(debugger: &Debugger, id: Id) -> ShaderVariable {
    debugger.lanes()[debugger.active_lane()]
        .variable(id)
        .cloned()
        .unwrap_or_else(|| panic!("{} was never assigned", id))
}
