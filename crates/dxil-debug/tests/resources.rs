//! Resource access through a mock host

mod common;

use common::*;
use dxil_debug::program::{Constant, DxOp, Operand, ProgramBuilder, ShaderStage, Type};
use dxil_debug::shader::{
    BindingSlot, HeapDescriptorType, ResourceClass, ResourceKind, ResourceReferenceInfo,
    ShaderEvents, VarType,
};
use dxil_debug::{
    CompType, GlobalState, LaneInit, ResourceInfo, SrvData, UavData, ViewFormat,
};

fn float4_buffer(elements: u32) -> SrvData {
    let values: Vec<f32> = (0..elements * 4).map(|v| v as f32).collect();
    SrvData {
        info: ResourceInfo {
            num_elements: elements,
            format: ViewFormat::new(4, 4, CompType::Float),
            ..Default::default()
        },
        data: f32_bytes(&values),
    }
}

#[test]
fn test_buffer_load_in_and_out_of_range() {
    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    pb.add_resource(decl("buf", ResourceClass::Srv, 0, ResourceKind::TypedBuffer));
    let mut fb = pb.function("main");
    let handle = fb.dx_op(DxOp::CreateHandle, Type::Handle, create_handle_args(ResourceClass::Srv, 0));
    let inside = fb.dx_op(
        DxOp::BufferLoad,
        res_ret(Type::f32()),
        vec![handle.into(), Constant::i32(1).into(), undef_i32()],
    );
    let outside = fb.dx_op(
        DxOp::BufferLoad,
        res_ret(Type::f32()),
        vec![handle.into(), Constant::i32(10).into(), undef_i32()],
    );
    fb.ret();
    fb.finish();

    let mut api = MockApi::default();
    api.srvs.insert(BindingSlot::new(0, 0), float4_buffer(4));
    let (debugger, states) = run_single(pb.build(), GlobalState::new(), LaneInit::default(), &mut api);

    let inside = value_of(&debugger, inside);
    assert_eq!(inside.ty, VarType::Float);
    assert_eq!(
        (0..4).map(|c| inside.value.f32v(c)).collect::<Vec<_>>(),
        vec![4.0, 5.0, 6.0, 7.0]
    );

    let outside = value_of(&debugger, outside);
    assert!((0..4).all(|c| outside.value.f32v(c) == 0.0));

    // handle creation and first access report a new variable, the second
    // access an unchanged one
    let accesses: Vec<_> = states
        .iter()
        .flat_map(|s| &s.changes)
        .filter(|c| c.after.as_ref().is_some_and(|v| v.ty == VarType::ReadOnlyResource))
        .collect();
    assert_eq!(accesses.len(), 3);
    assert_eq!(accesses.iter().filter(|c| c.before.is_none()).count(), 2);
    assert_eq!(accesses[2].before, accesses[2].after);

    // fetched once, then served from the cache
    assert_eq!(api.fetches, 1);
}

#[test]
fn test_raw_buffer_store_load_and_atomic() {
    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    pb.add_resource(decl("rw", ResourceClass::Uav, 0, ResourceKind::RawBuffer));
    let mut fb = pb.function("main");
    let handle = fb.dx_op(DxOp::CreateHandle, Type::Handle, create_handle_args(ResourceClass::Uav, 0));
    fb.dx_op_void(
        DxOp::RawBufferStore,
        vec![
            handle.into(),
            Constant::i32(4).into(),
            undef_i32(),
            Constant::i32(11).into(),
            Constant::i32(22).into(),
            undef_i32(),
            undef_i32(),
            Constant::i32(3).into(),
            Constant::i32(4).into(),
        ],
    );
    let first = fb.dx_op(
        DxOp::RawBufferLoad,
        res_ret(Type::i32()),
        vec![handle.into(), Constant::i32(4).into(), undef_i32(), Constant::i32(15).into()],
    );
    let old = fb.dx_op(
        DxOp::AtomicBinOp,
        Type::i32(),
        vec![
            handle.into(),
            Constant::i32(0).into(),
            Constant::i32(4).into(),
            undef_i32(),
            undef_i32(),
            Constant::i32(5).into(),
        ],
    );
    let second = fb.dx_op(
        DxOp::RawBufferLoad,
        res_ret(Type::i32()),
        vec![handle.into(), Constant::i32(4).into(), undef_i32(), Constant::i32(15).into()],
    );
    fb.ret();
    fb.finish();

    let mut api = MockApi::default();
    api.uavs.insert(
        BindingSlot::new(0, 0),
        UavData {
            info: ResourceInfo {
                num_elements: 4,
                is_byte_buffer: true,
                format: ViewFormat::new(4, 1, CompType::Typeless),
                ..Default::default()
            },
            data: vec![0; 16],
            ..Default::default()
        },
    );
    let (debugger, _) = run_single(pb.build(), GlobalState::new(), LaneInit::default(), &mut api);

    // the last dword of the view is past the end of a four component read
    let first = value_of(&debugger, first);
    assert_eq!(
        (0..4).map(|c| first.value.s32v(c)).collect::<Vec<_>>(),
        vec![11, 22, 0, 0]
    );

    assert_eq!(value_of(&debugger, old).value.s32v(0), 11);

    let second = value_of(&debugger, second);
    assert_eq!(second.value.s32v(0), 16);
    assert_eq!(second.value.s32v(1), 22);
}

#[test]
fn test_store_to_read_only_resource_fails() {
    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    pb.add_resource(decl("buf", ResourceClass::Srv, 0, ResourceKind::TypedBuffer));
    let mut fb = pb.function("main");
    let handle = fb.dx_op(DxOp::CreateHandle, Type::Handle, create_handle_args(ResourceClass::Srv, 0));
    fb.dx_op_void(
        DxOp::BufferStore,
        vec![
            handle.into(),
            Constant::i32(0).into(),
            undef_i32(),
            Constant::f32(1.0).into(),
            Constant::f32(1.0).into(),
            Constant::f32(1.0).into(),
            Constant::f32(1.0).into(),
            Constant::i32(15).into(),
        ],
    );
    fb.ret();
    fb.finish();

    let mut api = MockApi::default();
    let mut debugger = dxil_debug::Debugger::new(
        pb.build(),
        GlobalState::new(),
        vec![LaneInit::default()],
        0,
        Default::default(),
    )
    .unwrap();
    debugger.continue_debug(&mut api).unwrap();
    let result = debugger.continue_debug(&mut api);
    assert!(matches!(result, Err(dxil_debug::DebugError::TypeMismatch(_))));
    assert!(debugger.is_terminated());
}

#[test]
fn test_cbuffer_load_legacy_reads_registers() {
    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    pb.add_resource(decl("cb", ResourceClass::CBuffer, 0, ResourceKind::CBuffer));
    let mut fb = pb.function("main");
    let handle =
        fb.dx_op(DxOp::CreateHandle, Type::Handle, create_handle_args(ResourceClass::CBuffer, 0));
    let cbuf_ret = Type::structure("dx.types.CBufRet.f32", vec![Type::f32(); 4]);
    let second = fb.dx_op(
        DxOp::CBufferLoadLegacy,
        cbuf_ret.clone(),
        vec![handle.into(), Constant::i32(1).into()],
    );
    let past_end = fb.dx_op(
        DxOp::CBufferLoadLegacy,
        cbuf_ret,
        vec![handle.into(), Constant::i32(7).into()],
    );
    fb.ret();
    fb.finish();

    let mut global = GlobalState::new();
    global.add_constant_block(
        "cb",
        BindingSlot::new(0, 0),
        f32_bytes(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]),
    );
    let mut api = MockApi::default();
    let (debugger, _) = run_single(pb.build(), global, LaneInit::default(), &mut api);

    let second = value_of(&debugger, second);
    assert_eq!(second.columns, 4);
    assert_eq!(
        (0..4).map(|c| second.value.f32v(c)).collect::<Vec<_>>(),
        vec![5.0, 6.0, 7.0, 8.0]
    );
    let past_end = value_of(&debugger, past_end);
    assert!((0..4).all(|c| past_end.value.f32v(c) == 0.0));
}

#[test]
fn test_get_dimensions_comes_from_host() {
    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    pb.add_resource(decl("tex", ResourceClass::Srv, 0, ResourceKind::Texture2D));
    let mut fb = pb.function("main");
    let handle = fb.dx_op(DxOp::CreateHandle, Type::Handle, create_handle_args(ResourceClass::Srv, 0));
    let dims = fb.dx_op(
        DxOp::GetDimensions,
        Type::structure("dx.types.Dimensions", vec![Type::i32(); 4]),
        vec![handle.into(), Constant::i32(0).into()],
    );
    fb.ret();
    fb.finish();

    let mut api = MockApi { dimensions: [256, 128, 9, 0], ..Default::default() };
    let (debugger, _) = run_single(pb.build(), GlobalState::new(), LaneInit::default(), &mut api);

    let dims = value_of(&debugger, dims);
    assert_eq!(
        (0..4).map(|c| dims.value.u32v(c)).collect::<Vec<_>>(),
        vec![256, 128, 9, 0]
    );
}

#[test]
fn test_sample_goes_through_host() {
    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    pb.add_resource(decl("tex", ResourceClass::Srv, 0, ResourceKind::Texture2D));
    pb.add_resource(decl("smp", ResourceClass::Sampler, 0, ResourceKind::Sampler));
    let mut fb = pb.function("main");
    let tex = fb.dx_op(DxOp::CreateHandle, Type::Handle, create_handle_args(ResourceClass::Srv, 0));
    let smp =
        fb.dx_op(DxOp::CreateHandle, Type::Handle, create_handle_args(ResourceClass::Sampler, 0));
    let undef_f32 = Operand::Undef(Type::f32());
    let sampled = fb.dx_op(
        DxOp::Sample,
        res_ret(Type::f32()),
        vec![
            tex.into(),
            smp.into(),
            Constant::f32(0.25).into(),
            Constant::f32(0.75).into(),
            undef_f32.clone(),
            undef_f32.clone(),
            undef_i32(),
            undef_i32(),
            undef_i32(),
            undef_f32,
        ],
    );
    fb.ret();
    fb.finish();

    let mut api = MockApi { sample_result: [0.5, 0.25, 0.125, 1.0], ..Default::default() };
    let (debugger, states) =
        run_single(pb.build(), GlobalState::new(), LaneInit::default(), &mut api);

    let sampled = value_of(&debugger, sampled);
    assert_eq!(sampled.value.f32v(0), 0.5);
    assert_eq!(sampled.value.f32v(3), 1.0);
    assert_eq!(api.last_op, Some(DxOp::Sample));
    assert_eq!(api.last_uv, Some([0.25, 0.75, 0.0, 0.0]));

    let flagged: Vec<_> = states
        .iter()
        .filter(|s| s.flags.contains(ShaderEvents::SAMPLE_LOAD_GATHER))
        .collect();
    assert_eq!(flagged.len(), 1);
}

#[test]
fn test_heap_handle_with_structured_annotation() {
    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    let mut fb = pb.function("main");
    let heap = fb.dx_op(
        DxOp::CreateHandleFromHeap,
        Type::Handle,
        vec![Constant::i32(5).into(), Constant::bool(false).into(), Constant::bool(false).into()],
    );
    let props = Constant::Vector(vec![
        Constant::u32(ResourceKind::StructuredBuffer as u32 | (1 << 12)),
        Constant::u32(8),
    ]);
    let annotated =
        fb.dx_op(DxOp::AnnotateHandle, Type::Handle, vec![heap.into(), props.into()]);
    let loaded = fb.dx_op(
        DxOp::BufferLoad,
        res_ret(Type::i32()),
        vec![annotated.into(), Constant::i32(1).into(), Constant::i32(4).into()],
    );
    fb.ret();
    fb.finish();

    let slot = BindingSlot::heap(HeapDescriptorType::CbvSrvUav, 5);
    let mut api = MockApi::default();
    api.heap.insert(slot, ResourceReferenceInfo::new(ResourceClass::Uav, slot));
    api.uavs.insert(
        slot,
        UavData {
            info: ResourceInfo {
                num_elements: 4,
                format: ViewFormat::new(4, 1, CompType::Typeless),
                ..Default::default()
            },
            data: u32_bytes(&[0, 1, 2, 3, 4, 5, 6, 7]),
            ..Default::default()
        },
    );
    let (debugger, _) = run_single(pb.build(), GlobalState::new(), LaneInit::default(), &mut api);

    let heap = value_of(&debugger, heap);
    assert_eq!(heap.ty, VarType::ReadWriteResource);
    assert_eq!(heap.value.u32v(1), 160);

    // element 1 of an 8 byte stride, 4 bytes in
    let loaded = value_of(&debugger, loaded);
    assert_eq!(
        (0..4).map(|c| loaded.value.u32v(c)).collect::<Vec<_>>(),
        vec![3, 4, 5, 6]
    );
}

#[test]
fn test_render_target_sample_position() {
    let mut pb = ProgramBuilder::new(ShaderStage::Pixel);
    let mut fb = pb.function("main");
    let position = fb.dx_op(
        DxOp::RenderTargetGetSamplePosition,
        Type::vector(Type::f32(), 2),
        vec![Constant::i32(0).into()],
    );
    fb.ret();
    fb.finish();

    let mut api = MockApi::default();
    let (debugger, _) = run_single(pb.build(), GlobalState::new(), LaneInit::default(), &mut api);

    let position = value_of(&debugger, position);
    assert_eq!(position.value.f32v(0), -2.0 / 16.0);
    assert_eq!(position.value.f32v(1), -6.0 / 16.0);
}
