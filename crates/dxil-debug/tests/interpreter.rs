//! Single-lane execution of arithmetic and memory instructions

mod common;

use common::*;
use dxil_debug::program::{Constant, Operation, ProgramBuilder, ShaderStage, Type};
use dxil_debug::{GlobalState, LaneInit, NullApiWrapper};

#[test]
fn test_integer_arithmetic() {
    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    let mut fb = pb.function("main");
    let sum = fb.binary(Operation::Add, Type::i32(), Constant::i32(5), Constant::i32(-3));
    let udiv = fb.binary(Operation::UDiv, Type::i32(), Constant::i32(7), Constant::i32(2));
    let sdiv = fb.binary(Operation::SDiv, Type::i32(), Constant::i32(-7), Constant::i32(2));
    let srem = fb.binary(Operation::SRem, Type::i32(), Constant::i32(-7), Constant::i32(2));
    let wrapped = fb.binary(Operation::Add, Type::int(8), Constant::int(8, 250), Constant::int(8, 10));
    let as_float = fb.unary(Operation::SToF, Type::f32(), sum);
    fb.ret();
    fb.finish();

    let mut api = NullApiWrapper::default();
    let (debugger, _) = run_single(pb.build(), GlobalState::new(), LaneInit::default(), &mut api);

    assert_eq!(value_of(&debugger, sum).value.s32v(0), 2);
    assert_eq!(value_of(&debugger, udiv).value.u32v(0), 3);
    assert_eq!(value_of(&debugger, sdiv).value.s32v(0), -3);
    assert_eq!(value_of(&debugger, srem).value.s32v(0), -1);
    assert_eq!(value_of(&debugger, wrapped).value.get(0), 4);
    assert_eq!(value_of(&debugger, as_float).value.f32v(0), 2.0);
}

#[test]
fn test_float_arithmetic_and_denormals() {
    let tiny32 = f32::from_bits(1);
    let tiny64 = f64::from_bits(1);

    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    let mut fb = pb.function("main");
    let rem = fb.binary(Operation::FRem, Type::f32(), Constant::f32(5.5), Constant::f32(2.0));
    let quotient = fb.binary(Operation::FDiv, Type::f32(), Constant::f32(1.0), Constant::f32(4.0));
    let flushed = fb.binary(Operation::FMul, Type::f32(), Constant::f32(-tiny32), Constant::f32(1.0));
    let kept = fb.binary(Operation::FMul, Type::f64(), Constant::f64(tiny64), Constant::f64(1.0));
    fb.ret();
    fb.finish();

    let mut api = NullApiWrapper::default();
    let (debugger, _) = run_single(pb.build(), GlobalState::new(), LaneInit::default(), &mut api);

    assert_eq!(value_of(&debugger, rem).value.f32v(0), 1.5);
    assert_eq!(value_of(&debugger, quotient).value.f32v(0), 0.25);
    // subnormal float32 results flush to zero with their sign
    assert_eq!(value_of(&debugger, flushed).value.u32v(0), 0x8000_0000);
    assert_eq!(value_of(&debugger, kept).value.f64v(0).to_bits(), 1);
}

#[test]
fn test_nan_result_raises_event() {
    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    let mut fb = pb.function("main");
    let _nan = fb.binary(Operation::FDiv, Type::f32(), Constant::f32(0.0), Constant::f32(0.0));
    fb.ret();
    fb.finish();

    let mut api = NullApiWrapper::default();
    let (_, states) = run_single(pb.build(), GlobalState::new(), LaneInit::default(), &mut api);

    assert!(states
        .iter()
        .any(|s| s.flags.contains(dxil_debug::ShaderEvents::GENERATED_NAN_OR_INF)));
}

#[test]
fn test_local_array_through_pointers() {
    let array_ty = Type::array(Type::i32(), 2);

    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    let mut fb = pb.function("main");
    let array = fb.alloca(array_ty.clone());
    fb.store(
        array,
        Constant::Aggregate {
            ty: array_ty.clone(),
            members: vec![Constant::i32(7), Constant::i32(9)],
        },
    );
    let first = fb.load(array_ty.clone(), array);
    let element = fb.gep(Type::i32(), array, vec![Constant::i32(0).into(), Constant::i32(1).into()]);
    fb.store(element, Constant::i32(5));
    let second = fb.load(array_ty, array);
    let scalar = fb.load(Type::i32(), element);
    fb.ret();
    fb.finish();

    let mut api = NullApiWrapper::default();
    let (debugger, _) = run_single(pb.build(), GlobalState::new(), LaneInit::default(), &mut api);

    let first = value_of(&debugger, first);
    assert_eq!(first.members.len(), 2);
    assert_eq!(first.members[0].value.s32v(0), 7);
    assert_eq!(first.members[1].value.s32v(0), 9);

    let second = value_of(&debugger, second);
    assert_eq!(second.members[0].value.s32v(0), 7);
    assert_eq!(second.members[1].value.s32v(0), 5);
    assert_eq!(value_of(&debugger, scalar).value.s32v(0), 5);

    // the allocation's variable tracks what was written through the element
    let array = value_of(&debugger, array);
    assert_eq!(array.members[1].value.s32v(0), 5);
}

#[test]
fn test_global_memory_is_shared_between_lanes() {
    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    let counter = pb.add_global("counter", Type::i32(), Some(Constant::i32(41)));
    let mut fb = pb.function("main");
    let old = fb.emit_value(
        Operation::AtomicAdd,
        Type::i32(),
        vec![counter.into(), Constant::i32(1).into()],
    );
    let now = fb.load(Type::i32(), counter);
    fb.ret();
    fb.finish();
    let program = pb.build();

    for (active, expected_old) in [(0, 41), (1, 42)] {
        let mut api = NullApiWrapper::default();
        let (debugger, _) = run_lanes(
            program.clone(),
            GlobalState::new(),
            vec![LaneInit::default(), LaneInit::default()],
            active,
            &mut api,
        );
        assert_eq!(value_of(&debugger, old).value.s32v(0), expected_old);
        assert_eq!(value_of(&debugger, now).value.s32v(0), 43);
    }
}

#[test]
fn test_gep_with_huge_index_is_memory_error() {
    let array_ty = Type::array(Type::i32(), 4);

    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    let mut fb = pb.function("main");
    let array = fb.alloca(array_ty);
    let _element = fb.gep(
        Type::i32(),
        array,
        vec![Constant::i64(0).into(), Constant::i64(i64::MAX / 2).into()],
    );
    fb.ret();
    fb.finish();

    let mut api = NullApiWrapper::default();
    let mut debugger = dxil_debug::Debugger::new(
        pb.build(),
        GlobalState::new(),
        vec![LaneInit::default()],
        0,
        Default::default(),
    )
    .unwrap();

    let error = loop {
        match debugger.continue_debug(&mut api) {
            Ok(states) if states.is_empty() => panic!("session ended without an error"),
            Ok(_) => continue,
            Err(e) => break e,
        }
    };
    match error {
        dxil_debug::DebugError::Memory(msg) => assert!(msg.contains("overflows"), "{}", msg),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_global_snapshots_follow_other_lanes_stores() {
    let mut pb = ProgramBuilder::new(ShaderStage::Compute);
    let counter = pb.add_global("counter", Type::i32(), Some(Constant::i32(41)));
    let mut fb = pb.function("main");
    fb.emit_value(Operation::AtomicAdd, Type::i32(), vec![counter.into(), Constant::i32(1).into()]);
    fb.ret();
    fb.finish();

    let mut api = NullApiWrapper::default();
    let (debugger, _) = run_lanes(
        pb.build(),
        GlobalState::new(),
        vec![LaneInit::default(), LaneInit::default()],
        0,
        &mut api,
    );

    // lane 0 added first, yet its copy shows lane 1's later add too
    for lane in debugger.lanes() {
        assert_eq!(lane.variable(counter).map(|v| v.value.s32v(0)), Some(43));
    }
}
