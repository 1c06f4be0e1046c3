//! Pixel quads stepped in lockstep

mod common;

use common::*;
use dxil_debug::program::{Constant, DxOp, Id, Operand, Program, ProgramBuilder, ShaderStage, Type};
use dxil_debug::shader::{ShaderVariable, VarType};
use dxil_debug::thread::{ExecContext, Workgroup};
use dxil_debug::{
    build_function_infos, DebugError, DebugResult, DebuggerConfig, GlobalState, LaneInit,
    NullApiWrapper, ShaderDebugState, ThreadState,
};

const QUAD_VALUES: [f32; 4] = [1.0, 3.0, 7.0, 15.0];

fn quad_lane(x: f32) -> LaneInit {
    LaneInit::new(ShaderVariable::aggregate("input", vec![ShaderVariable::from_f32s("x", &[x])]))
}

fn quad() -> Vec<LaneInit> {
    QUAD_VALUES.iter().map(|&x| quad_lane(x)).collect()
}

fn load_x(fb: &mut dxil_debug::program::FunctionBuilder<'_>) -> Id {
    fb.dx_op(
        DxOp::LoadInput,
        Type::f32(),
        vec![
            Constant::i32(0).into(),
            Constant::i32(0).into(),
            Constant::i32(0).into(),
            Operand::Undef(Type::i32()),
        ],
    )
}

#[test]
fn test_quad_derivatives() {
    let mut pb = ProgramBuilder::new(ShaderStage::Pixel);
    let mut fb = pb.function("main");
    let x = load_x(&mut fb);
    let coarse_x = fb.dx_op(DxOp::DerivCoarseX, Type::f32(), vec![x.into()]);
    let coarse_y = fb.dx_op(DxOp::DerivCoarseY, Type::f32(), vec![x.into()]);
    let fine_x = fb.dx_op(DxOp::DerivFineX, Type::f32(), vec![x.into()]);
    let fine_y = fb.dx_op(DxOp::DerivFineY, Type::f32(), vec![x.into()]);
    fb.ret();
    fb.finish();
    let program = pb.build();

    let mut api = NullApiWrapper::default();
    let (debugger, _) = run_lanes(program.clone(), GlobalState::new(), quad(), 3, &mut api);
    assert_eq!(value_of(&debugger, coarse_x).value.f32v(0), 2.0);
    assert_eq!(value_of(&debugger, coarse_y).value.f32v(0), 6.0);
    assert_eq!(value_of(&debugger, fine_x).value.f32v(0), 8.0);
    assert_eq!(value_of(&debugger, fine_y).value.f32v(0), 12.0);

    let (debugger, _) = run_lanes(program, GlobalState::new(), quad(), 0, &mut api);
    assert_eq!(value_of(&debugger, coarse_x).value.f32v(0), 2.0);
    assert_eq!(value_of(&debugger, fine_x).value.f32v(0), 2.0);
    assert_eq!(value_of(&debugger, fine_y).value.f32v(0), 6.0);
}

#[test]
fn test_derivative_outside_quad_is_zero() {
    let mut pb = ProgramBuilder::new(ShaderStage::Pixel);
    let mut fb = pb.function("main");
    let x = load_x(&mut fb);
    let dx = fb.dx_op(DxOp::DerivCoarseX, Type::f32(), vec![x.into()]);
    fb.ret();
    fb.finish();

    let mut api = NullApiWrapper::default();
    let (debugger, _) = run_single(pb.build(), GlobalState::new(), quad_lane(5.0), &mut api);
    let dx = value_of(&debugger, dx);
    assert_eq!(dx.ty, VarType::Float);
    assert_eq!(dx.value.f32v(0), 0.0);
}

struct Harness {
    program: Program,
    global: GlobalState,
    infos: Vec<Option<dxil_debug::FunctionInfo>>,
    live_globals: Vec<bool>,
    config: DebuggerConfig,
    api: NullApiWrapper,
    lanes: Vec<ThreadState>,
}

impl Harness {
    fn new(program: Program, lanes: Vec<LaneInit>) -> Self {
        let infos = build_function_infos(&program, false).unwrap();
        let global = GlobalState::new();
        let live_globals = vec![false; program.id_count as usize];
        let mut lanes: Vec<ThreadState> = lanes
            .into_iter()
            .enumerate()
            .map(|(i, init)| ThreadState::new(i, &program, init))
            .collect();
        for (i, lane) in lanes.iter_mut().enumerate() {
            lane.enter_entry_point(&program, &global, &infos, &live_globals, i == 0).unwrap();
        }
        Harness {
            program,
            global,
            infos,
            live_globals,
            config: DebuggerConfig::default(),
            api: NullApiWrapper::default(),
            lanes,
        }
    }

    /// Step one lane on its own, then settle it on its next instruction
    fn step(&mut self, index: usize) -> DebugResult<Option<ShaderDebugState>> {
        let (before, rest) = self.lanes.split_at_mut(index);
        let (thread, after) = rest.split_first_mut().unwrap();
        let mut ctx = ExecContext {
            program: &self.program,
            global: &self.global,
            infos: &self.infos,
            api: &mut self.api,
            workgroup: Workgroup::new(before, after),
            config: &self.config,
            live_globals: &self.live_globals,
        };
        let state = thread.step_next(&mut ctx, index == 0)?;
        thread.step_over_nop_instructions(&self.program);
        Ok(state)
    }
}

#[test]
fn test_derivative_in_diverged_quad_fails() {
    let mut pb = ProgramBuilder::new(ShaderStage::Pixel);
    let mut fb = pb.function("main");
    let x = load_x(&mut fb);
    let dx = fb.dx_op(DxOp::DerivCoarseX, Type::f32(), vec![x.into()]);
    fb.ret();
    fb.finish();

    let mut harness = Harness::new(pb.build(), quad());
    for lane in 0..4 {
        harness.step(lane).unwrap();
    }

    // lane 1 runs ahead while the quad still agrees
    harness.step(1).unwrap();
    assert_eq!(harness.lanes[1].variable(dx).map(|v| v.value.f32v(0)), Some(2.0));

    // lane 0 now sits one instruction behind its neighbour
    assert!(matches!(harness.step(0), Err(DebugError::Diverged(_))));
}
