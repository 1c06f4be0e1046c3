//! Per-function static analysis
//!
//! Computed once before execution: block layout, control flow, the furthest
//! execution point at which each SSA id is still read, and the ids each block
//! feeds into phi nodes of its successors.

use rustc_hash::FxHashSet;
use tracing::debug;

use super::cfg::ControlFlow;
use crate::error::{DebugError, DebugResult};
use crate::program::{Function, Id, Operand, Operation, Program};

/// A program point: block plus instruction index within the function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionPoint {
    pub block: u32,
    pub instruction: u32,
}

impl ExecutionPoint {
    pub fn new(block: u32, instruction: u32) -> Self {
        ExecutionPoint { block, instruction }
    }

    /// Whether this point executes after `from`
    ///
    /// Within one block instruction order decides, across blocks the control
    /// flow does, so a point only reachable through a back edge is still after.
    pub fn is_after(&self, from: &ExecutionPoint, cf: &ControlFlow) -> bool {
        if self.block == from.block {
            self.instruction > from.instruction
        } else {
            cf.is_forward_connection(from.block, self.block)
        }
    }
}

/// Static information about one function
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    /// Index of the function in the program
    pub function: usize,
    /// Index of the function's first instruction across the whole program
    pub global_instruction_offset: u32,
    pub control_flow: ControlFlow,
    /// First instruction index of each block
    pub block_starts: Vec<u32>,
    /// Every id defined or read in the function, plus globals it touches
    pub referenced_ids: FxHashSet<Id>,
    /// Furthest point each id is read, indexed by id
    max_execution_points: Vec<Option<ExecutionPoint>>,
    /// Per block, ids read by phi nodes when control leaves that block
    phi_referenced_ids: Vec<Vec<Id>>,
}

impl FunctionInfo {
    /// Analyse function `index` of `program`
    pub fn build(
        program: &Program,
        index: usize,
        global_instruction_offset: u32,
        log_control_flow: bool,
    ) -> DebugResult<Self> {
        let function = program
            .functions
            .get(index)
            .ok_or_else(|| DebugError::invalid(format!("no function {}", index)))?;

        let block_starts = compute_block_starts(function)?;
        let control_flow = ControlFlow::new(function.blocks.len(), &function.block_links());

        if log_control_flow {
            debug!(
                function = %function.name,
                uniform = ?control_flow.uniform_blocks(),
                loops = ?control_flow.loop_blocks(),
                "control flow"
            );
        }

        let mut info = FunctionInfo {
            function: index,
            global_instruction_offset,
            control_flow,
            block_starts,
            referenced_ids: FxHashSet::default(),
            max_execution_points: vec![None; program.id_count as usize],
            phi_referenced_ids: vec![Vec::new(); function.blocks.len()],
        };
        info.compute_live_ranges(program, function)?;
        info.collect_phi_references(function)?;
        Ok(info)
    }

    fn compute_live_ranges(&mut self, program: &Program, function: &Function) -> DebugResult<()> {
        let count = function.instructions.len() as u32;
        let mut cur_block = 0u32;

        for (i, inst) in function.instructions.iter().enumerate() {
            let i = i as u32;
            if inst.is_nop() {
                continue;
            }

            if let Some(result) = inst.result {
                if !self.referenced_ids.insert(result) {
                    return Err(DebugError::invalid(format!("{} defined twice", result)));
                }
                let current = ExecutionPoint::new(cur_block, i);
                match self.max_point(result) {
                    None => self.set_max_point(result, current)?,
                    Some(existing) if existing.is_after(&current, &self.control_flow) => {}
                    Some(existing) => {
                        return Err(DebugError::invalid(format!(
                            "{} read at {:?} before its definition at {:?}",
                            result, existing, current
                        )))
                    }
                }
            }

            // phi arguments are tracked per predecessor block instead
            if inst.op != Operation::Phi {
                // stack allocations live until the function ends
                let max_inst = if inst.op == Operation::Alloca { count } else { i + 1 };
                let mut max_point = ExecutionPoint::new(cur_block, max_inst);
                // values read in a loop must survive every iteration
                if self.control_flow.is_loop(cur_block) {
                    let next = self.control_flow.next_uniform_block(cur_block);
                    let start = self.block_starts.get(next as usize).copied().unwrap_or(0);
                    max_point = ExecutionPoint::new(next, start + 1);
                }

                for arg in &inst.args {
                    let Operand::Id(id) = arg else { continue };
                    if program.global(*id).is_some() {
                        self.referenced_ids.insert(*id);
                    }
                    match self.max_point(*id) {
                        Some(existing) if !max_point.is_after(&existing, &self.control_flow) => {}
                        _ => self.set_max_point(*id, max_point)?,
                    }
                }
            }

            if inst.op.is_terminator() {
                cur_block += 1;
            }
        }

        let tracked = self.max_execution_points.iter().filter(|p| p.is_some()).count();
        if tracked != self.referenced_ids.len() {
            return Err(DebugError::invalid(format!(
                "function {} reads ids it never defines",
                function.name
            )));
        }
        Ok(())
    }

    fn collect_phi_references(&mut self, function: &Function) -> DebugResult<()> {
        for inst in function.instructions.iter().filter(|i| i.op == Operation::Phi) {
            for pair in inst.args.chunks(2) {
                let (Some(value), Some(block)) = (pair.first(), pair.get(1)) else {
                    return Err(DebugError::invalid("phi with unpaired operand"));
                };
                let Operand::Id(id) = value else { continue };
                let block = block
                    .block()
                    .ok_or_else(|| DebugError::invalid("phi operand without a block"))?;
                let ids = self
                    .phi_referenced_ids
                    .get_mut(block as usize)
                    .ok_or_else(|| DebugError::invalid(format!("phi names unknown block {}", block)))?;
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }
        Ok(())
    }

    fn set_max_point(&mut self, id: Id, point: ExecutionPoint) -> DebugResult<()> {
        let slot = self
            .max_execution_points
            .get_mut(id.index())
            .ok_or_else(|| DebugError::invalid(format!("{} outside the program id range", id)))?;
        *slot = Some(point);
        Ok(())
    }

    /// Furthest point at which `id` is read
    pub fn max_point(&self, id: Id) -> Option<ExecutionPoint> {
        self.max_execution_points.get(id.index()).copied().flatten()
    }

    /// Ids that phi nodes read when control leaves `block`
    pub fn phi_referenced_ids(&self, block: u32) -> &[Id] {
        self.phi_referenced_ids.get(block as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn block_start(&self, block: u32) -> Option<u32> {
        self.block_starts.get(block as usize).copied()
    }

    pub fn uniform_blocks(&self) -> &[u32] {
        self.control_flow.uniform_blocks()
    }

    pub fn is_uniform_block(&self, block: u32) -> bool {
        self.control_flow.is_uniform(block)
    }
}

/// First instruction of every block, split after each terminator
fn compute_block_starts(function: &Function) -> DebugResult<Vec<u32>> {
    let mut starts = Vec::with_capacity(function.blocks.len());
    if !function.instructions.is_empty() {
        starts.push(0);
    }
    let last = function.instructions.len().saturating_sub(1);
    for (i, inst) in function.instructions.iter().enumerate() {
        if inst.op.is_terminator() && i < last {
            starts.push(i as u32 + 1);
        }
    }
    if starts.len() != function.blocks.len() {
        return Err(DebugError::invalid(format!(
            "function {} has {} blocks but {} terminated instruction runs",
            function.name,
            function.blocks.len(),
            starts.len()
        )));
    }
    Ok(starts)
}

/// Build the info for every defined function, in program order
pub fn build_function_infos(
    program: &Program,
    log_control_flow: bool,
) -> DebugResult<Vec<Option<FunctionInfo>>> {
    let mut offset = 0u32;
    let mut infos = Vec::with_capacity(program.functions.len());
    for (index, function) in program.functions.iter().enumerate() {
        if function.external {
            infos.push(None);
            continue;
        }
        infos.push(Some(FunctionInfo::build(program, index, offset, log_control_flow)?));
        offset += function.instructions.len() as u32;
    }
    Ok(infos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Constant, ProgramBuilder, ShaderStage, Type};

    #[test]
    fn test_straight_line_ranges() {
        let mut pb = ProgramBuilder::new(ShaderStage::Compute);
        let mut fb = pb.function("main");
        let a = fb.binary(Operation::Add, Type::i32(), Constant::i32(1), Constant::i32(2));
        let b = fb.binary(Operation::Mul, Type::i32(), a, a);
        let _c = fb.binary(Operation::Sub, Type::i32(), b, a);
        fb.ret();
        fb.finish();
        let program = pb.build();

        let info = FunctionInfo::build(&program, 0, 0, false).unwrap();
        assert_eq!(info.max_point(a), Some(ExecutionPoint::new(0, 3)));
        assert_eq!(info.max_point(b), Some(ExecutionPoint::new(0, 3)));
        assert_eq!(info.block_starts, vec![0]);
        assert_eq!(info.uniform_blocks(), &[0]);
    }

    #[test]
    fn test_loop_reads_extend_to_next_uniform_block() {
        let mut pb = ProgramBuilder::new(ShaderStage::Compute);
        let mut fb = pb.function("main");
        let header = fb.create_block();
        let exit = fb.create_block();
        let a = fb.binary(Operation::Add, Type::i32(), Constant::i32(1), Constant::i32(2));
        fb.br(header);

        fb.switch_to_block(header);
        let i = fb.alloc_id();
        let next = fb.binary(Operation::Add, Type::i32(), i, a);
        let done = fb.binary(Operation::SGreater, Type::bool(), next, Constant::i32(10));
        fb.cond_br(done, exit, header);

        fb.switch_to_block(exit);
        fb.ret();

        // give the loop counter a phi at the top of the header
        let mut phi = crate::program::Instruction::new(
            Operation::Phi,
            Type::i32(),
            Some(i),
            vec![Constant::i32(0).into(), Operand::Block(0), next.into(), Operand::Block(header)],
        );
        phi.name = Some("i".into());
        fb.switch_to_block(header);
        fb.finish();
        let mut program = pb.build();
        program.functions[0].instructions.insert(2, phi);

        let info = FunctionInfo::build(&program, 0, 0, false).unwrap();
        assert_eq!(info.block_starts, vec![0, 2, 6]);
        assert_eq!(info.control_flow.loop_blocks(), &[header]);
        // `a` is read inside the loop so it survives into the exit block
        assert_eq!(info.max_point(a), Some(ExecutionPoint::new(exit, 7)));
        assert_eq!(info.phi_referenced_ids(header), &[next]);
        assert!(info.phi_referenced_ids(0).is_empty());
    }

    #[test]
    fn test_duplicate_definition_is_rejected() {
        let mut pb = ProgramBuilder::new(ShaderStage::Compute);
        let mut fb = pb.function("main");
        let a = fb.binary(Operation::Add, Type::i32(), Constant::i32(1), Constant::i32(2));
        fb.emit(crate::program::Instruction::new(
            Operation::Add,
            Type::i32(),
            Some(a),
            vec![Constant::i32(1).into(), Constant::i32(1).into()],
        ));
        fb.ret();
        fb.finish();
        let program = pb.build();
        assert!(matches!(
            FunctionInfo::build(&program, 0, 0, false),
            Err(DebugError::InvalidProgram(_))
        ));
    }

    #[test]
    fn test_execution_point_ordering_uses_control_flow() {
        let cf = ControlFlow::new(0, &[(0, 1), (1, 2), (2, 1)]);
        let in_loop = ExecutionPoint::new(2, 1);
        let loop_head = ExecutionPoint::new(1, 9);
        assert!(loop_head.is_after(&in_loop, &cf));
        assert!(in_loop.is_after(&loop_head, &cf));
        assert!(!ExecutionPoint::new(0, 5).is_after(&loop_head, &cf));
        assert!(ExecutionPoint::new(1, 10).is_after(&loop_head, &cf));
    }

    #[test]
    fn test_global_instruction_offsets() {
        let mut pb = ProgramBuilder::new(ShaderStage::Compute);
        let mut fb = pb.function("main");
        fb.debug_marker();
        fb.ret();
        fb.finish();
        let mut fb = pb.function("helper");
        fb.ret();
        fb.finish();
        let program = pb.build();

        let infos = build_function_infos(&program, false).unwrap();
        assert_eq!(infos[0].as_ref().map(|i| i.global_instruction_offset), Some(0));
        assert_eq!(infos[1].as_ref().map(|i| i.global_instruction_offset), Some(2));
    }
}
