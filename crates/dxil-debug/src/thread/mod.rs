//! Per-lane virtual machine
//!
//! A [`ThreadState`] owns one lane's SSA values, liveness, program counter and
//! local memory. [`ThreadState::step_next`] executes exactly one instruction
//! and, when the lane is the one being reported, returns the variable changes
//! it caused. Opcode handlers live in `opcodes/`, one file per family.

mod context;
mod derivatives;
mod opcodes;

pub use context::{ExecContext, Workgroup};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::analysis::{ExecutionPoint, FunctionInfo};
use crate::error::{DebugError, DebugResult};
use crate::global_state::GlobalState;
use crate::memory::MemoryTracking;
use crate::program::{Constant, Id, Instruction, Operand, Program, ShaderStage, Type};
use crate::shader::numeric::{f32_to_f16, flush_denorm, is_nan_or_inf};
use crate::shader::{
    BindingSlot, ResourceClass, ResourceKind, ResourceReferenceInfo, ShaderBuiltin,
    ShaderDebugState, ShaderEvents, ShaderVariable, ShaderVariableChange, VarType,
};

// ============================================================================
// Lane setup
// ============================================================================

/// Per-lane inputs supplied when a session starts
#[derive(Debug, Clone, Default)]
pub struct LaneInit {
    /// Input signature aggregate, one member per element
    pub input: ShaderVariable,
    /// Builtin values that differ per lane (thread ids, sample index, ...)
    pub builtins: FxHashMap<ShaderBuiltin, ShaderVariable>,
}

impl LaneInit {
    pub fn new(input: ShaderVariable) -> Self {
        LaneInit { input, builtins: FxHashMap::default() }
    }

    pub fn with_builtin(mut self, builtin: ShaderBuiltin, value: ShaderVariable) -> Self {
        self.builtins.insert(builtin, value);
        self
    }
}

/// Properties attached to a handle by `AnnotateHandle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AnnotationProperties {
    pub kind: ResourceKind,
    pub class: ResourceClass,
    pub struct_stride: u32,
}

/// What an instruction handler asks the step loop to do next
pub(crate) enum Exec {
    /// Fall through to the next instruction
    Continue,
    /// Write `var` to `id`; `record` is cleared for writes that are not worth
    /// reporting, such as handles to statically known resources
    Assign { id: Id, var: ShaderVariable, record: bool },
    /// Continue at the first instruction of a block
    Jump(u32),
    Return,
    Kill,
}

impl Exec {
    pub(crate) fn value(id: Id, var: ShaderVariable) -> Self {
        Exec::Assign { id, var, record: true }
    }
}

// ============================================================================
// ThreadState
// ============================================================================

/// One simulated lane
#[derive(Debug, Clone)]
pub struct ThreadState {
    lane: usize,
    stage: ShaderStage,

    variables: Vec<ShaderVariable>,
    live: Vec<bool>,
    assigned: Vec<bool>,
    is_global: Vec<bool>,
    memory: MemoryTracking,

    function: usize,
    block: u32,
    previous_block: u32,
    function_instruction: u32,
    global_instruction: u32,
    active_global_instruction: u32,
    killed: bool,
    ended: bool,
    callstack: Vec<usize>,

    /// Values feeding phi nodes, captured when control left `previous_block`
    phi_snapshot: FxHashMap<Id, ShaderVariable>,

    input_id: Id,
    output_id: Id,
    builtins: FxHashMap<ShaderBuiltin, ShaderVariable>,

    resource_refs: FxHashMap<Id, ResourceReferenceInfo>,
    annotations: FxHashMap<Id, AnnotationProperties>,
    accessed_resources: FxHashSet<(ResourceClass, BindingSlot)>,

    recording: bool,
    step_flags: ShaderEvents,
    step_changes: Vec<ShaderVariableChange>,
}

impl ThreadState {
    /// Create lane `lane` for `program`, not yet entered
    pub fn new(lane: usize, program: &Program, init: LaneInit) -> Self {
        let id_count = program.id_count as usize;
        let input_id = Id(program.id_count);
        let output_id = Id(program.id_count + 1);

        let mut variables = vec![ShaderVariable::default(); id_count + 2];
        let mut input = init.input;
        if input.name.is_empty() {
            input.name = "input".into();
        }
        let outputs = program
            .outputs
            .iter()
            .map(|e| ShaderVariable::new(e.name.clone(), e.var_type, e.rows, e.columns))
            .collect();
        variables[input_id.index()] = input;
        variables[output_id.index()] = ShaderVariable::aggregate("output", outputs);

        let mut live = vec![false; id_count + 2];
        live[input_id.index()] = true;
        live[output_id.index()] = true;

        ThreadState {
            lane,
            stage: program.stage,
            variables,
            assigned: live.clone(),
            is_global: vec![false; id_count + 2],
            live,
            memory: MemoryTracking::new(),
            function: program.entry_point,
            block: 0,
            previous_block: u32::MAX,
            function_instruction: 0,
            global_instruction: 0,
            active_global_instruction: 0,
            killed: false,
            ended: false,
            callstack: Vec::new(),
            phi_snapshot: FxHashMap::default(),
            input_id,
            output_id,
            builtins: init.builtins,
            resource_refs: FxHashMap::default(),
            annotations: FxHashMap::default(),
            accessed_resources: FxHashSet::default(),
            recording: false,
            step_flags: ShaderEvents::NONE,
            step_changes: Vec::new(),
        }
    }

    pub fn lane(&self) -> usize {
        self.lane
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn block(&self) -> u32 {
        self.block
    }

    pub fn function_instruction(&self) -> u32 {
        self.function_instruction
    }

    pub fn global_instruction(&self) -> u32 {
        self.global_instruction
    }

    /// Next instruction that is not a debug marker
    pub fn active_global_instruction(&self) -> u32 {
        self.active_global_instruction
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Killed, returned, or never entered
    pub fn finished(&self) -> bool {
        self.killed || self.ended || self.callstack.is_empty()
    }

    pub fn in_uniform_block(&self, infos: &[Option<FunctionInfo>]) -> bool {
        infos
            .get(self.function)
            .and_then(Option::as_ref)
            .is_some_and(|info| info.is_uniform_block(self.block))
    }

    /// Current value of `id`, if it was ever assigned
    pub fn variable(&self, id: Id) -> Option<&ShaderVariable> {
        let index = id.index();
        if self.assigned.get(index).copied().unwrap_or(false) {
            self.variables.get(index)
        } else {
            None
        }
    }

    /// Whether `id` is currently in scope
    pub fn is_live(&self, id: Id) -> bool {
        self.live.get(id.index()).copied().unwrap_or(false)
    }

    /// Every id currently in scope, inputs and outputs excluded
    pub fn live_ids(&self) -> Vec<Id> {
        (0..self.input_id.index())
            .filter(|&i| self.live[i])
            .map(|i| Id(i as u32))
            .collect()
    }

    pub fn input(&self) -> &ShaderVariable {
        &self.variables[self.input_id.index()]
    }

    pub fn output(&self) -> &ShaderVariable {
        &self.variables[self.output_id.index()]
    }

    pub fn memory(&self) -> &MemoryTracking {
        &self.memory
    }

    pub fn builtin(&self, builtin: ShaderBuiltin) -> Option<&ShaderVariable> {
        self.builtins.get(&builtin)
    }

    // ------------------------------------------------------------------------
    // Entry and stepping
    // ------------------------------------------------------------------------

    /// Re-decode this lane's copies of global variables from shared memory
    ///
    /// Nothing is recorded: the lane that stored already reported the change.
    pub fn refresh_globals(&mut self, global: &GlobalState) -> DebugResult<()> {
        let memory = global.memory.read();
        for g in &global.globals {
            let index = g.id.index();
            if !self.assigned.get(index).copied().unwrap_or(false) {
                continue;
            }
            if let Some(var) = self.variables.get_mut(index) {
                memory.update_variable_from_backing_memory(g.id, var)?;
            }
        }
        Ok(())
    }

    /// Bind global variables and enter the program's entry point
    ///
    /// With `record` set, returns the initial state: the inputs and globals as
    /// newly created variables.
    pub fn enter_entry_point(
        &mut self,
        program: &Program,
        global: &GlobalState,
        infos: &[Option<FunctionInfo>],
        live_globals: &[bool],
        record: bool,
    ) -> DebugResult<Option<ShaderDebugState>> {
        for g in &global.globals {
            let slot = self
                .variables
                .get_mut(g.id.index())
                .ok_or_else(|| DebugError::invalid(format!("global {} outside id range", g.id)))?;
            *slot = g.var.clone();
            self.assigned[g.id.index()] = true;
        }

        self.enter_function(program, infos, program.entry_point, live_globals)?;

        if !record {
            return Ok(None);
        }
        let mut changes = vec![ShaderVariableChange::created(self.input().clone())];
        changes.extend(global.globals.iter().map(|g| ShaderVariableChange::created(g.var.clone())));
        Ok(Some(ShaderDebugState {
            step_index: 0,
            next_instruction: self.global_instruction,
            flags: ShaderEvents::NONE,
            changes,
        }))
    }

    fn enter_function(
        &mut self,
        program: &Program,
        infos: &[Option<FunctionInfo>],
        index: usize,
        live_globals: &[bool],
    ) -> DebugResult<()> {
        let info = infos
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| DebugError::invalid(format!("cannot enter function {}", index)))?;

        self.function = index;
        self.function_instruction = 0;
        self.global_instruction = info.global_instruction_offset;
        self.block = 0;
        self.previous_block = u32::MAX;
        self.phi_snapshot.clear();

        for (i, &is_global) in live_globals.iter().enumerate().take(self.input_id.index()) {
            self.live[i] = is_global;
            self.is_global[i] = is_global;
        }

        self.callstack.push(index);
        self.step_over_nop_instructions(program);
        Ok(())
    }

    /// Advance past debug markers so the program counter rests on a real
    /// instruction
    pub fn step_over_nop_instructions(&mut self, program: &Program) {
        if self.finished() {
            return;
        }
        if let Some(function) = program.functions.get(self.function) {
            while function
                .instructions
                .get(self.function_instruction as usize)
                .is_some_and(Instruction::is_nop)
            {
                self.function_instruction += 1;
                self.global_instruction += 1;
            }
        }
        self.active_global_instruction = self.global_instruction;
    }

    /// Execute one instruction
    ///
    /// With `record` set, returns the state for this step with its changes;
    /// the caller assigns the step index.
    pub fn step_next(
        &mut self,
        ctx: &mut ExecContext<'_>,
        record: bool,
    ) -> DebugResult<Option<ShaderDebugState>> {
        self.recording = record;
        self.step_flags = ShaderEvents::NONE;
        self.step_changes.clear();

        let start = self.global_instruction;
        if !self.finished() {
            self.execute_instruction(ctx)?;
        }
        let next_instruction = if self.ended { start } else { self.global_instruction };

        self.recording = false;
        if !record {
            return Ok(None);
        }
        Ok(Some(ShaderDebugState {
            step_index: 0,
            next_instruction,
            flags: self.step_flags,
            changes: std::mem::take(&mut self.step_changes),
        }))
    }

    fn execute_instruction(&mut self, ctx: &mut ExecContext<'_>) -> DebugResult<()> {
        let program = ctx.program;
        let info = ctx.function_info(self.function)?;
        let function = program
            .functions
            .get(self.function)
            .ok_or_else(|| DebugError::invalid(format!("no function {}", self.function)))?;
        let inst = function.instructions.get(self.function_instruction as usize).ok_or_else(|| {
            DebugError::invalid(format!(
                "lane {} ran off the end of {}",
                self.lane, function.name
            ))
        })?;

        if ctx.config.trace_instructions {
            trace!(lane = self.lane, instruction = self.global_instruction, "{}", inst);
        }

        self.function_instruction += 1;
        self.global_instruction += 1;

        match self.dispatch(ctx, info, inst)? {
            Exec::Continue => self.retire_dead_ids(info, None),
            Exec::Assign { id, var, record } => {
                self.retire_dead_ids(info, Some(id));
                self.set_result(inst, id, var, record)?;
            }
            Exec::Jump(block) => {
                self.jump_to_block(info, block)?;
                self.retire_dead_ids(info, None);
            }
            Exec::Return => {
                self.ended = true;
                self.callstack.pop();
            }
            Exec::Kill => self.killed = true,
        }
        Ok(())
    }

    /// Drop every id whose last read is behind the program counter
    fn retire_dead_ids(&mut self, info: &FunctionInfo, output: Option<Id>) {
        let current = ExecutionPoint::new(self.block, self.function_instruction);
        for index in 0..self.input_id.index() {
            if !self.live[index] || self.is_global[index] {
                continue;
            }
            let id = Id(index as u32);
            if Some(id) == output {
                continue;
            }
            let Some(max) = info.max_point(id) else { continue };
            if current.is_after(&max, &info.control_flow) {
                self.live[index] = false;
                if self.recording {
                    self.step_changes.push(ShaderVariableChange::removed(self.variables[index].clone()));
                }
            }
        }
    }

    fn set_result(
        &mut self,
        inst: &Instruction,
        id: Id,
        mut var: ShaderVariable,
        record: bool,
    ) -> DebugResult<()> {
        let index = id.index();
        if index >= self.variables.len() {
            return Err(DebugError::invalid(format!("result {} outside id range", id)));
        }

        if inst.is_flushing() && var.ty == VarType::Float {
            for c in 0..var.component_count() {
                var.value.set(c, flush_denorm(VarType::Float, var.value.get(c)));
            }
        }

        if record && self.recording {
            if var.ty.is_float()
                && (0..var.component_count()).any(|c| is_nan_or_inf(var.ty, var.value.get(c)))
            {
                self.step_flags |= ShaderEvents::GENERATED_NAN_OR_INF;
            }
            let change = if self.assigned[index] {
                ShaderVariableChange::updated(self.variables[index].clone(), var.clone())
            } else {
                ShaderVariableChange::created(var.clone())
            };
            self.step_changes.push(change);
        }

        self.live[index] = true;
        self.assigned[index] = true;
        self.variables[index] = var;
        Ok(())
    }

    fn jump_to_block(&mut self, info: &FunctionInfo, target: u32) -> DebugResult<()> {
        let start = info
            .block_start(target)
            .ok_or_else(|| DebugError::invalid(format!("branch to unknown block {}", target)))?;

        self.previous_block = self.block;
        self.phi_snapshot.clear();
        for &id in info.phi_referenced_ids(self.previous_block) {
            if let Some(var) = self.variable(id) {
                self.phi_snapshot.insert(id, var.clone());
            }
        }

        self.block = target;
        self.function_instruction = start;
        self.global_instruction = info.global_instruction_offset + start;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers shared by the opcode families
    // ------------------------------------------------------------------------

    pub(crate) fn record_change(&mut self, change: ShaderVariableChange) {
        if self.recording {
            self.step_changes.push(change);
        }
    }

    pub(crate) fn raise_event(&mut self, flags: ShaderEvents) {
        self.step_flags |= flags;
    }

    /// Read an operand; float32 components are flushed when `flush` is set
    pub(crate) fn operand(&self, op: &Operand, flush: bool) -> DebugResult<ShaderVariable> {
        let mut var = match op {
            Operand::Id(id) => self.variable(*id).cloned().ok_or(DebugError::UnassignedRead(*id))?,
            Operand::Const(c) => constant_to_variable(c),
            Operand::Undef(ty) => ShaderVariable::zeroed_for_type("undef", ty),
            Operand::Block(b) => {
                return Err(DebugError::type_mismatch(format!("block {} used as a value", b)))
            }
        };
        if flush && var.ty == VarType::Float {
            for c in 0..var.component_count() {
                var.value.set(c, flush_denorm(VarType::Float, var.value.get(c)));
            }
        }
        Ok(var)
    }

    /// Operand `index` of `inst`
    pub(crate) fn arg(&self, inst: &Instruction, index: usize) -> DebugResult<ShaderVariable> {
        let op = inst.args.get(index).ok_or_else(|| {
            DebugError::invalid(format!("{:?} is missing operand {}", inst.op, index))
        })?;
        self.operand(op, inst.is_flushing())
    }

    pub(crate) fn arg_u32(&self, inst: &Instruction, index: usize) -> DebugResult<u32> {
        Ok(self.arg(inst, index)?.value.u32v(0))
    }

    pub(crate) fn arg_f32(&self, inst: &Instruction, index: usize) -> DebugResult<f32> {
        Ok(self.arg(inst, index)?.float_comp(0) as f32)
    }

    /// Whether operand `index` is present and not undef
    pub(crate) fn has_arg(inst: &Instruction, index: usize) -> bool {
        inst.args.get(index).is_some_and(|a| !a.is_undef())
    }

    pub(crate) fn arg_id(inst: &Instruction, index: usize) -> DebugResult<Id> {
        inst.args.get(index).and_then(Operand::id).ok_or_else(|| {
            DebugError::invalid(format!("{:?} operand {} is not an SSA id", inst.op, index))
        })
    }

    /// Result id of `inst`, which must have one
    pub(crate) fn result_id(inst: &Instruction) -> DebugResult<Id> {
        inst.result
            .ok_or_else(|| DebugError::invalid(format!("{:?} without a result id", inst.op)))
    }

    /// Zero value shaped like the result of `inst`, named after it
    pub(crate) fn blank_result(inst: &Instruction) -> DebugResult<(Id, ShaderVariable)> {
        let id = Self::result_id(inst)?;
        Ok((id, ShaderVariable::zeroed_for_type(result_name(inst, id), &inst.ty)))
    }
}

/// Display name of an instruction's result
pub(crate) fn result_name(inst: &Instruction, id: Id) -> String {
    match &inst.name {
        Some(name) => name.clone(),
        None => format!("_{}", id.0),
    }
}

/// Value of a constant operand
pub(crate) fn constant_to_variable(c: &Constant) -> ShaderVariable {
    match c {
        Constant::Int { bits, value } => {
            ShaderVariable::scalar("", Type::int(*bits).var_type(), *value)
        }
        Constant::Float { bits, value } => {
            let raw = match bits {
                16 => f32_to_f16(*value as f32) as u64,
                64 => value.to_bits(),
                _ => (*value as f32).to_bits() as u64,
            };
            ShaderVariable::scalar("", Type::float(*bits).var_type(), raw)
        }
        Constant::Vector(elems) => {
            let ty = elems.first().map(|e| e.ty().var_type()).unwrap_or_default();
            let mut var = ShaderVariable::new("", ty, 1, elems.len() as u8);
            for (i, e) in elems.iter().enumerate() {
                var.value.set(i, constant_to_variable(e).value.get(0));
            }
            var
        }
        Constant::Aggregate { ty, members } => {
            let mut var = ShaderVariable::zeroed_for_type("", ty);
            for (slot, member) in var.members.iter_mut().zip(members) {
                let name = std::mem::take(&mut slot.name);
                *slot = constant_to_variable(member).with_name(name);
            }
            var
        }
        Constant::Zero(ty) => ShaderVariable::zeroed_for_type("", ty),
    }
}

/// Whether lanes sit at different points
///
/// Finished lanes are ignored; the rest must share a block and the next real
/// instruction.
pub fn lanes_diverged<'t>(lanes: impl IntoIterator<Item = &'t ThreadState>) -> bool {
    let mut reference: Option<(u32, u32)> = None;
    for lane in lanes {
        if lane.finished() {
            continue;
        }
        let point = (lane.block, lane.active_global_instruction);
        match reference {
            None => reference = Some(point),
            Some(r) if r != point => return true,
            Some(_) => {}
        }
    }
    false
}
