//! Program construction helpers
//!
//! Used by hosts that translate an already-parsed module into the program
//! model, and by tests to write small programs inline.

use super::function::{
    Block, Function, GlobalVariable, Program, ResourceDecl, ShaderStage, SignatureElement,
};
use super::instr::{Callee, DxOp, Instruction, Operation};
use super::types::Type;
use super::value::{Constant, Id, Operand};

/// Builder for a whole program
pub struct ProgramBuilder {
    stage: ShaderStage,
    functions: Vec<Function>,
    entry_point: usize,
    globals: Vec<GlobalVariable>,
    resources: Vec<ResourceDecl>,
    inputs: Vec<SignatureElement>,
    outputs: Vec<SignatureElement>,
    next_id: u32,
}

impl ProgramBuilder {
    pub fn new(stage: ShaderStage) -> Self {
        ProgramBuilder {
            stage,
            functions: Vec::new(),
            entry_point: 0,
            globals: Vec::new(),
            resources: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            next_id: 0,
        }
    }

    /// Allocate a fresh SSA id
    pub fn alloc_id(&mut self) -> Id {
        let id = Id(self.next_id);
        self.next_id += 1;
        id
    }

    /// Declare a global variable holding a value of `pointee` type
    pub fn add_global(
        &mut self,
        name: impl Into<String>,
        pointee: Type,
        initializer: Option<Constant>,
    ) -> Id {
        let id = self.alloc_id();
        self.globals.push(GlobalVariable {
            id,
            name: name.into(),
            ty: Type::pointer(pointee),
            initializer,
        });
        id
    }

    pub fn add_resource(&mut self, decl: ResourceDecl) {
        self.resources.push(decl);
    }

    pub fn add_input(&mut self, element: SignatureElement) -> u32 {
        self.inputs.push(element);
        self.inputs.len() as u32 - 1
    }

    pub fn add_output(&mut self, element: SignatureElement) -> u32 {
        self.outputs.push(element);
        self.outputs.len() as u32 - 1
    }

    /// Start a function; the first one finished becomes the entry point
    pub fn function(&mut self, name: impl Into<String>) -> FunctionBuilder<'_> {
        FunctionBuilder {
            program: self,
            name: name.into(),
            blocks: vec![(Block::default(), Vec::new())],
            current: 0,
        }
    }

    pub fn set_entry_point(&mut self, index: usize) {
        self.entry_point = index;
    }

    pub fn build(self) -> Program {
        Program {
            stage: self.stage,
            functions: self.functions,
            entry_point: self.entry_point,
            globals: self.globals,
            resources: self.resources,
            inputs: self.inputs,
            outputs: self.outputs,
            id_count: self.next_id,
        }
    }
}

/// Builder for one function's blocks
pub struct FunctionBuilder<'a> {
    program: &'a mut ProgramBuilder,
    name: String,
    blocks: Vec<(Block, Vec<Instruction>)>,
    current: u32,
}

impl<'a> FunctionBuilder<'a> {
    /// Create a new basic block; blocks are laid out in creation order
    pub fn create_block(&mut self) -> u32 {
        self.blocks.push((Block::default(), Vec::new()));
        self.blocks.len() as u32 - 1
    }

    /// Switch to emitting into a different block
    pub fn switch_to_block(&mut self, block: u32) {
        self.current = block;
    }

    pub fn current_block(&self) -> u32 {
        self.current
    }

    pub fn alloc_id(&mut self) -> Id {
        self.program.alloc_id()
    }

    /// Emit an instruction into the current block
    pub fn emit(&mut self, inst: Instruction) {
        self.blocks[self.current as usize].1.push(inst);
    }

    /// Emit an instruction producing a value and return its id
    pub fn emit_value(&mut self, op: Operation, ty: Type, args: Vec<Operand>) -> Id {
        let id = self.alloc_id();
        self.emit(Instruction::new(op, ty, Some(id), args));
        id
    }

    pub fn binary(
        &mut self,
        op: Operation,
        ty: Type,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Id {
        self.emit_value(op, ty, vec![lhs.into(), rhs.into()])
    }

    pub fn unary(&mut self, op: Operation, ty: Type, value: impl Into<Operand>) -> Id {
        self.emit_value(op, ty, vec![value.into()])
    }

    /// Call a dx.op intrinsic with a result
    pub fn dx_op(&mut self, op: DxOp, ty: Type, args: Vec<Operand>) -> Id {
        let id = self.alloc_id();
        let mut inst = Instruction::new(Operation::Call, ty, Some(id), args);
        inst.callee = Some(Callee::DxOp(op));
        self.emit(inst);
        id
    }

    /// Call a dx.op intrinsic without a result
    pub fn dx_op_void(&mut self, op: DxOp, args: Vec<Operand>) {
        let mut inst = Instruction::new(Operation::Call, Type::Void, None, args);
        inst.callee = Some(Callee::DxOp(op));
        self.emit(inst);
    }

    /// Emit an `llvm.dbg` marker that execution steps over
    pub fn debug_marker(&mut self) {
        let mut inst = Instruction::new(Operation::Call, Type::Void, None, vec![]);
        inst.callee = Some(Callee::DebugIntrinsic);
        self.emit(inst);
    }

    pub fn select(
        &mut self,
        ty: Type,
        cond: impl Into<Operand>,
        if_true: impl Into<Operand>,
        if_false: impl Into<Operand>,
    ) -> Id {
        self.emit_value(Operation::Select, ty, vec![if_true.into(), if_false.into(), cond.into()])
    }

    pub fn phi(&mut self, ty: Type, incoming: Vec<(Operand, u32)>) -> Id {
        let mut args = Vec::with_capacity(incoming.len() * 2);
        for (value, block) in incoming {
            args.push(value);
            args.push(Operand::Block(block));
        }
        self.emit_value(Operation::Phi, ty, args)
    }

    /// Stack allocation of a value of `pointee` type
    pub fn alloca(&mut self, pointee: Type) -> Id {
        self.emit_value(Operation::Alloca, Type::pointer(pointee), vec![])
    }

    pub fn load(&mut self, ty: Type, ptr: Id) -> Id {
        self.emit_value(Operation::Load, ty, vec![ptr.into()])
    }

    pub fn store(&mut self, ptr: Id, value: impl Into<Operand>) {
        self.emit(Instruction::new(
            Operation::Store,
            Type::Void,
            None,
            vec![ptr.into(), value.into()],
        ));
    }

    /// Derived pointer to a `pointee` element of `base`
    pub fn gep(&mut self, pointee: Type, base: Id, indices: Vec<Operand>) -> Id {
        let mut args = Vec::with_capacity(indices.len() + 1);
        args.push(base.into());
        args.extend(indices);
        self.emit_value(Operation::GetElementPtr, Type::pointer(pointee), args)
    }

    fn add_pred(&mut self, target: u32) {
        let from = self.current;
        if let Some((block, _)) = self.blocks.get_mut(target as usize) {
            if !block.preds.contains(&from) {
                block.preds.push(from);
            }
        }
    }

    pub fn br(&mut self, target: u32) {
        self.add_pred(target);
        self.emit(Instruction::new(Operation::Br, Type::Void, None, vec![Operand::Block(target)]));
    }

    pub fn cond_br(&mut self, cond: impl Into<Operand>, if_true: u32, if_false: u32) {
        self.add_pred(if_true);
        self.add_pred(if_false);
        self.emit(Instruction::new(
            Operation::Br,
            Type::Void,
            None,
            vec![Operand::Block(if_true), Operand::Block(if_false), cond.into()],
        ));
    }

    pub fn switch(&mut self, value: impl Into<Operand>, default: u32, cases: Vec<(Constant, u32)>) {
        self.add_pred(default);
        let mut args = vec![value.into(), Operand::Block(default)];
        for (case, target) in cases {
            self.add_pred(target);
            args.push(Operand::Const(case));
            args.push(Operand::Block(target));
        }
        self.emit(Instruction::new(Operation::Switch, Type::Void, None, args));
    }

    pub fn ret(&mut self) {
        self.emit(Instruction::new(Operation::Ret, Type::Void, None, vec![]));
    }

    pub fn unreachable(&mut self) {
        self.emit(Instruction::new(Operation::Unreachable, Type::Void, None, vec![]));
    }

    /// Lay the blocks out in order and add the function to the program
    pub fn finish(self) -> usize {
        let mut blocks = Vec::with_capacity(self.blocks.len());
        let mut instructions = Vec::new();
        for (block, insts) in self.blocks {
            blocks.push(block);
            instructions.extend(insts);
        }
        self.program.functions.push(Function {
            name: self.name,
            blocks,
            instructions,
            external: false,
        });
        self.program.functions.len() - 1
    }
}
