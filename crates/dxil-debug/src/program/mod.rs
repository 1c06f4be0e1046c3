//! Program model consumed by the debugger
//!
//! A program is already parsed: functions hold typed SSA instructions laid out
//! flat, blocks carry their predecessor lists. The debugger only reads it.

mod builder;
mod display;
mod function;
mod instr;
mod types;
mod value;

pub use builder::{FunctionBuilder, ProgramBuilder};
pub use function::{
    Block, Function, GlobalVariable, Program, ResourceDecl, ShaderStage, SignatureElement,
};
pub use instr::{barrier_mode, AtomicBinOpKind, Callee, DxOp, Instruction, Operation};
pub use types::{AddressSpace, ScalarKind, Type};
pub use value::{Constant, Id, Operand};
