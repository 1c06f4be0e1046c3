//! Opcode handlers for the lane interpreter
//!
//! Each module implements one family of operations as methods on
//! `ThreadState`. [`ThreadState::dispatch`] routes an instruction to its
//! family; anything without a handler fails with an unsupported error.

mod arithmetic;
mod casts;
mod compare;
mod control_flow;
mod dxop;
mod memory;
mod resources;
mod vector;

use crate::analysis::FunctionInfo;
use crate::error::{DebugError, DebugResult};
use crate::program::{Callee, Instruction, Operation};

use super::{ExecContext, Exec, ThreadState};

impl ThreadState {
    pub(in crate::thread) fn dispatch(
        &mut self,
        ctx: &mut ExecContext<'_>,
        info: &FunctionInfo,
        inst: &Instruction,
    ) -> DebugResult<Exec> {
        use Operation::*;

        match inst.op {
            NoOp | Fence => Ok(Exec::Continue),

            Call => match &inst.callee {
                Some(Callee::DxOp(op)) => self.exec_dx_op(ctx, inst, *op),
                Some(Callee::DebugIntrinsic) | Some(Callee::LlvmIntrinsic(_)) => Ok(Exec::Continue),
                Some(Callee::Function(_)) | None => {
                    Err(DebugError::UnsupportedOperation(inst.op))
                }
            },

            Ret | Br | Switch | Unreachable | Phi | Select => {
                self.exec_control_flow(info, inst)
            }

            Add | Sub | Mul | UDiv | SDiv | URem | SRem | And | Or | Xor | ShiftLeft
            | LogicalShiftRight | ArithShiftRight | FAdd | FSub | FMul | FDiv | FRem => {
                self.exec_arithmetic(inst)
            }

            FOrdFalse | FOrdEqual | FOrdGreater | FOrdGreaterEqual | FOrdLess | FOrdLessEqual
            | FOrdNotEqual | FOrd | FUnord | FUnordEqual | FUnordGreater | FUnordGreaterEqual
            | FUnordLess | FUnordLessEqual | FUnordNotEqual | FOrdTrue | IEqual | INotEqual
            | UGreater | UGreaterEqual | ULess | ULessEqual | SGreater | SGreaterEqual | SLess
            | SLessEqual => self.exec_compare(inst),

            Trunc | ZExt | SExt | FToU | FToS | UToF | SToF | FPTrunc | FPExt | PtrToI
            | IToPtr | Bitcast => self.exec_cast(inst),

            ExtractVal | ExtractElement | InsertElement | ShuffleVector => self.exec_vector(inst),

            Alloca | Load | LoadAtomic | Store | StoreAtomic | GetElementPtr | AtomicExchange
            | AtomicAdd | AtomicSub | AtomicAnd | AtomicNand | AtomicOr | AtomicXor
            | AtomicMax | AtomicMin | AtomicUMax | AtomicUMin => self.exec_memory(ctx, inst),

            InsertValue | CompareExchange | AddrSpaceCast => {
                Err(DebugError::UnsupportedOperation(inst.op))
            }
        }
    }
}
