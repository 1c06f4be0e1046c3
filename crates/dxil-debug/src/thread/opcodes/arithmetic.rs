//! Integer and float arithmetic

use crate::error::{DebugError, DebugResult};
use crate::program::{Instruction, Operation};
use crate::shader::numeric::{float_binary_for, int_binary, FloatBinOp, IntBinOp};
use crate::thread::{Exec, ThreadState};

fn int_op(op: Operation) -> Option<IntBinOp> {
    Some(match op {
        Operation::Add => IntBinOp::Add,
        Operation::Sub => IntBinOp::Sub,
        Operation::Mul => IntBinOp::Mul,
        Operation::UDiv => IntBinOp::UDiv,
        Operation::SDiv => IntBinOp::SDiv,
        Operation::URem => IntBinOp::URem,
        Operation::SRem => IntBinOp::SRem,
        Operation::And => IntBinOp::And,
        Operation::Or => IntBinOp::Or,
        Operation::Xor => IntBinOp::Xor,
        Operation::ShiftLeft => IntBinOp::Shl,
        Operation::LogicalShiftRight => IntBinOp::LShr,
        Operation::ArithShiftRight => IntBinOp::AShr,
        _ => return None,
    })
}

fn float_op(op: Operation) -> Option<FloatBinOp> {
    Some(match op {
        Operation::FAdd => FloatBinOp::Add,
        Operation::FSub => FloatBinOp::Sub,
        Operation::FMul => FloatBinOp::Mul,
        Operation::FDiv => FloatBinOp::Div,
        Operation::FRem => FloatBinOp::Rem,
        _ => return None,
    })
}

impl ThreadState {
    pub(in crate::thread) fn exec_arithmetic(&mut self, inst: &Instruction) -> DebugResult<Exec> {
        let (id, mut result) = Self::blank_result(inst)?;
        let a = self.arg(inst, 0)?;
        let b = self.arg(inst, 1)?;

        if let Some(op) = int_op(inst.op) {
            if !inst.ty.is_int() {
                return Err(DebugError::type_mismatch(format!(
                    "{:?} on a {} result",
                    inst.op, inst.ty
                )));
            }
            let bits = inst.ty.scalar_bits();
            for c in 0..result.component_count() {
                result.value.set(c, int_binary(op, bits, a.value.get(c), b.value.get(c)));
            }
        } else if let Some(op) = float_op(inst.op) {
            for c in 0..result.component_count() {
                let r = float_binary_for(result.ty, op, a.value.get(c), b.value.get(c))
                    .ok_or_else(|| {
                        DebugError::type_mismatch(format!("{:?} on {:?}", inst.op, result.ty))
                    })?;
                result.value.set(c, r);
            }
        } else {
            return Err(DebugError::UnsupportedOperation(inst.op));
        }

        Ok(Exec::value(id, result))
    }
}
