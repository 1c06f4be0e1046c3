//! Float and integer comparisons

use crate::error::{DebugError, DebugResult};
use crate::program::{Instruction, Operation};
use crate::shader::numeric::{float_to_f64, mask, sext};
use crate::thread::{Exec, ThreadState};

fn compare_float(op: Operation, a: f64, b: f64) -> Option<bool> {
    use Operation::*;

    let unordered = a.is_nan() || b.is_nan();
    Some(match op {
        FOrdFalse => false,
        FOrdTrue => true,
        FOrd => !unordered,
        FUnord => unordered,
        FOrdEqual => !unordered && a == b,
        FOrdGreater => !unordered && a > b,
        FOrdGreaterEqual => !unordered && a >= b,
        FOrdLess => !unordered && a < b,
        FOrdLessEqual => !unordered && a <= b,
        FOrdNotEqual => !unordered && a != b,
        FUnordEqual => unordered || a == b,
        FUnordGreater => unordered || a > b,
        FUnordGreaterEqual => unordered || a >= b,
        FUnordLess => unordered || a < b,
        FUnordLessEqual => unordered || a <= b,
        FUnordNotEqual => unordered || a != b,
        _ => return None,
    })
}

fn compare_int(op: Operation, bits: u32, a: u64, b: u64) -> Option<bool> {
    use Operation::*;

    let (ua, ub) = (a & mask(bits), b & mask(bits));
    let (sa, sb) = (sext(a, bits), sext(b, bits));
    Some(match op {
        IEqual => ua == ub,
        INotEqual => ua != ub,
        UGreater => ua > ub,
        UGreaterEqual => ua >= ub,
        ULess => ua < ub,
        ULessEqual => ua <= ub,
        SGreater => sa > sb,
        SGreaterEqual => sa >= sb,
        SLess => sa < sb,
        SLessEqual => sa <= sb,
        _ => return None,
    })
}

impl ThreadState {
    pub(in crate::thread) fn exec_compare(&mut self, inst: &Instruction) -> DebugResult<Exec> {
        let (id, mut result) = Self::blank_result(inst)?;
        let a = self.arg(inst, 0)?;
        let b = self.arg(inst, 1)?;

        for c in 0..result.component_count() {
            let (x, y) = (a.value.get(c), b.value.get(c));
            let hit = if a.ty.is_float() {
                compare_float(inst.op, float_to_f64(a.ty, x), float_to_f64(b.ty, y))
            } else {
                compare_int(inst.op, a.ty.bits(), x, y)
            };
            let hit = hit.ok_or_else(|| {
                DebugError::type_mismatch(format!("{:?} on {:?} operands", inst.op, a.ty))
            })?;
            result.value.set(c, hit as u64);
        }

        Ok(Exec::value(id, result))
    }
}
