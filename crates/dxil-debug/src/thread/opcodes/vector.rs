//! Vector and aggregate element access

use crate::error::{DebugError, DebugResult};
use crate::program::{Instruction, Operation};
use crate::thread::{result_name, Exec, ThreadState};

impl ThreadState {
    pub(in crate::thread) fn exec_vector(&mut self, inst: &Instruction) -> DebugResult<Exec> {
        let (id, mut result) = Self::blank_result(inst)?;
        let a = self.arg(inst, 0)?;

        match inst.op {
            Operation::ExtractVal => {
                if inst.args.len() < 2 {
                    return Err(DebugError::invalid("extractvalue without an index"));
                }
                // Aggregates walk their members, flat results of intrinsics
                // index their components
                let mut current = a;
                for i in 1..inst.args.len() {
                    let index = self.arg_u32(inst, i)? as usize;
                    if current.members.is_empty() {
                        if i + 1 != inst.args.len() || index >= current.component_count() {
                            return Err(DebugError::invalid(format!(
                                "extractvalue index {} outside a {} component value",
                                index,
                                current.component_count()
                            )));
                        }
                        result.value.set(0, current.value.get(index));
                        return Ok(Exec::value(id, result));
                    }
                    current = current.members.get(index).cloned().ok_or_else(|| {
                        DebugError::invalid(format!("extractvalue member {} missing", index))
                    })?;
                }
                Ok(Exec::value(id, current.with_name(result_name(inst, id))))
            }

            Operation::ExtractElement => {
                let index = self.arg_u32(inst, 1)? as usize;
                if index >= a.component_count() {
                    return Err(DebugError::invalid(format!(
                        "extractelement index {} outside a {} element vector",
                        index,
                        a.component_count()
                    )));
                }
                result.value.set(0, a.value.get(index));
                Ok(Exec::value(id, result))
            }

            Operation::InsertElement => {
                let b = self.arg(inst, 1)?;
                let index = self.arg_u32(inst, 2)? as usize;
                if index >= result.component_count() {
                    return Err(DebugError::invalid(format!(
                        "insertelement index {} outside a {} element vector",
                        index,
                        result.component_count()
                    )));
                }
                result.value = a.value;
                result.value.set(index, b.value.get(0));
                Ok(Exec::value(id, result))
            }

            Operation::ShuffleVector => {
                let b = self.arg(inst, 1)?;
                let lanes = self.arg(inst, 2)?;
                let a_count = a.component_count();
                for c in 0..result.component_count() {
                    let pick = lanes.value.get(c) as usize;
                    let v = if pick < a_count {
                        a.value.get(pick)
                    } else if pick - a_count < b.component_count() {
                        b.value.get(pick - a_count)
                    } else {
                        return Err(DebugError::invalid(format!(
                            "shufflevector lane {} out of range",
                            pick
                        )));
                    };
                    result.value.set(c, v);
                }
                Ok(Exec::value(id, result))
            }

            other => Err(DebugError::UnsupportedOperation(other)),
        }
    }
}
