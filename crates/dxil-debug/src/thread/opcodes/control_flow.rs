//! Terminators, phi and select

use crate::analysis::FunctionInfo;
use crate::error::{DebugError, DebugResult};
use crate::program::{Instruction, Operand, Operation};
use crate::thread::{result_name, Exec, ThreadState};

impl ThreadState {
    pub(in crate::thread) fn exec_control_flow(
        &mut self,
        info: &FunctionInfo,
        inst: &Instruction,
    ) -> DebugResult<Exec> {
        match inst.op {
            Operation::Ret => Ok(Exec::Return),
            Operation::Unreachable => Ok(Exec::Kill),

            Operation::Br => {
                let target = match inst.args.as_slice() {
                    [Operand::Block(target)] => *target,
                    [Operand::Block(if_true), Operand::Block(if_false), _] => {
                        if self.arg(inst, 2)?.value.get(0) & 1 != 0 {
                            *if_true
                        } else {
                            *if_false
                        }
                    }
                    _ => return Err(DebugError::invalid("malformed branch operands")),
                };
                Ok(Exec::Jump(target))
            }

            Operation::Switch => {
                let value = self.arg(inst, 0)?.value.get(0);
                let mut target = inst
                    .args
                    .get(1)
                    .and_then(Operand::block)
                    .ok_or_else(|| DebugError::invalid("switch without a default target"))?;
                for pair in inst.args.get(2..).unwrap_or(&[]).chunks(2) {
                    let [case, Operand::Block(block)] = pair else {
                        return Err(DebugError::invalid("malformed switch case"));
                    };
                    if self.operand(case, false)?.value.get(0) == value {
                        target = *block;
                        break;
                    }
                }
                Ok(Exec::Jump(target))
            }

            Operation::Phi => {
                let id = Self::result_id(inst)?;
                for pair in inst.args.chunks(2) {
                    let [value, Operand::Block(block)] = pair else {
                        return Err(DebugError::invalid("malformed phi operands"));
                    };
                    if *block != self.previous_block {
                        continue;
                    }
                    let var = match value {
                        Operand::Id(src) => self
                            .phi_snapshot
                            .get(src)
                            .cloned()
                            .ok_or(DebugError::UnassignedRead(*src))?,
                        other => self.operand(other, false)?,
                    };
                    return Ok(Exec::value(id, var.with_name(result_name(inst, id))));
                }
                Err(DebugError::invalid(format!(
                    "phi {} has no value for predecessor block {} (function {})",
                    id, self.previous_block, info.function
                )))
            }

            Operation::Select => {
                let id = Self::result_id(inst)?;
                let cond = self.arg(inst, 2)?;
                let if_true = self.arg(inst, 0)?;
                let mut result = if cond.component_count() > 1 {
                    let if_false = self.arg(inst, 1)?;
                    let mut merged = if_false;
                    for c in 0..cond.component_count() {
                        if cond.value.get(c) & 1 != 0 {
                            merged.value.set(c, if_true.value.get(c));
                        }
                    }
                    merged
                } else if cond.value.get(0) & 1 != 0 {
                    if_true
                } else {
                    self.arg(inst, 1)?
                };
                result.name = result_name(inst, id);
                Ok(Exec::value(id, result))
            }

            other => Err(DebugError::UnsupportedOperation(other)),
        }
    }
}
