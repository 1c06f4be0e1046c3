//! Stack and global memory: alloca, load, store, getelementptr, atomics
//!
//! Allocations made by this lane live in its own tracker; global variables
//! live in the session-wide tracker. Pointer and allocation lookups try the
//! lane first.

use crate::error::{DebugError, DebugResult};
use crate::global_state::GlobalState;
use crate::memory::{flatten_variable, unflatten_variable, MemoryPointer};
use crate::program::{Id, Instruction, Operation, Type};
use crate::shader::numeric::{int_binary, mask, IntBinOp};
use crate::shader::{ShaderVariable, ShaderVariableChange};
use crate::thread::{result_name, ExecContext, Exec, ThreadState};

fn atomic_op(op: Operation) -> Option<IntBinOp> {
    Some(match op {
        Operation::AtomicAdd => IntBinOp::Add,
        Operation::AtomicSub => IntBinOp::Sub,
        Operation::AtomicAnd => IntBinOp::And,
        Operation::AtomicOr => IntBinOp::Or,
        Operation::AtomicXor => IntBinOp::Xor,
        Operation::AtomicMax => IntBinOp::SMax,
        Operation::AtomicMin => IntBinOp::SMin,
        Operation::AtomicUMax => IntBinOp::UMax,
        Operation::AtomicUMin => IntBinOp::UMin,
        _ => return None,
    })
}

impl ThreadState {
    pub(in crate::thread) fn exec_memory(
        &mut self,
        ctx: &mut ExecContext<'_>,
        inst: &Instruction,
    ) -> DebugResult<Exec> {
        let global = ctx.global;
        match inst.op {
            Operation::Alloca => {
                let id = Self::result_id(inst)?;
                let var = self.memory.allocate_for_type(&inst.ty, id, false, &result_name(inst, id))?;
                Ok(Exec::value(id, var))
            }

            Operation::Load | Operation::LoadAtomic => {
                let (id, mut result) = Self::blank_result(inst)?;
                let ptr = self.resolve_pointer(global, Self::arg_id(inst, 0)?)?;
                let bytes = self.read_pointer(global, &ptr)?;
                unflatten_variable(&mut result, &bytes);
                Ok(Exec::value(id, result))
            }

            Operation::Store | Operation::StoreAtomic => {
                let ptr_id = Self::arg_id(inst, 0)?;
                let ptr = self.resolve_pointer(global, ptr_id)?;
                let value = self.arg(inst, 1)?;
                let mut bytes = Vec::with_capacity(ptr.size);
                flatten_variable(&value, &mut bytes);
                self.store_through(global, ptr_id, &ptr, &bytes)
            }

            Operation::GetElementPtr => self.exec_gep(global, inst),

            op if op.is_atomic_rmw() => {
                let ptr_id = Self::arg_id(inst, 0)?;
                let ptr = self.resolve_pointer(global, ptr_id)?;
                let value = self.arg(inst, 1)?;

                let mut old = ShaderVariable::zeroed_for_type("", &ptr.pointee);
                unflatten_variable(&mut old, &self.read_pointer(global, &ptr)?);
                let bits = value.ty.bits();
                let (a, b) = (old.value.get(0), value.value.get(0));
                let new_bits = match op {
                    Operation::AtomicExchange => b,
                    Operation::AtomicNand => !(a & b) & mask(bits),
                    other => {
                        let op = atomic_op(other).ok_or(DebugError::UnsupportedOperation(other))?;
                        int_binary(op, bits, a, b)
                    }
                };
                let mut new = old.clone();
                new.value.set(0, new_bits);

                let mut bytes = Vec::with_capacity(ptr.size);
                flatten_variable(&new, &mut bytes);
                let exec = self.store_through(global, ptr_id, &ptr, &bytes)?;
                match inst.result {
                    Some(id) => {
                        if let Exec::Assign { id: target, var, .. } = exec {
                            self.overwrite_variable(target, var);
                        }
                        Ok(Exec::value(id, old.with_name(result_name(inst, id))))
                    }
                    None => Ok(exec),
                }
            }

            other => Err(DebugError::UnsupportedOperation(other)),
        }
    }

    fn exec_gep(&mut self, global: &GlobalState, inst: &Instruction) -> DebugResult<Exec> {
        let id = Self::result_id(inst)?;
        let base = self.resolve_pointer(global, Self::arg_id(inst, 0)?)?;
        if inst.args.len() < 2 {
            return Err(DebugError::invalid("getelementptr without indices"));
        }

        let overflow = || DebugError::memory("getelementptr offset overflows");
        let first = self.arg(inst, 1)?.int_comp(0);
        let mut offset = first
            .checked_mul(base.pointee.byte_size() as i64)
            .and_then(|o| o.checked_add(base.offset as i64))
            .ok_or_else(overflow)?;
        let mut ty = base.pointee.clone();
        for i in 2..inst.args.len() {
            let index = self.arg(inst, i)?.int_comp(0);
            ty = match ty {
                Type::Struct { members, .. } => {
                    if inst.args[i].constant().is_none() {
                        return Err(DebugError::invalid("struct member index must be constant"));
                    }
                    let index = usize::try_from(index)
                        .ok()
                        .filter(|&m| m < members.len())
                        .ok_or_else(|| {
                            DebugError::memory(format!("struct member {} out of range", index))
                        })?;
                    let skipped = members[..index].iter().map(Type::byte_size).sum::<usize>();
                    offset = offset.checked_add(skipped as i64).ok_or_else(overflow)?;
                    members[index].clone()
                }
                Type::Array { elem, .. } | Type::Vector { elem, .. } => {
                    offset = index
                        .checked_mul(elem.byte_size() as i64)
                        .and_then(|o| o.checked_add(offset))
                        .ok_or_else(overflow)?;
                    *elem
                }
                _ => return Err(DebugError::UnsupportedOperation(Operation::GetElementPtr)),
            };
        }

        if let Some(declared) = inst.ty.pointee() {
            if declared.byte_size() != ty.byte_size() {
                return Err(DebugError::type_mismatch(format!(
                    "getelementptr yields {} but is declared {}",
                    ty, declared
                )));
            }
        }

        let size = ty.byte_size();
        let alloc_size = self.allocation_size(global, base.base)?;
        let offset = usize::try_from(offset)
            .ok()
            .filter(|&o| o.checked_add(size).is_some_and(|end| end <= alloc_size))
            .ok_or_else(|| {
                DebugError::memory(format!(
                    "getelementptr offset {} (+{}) outside allocation {} of {} bytes",
                    offset, size, base.base, alloc_size
                ))
            })?;

        let ptr = MemoryPointer { base: base.base, offset, size, pointee: ty };
        let mut var = ShaderVariable::zeroed_for_type(result_name(inst, id), &ptr.pointee);
        unflatten_variable(&mut var, &self.read_pointer(global, &ptr)?);
        self.memory.add_pointer(id, ptr);
        Ok(Exec::value(id, var))
    }

    /// Write `bytes` through `ptr` and refresh the owning allocation's variable
    ///
    /// The base variable is updated in place; the returned assignment carries
    /// the new value of the pointer itself.
    fn store_through(
        &mut self,
        global: &GlobalState,
        ptr_id: Id,
        ptr: &MemoryPointer,
        bytes: &[u8],
    ) -> DebugResult<Exec> {
        if self.memory.has_allocation(ptr.base) {
            self.memory.write(ptr, bytes)?;
        } else {
            global.memory.write().write(ptr, bytes)?;
        }

        let base = ptr.base;
        let mut after = self.variable(base).cloned().ok_or(DebugError::UnassignedRead(base))?;
        if self.memory.has_allocation(base) {
            self.memory.update_variable_from_backing_memory(base, &mut after)?;
        } else {
            global.memory.read().update_variable_from_backing_memory(base, &mut after)?;
        }

        if ptr_id == base {
            return Ok(Exec::value(base, after));
        }
        self.overwrite_variable(base, after);

        let mut var = self.variable(ptr_id).cloned().ok_or(DebugError::UnassignedRead(ptr_id))?;
        unflatten_variable(&mut var, &self.read_pointer(global, ptr)?);
        Ok(Exec::value(ptr_id, var))
    }

    /// Replace a variable outside the normal result path, recording the update
    fn overwrite_variable(&mut self, id: Id, var: ShaderVariable) {
        let index = id.index();
        if let Some(slot) = self.variables.get_mut(index) {
            let before = std::mem::replace(slot, var.clone());
            self.assigned[index] = true;
            self.record_change(ShaderVariableChange::updated(before, var));
        }
    }

    fn resolve_pointer(&self, global: &GlobalState, id: Id) -> DebugResult<MemoryPointer> {
        if let Some(ptr) = self.memory.pointer(id) {
            return Ok(ptr.clone());
        }
        global
            .memory
            .read()
            .pointer(id)
            .cloned()
            .ok_or_else(|| DebugError::memory(format!("{} is not a known pointer", id)))
    }

    fn read_pointer(&self, global: &GlobalState, ptr: &MemoryPointer) -> DebugResult<Vec<u8>> {
        if self.memory.has_allocation(ptr.base) {
            Ok(self.memory.read(ptr)?.to_vec())
        } else {
            Ok(global.memory.read().read(ptr)?.to_vec())
        }
    }

    fn allocation_size(&self, global: &GlobalState, base: Id) -> DebugResult<usize> {
        if let Some(alloc) = self.memory.allocation(base) {
            return Ok(alloc.size());
        }
        global
            .memory
            .read()
            .allocation(base)
            .map(|a| a.size())
            .ok_or_else(|| DebugError::memory(format!("no allocation {}", base)))
    }
}
