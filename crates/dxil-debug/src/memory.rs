//! Backing storage for SSA pointers
//!
//! Every `Alloca` and global variable owns an [`Allocation`]: a zeroed byte
//! buffer sized to the pointee type. Pointers are non-owning
//! `(base allocation, offset, size)` triples validated on every access.
//! Variables are flattened depth-first into the buffer, members in order,
//! each component taking its element byte width with no padding.

use crate::error::{DebugError, DebugResult};
use crate::program::{Id, Type};
use crate::shader::ShaderVariable;

/// Raw storage behind one allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    backing: Vec<u8>,
    /// Lives as long as the session, not the lane
    pub global: bool,
}

impl Allocation {
    pub fn bytes(&self) -> &[u8] {
        &self.backing
    }

    pub fn size(&self) -> usize {
        self.backing.len()
    }
}

/// A typed view into an allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPointer {
    /// Id of the owning allocation
    pub base: Id,
    pub offset: usize,
    pub size: usize,
    /// Type of the value the pointer addresses
    pub pointee: Type,
}

/// Allocation and pointer tables, indexed by SSA id
#[derive(Debug, Clone, Default)]
pub struct MemoryTracking {
    allocations: Vec<Option<Allocation>>,
    pointers: Vec<Option<MemoryPointer>>,
    writes: u64,
}

fn slot<T>(table: &mut Vec<Option<T>>, id: Id) -> &mut Option<T> {
    if table.len() <= id.index() {
        table.resize_with(id.index() + 1, || None);
    }
    &mut table[id.index()]
}

impl MemoryTracking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate zeroed storage for the pointee of pointer type `ty`
    ///
    /// Registers `id` both as the allocation and as a pointer to its start,
    /// and returns a zero variable shaped like the pointee.
    pub fn allocate_for_type(
        &mut self,
        ty: &Type,
        id: Id,
        global: bool,
        name: &str,
    ) -> DebugResult<ShaderVariable> {
        let pointee = ty
            .pointee()
            .ok_or_else(|| DebugError::memory(format!("{} allocated with non-pointer type", id)))?;
        let size = pointee.byte_size();

        *slot(&mut self.allocations, id) = Some(Allocation { backing: vec![0; size], global });
        *slot(&mut self.pointers, id) =
            Some(MemoryPointer { base: id, offset: 0, size, pointee: pointee.clone() });

        Ok(ShaderVariable::zeroed_for_type(name, pointee))
    }

    /// Register a derived pointer
    pub fn add_pointer(&mut self, id: Id, pointer: MemoryPointer) {
        *slot(&mut self.pointers, id) = Some(pointer);
    }

    pub fn pointer(&self, id: Id) -> Option<&MemoryPointer> {
        self.pointers.get(id.index()).and_then(Option::as_ref)
    }

    pub fn allocation(&self, id: Id) -> Option<&Allocation> {
        self.allocations.get(id.index()).and_then(Option::as_ref)
    }

    pub fn has_allocation(&self, id: Id) -> bool {
        self.allocation(id).is_some()
    }


    /// Bytes addressed by `pointer`
    pub fn read(&self, pointer: &MemoryPointer) -> DebugResult<&[u8]> {
        let alloc = self
            .allocation(pointer.base)
            .ok_or_else(|| DebugError::memory(format!("no allocation {}", pointer.base)))?;
        let end = pointer.offset + pointer.size;
        alloc.backing.get(pointer.offset..end).ok_or_else(|| {
            DebugError::memory(format!(
                "read of {}..{} outside allocation {} of {} bytes",
                pointer.offset,
                end,
                pointer.base,
                alloc.size()
            ))
        })
    }

    /// Overwrite the start of the range addressed by `pointer`
    pub fn write(&mut self, pointer: &MemoryPointer, bytes: &[u8]) -> DebugResult<()> {
        if bytes.len() > pointer.size {
            return Err(DebugError::memory(format!(
                "write of {} bytes through a {} byte pointer",
                bytes.len(),
                pointer.size
            )));
        }
        let alloc = self
            .allocations
            .get_mut(pointer.base.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| DebugError::memory(format!("no allocation {}", pointer.base)))?;
        let size = alloc.backing.len();
        let end = pointer.offset + bytes.len();
        let dst = alloc.backing.get_mut(pointer.offset..end).ok_or_else(|| {
            DebugError::memory(format!(
                "write of {}..{} outside allocation {} of {} bytes",
                pointer.offset, end, pointer.base, size
            ))
        })?;
        dst.copy_from_slice(bytes);
        self.writes += 1;
        Ok(())
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Flatten `var` into the memory addressed by `pointer`
    pub fn update_backing_memory_from_variable(
        &mut self,
        pointer: &MemoryPointer,
        var: &ShaderVariable,
    ) -> DebugResult<()> {
        let mut bytes = Vec::with_capacity(pointer.size);
        flatten_variable(var, &mut bytes);
        self.write(pointer, &bytes)
    }

    /// Re-decode the whole allocation `base` into `var`
    pub fn update_variable_from_backing_memory(
        &self,
        base: Id,
        var: &mut ShaderVariable,
    ) -> DebugResult<()> {
        let alloc = self
            .allocation(base)
            .ok_or_else(|| DebugError::memory(format!("no allocation {}", base)))?;
        unflatten_variable(var, &alloc.backing);
        Ok(())
    }
}

/// Append the flat bytes of `var`, members depth-first
pub fn flatten_variable(var: &ShaderVariable, out: &mut Vec<u8>) {
    if !var.members.is_empty() {
        for member in &var.members {
            flatten_variable(member, out);
        }
        return;
    }
    let width = var.ty.byte_size();
    for c in 0..var.component_count() {
        out.extend_from_slice(&var.value.get(c).to_le_bytes()[..width]);
    }
}

/// Fill `var` from flat bytes in its own shape; returns the bytes consumed
///
/// Missing trailing bytes read as zero.
pub fn unflatten_variable(var: &mut ShaderVariable, bytes: &[u8]) -> usize {
    if !var.members.is_empty() {
        let mut used = 0;
        for member in &mut var.members {
            used += unflatten_variable(member, bytes.get(used..).unwrap_or(&[]));
        }
        return used;
    }
    let width = var.ty.byte_size();
    let mut used = 0;
    for c in 0..var.component_count() {
        let mut raw = [0u8; 8];
        if let Some(src) = bytes.get(used..used + width) {
            raw[..width].copy_from_slice(src);
        }
        var.value.set(c, u64::from_le_bytes(raw));
        used += width;
    }
    used
}
