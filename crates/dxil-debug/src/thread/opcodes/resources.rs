//! Resource intrinsics
//!
//! Handle creation and annotation, constant buffer reads, typed buffer and
//! texture access, resource atomics, metadata queries, and filtered texture
//! operations. Buffer and UAV contents are read and written locally against
//! the snapshots cached in `GlobalState`; anything that needs a sampler or a
//! read-only texture goes through the API wrapper.

use tracing::{error, warn};

use crate::api::{
    GatherChannel, SampleGatherRequest, SampleGatherResourceData, SampleGatherSamplerData,
};
use crate::error::{DebugError, DebugResult};
use crate::format::{from_result_bits, to_result_bits, CompType, ViewFormat};
use crate::global_state::ResourceInfo;
use crate::global_state::UavData;
use crate::program::{AtomicBinOpKind, DxOp, Id, Instruction, Operand, Program, ShaderStage};
use crate::shader::numeric::{int_binary, IntBinOp};
use crate::shader::{
    BindingSlot, ComponentType, HeapDescriptorType, ResourceClass, ResourceKind,
    ResourceReferenceInfo, ShaderEvents, ShaderVariable, ShaderVariableChange, SrvInfo, VarType,
};
use crate::thread::derivatives::QUAD_SIZE;
use crate::thread::{result_name, AnnotationProperties, ExecContext, Exec, ThreadState};

// ============================================================================
// Sample positions
// ============================================================================

const PATTERN_2X: [[i8; 2]; 2] = [[4, 4], [-4, -4]];
const PATTERN_4X: [[i8; 2]; 4] = [[-2, -6], [6, -2], [-6, 2], [2, 6]];
const PATTERN_8X: [[i8; 2]; 8] =
    [[1, -3], [-1, 3], [5, 1], [-3, -5], [-5, 5], [-7, -1], [3, 7], [7, -7]];
const PATTERN_16X: [[i8; 2]; 16] = [
    [1, 1],
    [-1, -3],
    [-3, 2],
    [4, -1],
    [-5, -2],
    [2, 5],
    [5, 3],
    [3, -5],
    [-2, 6],
    [0, -7],
    [-4, -6],
    [-6, 4],
    [-8, 0],
    [7, -4],
    [6, 7],
    [-7, -8],
];

/// Standard sample position of `index` in a `count` sample pattern, in pixels
///
/// Out of range indices and unknown counts give the pixel centre.
pub(crate) fn sample_position(index: u32, count: u32) -> [f32; 2] {
    if index >= count {
        warn!(index, count, "sample index out of range");
        return [0.0, 0.0];
    }
    let pattern: &[[i8; 2]] = match count {
        1 => return [0.0, 0.0],
        2 => &PATTERN_2X,
        4 => &PATTERN_4X,
        8 => &PATTERN_8X,
        16 => &PATTERN_16X,
        other => {
            error!(count = other, "unsupported sample count");
            return [0.0, 0.0];
        }
    };
    let [x, y] = pattern[index as usize];
    [x as f32 / 16.0, y as f32 / 16.0]
}

// ============================================================================
// Element addressing
// ============================================================================

/// Shape of a resource snapshot
#[derive(Debug, Clone, Copy)]
struct Layout {
    info: ResourceInfo,
    len: usize,
    tex: bool,
    row_pitch: u32,
    depth_pitch: u32,
}

/// How an access names its element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Address {
    Buffer { index: u32, offset: u64 },
    Texel([u32; 3]),
}

/// A located element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Element {
    offset: usize,
    fmt: ViewFormat,
    /// Components the access asked for, before clamping to the view
    requested: u32,
}

/// Byte position and format of an element, `None` for unbound or out of
/// bounds accesses
///
/// Typeless views take their format from the shader's element type.
/// Byte-address views step in bytes with the index rounded down to a dword;
/// structured views use the annotated stride.
fn locate_element(
    layout: &Layout,
    structured_stride: Option<u32>,
    elem_ty: VarType,
    columns: u32,
    address: Address,
) -> Option<Element> {
    if layout.len == 0 {
        return None;
    }

    let info = layout.info;
    let mut fmt = info.format;
    if fmt.comp_type == CompType::Typeless {
        let guessed = ViewFormat::from_var_type(elem_ty, columns)?;
        fmt.byte_width = guessed.byte_width;
        fmt.comp_type = guessed.comp_type;
        fmt.num_comps = columns;
        if fmt.stride == 0 {
            fmt.stride = guessed.stride;
        }
    }

    let requested = fmt.num_comps;
    let mut byte_address = info.is_byte_buffer;
    if byte_address {
        fmt.stride = 1;
    }
    if let Some(stride) = structured_stride {
        fmt.stride = stride;
        byte_address = false;
    }
    if fmt.stride == 0 {
        warn!(?fmt, "resource view has no stride");
        return None;
    }
    let stride = fmt.stride as u64;

    let offset = match address {
        Address::Texel([x, y, z]) if layout.tex => {
            let offset = x as u64 * stride
                + y as u64 * layout.row_pitch as u64
                + z as u64 * layout.depth_pitch as u64;
            if offset >= layout.len as u64 {
                return None;
            }
            offset
        }
        Address::Texel([x, ..]) => buffer_offset(layout, &mut fmt, byte_address, x, 0)?,
        Address::Buffer { index, offset } => {
            buffer_offset(layout, &mut fmt, byte_address, index, offset)?
        }
    };

    Some(Element { offset: offset as usize, fmt, requested })
}

/// Offset of buffer element `index`, clamping the format's component count
/// to the data that remains in the view
fn buffer_offset(
    layout: &Layout,
    fmt: &mut ViewFormat,
    byte_address: bool,
    index: u32,
    byte_offset: u64,
) -> Option<u64> {
    let stride = fmt.stride as u64;
    let mut first = layout.info.first_element as u64;
    let mut count = layout.info.num_elements as u64;
    let mut index = index as u64;
    if byte_address {
        index &= !3;
        let unit = fmt.byte_width.min(4) as u64;
        first *= unit;
        count *= unit;
    }
    if index >= count {
        return None;
    }

    let offset = byte_offset + (first + index) * stride;
    let len = layout.len as u64;
    if offset >= len {
        return None;
    }

    if fmt.byte_width < 10 && fmt.byte_width > 0 {
        let width = fmt.byte_width as u64;
        let end = (first + count) * stride;
        let fits = ((len - offset) / width).min(end.saturating_sub(offset) / width);
        fmt.num_comps = fmt.num_comps.min(fits as u32);
    }
    Some(offset)
}
// ============================================================================
// Handles
// ============================================================================

/// A handle resolved for one access
#[derive(Debug, Clone)]
struct HandleRef {
    info: ResourceReferenceInfo,
    annotation: Option<AnnotationProperties>,
}

impl HandleRef {
    /// Stride to use instead of the view's, for annotated structured buffers
    fn structured_stride(&self) -> Option<u32> {
        self.annotation.filter(|a| a.kind.is_structured()).map(|a| a.struct_stride)
    }
}

fn class_of(ty: VarType) -> Option<ResourceClass> {
    Some(match ty {
        VarType::ReadOnlyResource => ResourceClass::Srv,
        VarType::ReadWriteResource => ResourceClass::Uav,
        VarType::ConstantBlock => ResourceClass::CBuffer,
        VarType::Sampler => ResourceClass::Sampler,
        _ => return None,
    })
}

/// Decode the packed properties operand of `AnnotateHandle`
fn annotation_from_packed(packed0: u32, packed1: u32) -> AnnotationProperties {
    let kind = ResourceKind::from_u32(packed0 & 0xFF);
    let uav = packed0 & (1 << 12) != 0;
    let class = match kind {
        ResourceKind::Sampler => ResourceClass::Sampler,
        ResourceKind::CBuffer => ResourceClass::CBuffer,
        _ if uav => ResourceClass::Uav,
        _ => ResourceClass::Srv,
    };
    let struct_stride = if kind.is_structured() {
        packed1
    } else if kind.is_typed() {
        let comp_count = (packed1 & 0xFF00) >> 8;
        let comp_type = ComponentType::from_u32(packed1 & 0xFF);
        comp_count * comp_type.var_type().byte_size() as u32
    } else {
        0
    };
    AnnotationProperties { kind, class, struct_stride }
}

/// Integer operation of a resource atomic; `None` for exchange
fn atomic_int_op(kind: AtomicBinOpKind) -> Option<IntBinOp> {
    Some(match kind {
        AtomicBinOpKind::Add => IntBinOp::Add,
        AtomicBinOpKind::And => IntBinOp::And,
        AtomicBinOpKind::Or => IntBinOp::Or,
        AtomicBinOpKind::Xor => IntBinOp::Xor,
        AtomicBinOpKind::IMin => IntBinOp::SMin,
        AtomicBinOpKind::IMax => IntBinOp::SMax,
        AtomicBinOpKind::UMin => IntBinOp::UMin,
        AtomicBinOpKind::UMax => IntBinOp::UMax,
        AtomicBinOpKind::Exchange => return None,
    })
}

/// Name used in debug output for a filtered op
fn op_name(op: DxOp) -> String {
    format!("{:?}", op)
}

impl ThreadState {
    pub(in crate::thread) fn exec_resource(
        &mut self,
        ctx: &mut ExecContext<'_>,
        inst: &Instruction,
        op: DxOp,
    ) -> DebugResult<Exec> {
        use DxOp::*;
        let program = ctx.program;
        match op {
            CreateHandle | CreateHandleFromBinding => self.create_handle(ctx, inst, op),
            CreateHandleFromHeap => self.create_handle_from_heap(ctx, inst),
            AnnotateHandle => self.annotate_handle(inst),
            CBufferLoadLegacy => self.cbuffer_load_legacy(ctx, inst),

            RenderTargetGetSampleCount => {
                let (id, mut result) = Self::blank_result(inst)?;
                let info = ctx.api.get_render_target_sample_info(self.stage, &op_name(op));
                result.value.set(0, info.value.get(0));
                Ok(Exec::value(id, result))
            }
            RenderTargetGetSamplePosition => {
                let id = Self::result_id(inst)?;
                let info = ctx.api.get_render_target_sample_info(self.stage, &op_name(op));
                let index = self.arg_u32(inst, 0)?;
                let position = sample_position(index, info.value.u32v(0));
                Ok(Exec::value(id, ShaderVariable::from_f32s(result_name(inst, id), &position)))
            }

            _ => {
                let handle = self.resolve_handle(program, Self::arg_id(inst, 0)?)?;
                match op {
                    GetDimensions => {
                        let id = Self::result_id(inst)?;
                        let mip = if Self::has_arg(inst, 1) { self.arg_u32(inst, 1)? } else { 0 };
                        let (dims, _) = ctx.api.get_resource_info(
                            handle.info.class,
                            handle.info.binding,
                            mip,
                            self.stage,
                        );
                        let mut result = ShaderVariable::new(result_name(inst, id), VarType::SInt, 1, 4);
                        for c in 0..4 {
                            result.value.set(c, dims.value.get(c));
                        }
                        Ok(Exec::value(id, result))
                    }
                    Texture2DMSGetSamplePosition => {
                        let id = Self::result_id(inst)?;
                        let info = ctx.api.get_sample_info(
                            handle.info.class,
                            handle.info.binding,
                            self.stage,
                            &op_name(op),
                        );
                        let index = self.arg_u32(inst, 1)?;
                        let position = sample_position(index, info.value.u32v(0));
                        Ok(Exec::value(id, ShaderVariable::from_f32s(result_name(inst, id), &position)))
                    }
                    TextureLoad if handle.info.class == ResourceClass::Srv => {
                        self.sample_gather(ctx, inst, op, &handle)
                    }
                    BufferLoad | BufferStore | RawBufferLoad | RawBufferStore | TextureLoad
                    | TextureStore => self.typed_access(ctx, inst, op, &handle),
                    Sample | SampleBias | SampleLevel | SampleGrad | SampleCmp
                    | SampleCmpLevelZero | SampleCmpLevel | SampleCmpGrad | SampleCmpBias
                    | TextureGather | TextureGatherCmp | CalculateLOD => {
                        self.sample_gather(ctx, inst, op, &handle)
                    }
                    AtomicBinOp | AtomicCompareExchange => {
                        self.resource_atomic(ctx, inst, op, &handle)
                    }
                    other => Err(DebugError::UnsupportedDxOp(other)),
                }
            }
        }
    }

    /// Look up what a handle refers to, marking SRV and UAV accesses
    ///
    /// Heap handles carry their own reference; anything else is resolved from
    /// the handle variable's type and binding against the declared resources.
    fn resolve_handle(&mut self, program: &Program, id: Id) -> DebugResult<HandleRef> {
        let var = self.variable(id).ok_or(DebugError::UnassignedRead(id))?;
        let name = var.name.clone();
        let annotation = self.annotations.get(&id).copied();

        let info = match self.resource_refs.get(&id) {
            Some(info) => *info,
            None => {
                let class = class_of(var.ty).ok_or_else(|| {
                    DebugError::type_mismatch(format!("{} ({:?}) is not a resource handle", id, var.ty))
                })?;
                let binding = var.binding.ok_or_else(|| {
                    DebugError::invalid(format!("resource handle {} has no binding", name))
                })?;
                let mut info = ResourceReferenceInfo::new(class, binding);
                match program.resource_by_binding(class, binding.register, binding.space) {
                    Some(decl) => {
                        info.srv = SrvInfo {
                            kind: decl.kind,
                            sample_count: decl.sample_count,
                            comp_type: decl.component_type,
                        };
                        info.sampler_mode = decl.sampler_mode;
                    }
                    None => {
                        if let Some(a) = annotation {
                            info.srv.kind = a.kind;
                        }
                    }
                }
                info
            }
        };

        self.mark_resource_access(&name, &info);
        Ok(HandleRef { info, annotation })
    }

    /// Report the first touch of an SRV or UAV as a created variable, later
    /// touches as unchanged updates
    fn mark_resource_access(&mut self, name: &str, info: &ResourceReferenceInfo) {
        if !self.recording
            || !matches!(info.class, ResourceClass::Srv | ResourceClass::Uav)
        {
            return;
        }
        let mut after = ShaderVariable::new(name, info.var_type, 1, 1);
        after.binding = Some(info.binding);
        if self.accessed_resources.insert((info.class, info.binding)) {
            self.record_change(ShaderVariableChange::created(after));
        } else {
            self.record_change(ShaderVariableChange::updated(after.clone(), after));
        }
    }

    fn create_handle(
        &mut self,
        ctx: &mut ExecContext<'_>,
        inst: &Instruction,
        op: DxOp,
    ) -> DebugResult<Exec> {
        let id = Self::result_id(inst)?;
        let class_bits = self.arg_u32(inst, 0)?;
        let class = ResourceClass::from_u32(class_bits)
            .ok_or_else(|| DebugError::invalid(format!("unknown resource class {}", class_bits)))?;

        let (decl, index) = if op == DxOp::CreateHandle {
            let range = self.arg_u32(inst, 1)?;
            (ctx.program.resource(class, range), self.arg_u32(inst, 2)?)
        } else {
            let lower = self.arg_u32(inst, 1)?;
            let space = self.arg_u32(inst, 2)?;
            (ctx.program.resource_by_binding(class, lower, space), self.arg_u32(inst, 3)?)
        };
        let decl = decl.ok_or_else(|| {
            DebugError::invalid(format!("no {:?} resource declared for {:?}", class, op))
        })?;

        if let Some(var) = ctx.global.resource_variable(&decl.name) {
            return Ok(Exec::Assign { id, var: var.clone(), record: false });
        }

        if !matches!(class, ResourceClass::Srv | ResourceClass::Uav) {
            warn!(name = %decl.name, ?class, "handle to a resource the host did not register");
        }
        let mut var = ShaderVariable::new(result_name(inst, id), class.var_type(), 1, 1);
        var.binding = Some(BindingSlot::new(index, decl.space));
        Ok(Exec::value(id, var))
    }

    fn create_handle_from_heap(
        &mut self,
        ctx: &mut ExecContext<'_>,
        inst: &Instruction,
    ) -> DebugResult<Exec> {
        let id = Self::result_id(inst)?;
        let index = self.arg_u32(inst, 0)?;
        let heap = if self.arg_u32(inst, 1)? != 0 {
            HeapDescriptorType::Sampler
        } else {
            HeapDescriptorType::CbvSrvUav
        };
        let slot = BindingSlot::heap(heap, index);

        let info = ctx.api.get_resource_reference_info(slot);
        let access = ctx.api.get_shader_direct_access(info.category, slot);
        self.resource_refs.insert(id, info);

        let mut var = ShaderVariable::new(result_name(inst, id), info.var_type, 1, 1);
        var.binding = Some(slot);
        var.value.set(0, access.descriptor_store);
        var.value.set(1, access.byte_offset as u64);
        var.value.set(2, access.byte_size as u64);
        Ok(Exec::value(id, var))
    }

    fn annotate_handle(&mut self, inst: &Instruction) -> DebugResult<Exec> {
        let id = Self::result_id(inst)?;
        let source = Self::arg_id(inst, 0)?;
        let var = self.arg(inst, 0)?.with_name(result_name(inst, id));
        if let Some(info) = self.resource_refs.get(&source).copied() {
            self.resource_refs.insert(id, info);
        }

        let props = self.arg(inst, 1)?;
        let (packed0, packed1) = match props.members.as_slice() {
            [a, b, ..] => (a.value.u32v(0), b.value.u32v(0)),
            _ => (props.value.u32v(0), props.value.u32v(1)),
        };
        let annotation = annotation_from_packed(packed0, packed1);
        if let Some(existing) = self.annotations.insert(id, annotation) {
            if existing != annotation {
                return Err(DebugError::invalid(format!(
                    "{} annotated twice with different properties",
                    id
                )));
            }
        }
        Ok(Exec::Assign { id, var, record: false })
    }

    // ------------------------------------------------------------------------
    // Constant buffers
    // ------------------------------------------------------------------------

    fn cbuffer_load_legacy(
        &mut self,
        ctx: &mut ExecContext<'_>,
        inst: &Instruction,
    ) -> DebugResult<Exec> {
        let id = Self::result_id(inst)?;
        let handle = self.resolve_handle(ctx.program, Self::arg_id(inst, 0)?)?;
        if handle.info.class != ResourceClass::CBuffer {
            return Err(DebugError::type_mismatch("CBufferLoadLegacy on a non constant buffer handle"));
        }
        let elem = inst
            .ty
            .struct_members()
            .and_then(|m| m.first())
            .ok_or_else(|| DebugError::invalid("CBufferLoadLegacy result must be a struct"))?;
        let width = elem.byte_size().max(1);
        let columns = (16 / width).clamp(1, 4);
        let mut result = ShaderVariable::new(result_name(inst, id), elem.var_type(), 1, columns as u8);

        let reg = self.arg_u32(inst, 1)? as usize;
        let Some(block) = ctx.global.constant_block(&handle.info.binding) else {
            warn!(binding = ?handle.info.binding, "constant buffer not bound, reading zeros");
            return Ok(Exec::value(id, result));
        };
        let registers = block.data.len().div_ceil(16);
        if reg >= registers {
            warn!(reg, registers, "constant buffer read past the end");
            return Ok(Exec::value(id, result));
        }

        let row = reg * 16;
        for c in 0..columns {
            let start = row + c * width;
            let mut bits = 0u64;
            for (i, byte) in block.data.iter().skip(start).take(width.min(8)).enumerate() {
                bits |= (*byte as u64) << (8 * i);
            }
            result.value.set(c, bits);
        }
        Ok(Exec::value(id, result))
    }

    // ------------------------------------------------------------------------
    // Buffer and texture access
    // ------------------------------------------------------------------------

    /// Element address operands starting at `start`: texel coordinates for
    /// texture data, element index then byte offset otherwise
    fn element_address(&self, inst: &Instruction, start: usize, tex: bool) -> DebugResult<Address> {
        if tex {
            let mut coords = [0u32; 3];
            for (i, c) in coords.iter_mut().enumerate() {
                if Self::has_arg(inst, start + i) {
                    *c = self.arg_u32(inst, start + i)?;
                }
            }
            return Ok(Address::Texel(coords));
        }
        let index = if Self::has_arg(inst, start) { self.arg_u32(inst, start)? } else { 0 };
        let offset =
            if Self::has_arg(inst, start + 1) { self.arg_u32(inst, start + 1)? as u64 } else { 0 };
        Ok(Address::Buffer { index, offset })
    }

    fn typed_access(
        &mut self,
        ctx: &mut ExecContext<'_>,
        inst: &Instruction,
        op: DxOp,
        handle: &HandleRef,
    ) -> DebugResult<Exec> {
        let load = matches!(op, DxOp::BufferLoad | DxOp::RawBufferLoad | DxOp::TextureLoad);
        let coord_start = if op == DxOp::TextureLoad { 2 } else { 1 };
        let value_start = if op == DxOp::TextureStore { 4 } else { 3 };
        let structured_stride = handle.structured_stride();
        let slot = handle.info.binding;
        let global = ctx.global;

        if load {
            let id = Self::result_id(inst)?;
            let members = inst
                .ty
                .struct_members()
                .filter(|m| m.len() >= 2)
                .ok_or_else(|| DebugError::invalid(format!("{:?} result must be a struct", op)))?;
            let elem_ty = members[0].var_type();
            let columns = (members.len() - 1).min(4) as u32;
            let mut result = ShaderVariable::new(result_name(inst, id), elem_ty, 1, columns as u8);

            let read = |layout: Layout, data: &[u8], address: Address| {
                locate_element(&layout, structured_stride, elem_ty, columns, address)
                    .map(|e| (e, e.fmt.decode(&data[e.offset..])))
            };
            let located = match handle.info.class {
                ResourceClass::Srv => {
                    // read-only textures go through the host, only buffers reach here
                    let address = self.element_address(inst, coord_start, false)?;
                    global.with_srv(slot, &mut *ctx.api, |view| {
                        let layout = Layout {
                            info: view.info,
                            len: view.data.len(),
                            tex: view.tex,
                            row_pitch: view.row_pitch,
                            depth_pitch: view.depth_pitch,
                        };
                        read(layout, view.data, address)
                    })
                }
                ResourceClass::Uav => {
                    let tex = global.with_uav_mut(slot, &mut *ctx.api, |uav| uav.tex);
                    let address = self.element_address(inst, coord_start, tex)?;
                    global.with_uav_mut(slot, &mut *ctx.api, |uav| {
                        read(uav_layout(uav), &uav.data, address)
                    })
                }
                other => {
                    return Err(DebugError::type_mismatch(format!("{:?} on a {:?} handle", op, other)))
                }
            };

            match located {
                Some((element, mut wide)) => {
                    if element.fmt.num_comps < element.requested {
                        for w in wide.iter_mut().skip(element.fmt.num_comps as usize) {
                            *w = 0;
                        }
                    }
                    for c in 0..columns as usize {
                        result.value.set(c, to_result_bits(elem_ty, element.fmt.byte_width, wide[c]));
                    }
                }
                None => warn!(?op, binding = ?slot, "unbound or out of bounds access, reading zeros"),
            }
            return Ok(Exec::value(id, result));
        }

        if handle.info.class != ResourceClass::Uav {
            return Err(DebugError::type_mismatch(format!("{:?} on a read-only resource", op)));
        }

        let mut values: [Option<ShaderVariable>; 4] = Default::default();
        for (c, v) in values.iter_mut().enumerate() {
            if Self::has_arg(inst, value_start + c) {
                *v = Some(self.arg(inst, value_start + c)?);
            }
        }
        let elem_ty = values
            .iter()
            .flatten()
            .next()
            .map(|v| v.ty)
            .ok_or_else(|| DebugError::invalid(format!("{:?} without a value", op)))?;
        let written = values.iter().rposition(Option::is_some).map_or(0, |c| c + 1) as u32;

        let tex = global.with_uav_mut(slot, &mut *ctx.api, |uav| uav.tex);
        let address = self.element_address(inst, coord_start, tex)?;
        let stored = global.with_uav_mut(slot, &mut *ctx.api, |uav| {
            let element = locate_element(&uav_layout(uav), structured_stride, elem_ty, written, address)?;
            let mut fmt = element.fmt;
            let mut wide = fmt.decode(&uav.data[element.offset..]);
            for (c, v) in values.iter().enumerate() {
                if let Some(v) = v {
                    wide[c] = from_result_bits(v.ty, fmt.byte_width, v.value.get(0));
                }
            }
            fmt.num_comps = written.min(fmt.num_comps);
            fmt.encode(&wide, &mut uav.data[element.offset..]);
            Some(())
        });
        if stored.is_none() {
            warn!(?op, binding = ?slot, "unbound or out of bounds store dropped");
        }
        Ok(Exec::Continue)
    }

    fn resource_atomic(
        &mut self,
        ctx: &mut ExecContext<'_>,
        inst: &Instruction,
        op: DxOp,
        handle: &HandleRef,
    ) -> DebugResult<Exec> {
        if handle.info.class != ResourceClass::Uav {
            return Err(DebugError::type_mismatch(format!("{:?} on a non read-write resource", op)));
        }
        let (id, mut result) = Self::blank_result(inst)?;
        let ty = result.ty;
        let bits = ty.bits();

        let (kind, coord_start) = if op == DxOp::AtomicBinOp {
            let raw = self.arg_u32(inst, 1)?;
            let kind = AtomicBinOpKind::from_u32(raw)
                .ok_or_else(|| DebugError::invalid(format!("unknown atomic op {}", raw)))?;
            (Some(kind), 2)
        } else {
            (None, 1)
        };
        let value = self.arg(inst, 5)?.value.get(0);
        let compare = if kind.is_none() { Some(self.arg(inst, 4)?.value.get(0)) } else { None };

        let global = ctx.global;
        let slot = handle.info.binding;
        let structured_stride = handle.structured_stride();
        let tex = global.with_uav_mut(slot, &mut *ctx.api, |uav| uav.tex);
        let address = self.element_address(inst, coord_start, tex)?;

        let old = global.with_uav_mut(slot, &mut *ctx.api, |uav| {
            let element = locate_element(&uav_layout(uav), structured_stride, ty, 1, address)?;
            let mut fmt = element.fmt;
            let mut wide = fmt.decode(&uav.data[element.offset..]);
            let old = to_result_bits(ty, fmt.byte_width, wide[0]);
            let new = match (kind, compare) {
                (Some(kind), _) => match atomic_int_op(kind) {
                    Some(op) => int_binary(op, bits, old, value),
                    None => value,
                },
                (None, Some(compare)) if old == compare => value,
                (None, _) => old,
            };
            wide[0] = from_result_bits(ty, fmt.byte_width, new);
            fmt.num_comps = 1;
            fmt.encode(&wide, &mut uav.data[element.offset..]);
            Some(old)
        });

        match old {
            Some(old) => result.value.set(0, old),
            None => warn!(?op, binding = ?slot, "unbound or out of bounds atomic dropped"),
        }
        Ok(Exec::value(id, result))
    }

    // ------------------------------------------------------------------------
    // Filtered texture operations
    // ------------------------------------------------------------------------

    fn sample_gather(
        &mut self,
        ctx: &mut ExecContext<'_>,
        inst: &Instruction,
        op: DxOp,
        handle: &HandleRef,
    ) -> DebugResult<Exec> {
        use DxOp::*;
        let id = Self::result_id(inst)?;
        if handle.info.class != ResourceClass::Srv {
            return Err(DebugError::type_mismatch(format!("{:?} on a non read-only resource", op)));
        }

        let mut result = if op == CalculateLOD {
            ShaderVariable::zeroed_for_type(result_name(inst, id), &inst.ty)
        } else {
            let members = inst
                .ty
                .struct_members()
                .filter(|m| m.len() >= 2)
                .ok_or_else(|| DebugError::invalid(format!("{:?} result must be a struct", op)))?;
            ShaderVariable::new(
                result_name(inst, id),
                members[0].var_type(),
                1,
                (members.len() - 1).min(4) as u8,
            )
        };

        let srv = handle.info.srv;
        let resource = SampleGatherResourceData {
            kind: srv.kind,
            comp_type: srv.comp_type,
            sample_count: srv.sample_count,
            binding: handle.info.binding,
        };

        let mut uv = ShaderVariable::new("uv", VarType::Float, 1, 4);
        let mut ddx = ShaderVariable::new("ddx", VarType::Float, 1, 4);
        let mut ddy = ShaderVariable::new("ddy", VarType::Float, 1, 4);
        let mut texel_offsets = [0i8; 3];
        let mut multisample_index = 0i32;
        let mut sampler = None;
        let (mut bias, mut lod, mut compare) = (0.0f32, 0.0f32, 0.0f32);
        let mut gather_channel = GatherChannel::Red;

        if op == TextureLoad {
            uv.ty = VarType::SInt;
            if Self::has_arg(inst, 1) {
                let m = self.arg_u32(inst, 1)?;
                match srv.kind {
                    ResourceKind::Texture1D => uv.value.set_u32(2, m),
                    ResourceKind::Texture2D | ResourceKind::Texture3D => uv.value.set_u32(3, m),
                    ResourceKind::Texture2DMS | ResourceKind::Texture2DMSArray => {
                        multisample_index = m as i32
                    }
                    _ => {}
                }
            }
            for i in 0..3 {
                if Self::has_arg(inst, 2 + i) {
                    uv.value.set_u32(i, self.arg_u32(inst, 2 + i)?);
                }
                if Self::has_arg(inst, 5 + i) {
                    texel_offsets[i] = self.arg(inst, 5 + i)?.int_comp(0) as i8;
                }
            }
        } else {
            let sampler_ref = self.resolve_handle(ctx.program, Self::arg_id(inst, 1)?)?;
            if sampler_ref.info.class != ResourceClass::Sampler {
                return Err(DebugError::type_mismatch(format!("{:?} without a sampler", op)));
            }

            let (coord_count, offset_count) = match op {
                CalculateLOD => (3, 0),
                TextureGather | TextureGatherCmp => (4, 2),
                _ => (4, 3),
            };
            let coords: Vec<Operand> = inst.args.iter().skip(2).take(coord_count).cloned().collect();
            for i in 0..coord_count {
                if Self::has_arg(inst, 2 + i) {
                    uv.value.set_f32(i, self.arg_f32(inst, 2 + i)?);
                }
            }
            for (i, o) in texel_offsets.iter_mut().enumerate().take(offset_count) {
                if Self::has_arg(inst, 6 + i) {
                    *o = self.arg(inst, 6 + i)?.int_comp(0) as i8;
                }
            }

            let f = |s: &Self, i: usize| -> DebugResult<f32> {
                if Self::has_arg(inst, i) {
                    s.arg_f32(inst, i)
                } else {
                    Ok(0.0)
                }
            };
            match op {
                SampleBias => bias = f(self, 9)?,
                SampleLevel => lod = f(self, 9)?,
                SampleCmp | SampleCmpGrad | SampleCmpLevelZero => compare = f(self, 9)?,
                SampleCmpBias => {
                    compare = f(self, 9)?;
                    bias = f(self, 10)?;
                }
                SampleCmpLevel => {
                    compare = f(self, 9)?;
                    lod = f(self, 10)?;
                }
                TextureGather => gather_channel = GatherChannel::from_u32(self.arg_u32(inst, 8)?),
                TextureGatherCmp => {
                    gather_channel = GatherChannel::from_u32(self.arg_u32(inst, 8)?);
                    compare = f(self, 9)?;
                }
                _ => {}
            }

            match op {
                Sample | SampleBias | CalculateLOD => {
                    if self.stage == ShaderStage::Pixel && ctx.workgroup.lane_count() == QUAD_SIZE {
                        (ddx, ddy) = self.coordinate_derivatives(ctx, &coords)?;
                    } else {
                        error!(?op, lane = self.lane, "implicit derivatives outside a pixel quad, using zero");
                    }
                }
                SampleGrad | SampleCmpGrad => {
                    let first = if op == SampleGrad { 9 } else { 10 };
                    for (i, coord) in coords.iter().enumerate().take(3) {
                        if coord.id().is_some() {
                            ddx.value.set_f32(i, f(self, first + i)?);
                            ddy.value.set_f32(i, f(self, first + 3 + i)?);
                        }
                    }
                }
                _ => {}
            }

            sampler = Some(SampleGatherSamplerData {
                mode: sampler_ref.info.sampler_mode,
                bias,
                binding: sampler_ref.info.binding,
            });
        }

        let name = op_name(op);
        let request = SampleGatherRequest {
            op,
            resource,
            sampler,
            uv,
            ddx,
            ddy,
            texel_offsets,
            multisample_index,
            lod,
            compare,
            swizzle: [0, 1, 2, 3],
            gather_channel,
            stage: self.stage,
            instruction: self.function_instruction.saturating_sub(1),
            op_name: &name,
        };
        let data = ctx.api.calculate_sample_gather(&request)?;

        for c in 0..result.component_count() {
            result.value.set(c, data.value.get(c));
        }
        if op == CalculateLOD && Self::has_arg(inst, 5) && self.arg_u32(inst, 5)? == 0 {
            result.value.set(0, data.value.get(1));
        }
        self.raise_event(ShaderEvents::SAMPLE_LOAD_GATHER);
        Ok(Exec::value(id, result))
    }
}

fn uav_layout(uav: &UavData) -> Layout {
    Layout {
        info: uav.info,
        len: uav.data.len(),
        tex: uav.tex,
        row_pitch: uav.row_pitch,
        depth_pitch: uav.depth_pitch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(format: ViewFormat, num_elements: u32, len: usize) -> Layout {
        Layout {
            info: ResourceInfo { num_elements, format, ..Default::default() },
            len,
            tex: false,
            row_pitch: 0,
            depth_pitch: 0,
        }
    }

    #[test]
    fn test_sample_positions() {
        assert_eq!(sample_position(0, 1), [0.0, 0.0]);
        assert_eq!(sample_position(0, 4), [-0.125, -0.375]);
        assert_eq!(sample_position(5, 16), [0.125, 0.3125]);
        assert_eq!(sample_position(7, 8), [0.4375, -0.4375]);
        // out of range index, unsupported count
        assert_eq!(sample_position(3, 2), [0.0, 0.0]);
        assert_eq!(sample_position(0, 3), [0.0, 0.0]);
    }

    #[test]
    fn test_annotation_properties() {
        let structured = annotation_from_packed(12 | (1 << 12), 20);
        assert_eq!(structured.kind, ResourceKind::StructuredBuffer);
        assert_eq!(structured.class, ResourceClass::Uav);
        assert_eq!(structured.struct_stride, 20);

        let texture = annotation_from_packed(2, (4 << 8) | 9);
        assert_eq!(texture.class, ResourceClass::Srv);
        assert_eq!(texture.struct_stride, 16);

        assert_eq!(annotation_from_packed(14, 0).class, ResourceClass::Sampler);
        assert_eq!(annotation_from_packed(13, 0).class, ResourceClass::CBuffer);
    }

    #[test]
    fn test_typed_buffer_bounds() {
        let layout = buffer(ViewFormat::new(4, 4, CompType::UInt), 4, 64);
        let addr = |index| Address::Buffer { index, offset: 0 };

        let e = locate_element(&layout, None, VarType::UInt, 4, addr(2)).unwrap();
        assert_eq!((e.offset, e.fmt.num_comps), (32, 4));
        assert!(locate_element(&layout, None, VarType::UInt, 4, addr(10)).is_none());
        assert!(locate_element(&buffer(layout.info.format, 4, 0), None, VarType::UInt, 4, addr(0))
            .is_none());
    }

    #[test]
    fn test_byte_address_rounds_and_clamps() {
        let mut layout = buffer(ViewFormat::new(4, 1, CompType::Typeless), 16, 64);
        layout.info.is_byte_buffer = true;

        let e = locate_element(&layout, None, VarType::SInt, 4, Address::Buffer { index: 6, offset: 0 })
            .unwrap();
        assert_eq!(e.offset, 4);
        assert_eq!(e.fmt.comp_type, CompType::SInt);
        assert_eq!(e.fmt.num_comps, 4);

        let tail =
            locate_element(&layout, None, VarType::SInt, 4, Address::Buffer { index: 62, offset: 0 })
                .unwrap();
        assert_eq!(tail.offset, 60);
        assert_eq!((tail.fmt.num_comps, tail.requested), (1, 4));
    }

    #[test]
    fn test_structured_stride_overrides_byte_addressing() {
        let mut layout = buffer(ViewFormat::new(4, 1, CompType::Typeless), 4, 48);
        layout.info.is_byte_buffer = true;
        let e = locate_element(
            &layout,
            Some(12),
            VarType::Float,
            1,
            Address::Buffer { index: 2, offset: 4 },
        )
        .unwrap();
        assert_eq!(e.offset, 28);
        assert_eq!(e.fmt.stride, 12);
    }

    #[test]
    fn test_texel_addressing() {
        let layout = Layout {
            info: ResourceInfo { format: ViewFormat::new(4, 4, CompType::Float), ..Default::default() },
            len: 256,
            tex: true,
            row_pitch: 64,
            depth_pitch: 256,
        };
        let e = locate_element(&layout, None, VarType::Float, 4, Address::Texel([1, 2, 0])).unwrap();
        assert_eq!(e.offset, 144);
        assert!(locate_element(&layout, None, VarType::Float, 4, Address::Texel([0, 0, 1])).is_none());
    }
}
