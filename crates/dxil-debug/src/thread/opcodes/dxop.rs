//! dx.op intrinsics that do not touch resources
//!
//! Signature I/O, compute builtins, math, bit manipulation, derivatives and
//! lane control. Resource intrinsics are forwarded to `resources.rs`.

use tracing::error;

use crate::error::{DebugError, DebugResult};
use crate::program::{barrier_mode, DxOp, Instruction, ShaderStage};
use crate::shader::numeric::{
    f16_to_f32, f32_to_f16, f64_to_float, float_binary_for, float_to_f64, float_unary_for, int_binary,
    mask, sext, FloatBinOp, IntBinOp,
};
use crate::shader::{ShaderBuiltin, VarType};
use crate::thread::derivatives::{Axis, QUAD_SIZE};
use crate::thread::{ExecContext, Exec, ThreadState};

/// Whether a float component of width `ty` is a normal number
fn is_normal_at(ty: VarType, bits: u64) -> bool {
    match ty {
        VarType::Half => {
            let exp = (bits >> 10) & 0x1f;
            exp != 0 && exp != 0x1f
        }
        VarType::Double => f64::from_bits(bits).is_normal(),
        _ => f32::from_bits(bits as u32).is_normal(),
    }
}

/// Index of the highest set bit counted from the MSB, `!0` when none is set
fn firstbit_hi(v: u32) -> u32 {
    if v == 0 {
        !0
    } else {
        v.leading_zeros()
    }
}

fn firstbit_lo(v: u32) -> u32 {
    if v == 0 {
        !0
    } else {
        v.trailing_zeros()
    }
}

/// Like [`firstbit_hi`], but negative values search for the first clear bit
fn firstbit_shi(v: u32) -> u32 {
    if (v as i32) < 0 {
        firstbit_hi(!v)
    } else {
        firstbit_hi(v)
    }
}

fn reverse_bits(v: u64, bits: u32) -> u64 {
    match bits {
        0 => 0,
        64 => v.reverse_bits(),
        b => (v & mask(b)).reverse_bits() >> (64 - b),
    }
}

fn compute_builtin(op: DxOp) -> Option<ShaderBuiltin> {
    Some(match op {
        DxOp::ThreadId => ShaderBuiltin::DispatchThreadIndex,
        DxOp::GroupId => ShaderBuiltin::GroupIndex,
        DxOp::ThreadIdInGroup => ShaderBuiltin::GroupThreadIndex,
        DxOp::FlattenedThreadIdInGroup => ShaderBuiltin::GroupFlatIndex,
        _ => return None,
    })
}

impl ThreadState {
    pub(in crate::thread) fn exec_dx_op(
        &mut self,
        ctx: &mut ExecContext<'_>,
        inst: &Instruction,
        op: DxOp,
    ) -> DebugResult<Exec> {
        use DxOp::*;

        match op {
            LoadInput => self.load_input(inst),
            StoreOutput => self.store_output(inst),

            ThreadId | GroupId | ThreadIdInGroup | FlattenedThreadIdInGroup => {
                self.read_compute_builtin(ctx, inst, op)
            }

            op if op.is_math_intrinsic() => {
                let (id, mut result) = Self::blank_result(inst)?;
                let input = self.arg(inst, 0)?;
                let (out, _) = ctx.api.calculate_math_intrinsic(op, &input)?;
                for c in 0..result.component_count() {
                    result.value.set(c, out.value.get(c));
                }
                Ok(Exec::value(id, result))
            }

            Frc | Round_ne | Round_ni | Round_pi | Round_z | FAbs | Saturate => {
                let (id, mut result) = Self::blank_result(inst)?;
                let a = self.arg(inst, 0)?;
                let f: fn(f64) -> f64 = match op {
                    Frc => |x| x - x.floor(),
                    Round_ne => |x| x.round_ties_even(),
                    Round_ni => f64::floor,
                    Round_pi => f64::ceil,
                    Round_z => f64::trunc,
                    FAbs => f64::abs,
                    // NaN saturates to zero
                    _ => |x| x.max(0.0).min(1.0),
                };
                for c in 0..result.component_count() {
                    let r = float_unary_for(a.ty, a.value.get(c), f).ok_or_else(|| {
                        DebugError::type_mismatch(format!("{:?} on {:?}", op, a.ty))
                    })?;
                    result.value.set(c, r);
                }
                Ok(Exec::value(id, result))
            }

            IsNaN | IsInf | IsFinite | IsNormal => {
                let (id, mut result) = Self::blank_result(inst)?;
                let a = self.arg(inst, 0)?;
                if !a.ty.is_float() {
                    return Err(DebugError::type_mismatch(format!("{:?} on {:?}", op, a.ty)));
                }
                let bits = a.value.get(0);
                let v = float_to_f64(a.ty, bits);
                let hit = match op {
                    IsNaN => v.is_nan(),
                    IsInf => v.is_infinite(),
                    IsFinite => v.is_finite(),
                    _ => is_normal_at(a.ty, bits),
                };
                result.value.set(0, hit as u64);
                Ok(Exec::value(id, result))
            }

            IMin | IMax | UMin | UMax | IMul | UMul | UDiv => {
                let (id, mut result) = Self::blank_result(inst)?;
                let a = self.arg(inst, 0)?;
                let b = self.arg(inst, 1)?;
                let int_op = match op {
                    IMin => IntBinOp::SMin,
                    IMax => IntBinOp::SMax,
                    UMin => IntBinOp::UMin,
                    UMax => IntBinOp::UMax,
                    UDiv => IntBinOp::UDiv,
                    _ => IntBinOp::Mul,
                };
                result.value.set(0, int_binary(int_op, a.ty.bits(), a.value.get(0), b.value.get(0)));
                Ok(Exec::value(id, result))
            }

            FMin | FMax => {
                let (id, mut result) = Self::blank_result(inst)?;
                let a = self.arg(inst, 0)?;
                let b = self.arg(inst, 1)?;
                let float_op = if op == FMin { FloatBinOp::Min } else { FloatBinOp::Max };
                let r = float_binary_for(a.ty, float_op, a.value.get(0), b.value.get(0))
                    .ok_or_else(|| DebugError::type_mismatch(format!("{:?} on {:?}", op, a.ty)))?;
                result.value.set(0, r);
                Ok(Exec::value(id, result))
            }

            FMad | Fma => {
                let (id, mut result) = Self::blank_result(inst)?;
                let a = self.arg(inst, 0)?;
                let b = self.arg(inst, 1)?;
                let c = self.arg(inst, 2)?;
                let ty = a.ty;
                let r = if op == Fma {
                    let fused = float_to_f64(ty, a.value.get(0))
                        .mul_add(float_to_f64(ty, b.value.get(0)), float_to_f64(ty, c.value.get(0)));
                    Some(f64_to_float(ty, fused))
                } else {
                    float_binary_for(ty, FloatBinOp::Mul, a.value.get(0), b.value.get(0))
                        .and_then(|ab| float_binary_for(ty, FloatBinOp::Add, ab, c.value.get(0)))
                };
                let r = r.filter(|_| ty.is_float()).ok_or_else(|| {
                    DebugError::type_mismatch(format!("{:?} on {:?}", op, ty))
                })?;
                result.value.set(0, r);
                Ok(Exec::value(id, result))
            }

            IMad | UMad => {
                let (id, mut result) = Self::blank_result(inst)?;
                let a = self.arg(inst, 0)?;
                let b = self.arg(inst, 1)?;
                let c = self.arg(inst, 2)?;
                let bits = a.ty.bits();
                let ab = int_binary(IntBinOp::Mul, bits, a.value.get(0), b.value.get(0));
                result.value.set(0, int_binary(IntBinOp::Add, bits, ab, c.value.get(0)));
                Ok(Exec::value(id, result))
            }

            Dot2 | Dot3 | Dot4 => self.dot(inst, op),

            FirstbitLo | FirstbitHi | FirstbitSHi | Bfrev | Countbits => {
                let (id, mut result) = Self::blank_result(inst)?;
                let a = self.arg(inst, 0)?;
                if !a.ty.is_integer() {
                    return Err(DebugError::type_mismatch(format!("{:?} on {:?}", op, a.ty)));
                }
                let bits = a.ty.bits();
                let v = a.value.get(0) & mask(bits);
                let r = match op {
                    FirstbitLo => firstbit_lo(v as u32) as u64,
                    FirstbitHi => firstbit_hi(v as u32) as u64,
                    FirstbitSHi => firstbit_shi(sext(v, bits) as u32) as u64,
                    Bfrev => reverse_bits(v, bits),
                    _ => v.count_ones() as u64,
                };
                result.set_int_comp(0, r);
                Ok(Exec::value(id, result))
            }

            MakeDouble => {
                let (id, mut result) = Self::blank_result(inst)?;
                let lo = self.arg_u32(inst, 0)? as u64;
                let hi = self.arg_u32(inst, 1)? as u64;
                result.value.set(0, lo | hi << 32);
                Ok(Exec::value(id, result))
            }

            SplitDouble => {
                let (id, mut result) = Self::blank_result(inst)?;
                let bits = self.arg(inst, 0)?.value.get(0);
                let (lo, hi) = (bits & 0xffff_ffff, bits >> 32);
                if let [first, second, ..] = result.members.as_mut_slice() {
                    first.value.set(0, lo);
                    second.value.set(0, hi);
                } else {
                    result.value.set(0, lo);
                    result.value.set(1, hi);
                }
                Ok(Exec::value(id, result))
            }

            LegacyF32ToF16 => {
                let (id, mut result) = Self::blank_result(inst)?;
                let v = self.arg_f32(inst, 0)?;
                result.set_int_comp(0, f32_to_f16(v) as u64);
                Ok(Exec::value(id, result))
            }

            LegacyF16ToF32 => {
                let (id, mut result) = Self::blank_result(inst)?;
                let h = self.arg_u32(inst, 0)? as u16;
                result.value.set_f32(0, f16_to_f32(h));
                Ok(Exec::value(id, result))
            }

            DerivCoarseX | DerivCoarseY | DerivFineX | DerivFineY => {
                let (id, result) = Self::blank_result(inst)?;
                let axis = if matches!(op, DerivCoarseX | DerivFineX) { Axis::X } else { Axis::Y };
                let fine = matches!(op, DerivFineX | DerivFineY);
                let value = inst.args.first().ok_or_else(|| {
                    DebugError::invalid(format!("{:?} without an operand", op))
                })?;

                if self.stage != ShaderStage::Pixel || ctx.workgroup.lane_count() != QUAD_SIZE {
                    error!(?op, lane = self.lane, "derivative outside of a pixel quad is undefined");
                    return Ok(Exec::value(id, result));
                }
                let delta = self.quad_derivative(ctx, value, axis, fine)?;
                Ok(Exec::value(id, delta.with_name(result.name)))
            }

            Barrier => {
                let mode = self.arg_u32(inst, 0)?;
                if mode & barrier_mode::SYNC_THREAD_GROUP != 0 && self.workgroup_diverged(ctx) {
                    return Err(DebugError::Diverged("barrier"));
                }
                Ok(Exec::Continue)
            }

            Discard => {
                if self.arg_u32(inst, 0)? != 0 {
                    Ok(Exec::Kill)
                } else {
                    Ok(Exec::Continue)
                }
            }

            CreateHandle | CreateHandleFromBinding | CreateHandleFromHeap | AnnotateHandle
            | CBufferLoadLegacy | BufferLoad | BufferStore | RawBufferLoad | RawBufferStore
            | TextureLoad | TextureStore | GetDimensions | Texture2DMSGetSamplePosition
            | RenderTargetGetSamplePosition | RenderTargetGetSampleCount | Sample | SampleBias
            | SampleLevel | SampleGrad | SampleCmp | SampleCmpLevelZero | SampleCmpLevel
            | SampleCmpGrad | SampleCmpBias | TextureGather | TextureGatherCmp | CalculateLOD
            | AtomicBinOp | AtomicCompareExchange => self.exec_resource(ctx, inst, op),

            other => Err(DebugError::UnsupportedDxOp(other)),
        }
    }

    fn load_input(&mut self, inst: &Instruction) -> DebugResult<Exec> {
        let (id, mut result) = Self::blank_result(inst)?;
        let element = self.arg_u32(inst, 0)? as usize;
        let row = self.arg_u32(inst, 1)? as usize;
        let col = self.arg_u32(inst, 2)? as usize;

        let input = self.input();
        let var = input.members.get(element).ok_or_else(|| {
            DebugError::invalid(format!("input element {} not in the signature", element))
        })?;
        if row >= var.rows.max(1) as usize || col >= var.columns as usize {
            return Err(DebugError::invalid(format!(
                "input {}[{}][{}] outside {}x{}",
                var.name, row, col, var.rows, var.columns
            )));
        }
        result.value.set(0, var.value.get(row * var.columns as usize + col) & mask(result.ty.bits()));
        Ok(Exec::value(id, result))
    }

    /// Only the reporting lane writes its outputs
    fn store_output(&mut self, inst: &Instruction) -> DebugResult<Exec> {
        let element = self.arg_u32(inst, 0)? as usize;
        let row = self.arg_u32(inst, 1)? as usize;
        let col = self.arg_u32(inst, 2)? as usize;
        let value = self.arg(inst, 3)?;
        if !self.recording {
            return Ok(Exec::Continue);
        }

        let mut output = self.output().clone();
        let var = output.members.get_mut(element).ok_or_else(|| {
            DebugError::invalid(format!("output element {} not in the signature", element))
        })?;
        if row >= var.rows.max(1) as usize || col >= var.columns as usize {
            return Err(DebugError::invalid(format!(
                "output {}[{}][{}] outside {}x{}",
                var.name, row, col, var.rows, var.columns
            )));
        }
        let c = row * var.columns as usize + col;
        var.value.set(c, value.value.get(0) & mask(var.ty.bits()));
        Ok(Exec::value(self.output_id, output))
    }

    fn read_compute_builtin(
        &mut self,
        ctx: &ExecContext<'_>,
        inst: &Instruction,
        op: DxOp,
    ) -> DebugResult<Exec> {
        let (id, mut result) = Self::blank_result(inst)?;
        let builtin = compute_builtin(op).ok_or(DebugError::UnsupportedDxOp(op))?;
        let component = if op == DxOp::FlattenedThreadIdInGroup {
            0
        } else {
            self.arg_u32(inst, 0)? as usize
        };
        let source = self
            .builtins
            .get(&builtin)
            .or_else(|| ctx.global.builtins.get(&builtin))
            .ok_or_else(|| DebugError::invalid(format!("{:?} has no value", builtin)))?;
        if component >= 3 {
            return Err(DebugError::invalid(format!("{:?} component {}", op, component)));
        }
        result.value.set(0, source.value.get(component) & mask(result.ty.bits()));
        Ok(Exec::value(id, result))
    }

    fn dot(&mut self, inst: &Instruction, op: DxOp) -> DebugResult<Exec> {
        let (id, mut result) = Self::blank_result(inst)?;
        let n = match op {
            DxOp::Dot2 => 2,
            DxOp::Dot3 => 3,
            _ => 4,
        };
        let ty = result.ty;
        let mut acc = 0u64;
        for c in 0..n {
            let a = self.arg(inst, c)?.value.get(0);
            let b = self.arg(inst, n + c)?.value.get(0);
            acc = if ty.is_float() {
                float_binary_for(ty, FloatBinOp::Mul, a, b)
                    .and_then(|ab| float_binary_for(ty, FloatBinOp::Add, acc, ab))
                    .ok_or_else(|| DebugError::type_mismatch(format!("{:?} on {:?}", op, ty)))?
            } else if ty.is_integer() {
                let ab = int_binary(IntBinOp::Mul, ty.bits(), a, b);
                int_binary(IntBinOp::Add, ty.bits(), acc, ab)
            } else {
                return Err(DebugError::type_mismatch(format!("{:?} on {:?}", op, ty)));
            };
        }
        result.value.set(0, acc);
        Ok(Exec::value(id, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firstbit() {
        assert_eq!(firstbit_hi(1), 31);
        assert_eq!(firstbit_hi(0x8000_0000), 0);
        assert_eq!(firstbit_lo(8), 3);
        assert_eq!(firstbit_lo(0), !0);
        // -1 has no clear bit to find
        assert_eq!(firstbit_shi(u32::MAX), !0);
        assert_eq!(firstbit_shi(0xFFFF_FFF0), 28);
    }

    #[test]
    fn test_bit_reverse_at_width() {
        assert_eq!(reverse_bits(1, 32), 0x8000_0000);
        assert_eq!(reverse_bits(0x8000_0000, 32), 1);
        assert_eq!(reverse_bits(1, 16), 0x8000);
    }

    #[test]
    fn test_normal_classification_uses_native_width() {
        // smallest f32 subnormal is normal once widened to f64
        assert!(!is_normal_at(VarType::Float, 1));
        assert!(is_normal_at(VarType::Float, 1.0f32.to_bits() as u64));
        assert!(!is_normal_at(VarType::Half, 0x0001));
        assert!(is_normal_at(VarType::Half, 0x3C00));
        assert!(!is_normal_at(VarType::Half, 0x7C00));
    }
}
