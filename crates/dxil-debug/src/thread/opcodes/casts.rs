//! Width, signedness and representation casts

use crate::error::{DebugError, DebugResult};
use crate::memory::{flatten_variable, unflatten_variable};
use crate::program::{Instruction, Operation};
use crate::shader::numeric::{f64_to_float, float_to_f64, mask, sext};
use crate::thread::{Exec, ThreadState};

/// Float to unsigned integer of `bits`, saturating
fn float_to_uint(v: f64, bits: u32) -> u64 {
    match bits {
        1 => (v != 0.0) as u64,
        8 => v as u8 as u64,
        16 => v as u16 as u64,
        32 => v as u32 as u64,
        _ => v as u64,
    }
}

/// Float to signed integer of `bits`, saturating, as zero-extended bits
fn float_to_sint(v: f64, bits: u32) -> u64 {
    let wide = match bits {
        1 => (v != 0.0) as i64,
        8 => v as i8 as i64,
        16 => v as i16 as i64,
        32 => v as i32 as i64,
        _ => v as i64,
    };
    wide as u64 & mask(bits)
}

impl ThreadState {
    pub(in crate::thread) fn exec_cast(&mut self, inst: &Instruction) -> DebugResult<Exec> {
        let (id, mut result) = Self::blank_result(inst)?;
        let a = self.arg(inst, 0)?;

        if inst.op == Operation::Bitcast {
            let mut bytes = Vec::new();
            flatten_variable(&a, &mut bytes);
            let expected = inst.ty.byte_size();
            if bytes.len() != expected {
                return Err(DebugError::type_mismatch(format!(
                    "bitcast of {} bytes to {}",
                    bytes.len(),
                    inst.ty
                )));
            }
            unflatten_variable(&mut result, &bytes);
            return Ok(Exec::value(id, result));
        }

        let src_bits = a.ty.bits();
        let dst_bits = result.ty.bits();
        for c in 0..result.component_count() {
            let v = a.value.get(c);
            let out = match inst.op {
                Operation::Trunc | Operation::PtrToI | Operation::IToPtr => v & mask(dst_bits),
                Operation::ZExt => v & mask(src_bits),
                Operation::SExt => sext(v, src_bits) as u64 & mask(dst_bits),
                Operation::FToU => float_to_uint(float_to_f64(a.ty, v), dst_bits),
                Operation::FToS => float_to_sint(float_to_f64(a.ty, v), dst_bits),
                Operation::UToF => f64_to_float(result.ty, (v & mask(src_bits)) as f64),
                Operation::SToF => f64_to_float(result.ty, sext(v, src_bits) as f64),
                Operation::FPTrunc | Operation::FPExt => {
                    f64_to_float(result.ty, float_to_f64(a.ty, v))
                }
                other => return Err(DebugError::UnsupportedOperation(other)),
            };
            result.value.set(c, out);
        }

        Ok(Exec::value(id, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_int_saturates() {
        assert_eq!(float_to_uint(-4.0, 32), 0);
        assert_eq!(float_to_uint(1e12, 32), u32::MAX as u64);
        assert_eq!(float_to_sint(-2.7, 32), (-2i32) as u32 as u64);
        assert_eq!(float_to_sint(f64::NAN, 16), 0);
        assert_eq!(float_to_sint(-1.0, 8), 0xFF);
    }
}
