//! Numeric helpers over raw component bits
//!
//! Integer operations work on zero-extended bit patterns of a given width and
//! pick their signedness from the operation. Float operations are generic over
//! [`FloatLane`], implemented once per float width.

use std::ops::{Add, Div, Mul, Rem, Sub};

use half::f16;

use super::variable::VarType;

/// Mask covering the low `bits` bits
#[inline]
pub fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Sign-extend the low `bits` bits of `v`
#[inline]
pub fn sext(v: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return v as i64;
    }
    let shift = 64 - bits;
    ((v << shift) as i64) >> shift
}

// ============================================================================
// Half precision
// ============================================================================

/// Round a float to half precision, nearest-even
#[inline]
pub fn f32_to_f16(v: f32) -> u16 {
    f16::from_f32(v).to_bits()
}

/// Widen a half to float, exactly
#[inline]
pub fn f16_to_f32(h: u16) -> f32 {
    f16::from_bits(h).to_f32()
}

// ============================================================================
// Generic float lane
// ============================================================================

/// A float element type that operations can be instantiated over
pub trait FloatLane:
    Copy
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Rem<Output = Self>
{
    fn from_bits(bits: u64) -> Self;
    fn to_bits(self) -> u64;
    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;
    fn is_nan(self) -> bool;

    fn min(self, other: Self) -> Self {
        Self::from_f64(self.to_f64().min(other.to_f64()))
    }

    fn max(self, other: Self) -> Self {
        Self::from_f64(self.to_f64().max(other.to_f64()))
    }
}

impl FloatLane for f32 {
    fn from_bits(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }
    fn to_bits(self) -> u64 {
        f32::to_bits(self) as u64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
}

impl FloatLane for f64 {
    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }
    fn from_f64(v: f64) -> Self {
        v
    }
    fn to_f64(self) -> f64 {
        self
    }
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
}

impl FloatLane for f16 {
    fn from_bits(bits: u64) -> Self {
        f16::from_bits(bits as u16)
    }
    fn to_bits(self) -> u64 {
        f16::to_bits(self) as u64
    }
    fn from_f64(v: f64) -> Self {
        f16::from_f64(v)
    }
    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }
    fn is_nan(self) -> bool {
        f16::is_nan(self)
    }
}

/// Binary float operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Min,
    Max,
}

/// Apply `op` to two components of lane type `F`
pub fn float_binary<F: FloatLane>(op: FloatBinOp, a: u64, b: u64) -> u64 {
    let (a, b) = (F::from_bits(a), F::from_bits(b));
    let r = match op {
        FloatBinOp::Add => a + b,
        FloatBinOp::Sub => a - b,
        FloatBinOp::Mul => a * b,
        FloatBinOp::Div => a / b,
        FloatBinOp::Rem => a % b,
        FloatBinOp::Min => a.min(b),
        FloatBinOp::Max => a.max(b),
    };
    r.to_bits()
}

/// Dispatch a float operation on the element width of `ty`
pub fn float_binary_for(ty: VarType, op: FloatBinOp, a: u64, b: u64) -> Option<u64> {
    match ty {
        VarType::Half => Some(float_binary::<f16>(op, a, b)),
        VarType::Float => Some(float_binary::<f32>(op, a, b)),
        VarType::Double => Some(float_binary::<f64>(op, a, b)),
        _ => None,
    }
}

/// Apply a unary float function at the element width of `ty`
pub fn float_unary_for(ty: VarType, a: u64, f: impl Fn(f64) -> f64) -> Option<u64> {
    fn apply<F: FloatLane>(a: u64, f: impl Fn(f64) -> f64) -> u64 {
        F::from_f64(f(F::from_bits(a).to_f64())).to_bits()
    }
    match ty {
        VarType::Half => Some(apply::<f16>(a, f)),
        VarType::Float => Some(apply::<f32>(a, f)),
        VarType::Double => Some(apply::<f64>(a, f)),
        _ => None,
    }
}

/// Read a float component of width `ty` as f64
pub fn float_to_f64(ty: VarType, bits: u64) -> f64 {
    match ty {
        VarType::Half => f16::from_bits(bits as u16).to_f64(),
        VarType::Double => f64::from_bits(bits),
        _ => f32::from_bits(bits as u32) as f64,
    }
}

/// Round an f64 to a float component of width `ty`
pub fn f64_to_float(ty: VarType, v: f64) -> u64 {
    match ty {
        VarType::Half => f16::from_f64(v).to_bits() as u64,
        VarType::Double => v.to_bits(),
        _ => (v as f32).to_bits() as u64,
    }
}

/// Flush a subnormal float32 to a signed zero; other widths are untouched
pub fn flush_denorm(ty: VarType, bits: u64) -> u64 {
    if ty != VarType::Float {
        return bits;
    }
    let x = bits as u32;
    if x & 0x7f80_0000 == 0 && x & 0x007f_ffff != 0 {
        (x & 0x8000_0000) as u64
    } else {
        bits
    }
}

/// Whether a float component is NaN or infinite
pub fn is_nan_or_inf(ty: VarType, bits: u64) -> bool {
    !float_to_f64(ty, bits).is_finite()
}

// ============================================================================
// Integers
// ============================================================================

/// Binary integer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntBinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    SMin,
    SMax,
    UMin,
    UMax,
}

/// Apply `op` to two `bits`-wide components
///
/// Division or remainder by zero yields all bits set. Shift amounts are taken
/// modulo the width.
pub fn int_binary(op: IntBinOp, bits: u32, a: u64, b: u64) -> u64 {
    let m = mask(bits);
    let (a, b) = (a & m, b & m);
    let (sa, sb) = (sext(a, bits), sext(b, bits));
    let shift = if bits == 0 { 0 } else { (b % bits as u64) as u32 };
    let r = match op {
        IntBinOp::Add => a.wrapping_add(b),
        IntBinOp::Sub => a.wrapping_sub(b),
        IntBinOp::Mul => a.wrapping_mul(b),
        IntBinOp::UDiv => a.checked_div(b).unwrap_or(u64::MAX),
        IntBinOp::URem => a.checked_rem(b).unwrap_or(u64::MAX),
        IntBinOp::SDiv if sb == 0 => u64::MAX,
        IntBinOp::SDiv => sa.wrapping_div(sb) as u64,
        IntBinOp::SRem if sb == 0 => u64::MAX,
        IntBinOp::SRem => sa.wrapping_rem(sb) as u64,
        IntBinOp::And => a & b,
        IntBinOp::Or => a | b,
        IntBinOp::Xor => a ^ b,
        IntBinOp::Shl => a << shift,
        IntBinOp::LShr => a >> shift,
        IntBinOp::AShr => (sa >> shift) as u64,
        IntBinOp::SMin => sa.min(sb) as u64,
        IntBinOp::SMax => sa.max(sb) as u64,
        IntBinOp::UMin => a.min(b),
        IntBinOp::UMax => a.max(b),
    };
    r & m
}

// ============================================================================
// Normalised formats
// ============================================================================

pub fn unorm_to_f32(v: u32, bits: u32) -> f32 {
    v as f32 / mask(bits) as f32
}

pub fn f32_to_unorm(v: f32, bits: u32) -> u32 {
    let max = mask(bits) as f32;
    (v.clamp(0.0, 1.0) * max + 0.5) as u32
}

pub fn snorm_to_f32(v: i32, bits: u32) -> f32 {
    let max = mask(bits - 1) as i32;
    if v <= -max {
        -1.0
    } else {
        v as f32 / max as f32
    }
}

pub fn f32_to_snorm(v: f32, bits: u32) -> i32 {
    let f = v.clamp(-1.0, 1.0) * mask(bits - 1) as f32;
    if f < 0.0 {
        (f - 0.5) as i32
    } else {
        (f + 0.5) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sext_and_mask() {
        assert_eq!(mask(1), 1);
        assert_eq!(mask(64), u64::MAX);
        assert_eq!(sext(0xFD, 8), -3);
        assert_eq!(sext(0x7F, 8), 127);
        assert_eq!(sext(1, 1), -1);
    }

    #[test]
    fn test_int_arithmetic() {
        assert_eq!(int_binary(IntBinOp::Add, 32, 5, 0xFFFF_FFFD), 2);
        assert_eq!(int_binary(IntBinOp::UDiv, 32, 7, 2), 3);
        assert_eq!(int_binary(IntBinOp::SDiv, 32, 0xFFFF_FFF9, 2), 0xFFFF_FFFD);
        assert_eq!(int_binary(IntBinOp::SRem, 32, 0xFFFF_FFF9, 2), 0xFFFF_FFFF);
        assert_eq!(int_binary(IntBinOp::UDiv, 32, 7, 0), 0xFFFF_FFFF);
        assert_eq!(int_binary(IntBinOp::AShr, 16, 0x8000, 4), 0xF800);
        assert_eq!(int_binary(IntBinOp::Shl, 32, 1, 33), 2);
        assert_eq!(int_binary(IntBinOp::SMin, 32, 0xFFFF_FFFF, 1), 0xFFFF_FFFF);
        assert_eq!(int_binary(IntBinOp::UMin, 32, 0xFFFF_FFFF, 1), 1);
    }

    #[test]
    fn test_float_rem_and_minmax() {
        let r = float_binary::<f32>(FloatBinOp::Rem, 5.5f32.to_bits() as u64, 2.0f32.to_bits() as u64);
        assert_eq!(f32::from_bits(r as u32), 1.5);
        let nan = f32::NAN.to_bits() as u64;
        let one = 1.0f32.to_bits() as u64;
        assert_eq!(float_binary::<f32>(FloatBinOp::Min, nan, one), one);
        assert_eq!(float_binary::<f32>(FloatBinOp::Max, one, nan), one);
    }

    #[test]
    fn test_half_conversions() {
        assert_eq!(f32_to_f16(1.0), 0x3C00);
        assert_eq!(f32_to_f16(-2.0), 0xC000);
        assert_eq!(f32_to_f16(65504.0), 0x7BFF);
        assert_eq!(f32_to_f16(1.0e6), 0x7C00);
        assert_eq!(f32_to_f16(5.960_464_5e-8), 0x0001);
        assert_eq!(f16_to_f32(0x0001), 5.960_464_5e-8);
        assert_eq!(f16_to_f32(0x3555), 0.333_251_95);
        assert!(f16_to_f32(0x7E00).is_nan());
    }

    #[test]
    fn test_half_arithmetic_rounds() {
        let a = f32_to_f16(1.0) as u64;
        let b = f32_to_f16(0.0001) as u64;
        // 1.0001 is not representable and rounds back to 1.0
        assert_eq!(float_binary::<f16>(FloatBinOp::Add, a, b), a);
        let r = float_binary_for(VarType::Half, FloatBinOp::Rem, f32_to_f16(5.5) as u64, f32_to_f16(2.0) as u64);
        assert_eq!(r, Some(f32_to_f16(1.5) as u64));
    }

    #[test]
    fn test_flush_only_touches_f32_denormals() {
        let denorm = 0x0000_0001u64;
        assert_eq!(flush_denorm(VarType::Float, denorm), 0);
        assert_eq!(flush_denorm(VarType::Float, 0x8000_0001), 0x8000_0000);
        assert_eq!(flush_denorm(VarType::Float, 1.0f32.to_bits() as u64), 1.0f32.to_bits() as u64);
        assert_eq!(flush_denorm(VarType::Double, 1), 1);
    }

    #[test]
    fn test_norm_conversions() {
        assert_eq!(unorm_to_f32(255, 8), 1.0);
        assert_eq!(f32_to_unorm(0.5, 8), 128);
        assert_eq!(snorm_to_f32(-128, 8), -1.0);
        assert_eq!(snorm_to_f32(127, 8), 1.0);
        assert_eq!(f32_to_snorm(-1.0, 16), -32767);
    }
}
