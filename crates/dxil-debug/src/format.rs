//! Typed view formats for buffer and texture elements
//!
//! Decoding produces components in a wide domain: float and normalised
//! formats give f32 bits, 8/16-bit integers are extended to 32 bits, 64-bit
//! formats keep their raw bits. [`to_result_bits`] and [`from_result_bits`]
//! convert between that domain and the element type of a shader value.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::shader::numeric::{
    f16_to_f32, f32_to_f16, f32_to_snorm, f32_to_unorm, mask, sext, snorm_to_f32, unorm_to_f32,
};
use crate::shader::VarType;

/// Component interpretation of a view format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompType {
    /// Unknown; guessed from the shader's result type on access
    #[default]
    Typeless,
    Float,
    UInt,
    SInt,
    UNorm,
    SNorm,
}

/// Element layout of a view
///
/// `byte_width` is the size of one component, except 10 (R10G10B10A2) and 11
/// (R11G11B10) which name packed 32-bit formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewFormat {
    pub byte_width: u32,
    pub num_comps: u32,
    pub comp_type: CompType,
    /// Element stride in bytes
    pub stride: u32,
}

impl ViewFormat {
    pub fn new(byte_width: u32, num_comps: u32, comp_type: CompType) -> Self {
        ViewFormat { byte_width, num_comps, comp_type, stride: byte_width * num_comps }
    }

    /// Format matching a shader element type
    ///
    /// Returns `None` for types with no buffer representation.
    pub fn from_var_type(ty: VarType, num_comps: u32) -> Option<Self> {
        let (byte_width, comp_type) = match ty {
            VarType::Float => (4, CompType::Float),
            VarType::Double => (8, CompType::Float),
            VarType::Half => (2, CompType::Float),
            VarType::SInt => (4, CompType::SInt),
            VarType::UInt => (4, CompType::UInt),
            VarType::SShort => (2, CompType::SInt),
            VarType::UShort => (2, CompType::UInt),
            VarType::SLong => (8, CompType::SInt),
            VarType::ULong => (8, CompType::UInt),
            VarType::SByte => (1, CompType::SInt),
            VarType::UByte => (1, CompType::UInt),
            _ => return None,
        };
        Some(ViewFormat::new(byte_width, num_comps, comp_type))
    }

    fn is_float_like(&self) -> bool {
        matches!(self.comp_type, CompType::Float | CompType::UNorm | CompType::SNorm)
    }

    /// Decode one element into four wide components
    ///
    /// Missing bytes read as zero. Formats with fewer than four components
    /// get an alpha of 1.0 (or 1 for integers).
    pub fn decode(&self, bytes: &[u8]) -> [u64; 4] {
        let mut out = [0u64; 4];
        let read = |offset: usize, width: usize| -> u64 {
            let mut raw = [0u8; 8];
            if let Some(src) = bytes.get(offset..offset + width) {
                raw[..width].copy_from_slice(src);
            }
            u64::from_le_bytes(raw)
        };
        let comps = self.num_comps.min(4) as usize;

        match self.byte_width {
            10 => {
                let u = read(0, 4) as u32;
                let parts = [u & 0x3ff, (u >> 10) & 0x3ff, (u >> 20) & 0x3ff, u >> 30];
                match self.comp_type {
                    CompType::UInt => {
                        for (o, p) in out.iter_mut().zip(parts) {
                            *o = p as u64;
                        }
                    }
                    CompType::UNorm => {
                        for (c, (o, p)) in out.iter_mut().zip(parts).enumerate() {
                            let bits = if c == 3 { 2 } else { 10 };
                            *o = unorm_to_f32(p, bits).to_bits() as u64;
                        }
                    }
                    other => warn!(comp_type = ?other, "unexpected component type for R10G10B10A2"),
                }
                return out;
            }
            11 => {
                warn!("R11G11B10 views are not supported, reading zeros");
                return out;
            }
            8 => {
                for (c, o) in out.iter_mut().enumerate().take(comps) {
                    *o = read(c * 8, 8);
                }
            }
            4 => {
                for (c, o) in out.iter_mut().enumerate().take(comps) {
                    *o = read(c * 4, 4);
                }
            }
            2 | 1 => {
                let w = self.byte_width as usize;
                let bits = self.byte_width * 8;
                for (c, o) in out.iter_mut().enumerate().take(comps) {
                    let raw = read(c * w, w);
                    *o = match self.comp_type {
                        CompType::Float if w == 2 => f16_to_f32(raw as u16).to_bits() as u64,
                        CompType::UInt | CompType::Typeless | CompType::Float => raw,
                        CompType::SInt => sext(raw, bits) as u64 & 0xffff_ffff,
                        CompType::UNorm => unorm_to_f32(raw as u32, bits).to_bits() as u64,
                        CompType::SNorm => {
                            snorm_to_f32(sext(raw, bits) as i32, bits).to_bits() as u64
                        }
                    };
                }
            }
            other => {
                warn!(byte_width = other, "unexpected view format width, reading zeros");
                return out;
            }
        }

        if comps < 4 {
            out[3] = if self.is_float_like() { 1.0f32.to_bits() as u64 } else { 1 };
        }
        out
    }

    /// Encode the first `num_comps` wide components over `bytes`
    pub fn encode(&self, value: &[u64; 4], bytes: &mut [u8]) {
        let mut write = |offset: usize, width: usize, v: u64| {
            if let Some(dst) = bytes.get_mut(offset..offset + width) {
                dst.copy_from_slice(&v.to_le_bytes()[..width]);
            }
        };
        let comps = self.num_comps.min(4) as usize;
        let f = |c: usize| f32::from_bits(value[c] as u32);
        let s = |c: usize| value[c] as u32 as i32;

        match self.byte_width {
            10 => {
                let u = match self.comp_type {
                    CompType::UInt => {
                        (value[0] as u32 & 0x3ff)
                            | (value[1] as u32 & 0x3ff) << 10
                            | (value[2] as u32 & 0x3ff) << 20
                            | (value[3] as u32 & 0x3) << 30
                    }
                    CompType::UNorm => {
                        f32_to_unorm(f(0), 10)
                            | f32_to_unorm(f(1), 10) << 10
                            | f32_to_unorm(f(2), 10) << 20
                            | f32_to_unorm(f(3), 2) << 30
                    }
                    other => {
                        warn!(comp_type = ?other, "unexpected component type for R10G10B10A2");
                        return;
                    }
                };
                write(0, 4, u as u64);
            }
            11 => warn!("R11G11B10 views are not supported, store dropped"),
            8 => {
                for c in 0..comps {
                    write(c * 8, 8, value[c]);
                }
            }
            4 => {
                for c in 0..comps {
                    write(c * 4, 4, value[c] & 0xffff_ffff);
                }
            }
            2 | 1 => {
                let w = self.byte_width as usize;
                let bits = self.byte_width * 8;
                let (lo, hi) = (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1);
                for c in 0..comps {
                    let raw = match self.comp_type {
                        CompType::Float if w == 2 => f32_to_f16(f(c)) as u64,
                        CompType::UInt | CompType::Typeless | CompType::Float => value[c],
                        CompType::SInt => (s(c) as i64).clamp(lo, hi) as u64,
                        CompType::UNorm => f32_to_unorm(f(c), bits) as u64,
                        CompType::SNorm => f32_to_snorm(f(c), bits) as u64,
                    };
                    write(c * w, w, raw & mask(bits));
                }
            }
            other => warn!(byte_width = other, "unexpected view format width, store dropped"),
        }
    }
}

/// Convert a decoded wide component to the bits of a `ty` component
pub fn to_result_bits(ty: VarType, byte_width: u32, wide: u64) -> u64 {
    if byte_width == 8 {
        return wide;
    }
    match ty {
        VarType::Half => f32_to_f16(f32::from_bits(wide as u32)) as u64,
        VarType::Double => (f32::from_bits(wide as u32) as f64).to_bits(),
        VarType::SLong => sext(wide, 32) as u64,
        other => wide & mask(other.bits()),
    }
}

/// Convert the bits of a `ty` component to the wide domain
pub fn from_result_bits(ty: VarType, byte_width: u32, bits: u64) -> u64 {
    if byte_width == 8 {
        return bits;
    }
    match ty {
        VarType::Half => f16_to_f32(bits as u16).to_bits() as u64,
        VarType::Double => (f64::from_bits(bits) as f32).to_bits() as u64,
        ty if ty.is_signed() => sext(bits, ty.bits()) as u64 & 0xffff_ffff,
        _ => bits & 0xffff_ffff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fills_alpha() {
        let fmt = ViewFormat::new(4, 2, CompType::Float);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&2.5f32.to_le_bytes());
        let v = fmt.decode(&bytes);
        assert_eq!(f32::from_bits(v[0] as u32), 1.5);
        assert_eq!(f32::from_bits(v[1] as u32), 2.5);
        assert_eq!(v[2], 0);
        assert_eq!(f32::from_bits(v[3] as u32), 1.0);

        let ints = ViewFormat::new(4, 1, CompType::UInt);
        assert_eq!(ints.decode(&7u32.to_le_bytes()), [7, 0, 0, 1]);
    }

    #[test]
    fn test_narrow_signed_formats() {
        let fmt = ViewFormat::new(2, 2, CompType::SInt);
        let mut bytes = [0u8; 4];
        fmt.encode(&[(-40000i32) as u32 as u64, 5, 0, 0], &mut bytes);
        assert_eq!(&bytes, &[0x00, 0x80, 5, 0]);
        let v = fmt.decode(&bytes);
        assert_eq!(v[0] as u32 as i32, -32768);
        assert_eq!(to_result_bits(VarType::SShort, 2, v[0]), 0x8000);
    }

    #[test]
    fn test_unorm_bytes() {
        let fmt = ViewFormat::new(1, 4, CompType::UNorm);
        let mut bytes = [0u8; 4];
        let half = 0.5f32.to_bits() as u64;
        let one = 1.0f32.to_bits() as u64;
        fmt.encode(&[one, half, 0, one], &mut bytes);
        assert_eq!(bytes, [255, 128, 0, 255]);
        assert_eq!(f32::from_bits(fmt.decode(&bytes)[0] as u32), 1.0);
    }

    #[test]
    fn test_packed_10_10_10_2() {
        let fmt = ViewFormat::new(10, 4, CompType::UInt);
        let mut bytes = [0u8; 4];
        fmt.encode(&[1, 2, 3, 1], &mut bytes);
        assert_eq!(u32::from_le_bytes(bytes), 1 | 2 << 10 | 3 << 20 | 1 << 30);
        assert_eq!(fmt.decode(&bytes), [1, 2, 3, 1]);
    }

    #[test]
    fn test_half_result_conversion() {
        let wide = 1.5f32.to_bits() as u64;
        assert_eq!(to_result_bits(VarType::Half, 2, wide), 0x3E00);
        assert_eq!(from_result_bits(VarType::Half, 2, 0x3E00), wide);
        assert_eq!(from_result_bits(VarType::SShort, 2, 0xFFFF), 0xFFFF_FFFF);
    }

    #[test]
    fn test_from_var_type() {
        let fmt = ViewFormat::from_var_type(VarType::ULong, 2).unwrap();
        assert_eq!((fmt.byte_width, fmt.stride, fmt.comp_type), (8, 16, CompType::UInt));
        assert!(ViewFormat::from_var_type(VarType::Struct, 1).is_none());
    }
}
