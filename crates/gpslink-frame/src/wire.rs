//! Byte-level primitives: big-endian integers, the bit-construction
//! IEEE-754 packer, and the additive checksum.
//!
//! The float packer builds the bit pattern arithmetically instead of
//! reinterpreting the native representation. For finite, normal values
//! the result is bit-identical to `f32::to_bits` / `f64::to_bits`: the
//! normalized fraction is an exact binary value, so multiplying by
//! `2^significand_bits` and truncating loses nothing. Zero encodes as all
//! zero bits regardless of sign, subnormals flush to zero, and NaN or
//! infinity are rejected.

use crate::error::{FrameError, Result};

const F32_BITS: u32 = 32;
const F32_EXP_BITS: u32 = 8;
const F64_BITS: u32 = 64;
const F64_EXP_BITS: u32 = 11;

/// Store `value` big-endian at `buf[offset..offset + 2]`.
///
/// # Panics
///
/// Panics if the buffer is shorter than `offset + 2`.
pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

/// Store `value` big-endian at `buf[offset..offset + 4]`.
///
/// # Panics
///
/// Panics if the buffer is shorter than `offset + 4`.
pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Store `value` big-endian at `buf[offset..offset + 8]`.
///
/// # Panics
///
/// Panics if the buffer is shorter than `offset + 8`.
pub fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
}

/// Read a big-endian `u16` from `buf[offset..offset + 2]`.
///
/// # Panics
///
/// Panics if the buffer is shorter than `offset + 2`.
pub fn get_u16(buf: &[u8], offset: usize) -> u16 {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_be_bytes(raw)
}

/// Read a big-endian `u32` from `buf[offset..offset + 4]`.
///
/// # Panics
///
/// Panics if the buffer is shorter than `offset + 4`.
pub fn get_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_be_bytes(raw)
}

/// Read a big-endian `u64` from `buf[offset..offset + 8]`.
///
/// # Panics
///
/// Panics if the buffer is shorter than `offset + 8`.
pub fn get_u64(buf: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(raw)
}

/// Pack a single-precision float into its 32-bit IEEE-754 pattern.
pub fn pack_f32(value: f32) -> Result<u32> {
    if !value.is_finite() {
        return Err(FrameError::NonFinite { field: "f32" });
    }
    Ok(pack754(f64::from(value), F32_BITS, F32_EXP_BITS) as u32)
}

/// Pack a double-precision float into its 64-bit IEEE-754 pattern.
pub fn pack_f64(value: f64) -> Result<u64> {
    if !value.is_finite() {
        return Err(FrameError::NonFinite { field: "f64" });
    }
    Ok(pack754(value, F64_BITS, F64_EXP_BITS))
}

/// Rebuild a single-precision float from its 32-bit pattern.
pub fn unpack_f32(bits: u32) -> f32 {
    unpack754(u64::from(bits), F32_BITS, F32_EXP_BITS) as f32
}

/// Rebuild a double-precision float from its 64-bit pattern.
pub fn unpack_f64(bits: u64) -> f64 {
    unpack754(bits, F64_BITS, F64_EXP_BITS)
}

/// Additive checksum: the sum of all byte values modulo 2^32.
///
/// Detects any single changed byte, but is blind to reordered bytes and to
/// multi-byte changes whose differences cancel out (`+1` on one byte, `-1`
/// on another). It guards against line corruption, nothing more.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &byte| acc.wrapping_add(u32::from(byte)))
}

/// `value` must be finite.
fn pack754(value: f64, bits: u32, exp_bits: u32) -> u64 {
    if value == 0.0 {
        return 0;
    }
    let significand_bits = bits - exp_bits - 1;

    let (sign, mut norm) = if value < 0.0 {
        (1u64, -value)
    } else {
        (0u64, value)
    };

    // Normalize into [1, 2), tracking the binary exponent.
    let mut shift: i64 = 0;
    while norm >= 2.0 {
        norm /= 2.0;
        shift += 1;
    }
    while norm < 1.0 {
        norm *= 2.0;
        shift -= 1;
    }

    let bias = (1i64 << (exp_bits - 1)) - 1;
    let exp = shift + bias;
    if exp <= 0 {
        return 0;
    }

    let significand = ((norm - 1.0) * (1u64 << significand_bits) as f64) as u64;
    (sign << (bits - 1)) | ((exp as u64) << significand_bits) | significand
}

fn unpack754(bits_value: u64, bits: u32, exp_bits: u32) -> f64 {
    if bits_value == 0 {
        return 0.0;
    }
    let significand_bits = bits - exp_bits - 1;

    let mut result = (bits_value & ((1u64 << significand_bits) - 1)) as f64;
    result /= (1u64 << significand_bits) as f64;
    result += 1.0;

    let bias = (1i64 << (exp_bits - 1)) - 1;
    let mut shift = ((bits_value >> significand_bits) & ((1u64 << exp_bits) - 1)) as i64 - bias;
    while shift > 0 {
        result *= 2.0;
        shift -= 1;
    }
    while shift < 0 {
        result /= 2.0;
        shift += 1;
    }

    if (bits_value >> (bits - 1)) & 1 == 1 {
        -result
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F32_SAMPLES: &[f32] = &[
        1.0, -1.0, 0.5, 2.0, 15.2, 5.0, 270.0, 359.99, -0.001, 1.0e-30, 3.0e38, 8848.86,
    ];
    const F64_SAMPLES: &[f64] = &[
        37.7749,
        -122.4194,
        0.1,
        -90.0,
        180.0,
        1.0e-300,
        1.0e300,
        51.477_928_1,
        -0.000_000_1,
    ];

    #[test]
    fn integers_are_big_endian() {
        let mut buf = [0u8; 14];
        put_u16(&mut buf, 0, 0x0102);
        put_u32(&mut buf, 2, 0x0304_0506);
        put_u64(&mut buf, 6, 0x0708_090A_0B0C_0D0E);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14]);

        assert_eq!(get_u16(&buf, 0), 0x0102);
        assert_eq!(get_u32(&buf, 2), 0x0304_0506);
        assert_eq!(get_u64(&buf, 6), 0x0708_090A_0B0C_0D0E);
    }

    #[test]
    #[should_panic]
    fn put_beyond_capacity_panics() {
        let mut buf = [0u8; 3];
        put_u32(&mut buf, 0, 1);
    }

    #[test]
    fn f32_packer_matches_native_layout() {
        for &value in F32_SAMPLES {
            assert_eq!(pack_f32(value).unwrap(), value.to_bits(), "value {value}");
        }
    }

    #[test]
    fn f64_packer_matches_native_layout() {
        for &value in F64_SAMPLES {
            assert_eq!(pack_f64(value).unwrap(), value.to_bits(), "value {value}");
        }
    }

    #[test]
    fn unpack_is_exact_inverse_for_normal_values() {
        for &value in F32_SAMPLES {
            assert_eq!(unpack_f32(pack_f32(value).unwrap()), value);
        }
        for &value in F64_SAMPLES {
            assert_eq!(unpack_f64(pack_f64(value).unwrap()), value);
        }
    }

    #[test]
    fn unpack_reads_native_patterns() {
        assert_eq!(unpack_f32(0x4180_0000), 16.0);
        assert_eq!(unpack_f32(0xC2C8_0000), -100.0);
        assert_eq!(unpack_f64(0x3FF0_0000_0000_0000), 1.0);
    }

    #[test]
    fn zero_encodes_as_all_zero() {
        assert_eq!(pack_f32(0.0).unwrap(), 0);
        assert_eq!(pack_f32(-0.0).unwrap(), 0);
        assert_eq!(pack_f64(0.0).unwrap(), 0);
        assert_eq!(unpack_f32(0), 0.0);
        assert_eq!(unpack_f64(0), 0.0);
    }

    #[test]
    fn subnormals_flush_to_zero() {
        assert_eq!(pack_f32(f32::MIN_POSITIVE / 4.0).unwrap(), 0);
        assert_eq!(pack_f64(f64::MIN_POSITIVE / 2.0).unwrap(), 0);
        assert_eq!(pack_f32(f32::MIN_POSITIVE).unwrap(), f32::MIN_POSITIVE.to_bits());
    }

    #[test]
    fn non_finite_values_are_rejected() {
        assert!(matches!(
            pack_f32(f32::NAN),
            Err(FrameError::NonFinite { .. })
        ));
        assert!(matches!(
            pack_f32(f32::INFINITY),
            Err(FrameError::NonFinite { .. })
        ));
        assert!(matches!(
            pack_f64(f64::NEG_INFINITY),
            Err(FrameError::NonFinite { .. })
        ));
    }

    #[test]
    fn checksum_sums_bytes() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[1, 2, 3]), 6);
        assert_eq!(checksum(&[0xFF, 0xFF]), 510);
    }

    #[test]
    fn checksum_wraps_at_32_bits() {
        // 16_843_010 * 255 = 2^32 + 254
        let bytes = vec![0xFFu8; 16_843_010];
        assert_eq!(checksum(&bytes), 254);
    }

    #[test]
    fn checksum_detects_every_single_byte_change() {
        let payload: Vec<u8> = (0u8..28).map(|i| i.wrapping_mul(37)).collect();
        let reference = checksum(&payload);

        for position in 0..payload.len() {
            for replacement in 0..=255u8 {
                if replacement == payload[position] {
                    continue;
                }
                let mut corrupted = payload.clone();
                corrupted[position] = replacement;
                assert_ne!(checksum(&corrupted), reference);
            }
        }
    }

    #[test]
    fn checksum_blind_spots() {
        // Permuted bytes collide.
        assert_eq!(checksum(&[1, 2, 3, 4]), checksum(&[4, 3, 2, 1]));
        // Compensating changes collide.
        assert_eq!(checksum(&[10, 20]), checksum(&[11, 19]));
    }
}
