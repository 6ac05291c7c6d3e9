//! Bounds-checked little-endian scalar reads and fixed-width ASCII string reads.
//!
//! Every function here is pure and allocation-free apart from the `String` that
//! [`read_fixed_ascii`] must produce; none of them depend on any other part of the
//! file (header, variable dictionary, or sample region).

use crate::error::{Result, TelemetryError};

fn slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    bytes.get(offset..offset + len).ok_or_else(|| {
        let found = bytes.len().saturating_sub(offset.min(bytes.len()));
        TelemetryError::truncated(offset as u64, len, found)
    })
}

pub fn read_u8(bytes: &[u8], offset: usize) -> Result<u8> {
    Ok(slice(bytes, offset, 1)?[0])
}

pub fn read_i32(bytes: &[u8], offset: usize) -> Result<i32> {
    let s = slice(bytes, offset, 4)?;
    Ok(i32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

pub fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let s = slice(bytes, offset, 4)?;
    Ok(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

pub fn read_f32(bytes: &[u8], offset: usize) -> Result<f32> {
    let s = slice(bytes, offset, 4)?;
    Ok(f32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

pub fn read_f64(bytes: &[u8], offset: usize) -> Result<f64> {
    let s = slice(bytes, offset, 8)?;
    Ok(f64::from_le_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]]))
}

/// Reads exactly `len` bytes starting at `offset`, stops at the first NUL, and decodes
/// the prefix byte-for-byte (bytes past a NUL are discarded; non-ASCII bytes pass
/// through as their numeric value rather than being validated or replaced).
pub fn read_fixed_ascii(bytes: &[u8], offset: usize, len: usize) -> Result<String> {
    let s = slice(bytes, offset, len)?;
    let end = s.iter().position(|&b| b == 0).unwrap_or(s.len());
    Ok(s[..end].iter().map(|&b| b as char).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_i32_round_trips() {
        let bytes = (-12345i32).to_le_bytes();
        assert_eq!(read_i32(&bytes, 0).unwrap(), -12345);
    }

    #[test]
    fn read_f32_round_trips() {
        let bytes = 12.5f32.to_le_bytes();
        assert_eq!(read_f32(&bytes, 0).unwrap(), 12.5);
    }

    #[test]
    fn read_f64_round_trips() {
        let bytes = (-0.125f64).to_le_bytes();
        assert_eq!(read_f64(&bytes, 0).unwrap(), -0.125);
    }

    #[test]
    fn scalar_reads_fail_on_truncation() {
        let bytes = [0u8; 2];
        assert!(matches!(read_i32(&bytes, 0), Err(TelemetryError::Truncated { .. })));
        assert!(matches!(read_f64(&bytes, 0), Err(TelemetryError::Truncated { .. })));
    }

    #[test]
    fn read_fixed_ascii_stops_at_nul() {
        let mut buf = [0u8; 8];
        buf[..5].copy_from_slice(b"Speed");
        assert_eq!(read_fixed_ascii(&buf, 0, 8).unwrap(), "Speed");
    }

    #[test]
    fn read_fixed_ascii_handles_no_terminator() {
        let buf = *b"12345678";
        assert_eq!(read_fixed_ascii(&buf, 0, 8).unwrap(), "12345678");
    }

    #[test]
    fn read_fixed_ascii_tolerates_non_ascii_bytes() {
        let buf = [0x80u8, 0x41, 0x00, 0x00];
        let s = read_fixed_ascii(&buf, 0, 4).unwrap();
        assert_eq!(s.chars().next().unwrap() as u32, 0x80);
        assert_eq!(s.chars().nth(1).unwrap(), 'A');
    }

    #[test]
    fn read_fixed_ascii_out_of_bounds_is_truncated() {
        let buf = [0u8; 4];
        assert!(matches!(read_fixed_ascii(&buf, 0, 8), Err(TelemetryError::Truncated { .. })));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_read_i32_round_trips_any_value(v in any::<i32>()) {
            let bytes = v.to_le_bytes();
            prop_assert_eq!(read_i32(&bytes, 0).unwrap(), v);
        }

        #[test]
        fn prop_read_f32_round_trips_finite_values(v in any::<f32>().prop_filter("finite", |v| v.is_finite())) {
            let bytes = v.to_le_bytes();
            prop_assert_eq!(read_f32(&bytes, 0).unwrap(), v);
        }

        #[test]
        fn prop_read_f64_round_trips_finite_values(v in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            let bytes = v.to_le_bytes();
            prop_assert_eq!(read_f64(&bytes, 0).unwrap(), v);
        }

        #[test]
        fn prop_read_fixed_ascii_never_exceeds_requested_len(
            name in "[a-zA-Z0-9_]{0,31}",
            pad in 0usize..16,
        ) {
            let len = name.len() + pad;
            let mut buf = vec![0u8; len];
            buf[..name.len()].copy_from_slice(name.as_bytes());
            let decoded = read_fixed_ascii(&buf, 0, len).unwrap();
            prop_assert_eq!(decoded, name);
        }

        #[test]
        fn prop_scalar_reads_never_panic_on_arbitrary_short_buffers(
            buf in prop::collection::vec(any::<u8>(), 0..8),
            offset in 0usize..12,
        ) {
            let _ = read_i32(&buf, offset);
            let _ = read_u32(&buf, offset);
            let _ = read_f32(&buf, offset);
            let _ = read_f64(&buf, offset);
        }
    }
}
