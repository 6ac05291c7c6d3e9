//! Decodes the 112-byte file header and the 32-byte disk sub-header that follows it
//! contiguously at the start of every `.ibt` file (§4.B).

use std::io::{Read, Seek, SeekFrom};

use super::primitives::{read_f32, read_f64, read_i32};
use crate::error::{Result, TelemetryError};
use tracing::debug;

/// Absolute byte offset where the file header + disk sub-header end, and the
/// minimum legal value for any of the header's absolute offset fields.
pub const HEADER_END: i32 = 144;

const FILE_HEADER_SIZE: usize = 112;
const DISK_SUB_HEADER_SIZE: usize = 32;

/// The 112-byte `.ibt` file header: 28 little-endian `i32` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: i32,
    /// Opaque status word, stored verbatim; its bit layout is not interpreted here.
    pub status: i32,
    pub tick_rate: i32,
    pub session_info_update: i32,
    pub session_info_len: i32,
    pub session_info_offset: i32,
    pub num_vars: i32,
    pub var_header_offset: i32,
    pub num_buf: i32,
    pub buf_len: i32,
    pub buf_offset: i32,
}

impl FileHeader {
    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(FileHeader {
            version: read_i32(bytes, 0)?,
            status: read_i32(bytes, 4)?,
            tick_rate: read_i32(bytes, 8)?,
            session_info_update: read_i32(bytes, 12)?,
            session_info_len: read_i32(bytes, 16)?,
            session_info_offset: read_i32(bytes, 20)?,
            num_vars: read_i32(bytes, 24)?,
            var_header_offset: read_i32(bytes, 28)?,
            num_buf: read_i32(bytes, 32)?,
            buf_len: read_i32(bytes, 36)?,
            // offsets 40..52 are three reserved i32 slots, consumed but ignored
            buf_offset: read_i32(bytes, 52)?,
            // offsets 56..112 are fourteen reserved i32 slots, consumed but ignored
        })
    }

    fn validate(&self) -> Result<()> {
        if self.version != 2 {
            return Err(TelemetryError::UnsupportedVersion { found: self.version });
        }
        for (label, offset) in [
            ("session_info_offset", self.session_info_offset),
            ("var_header_offset", self.var_header_offset),
            ("buf_offset", self.buf_offset),
        ] {
            if offset < HEADER_END {
                return Err(header_layout_error(label, offset));
            }
        }
        if self.num_vars < 0 {
            return Err(header_layout_error("num_vars", self.num_vars));
        }
        if self.num_buf < 0 {
            return Err(header_layout_error("num_buf", self.num_buf));
        }
        if self.num_buf > 0 && self.buf_len <= 0 {
            return Err(header_layout_error("buf_len", self.buf_len));
        }
        Ok(())
    }
}

/// A header field's value is structurally inconsistent with a valid file layout.
///
/// The closed error set (§7) has no dedicated kind for this; it is treated as the
/// same "the file cannot be trusted to contain what its own header claims" category
/// as a short read, so it surfaces as [`TelemetryError::Truncated`].
fn header_layout_error(field: &str, value: i32) -> TelemetryError {
    debug!(field, value, "header field fails layout validation");
    TelemetryError::truncated(value.max(0) as u64, HEADER_END as usize, 0)
}

/// The 32-byte IBT-specific disk sub-header immediately following the file header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskSubHeader {
    pub start_date: f32,
    pub start_time: f64,
    pub end_time: f64,
    pub lap_count: i32,
    /// Nominally equal to `num_buf`, but never relied upon by the decoder.
    pub record_count: i32,
}

impl DiskSubHeader {
    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(DiskSubHeader {
            start_date: read_f32(bytes, 0)?,
            start_time: read_f64(bytes, 4)?,
            end_time: read_f64(bytes, 12)?,
            lap_count: read_i32(bytes, 20)?,
            record_count: read_i32(bytes, 24)?,
            // bytes 28..32 are trailing padding, discarded
        })
    }
}

/// Seeks to the start of `src`, decodes and validates the file header, then decodes
/// the disk sub-header that follows it (the cursor never leaves the first 144 bytes).
pub fn decode_headers<R: Read + Seek>(src: &mut R) -> Result<(FileHeader, DiskSubHeader)> {
    src.seek(SeekFrom::Start(0))?;
    let mut buf = [0u8; FILE_HEADER_SIZE + DISK_SUB_HEADER_SIZE];
    read_exact_checked(src, &mut buf, 0)?;

    let header = FileHeader::decode(&buf[..FILE_HEADER_SIZE])?;
    header.validate()?;
    let disk_header = DiskSubHeader::decode(&buf[FILE_HEADER_SIZE..])?;
    Ok((header, disk_header))
}

pub(crate) fn read_exact_checked<R: Read>(src: &mut R, buf: &mut [u8], offset: u64) -> Result<()> {
    let mut filled = 0usize;
    loop {
        match src.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(TelemetryError::truncated(offset, buf.len(), filled));
            }
            Ok(n) => {
                filled += n;
                if filled == buf.len() {
                    return Ok(());
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_header_bytes(version: i32, num_vars: i32, num_buf: i32, buf_len: i32) -> Vec<u8> {
        let mut buf = vec![0u8; 144];
        buf[0..4].copy_from_slice(&version.to_le_bytes());
        buf[4..8].copy_from_slice(&0i32.to_le_bytes()); // status
        buf[8..12].copy_from_slice(&60i32.to_le_bytes()); // tick_rate
        buf[12..16].copy_from_slice(&1i32.to_le_bytes()); // session_info_update
        buf[16..20].copy_from_slice(&100i32.to_le_bytes()); // session_info_len
        buf[20..24].copy_from_slice(&144i32.to_le_bytes()); // session_info_offset
        buf[24..28].copy_from_slice(&num_vars.to_le_bytes());
        buf[28..32].copy_from_slice(&300i32.to_le_bytes()); // var_header_offset
        buf[32..36].copy_from_slice(&num_buf.to_le_bytes());
        buf[36..40].copy_from_slice(&buf_len.to_le_bytes());
        buf[52..56].copy_from_slice(&1000i32.to_le_bytes()); // buf_offset
        buf
    }

    #[test]
    fn decodes_a_well_formed_header() {
        let bytes = make_header_bytes(2, 3, 10, 512);
        let mut cursor = Cursor::new(bytes);
        let (header, _disk) = decode_headers(&mut cursor).unwrap();
        assert_eq!(header.version, 2);
        assert_eq!(header.tick_rate, 60);
        assert_eq!(header.num_vars, 3);
        assert_eq!(header.num_buf, 10);
        assert_eq!(header.buf_len, 512);
        assert_eq!(header.buf_offset, 1000);
    }

    #[test]
    fn rejects_wrong_version() {
        let bytes = make_header_bytes(1, 0, 0, 0);
        let mut cursor = Cursor::new(bytes);
        let err = decode_headers(&mut cursor).unwrap_err();
        assert!(matches!(err, TelemetryError::UnsupportedVersion { found: 1 }));
    }

    #[test]
    fn rejects_buf_len_zero_with_nonzero_num_buf() {
        let bytes = make_header_bytes(2, 1, 5, 0);
        let mut cursor = Cursor::new(bytes);
        assert!(decode_headers(&mut cursor).is_err());
    }

    #[test]
    fn allows_zero_num_buf_and_zero_buf_len() {
        let bytes = make_header_bytes(2, 1, 0, 0);
        let mut cursor = Cursor::new(bytes);
        assert!(decode_headers(&mut cursor).is_ok());
    }

    #[test]
    fn rejects_truncated_file() {
        let bytes = vec![0u8; 10];
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(decode_headers(&mut cursor), Err(TelemetryError::Truncated { .. })));
    }

    #[test]
    fn decodes_disk_sub_header_fields() {
        let mut bytes = make_header_bytes(2, 0, 0, 0);
        bytes[144 - 32..144 - 28].copy_from_slice(&12.5f32.to_le_bytes());
        bytes[144 - 28..144 - 20].copy_from_slice(&1.0f64.to_le_bytes());
        bytes[144 - 20..144 - 12].copy_from_slice(&2.0f64.to_le_bytes());
        bytes[144 - 12..144 - 8].copy_from_slice(&3i32.to_le_bytes());
        bytes[144 - 8..144 - 4].copy_from_slice(&4i32.to_le_bytes());
        let mut cursor = Cursor::new(bytes);
        let (_header, disk) = decode_headers(&mut cursor).unwrap();
        assert_eq!(disk.start_date, 12.5);
        assert_eq!(disk.start_time, 1.0);
        assert_eq!(disk.end_time, 2.0);
        assert_eq!(disk.lap_count, 3);
        assert_eq!(disk.record_count, 4);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_any_valid_header_decodes_and_round_trips_its_fields(
            num_vars in 0..64_i32,
            num_buf in 0..64_i32,
            buf_len in 1..4096_i32,
        ) {
            let bytes = make_header_bytes(2, num_vars, num_buf, buf_len);
            let mut cursor = Cursor::new(bytes);
            let (header, _disk) = decode_headers(&mut cursor).unwrap();
            prop_assert_eq!(header.num_vars, num_vars);
            prop_assert_eq!(header.num_buf, num_buf);
            prop_assert_eq!(header.buf_len, buf_len);
            prop_assert!(header.buf_offset >= HEADER_END);
            prop_assert!(header.var_header_offset >= HEADER_END);
            prop_assert!(header.session_info_offset >= HEADER_END);
        }

        #[test]
        fn prop_zero_or_negative_buf_len_with_frames_always_rejected(
            num_buf in 1..64_i32,
            buf_len in -10..=0_i32,
        ) {
            let bytes = make_header_bytes(2, 0, num_buf, buf_len);
            let mut cursor = Cursor::new(bytes);
            prop_assert!(decode_headers(&mut cursor).is_err());
        }

        #[test]
        fn prop_any_version_other_than_two_is_unsupported(version in any::<i32>().prop_filter("not 2", |v| *v != 2)) {
            let bytes = make_header_bytes(version, 0, 0, 0);
            let mut cursor = Cursor::new(bytes);
            let err = decode_headers(&mut cursor).unwrap_err();
            prop_assert!(matches!(err, TelemetryError::UnsupportedVersion { found } if found == version));
        }
    }
}
