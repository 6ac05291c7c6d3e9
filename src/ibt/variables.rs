//! Decodes the `num_vars`-element array of 144-byte variable headers and builds the
//! case-insensitive dictionary that gives every sample frame its meaning (§3, §4.B).

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use super::header::{FileHeader, read_exact_checked};
use super::primitives::{read_fixed_ascii, read_i32, read_u8};
use crate::error::{Result, TelemetryError};
use crate::types::VariableType;

const VAR_HEADER_SIZE: usize = 144;
const NAME_LEN: usize = 32;
const DESC_LEN: usize = 64;
const UNIT_LEN: usize = 32;

/// One decoded 144-byte variable header: a name, type, and its location within every
/// sample frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VarHeader {
    pub var_type: VariableType,
    /// Byte offset of this variable's first element within a sample frame.
    pub offset: i32,
    /// Element arity: 1 for a scalar, >1 for an array.
    pub count: i32,
    pub count_as_time: bool,
    pub name: String,
    pub description: String,
    pub unit: String,
}

impl VarHeader {
    fn decode(bytes: &[u8], index: usize, buf_len: i32) -> Result<Self> {
        let tag = read_i32(bytes, 0)?;
        let offset = read_i32(bytes, 4)?;
        let count = read_i32(bytes, 8)?;
        let count_as_time = read_u8(bytes, 12)? != 0;
        let name = read_fixed_ascii(bytes, 16, NAME_LEN)?;
        let description = read_fixed_ascii(bytes, 16 + NAME_LEN, DESC_LEN)?;
        let unit = read_fixed_ascii(bytes, 16 + NAME_LEN + DESC_LEN, UNIT_LEN)?;

        let var_type = VariableType::from_tag(tag)
            .ok_or(TelemetryError::UnknownVarType { index, name: name.clone(), tag })?;

        if count < 1 {
            return Err(TelemetryError::VarOutOfFrame { name, offset, count, buf_len });
        }
        let end = offset.checked_add(count.saturating_mul(var_type.width() as i32));
        if offset < 0 || end.is_none_or(|end| end > buf_len) {
            return Err(TelemetryError::VarOutOfFrame { name, offset, count, buf_len });
        }

        Ok(VarHeader { var_type, offset, count, count_as_time, name, description, unit })
    }
}

/// The ordered, case-insensitive-lookup variable dictionary for one file.
///
/// Variables keep file order; looking a name up is O(1) regardless of case. A
/// duplicate name (case-insensitively) keeps its first occurrence and records the
/// second in [`VariableDictionary::duplicate_warnings`] rather than erroring or logging.
#[derive(Debug, Clone, Default)]
pub struct VariableDictionary {
    headers: Vec<VarHeader>,
    by_lower_name: HashMap<String, usize>,
    pub duplicate_warnings: Vec<String>,
}

impl VariableDictionary {
    pub fn decode<R: Read + Seek>(src: &mut R, header: &FileHeader) -> Result<Self> {
        let num_vars = usize::try_from(header.num_vars).unwrap_or(0);
        let mut dict = VariableDictionary {
            headers: Vec::with_capacity(num_vars),
            by_lower_name: HashMap::with_capacity(num_vars),
            duplicate_warnings: Vec::new(),
        };
        if num_vars == 0 {
            return Ok(dict);
        }

        src.seek(SeekFrom::Start(header.var_header_offset as u64))?;
        let mut buf = [0u8; VAR_HEADER_SIZE];
        for index in 0..num_vars {
            read_exact_checked(src, &mut buf, header.var_header_offset as u64 + (index * VAR_HEADER_SIZE) as u64)?;
            let var_header = VarHeader::decode(&buf, index, header.buf_len)?;
            dict.insert(var_header);
        }
        Ok(dict)
    }

    fn insert(&mut self, var_header: VarHeader) {
        let lower = var_header.name.to_ascii_lowercase();
        if self.by_lower_name.contains_key(&lower) {
            self.duplicate_warnings.push(var_header.name.clone());
            return;
        }
        let position = self.headers.len();
        self.by_lower_name.insert(lower, position);
        self.headers.push(var_header);
    }

    /// Case-insensitive index lookup.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_lower_name.get(&name.to_ascii_lowercase()).copied()
    }

    /// Case-insensitive variable lookup.
    pub fn get(&self, name: &str) -> Option<&VarHeader> {
        self.index_of(name).map(|i| &self.headers[i])
    }

    pub fn get_index(&self, index: usize) -> Option<&VarHeader> {
        self.headers.get(index)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VarHeader> {
        self.headers.iter()
    }
}
