//! The streaming, single-pass, cancellable sample iterator and the typed view it
//! yields for each frame (§4.D).

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::header::read_exact_checked;
use super::primitives::{read_f32, read_f64, read_fixed_ascii, read_i32, read_u32, read_u8};
use super::variables::{VarHeader, VariableDictionary};
use crate::error::Result;
use crate::types::{Value, VariableType};

/// One field read out of a [`SampleView`]: the decoded value plus the dictionary
/// metadata that described it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub name: String,
    pub value: Value,
    pub unit: String,
    pub description: String,
}

/// A single `buf_len`-byte sample frame together with the dictionary needed to make
/// sense of it.
///
/// Views own an `Arc<[u8]>` snapshot of their frame rather than borrowing the
/// iterator's internal buffer, the same sharing pattern the dictionary lookup table
/// uses elsewhere in this crate: a view is cheap to keep around after the iterator
/// has moved on, at the cost of one copy per frame instead of zero.
#[derive(Debug, Clone)]
pub struct SampleView {
    data: Arc<[u8]>,
    dictionary: Arc<VariableDictionary>,
    index: usize,
}

impl SampleView {
    fn new(data: Arc<[u8]>, dictionary: Arc<VariableDictionary>, index: usize) -> Self {
        SampleView { data, dictionary, index }
    }

    /// The zero-based frame index within the file.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Looks up a variable by case-insensitive name and decodes its value from this
    /// frame. Returns `None` if the name is not in the dictionary.
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        let header = self.dictionary.get(name)?;
        let value = decode_value(&self.data, header).ok()?;
        Some(FieldValue {
            name: header.name.clone(),
            value,
            unit: header.unit.clone(),
            description: header.description.clone(),
        })
    }

    /// Decodes the value of the dictionary entry at `index`, bypassing the
    /// name-lookup hash. Used by the exporter, which resolves variables to indices
    /// once per file rather than once per frame.
    pub fn get_by_index(&self, index: usize) -> Option<FieldValue> {
        let header = self.dictionary.get_index(index)?;
        let value = decode_value(&self.data, header).ok()?;
        Some(FieldValue {
            name: header.name.clone(),
            value,
            unit: header.unit.clone(),
            description: header.description.clone(),
        })
    }

    /// An ordered mapping of every dictionary variable to its value in this frame,
    /// in dictionary (file declaration) order.
    pub fn to_map(&self) -> Vec<(String, FieldValue)> {
        self.dictionary
            .iter()
            .filter_map(|header| {
                let value = decode_value(&self.data, header).ok()?;
                Some((
                    header.name.clone(),
                    FieldValue {
                        name: header.name.clone(),
                        value,
                        unit: header.unit.clone(),
                        description: header.description.clone(),
                    },
                ))
            })
            .collect()
    }
}

fn decode_value(data: &[u8], header: &VarHeader) -> Result<Value> {
    let offset = header.offset as usize;
    let count = header.count as usize;

    if header.var_type == VariableType::Char {
        return if count <= 1 {
            let byte = read_u8(data, offset)?;
            Ok(Value::Char(if byte == 0 { String::new() } else { (byte as char).to_string() }))
        } else {
            Ok(Value::Char(read_fixed_ascii(data, offset, count)?))
        };
    }

    if count <= 1 {
        return Ok(match header.var_type {
            VariableType::Bool => Value::Bool(read_u8(data, offset)? != 0),
            VariableType::Int => Value::Int(read_i32(data, offset)?),
            VariableType::BitField => Value::BitField(read_u32(data, offset)?),
            VariableType::Float => Value::Float(read_f32(data, offset)?),
            VariableType::Double => Value::Double(read_f64(data, offset)?),
            VariableType::Char => unreachable!("handled above"),
        });
    }

    Ok(match header.var_type {
        VariableType::Bool => Value::BoolArray(
            (0..count).map(|i| Ok(read_u8(data, offset + i)? != 0)).collect::<Result<_>>()?,
        ),
        VariableType::Int => Value::IntArray(
            (0..count).map(|i| read_i32(data, offset + i * 4)).collect::<Result<_>>()?,
        ),
        VariableType::BitField => Value::BitFieldArray(
            (0..count).map(|i| read_u32(data, offset + i * 4)).collect::<Result<_>>()?,
        ),
        VariableType::Float => Value::FloatArray(
            (0..count).map(|i| read_f32(data, offset + i * 4)).collect::<Result<_>>()?,
        ),
        VariableType::Double => Value::DoubleArray(
            (0..count).map(|i| read_f64(data, offset + i * 8)).collect::<Result<_>>()?,
        ),
        VariableType::Char => unreachable!("handled above"),
    })
}

/// A lazy, finite, single-pass sequence of [`SampleView`]s over one file's sample
/// region, driven by repeated calls to [`Iterator::next`].
///
/// Peak working set is one `buf_len`-byte read buffer plus fixed overhead: frames are
/// never buffered ahead, and the iterator holds no more than the current frame at a
/// time regardless of `num_buf`.
pub struct SampleIterator<R> {
    reader: R,
    dictionary: Arc<VariableDictionary>,
    buf_len: usize,
    buf_offset: u64,
    num_buf: usize,
    next_index: usize,
    cancel: CancellationToken,
    done: bool,
}

impl<R: Read + Seek> SampleIterator<R> {
    pub fn new(
        reader: R,
        dictionary: Arc<VariableDictionary>,
        buf_offset: u64,
        buf_len: usize,
        num_buf: usize,
        cancel: CancellationToken,
    ) -> Self {
        SampleIterator {
            reader,
            dictionary,
            buf_len,
            buf_offset,
            num_buf,
            next_index: 0,
            cancel,
            done: false,
        }
    }

    fn read_frame(&mut self, index: usize) -> Result<SampleView> {
        let offset = self.buf_offset + (index * self.buf_len) as u64;
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.buf_len];
        read_exact_checked(&mut self.reader, &mut buf, offset)?;
        Ok(SampleView::new(Arc::from(buf.into_boxed_slice()), Arc::clone(&self.dictionary), index))
    }
}

impl<R: Read + Seek> Iterator for SampleIterator<R> {
    type Item = Result<SampleView>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next_index >= self.num_buf {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.done = true;
            return None;
        }

        let index = self.next_index;
        self.next_index += 1;
        match self.read_frame(index) {
            Ok(view) => Some(Ok(view)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Random-access read of the `index`-th sample frame, using its own seek rather than
/// the streaming iterator's cursor so the two never interfere with each other.
///
/// Observes `cancel` before performing the read, the same cancellation contract
/// [`SampleIterator::next`] honors for streaming reads (§5).
pub fn read_sample_at<R: Read + Seek>(
    reader: &mut R,
    dictionary: Arc<VariableDictionary>,
    buf_offset: u64,
    buf_len: usize,
    num_buf: usize,
    index: usize,
    cancel: &CancellationToken,
) -> Result<SampleView> {
    if cancel.is_cancelled() {
        return Err(crate::error::TelemetryError::Cancelled);
    }
    if index >= num_buf {
        return Err(crate::error::TelemetryError::truncated(
            buf_offset + (index * buf_len) as u64,
            buf_len,
            0,
        ));
    }
    let offset = buf_offset + (index * buf_len) as u64;
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; buf_len];
    read_exact_checked(reader, &mut buf, offset)?;
    Ok(SampleView::new(Arc::from(buf.into_boxed_slice()), dictionary, index))
}
