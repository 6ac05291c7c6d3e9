//! Low-level `.ibt` file decoding: header, variable dictionary, session info YAML,
//! and the sample frame region. See [`crate::telemetry`] for the public handle built
//! on top of these pieces.

pub mod header;
pub mod primitives;
pub mod sample;
pub mod session_info;
pub mod variables;

pub use header::{DiskSubHeader, FileHeader, HEADER_END, decode_headers};
pub use sample::{FieldValue, SampleIterator, SampleView, read_sample_at};
pub use session_info::{OnSessionInfoError, decode_session_info, derive_session_id};
pub use variables::{VarHeader, VariableDictionary};
