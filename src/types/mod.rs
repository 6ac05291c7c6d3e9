//! Runtime value types shared between the decoder and the exporter.
//!
//! [`VariableType`] is the closed set of six on-disk scalar types; [`Value`] is the
//! decoded runtime value a [`crate::ibt::sample::SampleView`] hands back for a given
//! variable name.

mod variable_type;

pub use variable_type::{Value, VariableType};
