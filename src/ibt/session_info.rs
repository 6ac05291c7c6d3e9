//! Extracts the YAML session-metadata blob and parses it into a loose, schema-free tree
//! (§3, §4.C).
//!
//! iRacing's YAML output is not always clean: it can contain trailing NUL padding and,
//! on some SDK versions, stray control bytes left over from fixed-width padding inside
//! the blob itself. This module strips both before handing the text to `serde_yaml_ng`.

use std::io::{Read, Seek, SeekFrom};

use serde_yaml_ng::Value;

use super::header::{FileHeader, read_exact_checked};
use crate::error::{Result, TelemetryError};

/// What to do when the session-info YAML fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnSessionInfoError {
    /// Propagate `SessionInfoMalformed` (the default).
    #[default]
    Fail,
    /// Proceed with an empty mapping.
    Empty,
}

/// Reads `session_info_len` bytes at `session_info_offset`, strips trailing NULs,
/// decodes as UTF-8, and parses the result as YAML.
pub fn decode_session_info<R: Read + Seek>(
    src: &mut R,
    header: &FileHeader,
    policy: OnSessionInfoError,
) -> Result<Value> {
    let len = usize::try_from(header.session_info_len).unwrap_or(0);
    if len == 0 {
        return Ok(empty_mapping());
    }

    src.seek(SeekFrom::Start(header.session_info_offset as u64))?;
    let mut buf = vec![0u8; len];
    read_exact_checked(src, &mut buf, header.session_info_offset as u64)?;

    while buf.last() == Some(&0) {
        buf.pop();
    }

    let text = match String::from_utf8(buf) {
        Ok(text) => text,
        Err(e) => return malformed_or_empty(policy, e.to_string()),
    };
    let text = strip_control_characters(&text);

    match serde_yaml_ng::from_str::<Value>(&text) {
        Ok(value) => Ok(value),
        Err(e) => malformed_or_empty(policy, e.to_string()),
    }
}

/// Drops stray control bytes (everything but `\n`, `\r`, `\t`) left over from
/// fixed-width padding, which would otherwise make a standards-conformant YAML
/// parser reject an otherwise well-formed blob.
fn strip_control_characters(text: &str) -> String {
    text.chars()
        .filter(|&c| !matches!(c, '\x00'..='\x08' | '\x0B'..='\x0C' | '\x0E'..='\x1F'))
        .collect()
}

fn malformed_or_empty(policy: OnSessionInfoError, details: String) -> Result<Value> {
    match policy {
        OnSessionInfoError::Fail => Err(TelemetryError::SessionInfoMalformed { details }),
        OnSessionInfoError::Empty => Ok(empty_mapping()),
    }
}

fn empty_mapping() -> Value {
    Value::Mapping(serde_yaml_ng::Mapping::new())
}

/// Derives `"{SubSessionID}-{SessionID}"` from `WeekendInfo`; a missing side becomes
/// an empty string, so an entirely absent `WeekendInfo` yields `"-"` (§3, §4.C).
pub fn derive_session_id(session_info: &Value) -> String {
    let weekend = mapping_get(session_info, "WeekendInfo");
    let sub_session_id =
        weekend.and_then(|w| mapping_get(w, "SubSessionID")).map(stringify).unwrap_or_default();
    let session_id =
        weekend.and_then(|w| mapping_get(w, "SessionID")).map(stringify).unwrap_or_default();
    format!("{sub_session_id}-{session_id}")
}

/// Looks up a string key in a YAML mapping without relying on `Value`/`Mapping`
/// indexing helpers that may not exist across `serde_yaml` forks; mirrors the
/// plain iteration the session discovery code already uses.
fn mapping_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Mapping(map) => map.iter().find(|(k, _)| k.as_str() == Some(key)).map(|(_, v)| v),
        _ => None,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
