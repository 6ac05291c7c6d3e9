//! The public handle for an opened `.ibt` file: headers, variable dictionary, session
//! info, and the two ways to read sample frames (streaming and random-access).

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, TelemetryError};
use crate::ibt::header::{DiskSubHeader, FileHeader, decode_headers};
use crate::ibt::sample::{SampleIterator, SampleView, read_sample_at};
use crate::ibt::session_info::{OnSessionInfoError, decode_session_info, derive_session_id};
use crate::ibt::variables::VariableDictionary;

/// Options controlling how [`Telemetry::open`] handles recoverable decode problems.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryOptions {
    pub on_session_info_error: OnSessionInfoError,
}

/// An opened `.ibt` file: its headers and variable dictionary decoded up front, its
/// sample frames read lazily on demand.
///
/// Streaming ([`Telemetry::samples`]) and random access ([`Telemetry::sample_at`])
/// each open their own file handle so neither call disturbs the other's cursor.
pub struct Telemetry {
    path: PathBuf,
    header: FileHeader,
    disk_header: DiskSubHeader,
    variables: Arc<VariableDictionary>,
    session_info: serde_yaml_ng::Value,
    session_id: String,
}

impl Telemetry {
    /// Opens and fully decodes a file's header, variable dictionary, and session info.
    /// Does not read any sample frames.
    pub fn open<P: AsRef<Path>>(path: P, options: TelemetryOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = open_file(&path)?;

        let (header, disk_header) = decode_headers(&mut file)?;
        // Duplicate variable names are reported to the caller through
        // `VariableDictionary::duplicate_warnings` only; §4.B is explicit that this is not a
        // logging event, so no `tracing` call is made here.
        let variables = Arc::new(VariableDictionary::decode(&mut file, &header)?);

        let session_info =
            decode_session_info(&mut file, &header, options.on_session_info_error)?;
        let session_id = derive_session_id(&session_info);

        Ok(Telemetry { path, header, disk_header, variables, session_info, session_id })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn disk_header(&self) -> &DiskSubHeader {
        &self.disk_header
    }

    pub fn variables(&self) -> &VariableDictionary {
        &self.variables
    }

    pub fn session_info(&self) -> &serde_yaml_ng::Value {
        &self.session_info
    }

    /// `"{SubSessionID}-{SessionID}"`, derived from `WeekendInfo` at open time.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Number of sample frames in this file.
    pub fn len(&self) -> usize {
        self.header.num_buf.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A streaming, single-pass, cancellable iterator over every sample frame in file
    /// order, starting from its own independent file handle.
    pub fn samples(&self, cancel: CancellationToken) -> Result<SampleIterator<File>> {
        let file = open_file(&self.path)?;
        Ok(SampleIterator::new(
            file,
            Arc::clone(&self.variables),
            self.header.buf_offset as u64,
            self.header.buf_len.max(0) as usize,
            self.len(),
            cancel,
        ))
    }

    /// Decodes a single sample frame by index without disturbing any in-progress
    /// [`Telemetry::samples`] iteration.
    pub fn sample_at(&self, index: usize, cancel: CancellationToken) -> Result<SampleView> {
        let mut file = open_file(&self.path)?;
        read_sample_at(
            &mut file,
            Arc::clone(&self.variables),
            self.header.buf_offset as u64,
            self.header.buf_len.max(0) as usize,
            self.len(),
            index,
            &cancel,
        )
    }
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            TelemetryError::NotFound { path: path.to_path_buf() }
        } else {
            TelemetryError::Io { path: path.to_path_buf(), source }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn var_header_bytes(tag: i32, offset: i32, count: i32, name: &str) -> Vec<u8> {
        let mut buf = vec![0u8; 144];
        buf[0..4].copy_from_slice(&tag.to_le_bytes());
        buf[4..8].copy_from_slice(&offset.to_le_bytes());
        buf[8..12].copy_from_slice(&count.to_le_bytes());
        let name_bytes = name.as_bytes();
        buf[16..16 + name_bytes.len()].copy_from_slice(name_bytes);
        buf
    }

    fn write_sample_file(dir: &Path, yaml: &str, vars: &[(i32, i32, i32, &str)], frames: &[Vec<u8>]) -> PathBuf {
        let mut yaml_bytes = yaml.as_bytes().to_vec();
        yaml_bytes.push(0);
        let session_info_len = yaml_bytes.len() as i32;
        let session_info_offset = 144i32;
        let num_vars = vars.len() as i32;
        let var_header_offset = session_info_offset + session_info_len;
        let buf_len: i32 = frames.first().map(|f| f.len() as i32).unwrap_or(0);
        let buf_offset = var_header_offset + num_vars * 144;

        let mut file = vec![0u8; 144];
        file[0..4].copy_from_slice(&2i32.to_le_bytes());
        file[16..20].copy_from_slice(&session_info_len.to_le_bytes());
        file[20..24].copy_from_slice(&session_info_offset.to_le_bytes());
        file[24..28].copy_from_slice(&num_vars.to_le_bytes());
        file[28..32].copy_from_slice(&var_header_offset.to_le_bytes());
        file[32..36].copy_from_slice(&(frames.len() as i32).to_le_bytes());
        file[36..40].copy_from_slice(&buf_len.to_le_bytes());
        file[52..56].copy_from_slice(&buf_offset.to_le_bytes());

        file.extend(&yaml_bytes);
        for (tag, offset, count, name) in vars {
            file.extend(var_header_bytes(*tag, *offset, *count, name));
        }
        for frame in frames {
            file.extend(frame);
        }

        let path = dir.join("session.ibt");
        let mut f = File::create(&path).unwrap();
        f.write_all(&file).unwrap();
        path
    }

    #[test]
    fn opens_file_and_exposes_metadata() {
        let dir = std::env::temp_dir().join(format!("ibtkit-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let yaml = "WeekendInfo:\n  SubSessionID: 1\n  SessionID: 2\n";
        let vars = [(4, 0, 1, "Speed")];
        let frame = 12.5f32.to_le_bytes().to_vec();
        let path = write_sample_file(&dir, yaml, &vars, &[frame]);

        let telemetry = Telemetry::open(&path, TelemetryOptions::default()).unwrap();
        assert_eq!(telemetry.session_id(), "1-2");
        assert_eq!(telemetry.len(), 1);
        assert_eq!(telemetry.variables().len(), 1);

        let view = telemetry.sample_at(0, CancellationToken::new()).unwrap();
        assert_eq!(view.get("Speed").unwrap().value, crate::types::Value::Float(12.5));

        let collected: Vec<_> =
            telemetry.samples(CancellationToken::new()).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(collected.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = Telemetry::open("/nonexistent/path.ibt", TelemetryOptions::default()).unwrap_err();
        assert!(matches!(err, TelemetryError::NotFound { .. }));
    }

    #[test]
    fn sample_at_observes_a_pre_cancelled_token() {
        let dir = std::env::temp_dir().join(format!("ibtkit-test-cancel-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let yaml = "WeekendInfo:\n  SubSessionID: 1\n  SessionID: 2\n";
        let vars = [(4, 0, 1, "Speed")];
        let frame = 12.5f32.to_le_bytes().to_vec();
        let path = write_sample_file(&dir, yaml, &vars, &[frame]);

        let telemetry = Telemetry::open(&path, TelemetryOptions::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = telemetry.sample_at(0, cancel).unwrap_err();
        assert!(matches!(err, TelemetryError::Cancelled));

        std::fs::remove_dir_all(&dir).ok();
    }
}
