//! Columnar Parquet export: resolves a variable projection against a file's
//! dictionary, builds one Arrow column per resolved variable plus two bookkeeping
//! columns, and writes the result with `parquet::arrow::ArrowWriter` (§4.E).

use std::fs;
use std::path::{Path, PathBuf};

use arrow_array::builder::{
    BooleanBuilder, Float32Builder, Float64Builder, Int32Builder, StringBuilder, UInt32Builder,
};
use arrow_array::{ArrayRef, RecordBatch, new_null_array};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, TelemetryError};
use crate::ibt::VariableDictionary;
use crate::ibt::sample::SampleView;
use crate::telemetry::Telemetry;
use crate::types::{Value, VariableType};

/// A plausible roster of variables a machine-learning pipeline over iRacing telemetry
/// would want, used when a caller asks for neither `include_all` nor an explicit
/// `projection`. Names not present in a given file's dictionary are handled per
/// [`ExportOptions::on_missing_variable`], same as any other projected name.
pub const DEFAULT_ML_ROSTER: &[&str] = &[
    "SessionTime",
    "Lap",
    "LapDistPct",
    "Speed",
    "RPM",
    "Gear",
    "Throttle",
    "Brake",
    "Clutch",
    "SteeringWheelAngle",
    "Lat",
    "Lon",
    "Alt",
    "VelocityX",
    "VelocityY",
    "VelocityZ",
    "YawRate",
    "Pitch",
    "Roll",
    "Yaw",
    "LatAccel",
    "LongAccel",
    "VertAccel",
    "FuelLevel",
    "FuelLevelPct",
    "FuelUsePerHour",
    "LFtempCL",
    "LFtempCM",
    "LFtempCR",
    "RFtempCL",
    "RFtempCM",
    "RFtempCR",
    "LRtempCL",
    "LRtempCM",
    "LRtempCR",
    "RRtempCL",
    "RRtempCM",
    "RRtempCR",
    "LFwearL",
    "RFwearL",
    "LRwearL",
    "RRwearL",
    "LFpressure",
    "RFpressure",
    "LRpressure",
    "RRpressure",
    "TrackTempCrew",
    "AirTemp",
];

/// What to do with a projected variable name that is absent from a file's
/// dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnMissingVariable {
    /// Silently exclude the column (the default).
    #[default]
    Drop,
    /// Keep the column, filled with nulls.
    NullColumn,
}

/// Controls which variables become Parquet columns and how a file's own dictionary
/// resolves that request.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// When true, export every variable in the file's dictionary; `projection` is
    /// ignored.
    pub include_all: bool,
    /// Explicit variable names to export, resolved case-insensitively. Ignored when
    /// `include_all` is set. When neither is set, [`DEFAULT_ML_ROSTER`] is used.
    pub projection: Option<Vec<String>>,
    pub on_missing_variable: OnMissingVariable,
}

/// A progress update emitted during a multi-file export.
#[derive(Debug, Clone, Copy)]
pub struct ExportProgress {
    pub files_done: usize,
    pub files_total: usize,
}

#[derive(Debug, Clone)]
struct ColumnPlan {
    /// Column name as it appears in the Parquet schema (the dictionary's canonical
    /// name when resolved, the requested name verbatim when unresolved).
    name: String,
    /// Index into the dictionary that produced this column's type, when resolved.
    source: Option<usize>,
    data_type: DataType,
}

fn requested_names(dictionary: &VariableDictionary, options: &ExportOptions) -> Vec<String> {
    if options.include_all {
        return dictionary.iter().map(|h| h.name.clone()).collect();
    }
    match &options.projection {
        Some(names) => names.clone(),
        None => DEFAULT_ML_ROSTER.iter().map(|s| s.to_string()).collect(),
    }
}

fn column_type_for(var_type: VariableType) -> DataType {
    match var_type {
        VariableType::Char => DataType::Utf8,
        VariableType::Bool => DataType::Boolean,
        VariableType::Int => DataType::Int32,
        VariableType::BitField => DataType::UInt32,
        VariableType::Float => DataType::Float32,
        VariableType::Double => DataType::Float64,
    }
}

fn resolve_projection(
    dictionary: &VariableDictionary,
    options: &ExportOptions,
) -> Result<Vec<ColumnPlan>> {
    let mut plans = Vec::new();
    for name in requested_names(dictionary, options) {
        match dictionary.index_of(&name) {
            Some(index) => {
                let header = dictionary.get_index(index).expect("index just resolved");
                plans.push(ColumnPlan {
                    name: header.name.clone(),
                    source: Some(index),
                    data_type: column_type_for(header.var_type),
                });
            }
            None => match options.on_missing_variable {
                OnMissingVariable::Drop => {
                    debug!(name, "projected variable not found in dictionary, dropping column");
                }
                OnMissingVariable::NullColumn => {
                    plans.push(ColumnPlan { name, source: None, data_type: DataType::Null });
                }
            },
        }
    }

    if plans.is_empty() {
        return Err(TelemetryError::ProjectionEmpty);
    }
    Ok(plans)
}

fn build_schema(plans: &[ColumnPlan]) -> SchemaRef {
    let mut fields = vec![
        Field::new("session_id", DataType::Utf8, false),
        Field::new("sample_idx", DataType::Int32, false),
    ];
    for plan in plans {
        fields.push(Field::new(&plan.name, plan.data_type.clone(), plan.source.is_none()));
    }
    std::sync::Arc::new(Schema::new(fields))
}

enum ColumnBuilder {
    Utf8(StringBuilder),
    Bool(BooleanBuilder),
    Int32(Int32Builder),
    UInt32(UInt32Builder),
    Float32(Float32Builder),
    Float64(Float64Builder),
    Null(usize),
}

impl ColumnBuilder {
    fn for_type(data_type: &DataType) -> Self {
        match data_type {
            DataType::Utf8 => ColumnBuilder::Utf8(StringBuilder::new()),
            DataType::Boolean => ColumnBuilder::Bool(BooleanBuilder::new()),
            DataType::Int32 => ColumnBuilder::Int32(Int32Builder::new()),
            DataType::UInt32 => ColumnBuilder::UInt32(UInt32Builder::new()),
            DataType::Float32 => ColumnBuilder::Float32(Float32Builder::new()),
            DataType::Float64 => ColumnBuilder::Float64(Float64Builder::new()),
            DataType::Null => ColumnBuilder::Null(0),
            other => unreachable!("column_type_for never produces {other:?}"),
        }
    }

    fn append(&mut self, value: &Value) {
        match (self, value.last_scalar()) {
            (ColumnBuilder::Utf8(b), Value::Char(s)) => b.append_value(s),
            (ColumnBuilder::Bool(b), Value::Bool(x)) => b.append_value(x),
            (ColumnBuilder::Int32(b), Value::Int(x)) => b.append_value(x),
            (ColumnBuilder::UInt32(b), Value::BitField(x)) => b.append_value(x),
            (ColumnBuilder::Float32(b), Value::Float(x)) => b.append_value(x),
            (ColumnBuilder::Float64(b), Value::Double(x)) => b.append_value(x),
            (ColumnBuilder::Null(count), _) => *count += 1,
            (builder, value) => {
                unreachable!("column builder/value type mismatch: {value:?} into {builder:?}")
            }
        }
    }

    fn append_null(&mut self) {
        match self {
            ColumnBuilder::Utf8(b) => b.append_null(),
            ColumnBuilder::Bool(b) => b.append_null(),
            ColumnBuilder::Int32(b) => b.append_null(),
            ColumnBuilder::UInt32(b) => b.append_null(),
            ColumnBuilder::Float32(b) => b.append_null(),
            ColumnBuilder::Float64(b) => b.append_null(),
            ColumnBuilder::Null(count) => *count += 1,
        }
    }

    fn finish(self, data_type: &DataType) -> ArrayRef {
        match self {
            ColumnBuilder::Utf8(mut b) => std::sync::Arc::new(b.finish()),
            ColumnBuilder::Bool(mut b) => std::sync::Arc::new(b.finish()),
            ColumnBuilder::Int32(mut b) => std::sync::Arc::new(b.finish()),
            ColumnBuilder::UInt32(mut b) => std::sync::Arc::new(b.finish()),
            ColumnBuilder::Float32(mut b) => std::sync::Arc::new(b.finish()),
            ColumnBuilder::Float64(mut b) => std::sync::Arc::new(b.finish()),
            ColumnBuilder::Null(count) => new_null_array(data_type, count),
        }
    }
}

impl std::fmt::Debug for ColumnBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ColumnBuilder::Utf8(_) => "Utf8",
            ColumnBuilder::Bool(_) => "Bool",
            ColumnBuilder::Int32(_) => "Int32",
            ColumnBuilder::UInt32(_) => "UInt32",
            ColumnBuilder::Float32(_) => "Float32",
            ColumnBuilder::Float64(_) => "Float64",
            ColumnBuilder::Null(_) => "Null",
        };
        f.write_str(kind)
    }
}

fn append_row(
    plans: &[ColumnPlan],
    builders: &mut [ColumnBuilder],
    view: &SampleView,
) -> Result<()> {
    for (plan, builder) in plans.iter().zip(builders.iter_mut()) {
        match plan.source {
            Some(index) => {
                let field = view.get_by_index(index).expect("resolved index stays valid");
                builder.append(&field.value);
            }
            None => builder.append_null(),
        }
    }
    Ok(())
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder().set_compression(Compression::ZSTD(Default::default())).build()
}

/// A Parquet writer that targets a `.tmp` sibling of the real output path, renamed
/// into place on success and deleted on any failure — a caller never observes a
/// partially written output file (§7).
struct AtomicParquetWriter {
    tmp_path: PathBuf,
    output_path: PathBuf,
    writer: ArrowWriter<fs::File>,
}

impl AtomicParquetWriter {
    fn create(schema: SchemaRef, output_path: &Path) -> Result<Self> {
        let tmp_path = output_path.with_extension("parquet.tmp");
        let file = fs::File::create(&tmp_path)
            .map_err(|source| TelemetryError::Io { path: tmp_path.clone(), source })?;
        let writer = ArrowWriter::try_new(file, schema, Some(writer_properties()))
            .map_err(|e| parquet_io_error(&tmp_path, e))?;
        Ok(AtomicParquetWriter { tmp_path, output_path: output_path.to_path_buf(), writer })
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer.write(batch).map_err(|e| parquet_io_error(&self.tmp_path, e))
    }

    fn finish(mut self) -> Result<()> {
        self.writer.close().map_err(|e| parquet_io_error(&self.tmp_path, e))?;
        fs::rename(&self.tmp_path, &self.output_path)
            .map_err(|source| TelemetryError::Io { path: self.output_path.clone(), source })
    }

    fn abort(self, err: TelemetryError) -> TelemetryError {
        let _ = fs::remove_file(&self.tmp_path);
        err
    }
}

fn parquet_io_error(path: &Path, error: parquet::errors::ParquetError) -> TelemetryError {
    TelemetryError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::other(error.to_string()),
    }
}

/// Exports one telemetry file to a single Parquet file. Returns the number of rows
/// written (the file's sample count).
pub fn export_parquet(
    telemetry: &Telemetry,
    output_path: &Path,
    options: &ExportOptions,
    cancel: CancellationToken,
) -> Result<u64> {
    let plans = resolve_projection(telemetry.variables(), options)?;
    let schema = build_schema(&plans);

    let mut session_id_builder = StringBuilder::new();
    let mut sample_idx_builder = Int32Builder::new();
    let mut builders: Vec<ColumnBuilder> =
        plans.iter().map(|p| ColumnBuilder::for_type(&p.data_type)).collect();

    let mut rows = 0u64;
    for view in telemetry.samples(cancel.clone())? {
        if cancel.is_cancelled() {
            return Err(TelemetryError::Cancelled);
        }
        let view = view?;
        session_id_builder.append_value(telemetry.session_id());
        sample_idx_builder.append_value(view.index() as i32);
        append_row(&plans, &mut builders, &view)?;
        rows += 1;
    }

    let mut columns: Vec<ArrayRef> =
        vec![std::sync::Arc::new(session_id_builder.finish()), std::sync::Arc::new(sample_idx_builder.finish())];
    for (plan, builder) in plans.iter().zip(builders) {
        columns.push(builder.finish(&plan.data_type));
    }

    let batch = RecordBatch::try_new(schema.clone(), columns)
        .map_err(|e| TelemetryError::Io { path: output_path.to_path_buf(), source: std::io::Error::other(e.to_string()) })?;

    let mut writer = AtomicParquetWriter::create(schema, output_path)?;
    if let Err(e) = writer.write(&batch) {
        return Err(writer.abort(e));
    }
    writer.finish()?;
    Ok(rows)
}

/// Exports several telemetry files into a single Parquet file, one `RecordBatch` per
/// source file. The schema is fixed by the first file; variables present there but
/// missing from a later file are filled with typed nulls rather than changing the
/// schema mid-stream, regardless of `on_missing_variable` (which governs resolution
/// against the *first* file only).
pub fn export_parquet_multi<L, P>(
    paths: &[PathBuf],
    output_path: &Path,
    options: &ExportOptions,
    loader: L,
    mut progress: P,
    cancel: CancellationToken,
) -> Result<u64>
where
    L: Fn(&Path) -> Result<Telemetry>,
    P: FnMut(ExportProgress),
{
    let Some(first_path) = paths.first() else {
        return Err(TelemetryError::ProjectionEmpty);
    };

    let plans = {
        let first = loader(first_path)?;
        resolve_projection(first.variables(), options)?
    };
    let schema = build_schema(&plans);

    let mut writer = AtomicParquetWriter::create(schema.clone(), output_path)?;
    let mut rows = 0u64;

    for (i, path) in paths.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(writer.abort(TelemetryError::Cancelled));
        }

        let telemetry = match loader(path) {
            Ok(t) => t,
            Err(e) => return Err(writer.abort(e)),
        };
        let batch = match build_file_batch(&telemetry, &plans, schema.clone(), cancel.clone()) {
            Ok(b) => b,
            Err(e) => return Err(writer.abort(e)),
        };
        rows += batch.num_rows() as u64;
        if let Err(e) = writer.write(&batch) {
            return Err(writer.abort(e));
        }

        progress(ExportProgress { files_done: i + 1, files_total: paths.len() });
    }

    writer.finish()?;
    Ok(rows)
}

fn build_file_batch(
    telemetry: &Telemetry,
    plans: &[ColumnPlan],
    schema: SchemaRef,
    cancel: CancellationToken,
) -> Result<RecordBatch> {
    let mut session_id_builder = StringBuilder::new();
    let mut sample_idx_builder = Int32Builder::new();
    let mut builders: Vec<ColumnBuilder> =
        plans.iter().map(|p| ColumnBuilder::for_type(&p.data_type)).collect();

    let local_indices: Vec<Option<usize>> = plans
        .iter()
        .map(|plan| telemetry.variables().index_of(&plan.name))
        .collect();
    for (plan, local) in plans.iter().zip(&local_indices) {
        if plan.source.is_some() && local.is_none() {
            warn!(
                path = %telemetry.path().display(),
                variable = %plan.name,
                "variable present in first file but missing here, filling with nulls",
            );
        }
    }

    for view in telemetry.samples(cancel.clone())? {
        if cancel.is_cancelled() {
            return Err(TelemetryError::Cancelled);
        }
        let view = view?;
        session_id_builder.append_value(telemetry.session_id());
        sample_idx_builder.append_value(view.index() as i32);
        for (local, builder) in local_indices.iter().zip(builders.iter_mut()) {
            match local {
                Some(index) => {
                    let field = view.get_by_index(*index).expect("resolved index stays valid");
                    builder.append(&field.value);
                }
                None => builder.append_null(),
            }
        }
    }

    let mut columns: Vec<ArrayRef> =
        vec![std::sync::Arc::new(session_id_builder.finish()), std::sync::Arc::new(sample_idx_builder.finish())];
    for (plan, builder) in plans.iter().zip(builders) {
        columns.push(builder.finish(&plan.data_type));
    }

    RecordBatch::try_new(schema, columns)
        .map_err(|e| TelemetryError::Io { path: telemetry.path().to_path_buf(), source: std::io::Error::other(e.to_string()) })
}
