//! Decodes iRacing `.ibt` telemetry files and exports them as columnar Parquet
//! datasets.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use ibtkit::{Telemetry, TelemetryOptions};
//! use ibtkit::export::{export_parquet, ExportOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # fn main() -> ibtkit::Result<()> {
//! let telemetry = Telemetry::open("session.ibt", TelemetryOptions::default())?;
//! println!("session {} has {} samples", telemetry.session_id(), telemetry.len());
//!
//! for sample in telemetry.samples(CancellationToken::new())? {
//!     let sample = sample?;
//!     if let Some(speed) = sample.get("Speed") {
//!         println!("sample {}: {:?}", sample.index(), speed.value);
//!     }
//! }
//!
//! export_parquet(&telemetry, "session.parquet".as_ref(), &ExportOptions::default(), CancellationToken::new())?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod export;
pub mod ibt;
mod telemetry;
pub mod types;

pub use error::{Result, TelemetryError};
pub use ibt::{FieldValue, FileHeader, DiskSubHeader, OnSessionInfoError, SampleIterator, SampleView, VarHeader, VariableDictionary};
pub use telemetry::{Telemetry, TelemetryOptions};
pub use types::{Value, VariableType};

/// Installs a process-wide `tracing` subscriber reading its filter from `RUST_LOG`
/// (defaulting to `info`), for binaries embedding this crate that have not already set
/// one up themselves.
///
/// A library should not normally install a global subscriber on its embedder's behalf,
/// which is why this is opt-in behind the `tracing-init` feature rather than called from
/// [`Telemetry::open`] or anywhere else in the crate.
#[cfg(feature = "tracing-init")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
