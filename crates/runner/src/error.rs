//! Runner error types.

use std::path::PathBuf;

use snafu::{Location, Snafu};

/// Result type alias for runner operations.
pub type Result<T, E = RunnerError> = std::result::Result<T, E>;

/// Errors raised by the runner's own machinery.
///
/// Per-operation store failures are not errors at this level; they are
/// classified and recorded in the metric rows while the run continues.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RunnerError {
    /// Creating or writing the metrics file failed.
    #[snafu(display("metrics file {}: {source}", path.display()))]
    MetricsIo {
        /// Offending path.
        path: PathBuf,
        /// Underlying CSV/IO error.
        source: csv::Error,
    },

    /// A row was added after the sink was closed.
    #[snafu(display("metrics sink is closed"))]
    SinkClosed,

    /// A server push found no live control stream.
    #[snafu(display("no active control stream"))]
    NoActiveStream,

    /// The control stream went away mid-send.
    #[snafu(display("control stream closed while sending"))]
    StreamClosed,

    /// Pool construction or growth failed; fatal for the run.
    #[snafu(display("client pool error at {location}: {source}"))]
    Pool {
        /// Underlying store error.
        source: kvbench_store::StoreError,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Writing the generated key file failed.
    #[snafu(display("key file {}: {source}", path.display()))]
    KeyFile {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Synthetic data generation failed.
    #[snafu(display("data generation failed: {source}"))]
    Generate {
        /// Underlying generator error.
        source: kvbench_generator::GeneratorError,
    },
}
