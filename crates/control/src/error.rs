//! Controller error types.

use std::path::PathBuf;

use snafu::Snafu;

/// Result type alias for controller operations.
pub type Result<T, E = ControlError> = std::result::Result<T, E>;

/// Errors surfaced by `benchctl`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ControlError {
    /// `$HOME` is not set, so the config directory cannot be located.
    #[snafu(display("HOME is not set; cannot locate the config directory"))]
    NoHome,

    /// No persisted configuration exists yet.
    #[snafu(display("Config not found, please run 'benchctl config init' first"))]
    MissingConfig,

    /// Filesystem access to the config directory failed.
    #[snafu(display("config dir {}: {source}", path.display()))]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration failed to parse or validate.
    #[snafu(display("{source}"))]
    Config {
        /// Underlying configuration error.
        source: kvbench_types::ConfigError,
    },

    /// `config set` was not given `field=value`.
    #[snafu(display("invalid format. Use: field=value"))]
    InvalidAssignment,

    /// The named field does not exist.
    #[snafu(display("field {field} not found"))]
    UnknownField {
        /// Requested field name.
        field: String,
    },

    /// The provided value does not fit the field's type.
    #[snafu(display("invalid value for {field}: {message}"))]
    InvalidValue {
        /// Field being set.
        field: String,
        /// Why the value was rejected.
        message: String,
    },

    /// Dialing the runner failed.
    #[snafu(display("failed to reach the runner: {source}"))]
    Transport {
        /// Underlying transport error.
        source: tonic::transport::Error,
    },

    /// The control stream failed.
    #[snafu(display("control stream error: {source}"))]
    Stream {
        /// Underlying status.
        source: tonic::Status,
    },

    /// The runner rejected the configuration.
    #[snafu(display("runner rejected the configuration"))]
    ConfigRejected,

    /// The stream closed while a send was in flight.
    #[snafu(display("control stream closed unexpectedly"))]
    StreamClosed,
}
