//! Store error taxonomy.
//!
//! Every per-operation failure is classified into a stable numeric code
//! recorded in the metric rows:
//!
//! - `-1` operation canceled by another task
//! - `-2` per-operation deadline exceeded
//! - `-3` client transport canceled or closed
//! - `-4` unclassified (bad endpoints, sentinel lock errors, unknown
//!   transport failures)
//! - positive codes: gRPC status codes reported by the target service
//! - `0` success

use snafu::{Location, Snafu};

/// Result type alias for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Code recorded for cancellations.
pub const CODE_CANCELED: i32 = -1;
/// Code recorded for per-operation deadline expiry.
pub const CODE_DEADLINE: i32 = -2;
/// Code recorded for closed client transports.
pub const CODE_CONN_CLOSED: i32 = -3;
/// Code recorded for everything the taxonomy cannot classify.
pub const CODE_UNCLASSIFIED: i32 = -4;

/// Errors surfaced by the target-store capability set.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The lock is held by another session. Sentinel, not a failure of the
    /// transport.
    #[snafu(display("lock is held by another session"))]
    Locked,

    /// The session's lease expired; its locks are gone.
    #[snafu(display("session lease expired"))]
    SessionExpired,

    /// The operation was canceled by another task.
    #[snafu(display("operation canceled by another task"))]
    Canceled,

    /// The per-operation deadline elapsed before a response arrived.
    #[snafu(display("request deadline exceeded"))]
    DeadlineExceeded,

    /// The client transport was canceled or closed underneath the call.
    #[snafu(display("client connection closed: {message}"))]
    ConnectionClosed {
        /// Transport detail.
        message: String,
    },

    /// Establishing a connection failed.
    #[snafu(display("connection error at {location}: {message}"))]
    Connection {
        /// Dial failure detail.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// The target service rejected the request with a status code.
    #[snafu(display("rpc error (code={code}): {message}"))]
    Rpc {
        /// Target-service status code.
        code: i32,
        /// Status message.
        message: String,
    },

    /// Anything the taxonomy cannot classify.
    #[snafu(display("store error: {message}"))]
    Other {
        /// Error detail.
        message: String,
    },
}

impl StoreError {
    /// Classifies the error into its `(status_code, status_text)` pair.
    #[must_use]
    pub fn status(&self) -> (i32, String) {
        match self {
            StoreError::Canceled => (CODE_CANCELED, self.to_string()),
            StoreError::DeadlineExceeded => (CODE_DEADLINE, self.to_string()),
            StoreError::ConnectionClosed { .. } => (CODE_CONN_CLOSED, self.to_string()),
            StoreError::Rpc { code, message } => (*code, message.clone()),
            _ => (CODE_UNCLASSIFIED, self.to_string()),
        }
    }

    /// True for the sentinel "someone else holds the lock" outcome.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, StoreError::Locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canceled_maps_to_minus_one() {
        assert_eq!(StoreError::Canceled.status().0, CODE_CANCELED);
    }

    #[test]
    fn test_deadline_maps_to_minus_two() {
        assert_eq!(StoreError::DeadlineExceeded.status().0, CODE_DEADLINE);
    }

    #[test]
    fn test_closed_transport_maps_to_minus_three() {
        let err = StoreError::ConnectionClosed {
            message: "channel closed".to_owned(),
        };
        assert_eq!(err.status().0, CODE_CONN_CLOSED);
    }

    #[test]
    fn test_rpc_code_passes_through() {
        let err = StoreError::Rpc {
            code: 14,
            message: "unavailable".to_owned(),
        };
        assert_eq!(err.status(), (14, "unavailable".to_owned()));
    }

    #[test]
    fn test_sentinels_are_unclassified() {
        assert_eq!(StoreError::Locked.status().0, CODE_UNCLASSIFIED);
        assert_eq!(StoreError::SessionExpired.status().0, CODE_UNCLASSIFIED);
        assert!(StoreError::Locked.is_locked());
        assert!(!StoreError::SessionExpired.is_locked());
    }
}
