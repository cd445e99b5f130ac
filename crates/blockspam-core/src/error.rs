//! Task and decode errors.

use std::time::Duration;

use thiserror::Error;

/// Boxed error used for the opaque failures of external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a single task did not produce a summary.
///
/// Every variant stops only the task that produced it; sibling tasks and the
/// run itself continue.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Dialing or transport setup failed.
    #[error("connection failed: {source}")]
    Connection {
        #[source]
        source: BoxError,
    },

    /// A named remote-call stage failed.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: BoxError,
    },

    /// The task deadline passed while the stage was in flight.
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    /// The run was cancelled while the stage was in flight.
    #[error("{stage} cancelled")]
    Cancelled { stage: &'static str },

    /// The fetched data could not be turned into a summary.
    #[error("decode failed: {source}")]
    Decode {
        #[source]
        source: BoxError,
    },

    /// The task panicked or was aborted before reporting.
    #[error("task aborted: {reason}")]
    Aborted { reason: String },
}

impl TaskError {
    /// Name of the stage that failed, if the failure belongs to one.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Self::Connection { .. } => Some(crate::stage::CONNECT),
            Self::Stage { stage, .. } | Self::Timeout { stage, .. } | Self::Cancelled { stage } => {
                Some(stage)
            }
            Self::Decode { .. } => Some(crate::stage::DECODE),
            Self::Aborted { .. } => None,
        }
    }

    /// Returns true if the task ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if the run was cancelled underneath the task.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Errors turning raw node responses into domain types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A required field was absent from the response.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A fixed-size field had the wrong length.
    #[error("invalid length for {field}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An event could not be interpreted.
    #[error("malformed event #{index}: {reason}")]
    MalformedEvent { index: usize, reason: String },

    /// A transaction could not be interpreted.
    #[error("malformed transaction #{index}: {reason}")]
    MalformedTransaction { index: usize, reason: String },

    /// A numeric field does not fit its domain type.
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: u64 },

    /// A hex-encoded value could not be parsed.
    #[error("invalid hex in {field}: {reason}")]
    InvalidHex { field: &'static str, reason: String },
}
