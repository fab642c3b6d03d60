//! Stream error types.

use crate::storage::StoreError;

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Cause of an optimistic concurrency conflict on a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcurrencyConflict {
    /// The header's etag no longer matches the stored one.
    StreamChanged,
    /// A transient header was written but a header row already exists.
    StreamAlreadyExists,
    /// The store could not tell which of the two above happened.
    StreamChangedOrExists,
    /// Another writer already recorded an event at this version.
    EventVersionExists { version: u64 },
}

impl std::fmt::Display for ConcurrencyConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConcurrencyConflict::StreamChanged => write!(f, "stream header has been changed"),
            ConcurrencyConflict::StreamAlreadyExists => write!(f, "stream header already exists"),
            ConcurrencyConflict::StreamChangedOrExists => {
                write!(f, "stream header has been changed or already exists")
            }
            ConcurrencyConflict::EventVersionExists { version } => {
                write!(f, "event with version {} is already recorded", version)
            }
        }
    }
}

/// Errors that can occur during stream operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Stream not found: partition={partition}")]
    StreamNotFound { partition: String },

    #[error("Concurrency conflict on partition {partition}: {kind}")]
    ConcurrencyConflict {
        partition: String,
        kind: ConcurrencyConflict,
    },

    #[error("Duplicate event: partition={partition}, id={id}")]
    DuplicateEvent { partition: String, id: String },

    #[error("Included operation conflict: partition={partition}, row_key={row_key}")]
    IncludedOperationConflict { partition: String, row_key: String },

    #[error("Invalid include sequence: {0}")]
    InvalidMerge(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid row key {row_key:?}: {reason}")]
    InvalidRowKey { row_key: String, reason: String },

    #[error("Unexpected backend response: {0}")]
    UnexpectedBackendResponse(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl StreamError {
    pub(crate) fn conflict(partition: &str, kind: ConcurrencyConflict) -> Self {
        StreamError::ConcurrencyConflict {
            partition: partition.to_string(),
            kind,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        StreamError::InvalidArgument(message.into())
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, StreamError::ConcurrencyConflict { .. })
    }

    pub fn is_duplicate_event(&self) -> bool {
        matches!(self, StreamError::DuplicateEvent { .. })
    }
}
