//! Limits applied to stream writes and reads.
//!
//! The batch ceiling mirrors the per-transaction operation limit of the
//! backing table store. When the adapter reports a lower ceiling the lower
//! value wins.

use serde::Deserialize;

use crate::error::{Result, StreamError};

/// Default maximum operations per atomic batch (header + events + includes).
pub const DEFAULT_MAX_OPERATIONS_PER_BATCH: usize = 100;

/// Default number of events returned by one read.
pub const DEFAULT_SLICE_SIZE: usize = 1000;

/// Stream protocol limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamLimits {
    /// Maximum operations per atomic batch, the header row included.
    ///
    /// Default: 100.
    pub max_operations_per_batch: usize,

    /// Slice size used when a read does not specify one.
    ///
    /// Default: 1,000.
    pub default_slice_size: usize,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_operations_per_batch: DEFAULT_MAX_OPERATIONS_PER_BATCH,
            default_slice_size: DEFAULT_SLICE_SIZE,
        }
    }
}

impl StreamLimits {
    /// Reject limits no write or read could satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.max_operations_per_batch < 2 {
            return Err(StreamError::invalid_argument(format!(
                "max_operations_per_batch must be at least 2, got {}",
                self.max_operations_per_batch
            )));
        }
        if self.default_slice_size == 0 {
            return Err(StreamError::invalid_argument(
                "default_slice_size must be at least 1",
            ));
        }
        Ok(())
    }

    /// Effective batch ceiling given what the store accepts.
    pub fn batch_ceiling(&self, store_limit: usize) -> usize {
        self.max_operations_per_batch.min(store_limit)
    }
}
