//! Translation of batch refusals into stream errors.

use tracing::warn;

use crate::error::{ConcurrencyConflict, StreamError};
use crate::storage::{BatchFailureReason, StoreError};
use crate::stream::Partition;

/// What a batch operation writes, so a refusal can be attributed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BatchSlot {
    /// Header insert (transient stream) or conditional replace.
    Header { transient: bool },
    Event { version: u64 },
    EventId { id: String },
    Include { row_key: String },
}

/// Classify a failed batch submission.
///
/// Conflicts on stream rows become typed stream errors, conflicts on
/// included rows become [`StreamError::IncludedOperationConflict`], and
/// everything else is passed through unchanged.
pub(crate) fn classify(partition: &Partition, slots: &[BatchSlot], error: StoreError) -> StreamError {
    let batch = match error {
        StoreError::Batch(batch) => batch,
        other => return StreamError::Store(other),
    };

    let Some(slot) = batch.index.and_then(|index| slots.get(index)) else {
        return StreamError::UnexpectedBackendResponse(format!(
            "batch of {} operations on {} failed without a valid operation index: {}",
            slots.len(),
            partition,
            batch
        ));
    };

    let classified = match (slot, &batch.reason) {
        (BatchSlot::Header { transient: true }, BatchFailureReason::AlreadyExists) => {
            StreamError::conflict(partition.key(), ConcurrencyConflict::StreamAlreadyExists)
        }
        (
            BatchSlot::Header { transient: false },
            BatchFailureReason::PreconditionFailed | BatchFailureReason::NotFound,
        ) => StreamError::conflict(partition.key(), ConcurrencyConflict::StreamChanged),
        (
            BatchSlot::Header { .. },
            BatchFailureReason::AlreadyExists | BatchFailureReason::PreconditionFailed,
        ) => StreamError::conflict(partition.key(), ConcurrencyConflict::StreamChangedOrExists),
        (BatchSlot::Event { version }, BatchFailureReason::AlreadyExists) => StreamError::conflict(
            partition.key(),
            ConcurrencyConflict::EventVersionExists { version: *version },
        ),
        (BatchSlot::EventId { id }, BatchFailureReason::AlreadyExists) => StreamError::DuplicateEvent {
            partition: partition.key().to_string(),
            id: id.clone(),
        },
        (
            BatchSlot::Include { row_key },
            BatchFailureReason::AlreadyExists
            | BatchFailureReason::PreconditionFailed
            | BatchFailureReason::NotFound,
        ) => StreamError::IncludedOperationConflict {
            partition: partition.key().to_string(),
            row_key: row_key.clone(),
        },
        _ => return StreamError::Store(StoreError::Batch(batch)),
    };

    warn!(partition = %partition, error = %classified, "Batch refused");
    classified
}
