//! Append protocol.

use std::collections::HashMap;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, StreamError};
use crate::storage::{OperationOutcome, TableOperation};
use crate::stream::keys::{self, MAX_VERSION};
use crate::stream::{
    Entity, EntityChangeTracker, EntityOperation, EventData, Partition, RecordedEvent,
    StreamHeader,
};

use super::classify::{classify, BatchSlot};
use super::{header_etag, StreamRepository};

/// Options controlling one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Fold includes through the change tracker. When disabled every include
    /// is submitted as given.
    pub track_changes: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            track_changes: true,
        }
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// Header after the last committed batch. Use it for the next write.
    pub stream: StreamHeader,
    /// The written events with their assigned versions.
    pub events: Vec<RecordedEvent>,
    /// Included rows that reached the store, carrying their new etags.
    pub includes: Vec<Entity>,
}

/// One atomic batch worth of work.
struct Batch {
    operations: Vec<TableOperation>,
    slots: Vec<BatchSlot>,
    entities: Vec<Entity>,
    header: StreamHeader,
}

impl StreamRepository {
    /// Append events to the stream described by `header`.
    pub async fn write(&self, header: &StreamHeader, events: Vec<EventData>) -> Result<WriteResult> {
        self.write_with_options(header, events, WriteOptions::default())
            .await
    }

    /// Append events to a stream that has not been provisioned yet.
    pub async fn write_new(
        &self,
        partition: &Partition,
        events: Vec<EventData>,
    ) -> Result<WriteResult> {
        self.write(&StreamHeader::new(partition.clone()), events)
            .await
    }

    /// Append events, splitting them into as many atomic batches as the
    /// store's batch ceiling requires.
    ///
    /// Batches are committed in order. If batch `k` fails, batches before it
    /// stay committed and the error is returned; callers re-open the stream
    /// to learn its current version.
    ///
    /// With change tracking on, an event is sized as its event row, its id
    /// row and one operation per distinct included row. Untracked events
    /// count every include. An event whose size plus the header exceeds the
    /// batch ceiling is rejected before anything is written.
    ///
    /// Etags the store assigns to included rows in one batch are carried to
    /// includes of the same entity in later batches.
    #[tracing::instrument(name = "stream.write", skip_all, fields(partition = %header.partition()))]
    pub async fn write_with_options(
        &self,
        header: &StreamHeader,
        events: Vec<EventData>,
        options: WriteOptions,
    ) -> Result<WriteResult> {
        if events.is_empty() {
            return Err(StreamError::invalid_argument("no events to write"));
        }

        let partition = header.partition();
        let ceiling = self
            .limits
            .batch_ceiling(self.store.max_batch_operations());

        if header.version() >= MAX_VERSION {
            return Err(StreamError::invalid_argument(format!(
                "stream version {} leaves no room for new events, maximum is {}",
                header.version(),
                MAX_VERSION
            )));
        }

        let recorded: Vec<RecordedEvent> = events
            .into_iter()
            .zip(header.version() + 1..)
            .map(|(event, version)| event.record(version))
            .collect();

        let sizes: Vec<usize> = recorded
            .iter()
            .map(|event| {
                if options.track_changes {
                    event.folded_operations()
                } else {
                    event.operations()
                }
            })
            .collect();

        for (event, size) in recorded.iter().zip(&sizes) {
            keys::event_row_key(partition, event.version())?;
            if size + 1 > ceiling {
                return Err(StreamError::invalid_argument(format!(
                    "event at version {} needs {} operations with the header, batch ceiling is {}",
                    event.version(),
                    size + 1,
                    ceiling
                )));
            }
        }

        let chunks = chunk(&recorded, &sizes, ceiling);
        let mut current = header.clone();
        let mut includes: Vec<Entity> = Vec::new();
        let mut etags: HashMap<Uuid, Option<String>> = HashMap::new();

        for (index, events) in chunks.iter().enumerate() {
            let batch = build_batch(&current, events, options, &etags)?;
            let operation_count = batch.operations.len();
            debug!(
                partition = %partition,
                chunk = index,
                events = events.len(),
                operations = operation_count,
                "Submitting batch"
            );

            let outcomes = self
                .store
                .submit_batch(partition.partition_key(), batch.operations)
                .await
                .map_err(|e| classify(partition, &batch.slots, e))?;

            if outcomes.len() != operation_count {
                return Err(StreamError::UnexpectedBackendResponse(format!(
                    "store reported {} outcomes for a batch of {} operations",
                    outcomes.len(),
                    operation_count
                )));
            }

            let etag = header_etag(partition, &outcomes)?;
            current = batch.header.with_etag(Some(etag));
            for entity in applied(batch.entities, &outcomes) {
                etags.insert(entity.identity(), entity.row().etag.clone());
                includes.push(entity);
            }
        }

        info!(
            partition = %partition,
            version = current.version(),
            events = recorded.len(),
            batches = chunks.len(),
            "Events written"
        );

        Ok(WriteResult {
            stream: current,
            events: recorded,
            includes,
        })
    }
}

/// Greedy split into runs whose summed event sizes, header included, stay
/// within `ceiling`. Each event is known to fit on its own.
fn chunk<'a>(
    events: &'a [RecordedEvent],
    sizes: &[usize],
    ceiling: usize,
) -> Vec<&'a [RecordedEvent]> {
    let mut chunks = Vec::new();
    let mut begin = 0;
    let mut operations = 1;
    for (index, size) in sizes.iter().enumerate() {
        if index > begin && operations + size > ceiling {
            chunks.push(&events[begin..index]);
            begin = index;
            operations = 1;
        }
        operations += size;
    }
    chunks.push(&events[begin..]);
    chunks
}

/// `etags` holds the etags committed by earlier batches of the same write,
/// keyed by entity identity. They replace whatever the caller's handle carried.
fn build_batch(
    current: &StreamHeader,
    events: &[RecordedEvent],
    options: WriteOptions,
    etags: &HashMap<Uuid, Option<String>>,
) -> Result<Batch> {
    let partition = current.partition();
    let last_version = events.last().map_or(current.version(), RecordedEvent::version);
    let next = current.advanced(last_version, events.len() as u64);

    let mut operations = Vec::new();
    let mut slots = Vec::new();

    let transient = current.is_transient();
    let mut header_row = keys::header_row(&next);
    let header_op = if transient {
        header_row.etag = None;
        TableOperation::Insert(header_row)
    } else {
        TableOperation::Replace(header_row)
    };
    operations.push(header_op);
    slots.push(BatchSlot::Header { transient });

    for event in events {
        operations.push(TableOperation::Insert(keys::event_row(partition, event)?));
        slots.push(BatchSlot::Event {
            version: event.version(),
        });
        if let (Some(id), Some(row)) = (event.id(), keys::event_id_row(partition, event)) {
            operations.push(TableOperation::Insert(row));
            slots.push(BatchSlot::EventId { id: id.to_string() });
        }
    }

    let included = events
        .iter()
        .flat_map(|event| event.includes().iter().cloned())
        .map(|mut include| {
            if let Some(etag) = etags.get(&include.entity().identity()) {
                include.entity_mut().set_etag(etag.clone());
            }
            include
        });
    let included: Vec<(Entity, TableOperation)> = if options.track_changes {
        let mut tracker = EntityChangeTracker::new();
        tracker.record_all(included)?;
        tracker.table_operations(partition)?
    } else {
        included
            .filter_map(|include| {
                let entity = include.entity().clone();
                EntityOperation::from(include)
                    .apply(partition)
                    .map(|op| (entity, op))
            })
            .collect()
    };

    let mut entities = Vec::with_capacity(included.len());
    for (entity, operation) in included {
        slots.push(BatchSlot::Include {
            row_key: entity.row_key().to_string(),
        });
        operations.push(operation);
        entities.push(entity);
    }

    Ok(Batch {
        operations,
        slots,
        entities,
        header: next,
    })
}

/// Included entities updated with the etags the store assigned. Include
/// operations always close the batch, so they match the trailing outcomes.
fn applied(entities: Vec<Entity>, outcomes: &[OperationOutcome]) -> Vec<Entity> {
    let offset = outcomes.len() - entities.len();
    entities
        .into_iter()
        .zip(&outcomes[offset..])
        .map(|(mut entity, outcome)| {
            entity.set_etag(outcome.etag.clone());
            entity
        })
        .collect()
}
