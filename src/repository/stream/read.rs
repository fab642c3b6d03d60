//! Slice reads.

use tracing::debug;

use crate::error::{Result, StreamError};
use crate::storage::{query_rows, Row, RowQuery};
use crate::stream::keys::{self, MAX_VERSION};
use crate::stream::{Partition, StreamEvent, StreamHeader};

use super::StreamRepository;

/// A contiguous run of events plus the header read in the same round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSlice<T> {
    pub header: StreamHeader,
    pub events: Vec<T>,
    /// The slice reaches the stream's current version.
    pub is_end_of_stream: bool,
    /// First version of the following slice, `None` at the end of the stream.
    pub next_version: Option<u64>,
}

impl StreamRepository {
    /// Read up to `size` events starting at version `start`.
    pub async fn read(
        &self,
        partition: &Partition,
        start: u64,
        size: usize,
    ) -> Result<StreamSlice<StreamEvent>> {
        self.read_as(partition, start, size, |row| {
            keys::stream_event_from_row(partition, row)
        })
        .await
    }

    /// Read from `start` using the configured default slice size.
    pub async fn read_from(
        &self,
        partition: &Partition,
        start: u64,
    ) -> Result<StreamSlice<StreamEvent>> {
        self.read(partition, start, self.limits.default_slice_size)
            .await
    }

    /// Read up to `size` events starting at `start`, mapping every event row
    /// through `transform`.
    #[tracing::instrument(name = "stream.read", skip_all, fields(partition = %partition, start = start, size = size))]
    pub async fn read_as<T, F>(
        &self,
        partition: &Partition,
        start: u64,
        size: usize,
        transform: F,
    ) -> Result<StreamSlice<T>>
    where
        F: Fn(Row) -> Result<T>,
    {
        if start == 0 {
            return Err(StreamError::invalid_argument(
                "start version must be at least 1",
            ));
        }
        if size == 0 {
            return Err(StreamError::invalid_argument(
                "slice size must be at least 1",
            ));
        }

        let end = start.saturating_add(size as u64 - 1);
        let header_key = keys::header_row_key(partition);
        let query = RowQuery::new().exact(header_key.clone()).range(
            keys::event_row_key(partition, start)?,
            keys::event_row_key(partition, end.min(MAX_VERSION))?,
        );

        let rows = query_rows(self.store.as_ref(), partition.partition_key(), &query).await?;

        let mut header = None;
        let mut event_rows = Vec::with_capacity(rows.len());
        for row in rows {
            if row.row_key == header_key {
                header = Some(row);
            } else {
                event_rows.push(row);
            }
        }

        let Some(header) = header else {
            return Err(StreamError::StreamNotFound {
                partition: partition.key().to_string(),
            });
        };
        let header = keys::header_from_row(partition, header)?;

        let events = event_rows
            .into_iter()
            .map(transform)
            .collect::<Result<Vec<_>>>()?;

        let is_end_of_stream = end >= header.version();
        debug!(
            partition = %partition,
            events = events.len(),
            version = header.version(),
            "Slice read"
        );

        Ok(StreamSlice {
            header,
            events,
            is_end_of_stream,
            next_version: (!is_end_of_stream).then(|| end + 1),
        })
    }
}
