//! Stream repository.
//!
//! Implements the stream protocols (provision, open, append, property
//! updates and slice reads) on top of any [`TableStore`]. The repository
//! holds no mutable state: every call takes the caller's last known header
//! and returns a fresh one.

mod classify;
mod read;
mod write;


use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{Config, StreamLimits};
use crate::error::{Result, StreamError};
use crate::storage::{OperationOutcome, TableOperation, TableStore};
use crate::stream::keys;
use crate::stream::{Partition, StreamHeader, StreamProperties};

use classify::{classify, BatchSlot};

pub use read::StreamSlice;
pub use write::{WriteOptions, WriteResult};

/// Outcome of [`StreamRepository::try_open`].
#[derive(Debug, Clone, PartialEq)]
pub struct OpenResult {
    /// Whether a header row exists.
    pub found: bool,
    /// The stored header, or a transient one when nothing was found.
    pub stream: StreamHeader,
}

/// Repository for event streams stored in a partitioned table.
pub struct StreamRepository {
    store: Arc<dyn TableStore>,
    limits: StreamLimits,
}

impl StreamRepository {
    /// Create a repository with default limits.
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            store,
            limits: StreamLimits::default(),
        }
    }

    /// Create a repository using the limits from loaded configuration.
    pub fn with_config(store: Arc<dyn TableStore>, config: &Config) -> Result<Self> {
        Self::with_limits(store, config.limits.clone())
    }

    pub fn with_limits(store: Arc<dyn TableStore>, limits: StreamLimits) -> Result<Self> {
        limits.validate()?;
        Ok(Self { store, limits })
    }

    pub fn limits(&self) -> &StreamLimits {
        &self.limits
    }

    /// Create the header row of a new, empty stream.
    ///
    /// Fails with a `StreamAlreadyExists` conflict when the partition already
    /// holds a stream.
    #[tracing::instrument(name = "stream.provision", skip_all, fields(partition = %partition))]
    pub async fn provision(
        &self,
        partition: &Partition,
        properties: StreamProperties,
    ) -> Result<StreamHeader> {
        let header = StreamHeader::new(partition.clone()).with_properties(properties);
        let mut row = keys::header_row(&header);
        row.etag = None;

        let outcomes = self
            .store
            .submit_batch(partition.partition_key(), vec![TableOperation::Insert(row)])
            .await
            .map_err(|e| classify(partition, &[BatchSlot::Header { transient: true }], e))?;

        let header = header.with_etag(Some(header_etag(partition, &outcomes)?));
        info!(partition = %partition, "Stream provisioned");
        Ok(header)
    }

    /// Look up the stream header. A missing stream is not an error.
    #[tracing::instrument(name = "stream.try_open", skip_all, fields(partition = %partition))]
    pub async fn try_open(&self, partition: &Partition) -> Result<OpenResult> {
        let row = self
            .store
            .get(partition.partition_key(), &keys::header_row_key(partition))
            .await?;

        match row {
            Some(row) => Ok(OpenResult {
                found: true,
                stream: keys::header_from_row(partition, row)?,
            }),
            None => {
                debug!(partition = %partition, "No stream header");
                Ok(OpenResult {
                    found: false,
                    stream: StreamHeader::new(partition.clone()),
                })
            }
        }
    }

    /// Load the stream header, failing with `StreamNotFound` when absent.
    pub async fn open(&self, partition: &Partition) -> Result<StreamHeader> {
        let result = self.try_open(partition).await?;
        if !result.found {
            return Err(StreamError::StreamNotFound {
                partition: partition.key().to_string(),
            });
        }
        Ok(result.stream)
    }

    pub async fn exists(&self, partition: &Partition) -> Result<bool> {
        Ok(self.try_open(partition).await?.found)
    }

    /// Replace the stream properties, conditioned on the header's etag.
    ///
    /// Returns the header carrying the new properties and etag.
    #[tracing::instrument(name = "stream.set_properties", skip_all, fields(partition = %header.partition()))]
    pub async fn set_properties(
        &self,
        header: &StreamHeader,
        properties: StreamProperties,
    ) -> Result<StreamHeader> {
        if header.is_transient() {
            return Err(StreamError::invalid_argument(format!(
                "cannot set properties of {}: stream header is transient",
                header.partition()
            )));
        }

        let partition = header.partition();
        let updated = header.clone().with_properties(properties);
        let outcomes = self
            .store
            .submit_batch(
                partition.partition_key(),
                vec![TableOperation::Replace(keys::header_row(&updated))],
            )
            .await
            .map_err(|e| classify(partition, &[BatchSlot::Header { transient: false }], e))?;

        let etag = header_etag(partition, &outcomes)?;
        debug!(partition = %partition, "Stream properties replaced");
        Ok(updated.with_etag(Some(etag)))
    }
}

/// New header etag, reported for the first operation of a batch.
fn header_etag(partition: &Partition, outcomes: &[OperationOutcome]) -> Result<String> {
    outcomes
        .first()
        .and_then(|outcome| outcome.etag.clone())
        .filter(|etag| !etag.is_empty())
        .ok_or_else(|| {
            StreamError::UnexpectedBackendResponse(format!(
                "store did not return an etag for the header of {}",
                partition
            ))
        })
}
