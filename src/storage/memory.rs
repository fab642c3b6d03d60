//! In-memory TableStore implementation.
//!
//! Each partition is an ordered map keyed by row key, so range queries come
//! back in row-key order exactly as a real table store returns them. Batches are staged against a copy of the partition and only swapped
//! in once every operation has succeeded.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{
    BatchError, BatchFailureReason, ContinuationToken, OperationOutcome, QueryPage, Row, RowQuery,
    StoreError, StoreResult, TableOperation, TableStore, DEFAULT_MAX_BATCH_OPERATIONS, ETAG_ANY,
};

/// Default number of rows returned per query page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

type Partition = BTreeMap<String, Row>;

/// In-memory table store with real conditional-write semantics.
pub struct InMemoryTableStore {
    partitions: RwLock<BTreeMap<String, Partition>>,
    max_batch_operations: usize,
    page_size: usize,
    batches_committed: AtomicUsize,
    queries_served: AtomicUsize,
    fail_next_batch: Mutex<Option<StoreError>>,
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_BATCH_OPERATIONS, DEFAULT_PAGE_SIZE)
    }
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with a custom batch ceiling and query page size.
    pub fn with_limits(max_batch_operations: usize, page_size: usize) -> Self {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
            max_batch_operations,
            page_size: page_size.max(1),
            batches_committed: AtomicUsize::new(0),
            queries_served: AtomicUsize::new(0),
            fail_next_batch: Mutex::new(None),
        }
    }

    /// Make the next `submit_batch` call fail with `error` without touching any rows.
    pub async fn fail_next_batch(&self, error: StoreError) {
        *self.fail_next_batch.lock().await = Some(error);
    }

    /// Number of batches committed so far.
    pub fn batches_committed(&self) -> usize {
        self.batches_committed.load(Ordering::SeqCst)
    }

    /// Number of query pages served so far.
    pub fn queries_served(&self) -> usize {
        self.queries_served.load(Ordering::SeqCst)
    }

    /// Snapshot of every row in a partition, in row-key order.
    pub async fn rows(&self, partition_key: &str) -> Vec<Row> {
        self.partitions
            .read()
            .await
            .get(partition_key)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Write a row directly, bypassing conditional checks. Returns the new etag.
    pub async fn put_row(&self, mut row: Row) -> String {
        let etag = new_etag();
        row.etag = Some(etag.clone());
        row.timestamp = Some(chrono::Utc::now());
        self.partitions
            .write()
            .await
            .entry(row.partition_key.clone())
            .or_default()
            .insert(row.row_key.clone(), row);
        etag
    }

    fn apply(partition: &mut Partition, operation: TableOperation) -> Result<OperationOutcome, BatchFailureReason> {
        match operation {
            TableOperation::Insert(row) => {
                if partition.contains_key(&row.row_key) {
                    return Err(BatchFailureReason::AlreadyExists);
                }
                Ok(Self::store(partition, row))
            }
            TableOperation::Replace(row) => {
                Self::check_etag(partition, &row)?;
                Ok(Self::store(partition, row))
            }
            TableOperation::InsertOrMerge(mut row) => {
                if let Some(existing) = partition.get(&row.row_key) {
                    let mut merged = existing.properties.clone();
                    merged.append(&mut row.properties);
                    row.properties = merged;
                }
                Ok(Self::store(partition, row))
            }
            TableOperation::InsertOrReplace(row) => Ok(Self::store(partition, row)),
            TableOperation::Delete(row) => {
                Self::check_etag(partition, &row)?;
                partition.remove(&row.row_key);
                Ok(OperationOutcome {
                    row_key: row.row_key,
                    etag: None,
                })
            }
        }
    }

    fn check_etag(partition: &Partition, row: &Row) -> Result<(), BatchFailureReason> {
        let existing = partition
            .get(&row.row_key)
            .ok_or(BatchFailureReason::NotFound)?;
        match row.etag.as_deref() {
            Some(ETAG_ANY) => Ok(()),
            Some(etag) if existing.etag.as_deref() == Some(etag) => Ok(()),
            _ => Err(BatchFailureReason::PreconditionFailed),
        }
    }

    fn store(partition: &mut Partition, mut row: Row) -> OperationOutcome {
        let etag = new_etag();
        row.etag = Some(etag.clone());
        row.timestamp = Some(chrono::Utc::now());
        let row_key = row.row_key.clone();
        partition.insert(row_key.clone(), row);
        OperationOutcome {
            row_key,
            etag: Some(etag),
        }
    }
}

fn new_etag() -> String {
    format!("W/\"{}\"", Uuid::new_v4())
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    fn max_batch_operations(&self) -> usize {
        self.max_batch_operations
    }

    async fn get(&self, partition_key: &str, row_key: &str) -> StoreResult<Option<Row>> {
        Ok(self
            .partitions
            .read()
            .await
            .get(partition_key)
            .and_then(|rows| rows.get(row_key))
            .cloned())
    }

    async fn submit_batch(
        &self,
        partition_key: &str,
        operations: Vec<TableOperation>,
    ) -> StoreResult<Vec<OperationOutcome>> {
        if let Some(error) = self.fail_next_batch.lock().await.take() {
            return Err(error);
        }
        if operations.is_empty() {
            return Err(StoreError::Other("empty batch".to_string()));
        }
        if operations.len() > self.max_batch_operations {
            return Err(StoreError::Batch(BatchError {
                index: None,
                reason: BatchFailureReason::Other(format!(
                    "batch of {} operations exceeds limit of {}",
                    operations.len(),
                    self.max_batch_operations
                )),
            }));
        }

        let mut seen = HashSet::new();
        for (index, operation) in operations.iter().enumerate() {
            let row = operation.row();
            if row.partition_key != partition_key {
                return Err(StoreError::Batch(BatchError::at(
                    index,
                    BatchFailureReason::Other("row belongs to another partition".to_string()),
                )));
            }
            if !seen.insert(row.row_key.clone()) {
                return Err(StoreError::Batch(BatchError::at(
                    index,
                    BatchFailureReason::Other("row appears more than once in batch".to_string()),
                )));
            }
        }

        let mut partitions = self.partitions.write().await;
        let mut staged = partitions.get(partition_key).cloned().unwrap_or_default();
        let mut outcomes = Vec::with_capacity(operations.len());
        for (index, operation) in operations.into_iter().enumerate() {
            let outcome = Self::apply(&mut staged, operation)
                .map_err(|reason| StoreError::Batch(BatchError::at(index, reason)))?;
            outcomes.push(outcome);
        }
        partitions.insert(partition_key.to_string(), staged);
        self.batches_committed.fetch_add(1, Ordering::SeqCst);

        debug!(
            partition = %partition_key,
            operations = outcomes.len(),
            "Committed batch"
        );
        Ok(outcomes)
    }

    async fn query(
        &self,
        partition_key: &str,
        query: &RowQuery,
        continuation: Option<ContinuationToken>,
    ) -> StoreResult<QueryPage> {
        self.queries_served.fetch_add(1, Ordering::SeqCst);
        let partitions = self.partitions.read().await;
        let Some(rows) = partitions.get(partition_key) else {
            return Ok(QueryPage::default());
        };

        let after = continuation.map(|token| token.0);
        let mut matching = rows
            .values()
            .filter(|row| after.as_deref().map_or(true, |last| row.row_key.as_str() > last))
            .filter(|row| query.matches(&row.row_key));

        let page: Vec<Row> = matching.by_ref().take(self.page_size).cloned().collect();
        let continuation = match (matching.next(), page.last()) {
            (Some(_), Some(last)) => Some(ContinuationToken(last.row_key.clone())),
            _ => None,
        };

        Ok(QueryPage {
            rows: page,
            continuation,
        })
    }
}
