//! Backing table store contract.
//!
//! The stream protocols only ever talk to a partitioned table store through
//! [`TableStore`]: single-row reads, atomic per-partition batches, and paged
//! row-key queries. Concrete SDK adapters live outside this crate;
//! [`memory::InMemoryTableStore`] implements the contract for tests and
//! local development.

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};

pub mod memory;
mod row;


pub use memory::InMemoryTableStore;
pub use row::{PropertyMap, PropertyValue, Row, ETAG_ANY};

/// Default maximum number of operations in one atomic batch.
pub const DEFAULT_MAX_BATCH_OPERATIONS: usize = 100;

/// Result type for adapter calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Why the store refused one operation of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchFailureReason {
    /// Insert targeted a row that already exists.
    AlreadyExists,
    /// Conditional write whose etag no longer matches.
    PreconditionFailed,
    /// Replace/Delete targeted a row that does not exist.
    NotFound,
    /// Anything else the store reported for that operation.
    Other(String),
}

impl std::fmt::Display for BatchFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchFailureReason::AlreadyExists => write!(f, "entity already exists"),
            BatchFailureReason::PreconditionFailed => write!(f, "precondition failed"),
            BatchFailureReason::NotFound => write!(f, "entity not found"),
            BatchFailureReason::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Structured batch refusal: which operation failed and why.
///
/// `index` is `None` when the store could not attribute the failure to a
/// single operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    pub index: Option<usize>,
    pub reason: BatchFailureReason,
}

impl BatchError {
    pub fn at(index: usize, reason: BatchFailureReason) -> Self {
        Self {
            index: Some(index),
            reason,
        }
    }
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(index) => write!(f, "operation {} failed: {}", index, self.reason),
            None => write!(f, "batch failed: {}", self.reason),
        }
    }
}

/// Errors reported by a table store adapter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Batch rejected: {0}")]
    Batch(BatchError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Other(String),
}

/// Primitive write operations understood by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOperation {
    /// Create; fails if the row exists.
    Insert(Row),
    /// Overwrite; conditioned on the row's etag.
    Replace(Row),
    /// Upsert merging properties into any existing row.
    InsertOrMerge(Row),
    /// Upsert overwriting any existing row.
    InsertOrReplace(Row),
    /// Remove; conditioned on the row's etag.
    Delete(Row),
}

impl TableOperation {
    pub fn row(&self) -> &Row {
        match self {
            TableOperation::Insert(row)
            | TableOperation::Replace(row)
            | TableOperation::InsertOrMerge(row)
            | TableOperation::InsertOrReplace(row)
            | TableOperation::Delete(row) => row,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TableOperation::Insert(_) => "Insert",
            TableOperation::Replace(_) => "Replace",
            TableOperation::InsertOrMerge(_) => "InsertOrMerge",
            TableOperation::InsertOrReplace(_) => "InsertOrReplace",
            TableOperation::Delete(_) => "Delete",
        }
    }
}

/// Per-operation result of a committed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    pub row_key: String,
    /// New etag of the written row; `None` for deletes.
    pub etag: Option<String>,
}

/// One disjunct of a row-key filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyClause {
    Exact(String),
    /// Inclusive lexicographic range.
    Range { from: String, to: String },
}

impl KeyClause {
    pub fn matches(&self, row_key: &str) -> bool {
        match self {
            KeyClause::Exact(key) => key == row_key,
            KeyClause::Range { from, to } => from.as_str() <= row_key && row_key <= to.as_str(),
        }
    }
}

/// Row-key filter within a single partition: a row matches if any clause does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowQuery {
    pub clauses: Vec<KeyClause>,
}

impl RowQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exact(mut self, row_key: impl Into<String>) -> Self {
        self.clauses.push(KeyClause::Exact(row_key.into()));
        self
    }

    pub fn range(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.clauses.push(KeyClause::Range {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn matches(&self, row_key: &str) -> bool {
        self.clauses.iter().any(|clause| clause.matches(row_key))
    }
}

/// Opaque resume point handed back by the store when a page is truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(pub String);

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub rows: Vec<Row>,
    pub continuation: Option<ContinuationToken>,
}

/// Interface for a partitioned, etag-versioned table store.
///
/// Implementations:
/// - `InMemoryTableStore`: in-process store for tests and local development
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Maximum number of operations accepted by one `submit_batch` call.
    fn max_batch_operations(&self) -> usize {
        DEFAULT_MAX_BATCH_OPERATIONS
    }

    /// Retrieve a single row.
    async fn get(&self, partition_key: &str, row_key: &str) -> StoreResult<Option<Row>>;

    /// Apply all operations atomically within one partition.
    ///
    /// On success returns one outcome per operation, in submission order.
    /// On refusal returns [`StoreError::Batch`] naming the failed operation.
    async fn submit_batch(
        &self,
        partition_key: &str,
        operations: Vec<TableOperation>,
    ) -> StoreResult<Vec<OperationOutcome>>;

    /// Fetch one page of rows matching `query`, ordered by row key.
    async fn query(
        &self,
        partition_key: &str,
        query: &RowQuery,
        continuation: Option<ContinuationToken>,
    ) -> StoreResult<QueryPage>;
}

enum Paging {
    Start,
    Next(ContinuationToken),
    Done,
}

/// Stream every row matching `query`, following continuation tokens until
/// the store reports no more pages.
pub fn query_all<'a>(
    store: &'a dyn TableStore,
    partition_key: &'a str,
    query: &'a RowQuery,
) -> impl Stream<Item = StoreResult<Row>> + Send + 'a {
    stream::try_unfold(Paging::Start, move |state| async move {
        let continuation = match state {
            Paging::Start => None,
            Paging::Next(token) => Some(token),
            Paging::Done => return Ok::<_, StoreError>(None),
        };
        let page = store.query(partition_key, query, continuation).await?;
        let next = match page.continuation {
            Some(token) => Paging::Next(token),
            None => Paging::Done,
        };
        Ok(Some((stream::iter(page.rows.into_iter().map(Ok::<Row, StoreError>)), next)))
    })
    .try_flatten()
    .boxed()
}

/// Collect every row matching `query`.
pub async fn query_rows(
    store: &dyn TableStore,
    partition_key: &str,
    query: &RowQuery,
) -> StoreResult<Vec<Row>> {
    query_all(store, partition_key, query).try_collect().await
}
