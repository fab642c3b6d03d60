//! Side-effect rows written together with events.
//!
//! An [`Entity`] is a handle to a row. Cloning the handle keeps its identity,
//! so two includes target "the same row" exactly when they carry clones of
//! one handle. Two handles with equal row keys but different identities are
//! a caller error, detected by the change tracker.

use uuid::Uuid;

use crate::error::{Result, StreamError};
use crate::storage::{Row, TableOperation};

use super::Partition;

/// Identity-carrying handle to a side-effect row.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    identity: Uuid,
    row: Row,
}

impl Entity {
    /// Wrap a row under a fresh identity.
    pub fn new(row: Row) -> Self {
        Self {
            identity: Uuid::new_v4(),
            row,
        }
    }

    pub fn identity(&self) -> Uuid {
        self.identity
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn row_key(&self) -> &str {
        &self.row.row_key
    }

    /// Same identity, new row content (e.g. after mutating properties).
    pub fn with_row(&self, row: Row) -> Self {
        Self {
            identity: self.identity,
            row,
        }
    }

    pub fn into_row(self) -> Row {
        self.row
    }

    pub(crate) fn same_identity(&self, other: &Entity) -> bool {
        self.identity == other.identity
    }

    pub(crate) fn etag(&self) -> Option<&str> {
        self.row.etag.as_deref().filter(|etag| !etag.is_empty())
    }

    pub(crate) fn set_etag(&mut self, etag: Option<String>) {
        self.row.etag = etag;
    }
}

/// A requested side-effect operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Include {
    Insert(Entity),
    Replace(Entity),
    Delete(Entity),
    InsertOrMerge(Entity),
    InsertOrReplace(Entity),
}

impl Include {
    pub fn insert(entity: Entity) -> Self {
        Include::Insert(entity)
    }

    pub fn replace(entity: Entity) -> Self {
        Include::Replace(entity)
    }

    pub fn delete(entity: Entity) -> Self {
        Include::Delete(entity)
    }

    pub fn insert_or_merge(entity: Entity) -> Self {
        Include::InsertOrMerge(entity)
    }

    pub fn insert_or_replace(entity: Entity) -> Self {
        Include::InsertOrReplace(entity)
    }

    pub fn entity(&self) -> &Entity {
        match self {
            Include::Insert(entity)
            | Include::Replace(entity)
            | Include::Delete(entity)
            | Include::InsertOrMerge(entity)
            | Include::InsertOrReplace(entity) => entity,
        }
    }

    pub(crate) fn entity_mut(&mut self) -> &mut Entity {
        match self {
            Include::Insert(entity)
            | Include::Replace(entity)
            | Include::Delete(entity)
            | Include::InsertOrMerge(entity)
            | Include::InsertOrReplace(entity) => entity,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Include::Insert(_) => "Insert",
            Include::Replace(_) => "Replace",
            Include::Delete(_) => "Delete",
            Include::InsertOrMerge(_) => "InsertOrMerge",
            Include::InsertOrReplace(_) => "InsertOrReplace",
        }
    }
}

/// Net operation for one row after folding every include that targets it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EntityOperation {
    /// Nothing left to write.
    #[default]
    None,
    Insert(Entity),
    Replace(Entity),
    Delete(Entity),
    InsertOrMerge(Entity),
    InsertOrReplace(Entity),
}

impl From<Include> for EntityOperation {
    fn from(include: Include) -> Self {
        match include {
            Include::Insert(entity) => EntityOperation::Insert(entity),
            Include::Replace(entity) => EntityOperation::Replace(entity),
            Include::Delete(entity) => EntityOperation::Delete(entity),
            Include::InsertOrMerge(entity) => EntityOperation::InsertOrMerge(entity),
            Include::InsertOrReplace(entity) => EntityOperation::InsertOrReplace(entity),
        }
    }
}

impl EntityOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            EntityOperation::None => "None",
            EntityOperation::Insert(_) => "Insert",
            EntityOperation::Replace(_) => "Replace",
            EntityOperation::Delete(_) => "Delete",
            EntityOperation::InsertOrMerge(_) => "InsertOrMerge",
            EntityOperation::InsertOrReplace(_) => "InsertOrReplace",
        }
    }

    pub fn entity(&self) -> Option<&Entity> {
        match self {
            EntityOperation::None => None,
            EntityOperation::Insert(entity)
            | EntityOperation::Replace(entity)
            | EntityOperation::Delete(entity)
            | EntityOperation::InsertOrMerge(entity)
            | EntityOperation::InsertOrReplace(entity) => Some(entity),
        }
    }

    /// Fold the next requested operation on the same row into this one.
    ///
    /// Insert then Delete cancels out. Delete then Insert becomes a Replace,
    /// since the row is known to exist. Insert followed by Replace stays an
    /// Insert carrying the latest row content. Upserts only chain with
    /// themselves.
    pub fn merge(self, next: Include) -> Result<EntityOperation> {
        use EntityOperation as Op;

        let current = self.kind();
        let merged = match (self, next) {
            (Op::None, Include::Insert(e)) => Op::Insert(e),
            (Op::None, Include::InsertOrMerge(e)) => Op::InsertOrMerge(e),
            (Op::None, Include::InsertOrReplace(e)) => Op::InsertOrReplace(e),
            (Op::None, next @ (Include::Replace(_) | Include::Delete(_))) => {
                return Err(StreamError::InvalidMerge(format!(
                    "{} cannot be applied to NULL",
                    next.kind()
                )))
            }

            (Op::Insert(_), Include::Replace(e)) => Op::Insert(e),
            (Op::Insert(_), Include::Delete(_)) => Op::None,

            (Op::Replace(_), Include::Replace(e)) => Op::Replace(e),
            (Op::Replace(_), Include::Delete(e)) => Op::Delete(e),

            (Op::Delete(_), Include::Insert(e)) => Op::Replace(e),

            (Op::InsertOrMerge(_), Include::InsertOrMerge(e)) => Op::InsertOrMerge(e),

            (Op::InsertOrReplace(_), Include::InsertOrReplace(e)) => Op::InsertOrReplace(e),

            (
                Op::Insert(_) | Op::Replace(_) | Op::Delete(_) | Op::InsertOrMerge(_)
                | Op::InsertOrReplace(_),
                next,
            ) => {
                return Err(StreamError::InvalidMerge(format!(
                    "{} cannot be followed by {}",
                    current,
                    next.kind()
                )))
            }
        };
        Ok(merged)
    }

    /// Stamp the partition key and translate into a store primitive.
    pub fn apply(self, partition: &Partition) -> Option<TableOperation> {
        let stamp = |entity: Entity| {
            let mut row = entity.into_row();
            row.partition_key = partition.partition_key().to_string();
            row
        };
        match self {
            EntityOperation::None => None,
            EntityOperation::Insert(e) => Some(TableOperation::Insert(stamp(e))),
            EntityOperation::Replace(e) => Some(TableOperation::Replace(stamp(e))),
            EntityOperation::Delete(e) => Some(TableOperation::Delete(stamp(e))),
            EntityOperation::InsertOrMerge(e) => Some(TableOperation::InsertOrMerge(stamp(e))),
            EntityOperation::InsertOrReplace(e) => Some(TableOperation::InsertOrReplace(stamp(e))),
        }
    }
}
