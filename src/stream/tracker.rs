//! Entity change tracking.
//!
//! Folds every include of a write into one net operation per row, so a batch
//! never touches the same row twice.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, StreamError};
use crate::storage::TableOperation;

use super::{Entity, EntityOperation, Include, Partition};

/// Running change record for one row.
struct EntityChangeRecord {
    entity: Entity,
    operation: EntityOperation,
}

impl EntityChangeRecord {
    fn new(include: Include) -> Self {
        Self {
            entity: include.entity().clone(),
            operation: include.into(),
        }
    }

    fn merge(&mut self, mut include: Include) -> Result<()> {
        if !self.entity.same_identity(include.entity()) {
            return Err(StreamError::InvalidMerge(format!(
                "row {:?} is included through two different entity instances",
                self.entity.row_key()
            )));
        }
        // The etag follows the identity when new content arrives without one
        if include.entity().etag().is_none() {
            if let Some(etag) = self.entity.etag() {
                let etag = etag.to_string();
                include.entity_mut().set_etag(Some(etag));
            }
        }
        self.entity = include.entity().clone();
        let current = std::mem::take(&mut self.operation);
        self.operation = current.merge(include)?;
        Ok(())
    }

    /// Final operation, if anything still needs to reach the store.
    fn compute(self) -> Result<Option<EntityOperation>> {
        match self.operation {
            EntityOperation::None => Ok(None),
            EntityOperation::Replace(entity) if !entity.row().has_etag() => {
                Err(StreamError::InvalidMerge(format!(
                    "Replace of row {:?} requires an etag",
                    entity.row_key()
                )))
            }
            // Never persisted, nothing to delete
            EntityOperation::Delete(entity) if !entity.row().has_etag() => Ok(None),
            operation => Ok(Some(operation)),
        }
    }
}

/// Collects includes and computes the net operation per row.
#[derive(Default)]
pub struct EntityChangeTracker {
    records: HashMap<String, EntityChangeRecord>,
    order: Vec<String>,
}

impl EntityChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one requested operation.
    pub fn record(&mut self, include: Include) -> Result<()> {
        let row_key = include.entity().row_key().to_string();
        match self.records.entry(row_key) {
            Entry::Occupied(entry) => entry.into_mut().merge(include),
            Entry::Vacant(entry) => {
                self.order.push(entry.key().clone());
                entry.insert(EntityChangeRecord::new(include));
                Ok(())
            }
        }
    }

    pub fn record_all(&mut self, includes: impl IntoIterator<Item = Include>) -> Result<()> {
        includes.into_iter().try_for_each(|include| self.record(include))
    }

    /// Net operations, in the order rows were first seen.
    pub fn compute(mut self) -> Result<Vec<EntityOperation>> {
        let mut operations = Vec::with_capacity(self.order.len());
        for row_key in std::mem::take(&mut self.order) {
            let Some(record) = self.records.remove(&row_key) else {
                continue;
            };
            match record.compute()? {
                Some(operation) => operations.push(operation),
                None => debug!(row_key = %row_key, "Include folded to no operation"),
            }
        }
        Ok(operations)
    }

    /// Net operations translated into store primitives for `partition`.
    pub fn table_operations(self, partition: &Partition) -> Result<Vec<(Entity, TableOperation)>> {
        Ok(self
            .compute()?
            .into_iter()
            .filter_map(|operation| {
                let entity = operation.entity()?.clone();
                operation.apply(partition).map(|op| (entity, op))
            })
            .collect())
    }
}
