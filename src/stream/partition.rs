//! Stream partitions.

use crate::error::{Result, StreamError};

/// Separates the physical partition key from a virtual partition name.
pub const VIRTUAL_PARTITION_SEPARATOR: char = '|';

/// Physical partition plus optional virtual-partition row-key prefix.
///
/// `"orders-42"` maps to partition key `orders-42` with no prefix.
/// `"tenant-a|orders-42"` maps to partition key `tenant-a` and prefixes every
/// row key with `orders-42|`, so several streams can share one physical
/// partition (and therefore one atomic batch scope).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    key: String,
    partition_key: String,
    row_key_prefix: String,
}

impl Partition {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let (partition_key, row_key_prefix) = match key.split_once(VIRTUAL_PARTITION_SEPARATOR) {
            Some((physical, virtual_name)) => (
                physical.to_string(),
                format!("{}{}", virtual_name, VIRTUAL_PARTITION_SEPARATOR),
            ),
            None => (key.clone(), String::new()),
        };

        if partition_key.is_empty() {
            return Err(StreamError::invalid_argument(format!(
                "partition key is empty in {:?}",
                key
            )));
        }

        Ok(Self {
            key,
            partition_key,
            row_key_prefix,
        })
    }

    /// The full key the partition was created from.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn row_key_prefix(&self) -> &str {
        &self.row_key_prefix
    }

    pub fn is_virtual(&self) -> bool {
        !self.row_key_prefix.is_empty()
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}
