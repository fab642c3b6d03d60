//! Stream header: the single row that versions a stream.

use super::{Partition, StreamProperties};

/// Snapshot of a stream header as last seen by the caller.
///
/// Headers are values: every successful write or property update returns a
/// fresh header carrying the new etag. Writing with an older value fails with
/// a concurrency conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamHeader {
    partition: Partition,
    etag: Option<String>,
    start: u64,
    count: u64,
    version: u64,
    properties: StreamProperties,
}

impl StreamHeader {
    /// A transient header for a stream that has not been persisted yet.
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            etag: None,
            start: 0,
            count: 0,
            version: 0,
            properties: StreamProperties::default(),
        }
    }

    /// Rebuild a persistent header from values obtained elsewhere.
    pub fn from_parts(
        partition: Partition,
        etag: impl Into<String>,
        version: u64,
        properties: StreamProperties,
    ) -> Self {
        Self {
            partition,
            etag: Some(etag.into()),
            start: u64::from(version > 0),
            count: version,
            version,
            properties,
        }
    }

    pub(crate) fn stored(
        partition: Partition,
        etag: Option<String>,
        start: u64,
        count: u64,
        version: u64,
        properties: StreamProperties,
    ) -> Self {
        Self {
            partition,
            etag,
            start,
            count,
            version,
            properties,
        }
    }

    pub fn with_properties(mut self, properties: StreamProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn properties(&self) -> &StreamProperties {
        &self.properties
    }

    pub fn is_transient(&self) -> bool {
        self.etag.as_deref().map_or(true, str::is_empty)
    }

    pub fn is_persistent(&self) -> bool {
        !self.is_transient()
    }

    /// Header content after appending `appended` events ending at `version`.
    /// The etag is left untouched; it only changes once the store confirms.
    pub(crate) fn advanced(&self, version: u64, appended: u64) -> Self {
        Self {
            start: if self.start == 0 && appended > 0 { 1 } else { self.start },
            count: self.count + appended,
            version,
            ..self.clone()
        }
    }

    pub(crate) fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }
}
