//! Stream domain model.
//!
//! Partitions, headers, events, side-effect includes and the row codec that
//! maps them onto a table store partition.

mod event;
mod header;
mod include;
pub mod keys;
mod partition;
mod properties;
mod tracker;

pub use event::{EventData, RecordedEvent, StreamEvent};
pub use header::StreamHeader;
pub use include::{Entity, EntityOperation, Include};
pub use partition::{Partition, VIRTUAL_PARTITION_SEPARATOR};
pub use properties::{
    EventProperties, StreamProperties, RESERVED_EVENT_PROPERTIES, RESERVED_STREAM_PROPERTIES,
};
pub use tracker::EntityChangeTracker;
