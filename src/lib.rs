//! Tablestream - event streams over a partitioned table store
//!
//! Stores append-only event streams in a partitioned key/row table that
//! offers conditional writes, atomic per-partition batches and range queries.
//! Each stream is one partition (or a virtual slice of one): a header row
//! carrying the version, one row per event, and one row per event id for
//! duplicate detection. Side-effect rows may be written in the same batch as
//! the events that cause them.
//!
//! The [`repository::StreamRepository`] drives the protocols against any
//! [`storage::TableStore`] adapter.

pub mod config;
pub mod error;
pub mod repository;
pub mod shard;
pub mod storage;
pub mod stream;
pub mod utils;

pub use error::{ConcurrencyConflict, Result, StreamError};
pub use repository::{OpenResult, StreamRepository, StreamSlice, WriteOptions, WriteResult};
