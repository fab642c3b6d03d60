//! Stream repositories.

mod stream;

pub use stream::{OpenResult, StreamRepository, StreamSlice, WriteOptions, WriteResult};
