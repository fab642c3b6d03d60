//! Shared stream protocol integration tests.
//!
//! Exercises the repository end to end against a TableStore adapter.

pub mod stream_protocol_tests;
