//! Store trait implementations
//!
//! [`redis`] talks to a real broker and backs every deployed module. The
//! [`memory`] variant keeps everything in process memory with the same
//! delivery semantics and substitutes for the broker in tests.

pub mod memory;
pub mod redis;
