//! Seams towards the external stores backing the delivery primitives
//!
//! The core never talks to a concrete broker directly. It depends on two
//! collaborator abstractions: an append-only partitioned [`LogStore`] with
//! consumer-group cursors and a pending set, and a durable FIFO [`ListStore`]
//! with blocking pops and expiring records. Which process hands a given entry
//! to which consumer is the store's responsibility, not ours.

mod list;
mod log;

pub use list::*;
pub use log::*;
