//! Structures for reliable message delivery between services in a distributed system
//!
//! Two delivery primitives are provided, both built on the same at-least-once
//! contract (retry on failure, quarantine poison messages in a dead-letter area):
//!
//! 1. A publish/subscribe [`event bus`](event) over an append-only, partitioned
//!    log with [consumer groups](event::ConsumerGroupDescriptor). Every interested
//!    handler group receives each published event at least once.
//! 2. A point-to-point [`work queue`](work) over a durable FIFO list where each
//!    task is handed to exactly one worker at a time.
//!
//! The backing stores are external collaborators hidden behind the traits in
//! [`store`]; production talks to redis, tests run against the in-process
//! implementation. See [`implementation`].

pub mod event;
pub mod implementation;
pub mod store;
pub mod work;

mod error;

pub use error::{CauseChain, TransportError};
