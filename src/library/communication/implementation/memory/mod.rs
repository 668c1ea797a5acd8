//! In-process store implementations
//!
//! Functionally equivalent stand-ins for the broker: the log store keeps
//! per-topic entry vectors with group cursors and pending sets, the list
//! store keeps deques and expiring records. Both are cheaply cloneable
//! handles onto shared state, so a test can hold one clone while the code
//! under test consumes another.

mod list_store;
mod log_store;

pub use list_store::*;
pub use log_store::*;
