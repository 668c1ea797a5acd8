//! Platform specific data structures
//!
//! Everything in here instantiates the generic delivery primitives from the
//! [`library`](super::library) with the event and notification types of the
//! task platform.

mod event;
mod notification;

pub use event::*;
pub use notification::*;
