//! Point-to-point work queue with bounded retries and a dead-letter list
//!
//! The queue solves the same underlying problem as the [`event`](super::event)
//! module (deliver a message at least once, survive processing failures,
//! quarantine poison messages) over a simpler FIFO structure where each
//! [`WorkTask`] is handed to exactly one dequeuer. The [`QueueWorker`] is the
//! process loop draining the queue, guarded by a consecutive-failure circuit
//! breaker; the [`DeadLetterMonitor`] keeps an eye on the quarantine area.

mod monitor;
mod queue;
mod task;
mod worker;

pub use monitor::*;
pub use queue::*;
pub use task::*;
pub use worker::*;
