//! This library crate contains all the necessities to run and manage the reliable
//! delivery core shared by the platform services.
//!
//! Submodules have been introduced to split responsibilities. Each module has a specific
//! focus and together they form a chain of dependencies from the low-level [`library`],
//! over the platform [`domain`] specific event types, through the executable [`harness`],
//! up to the high-level [`modules`](module) and the runnable processes they contain.

#![deny(missing_docs)]

pub mod constants;
pub mod domain;
pub mod harness;
pub mod library;
pub mod module;
