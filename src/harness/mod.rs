//! Building blocks to run modules as supervised processes
//!
//! A [`Module`] bundles the services of one deployable process. The
//! [`ModuleRunner`] drives it through its lifecycle while [`jatsl`] supervises
//! the individual jobs, restarting them when the redis connections they
//! registered report their death. The [`Heart`] keeps the process alive until
//! a module decides to die or an external signal arrives.

mod heart;
mod module;
mod redis;
mod runner;

pub use heart::*;
pub use module::*;
pub use redis::*;
pub use runner::*;
