//! Independent and project agnostic libraries
//!
//! Nothing in this module knows about the platform domain. The submodules provide
//! the messaging primitives which the [`domain`](super::domain) and
//! [`module`](super::module) layers instantiate with concrete types.

pub mod communication;

/// Generic error type
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result with no value and a [`BoxedError`]
pub type EmptyResult = Result<(), BoxedError>;
