//! Embedded interpreter: lifecycle state machine and the runtimes that back it.

pub mod domain;
#[cfg(feature = "python")]
pub mod python;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use domain::{ForeignRuntime, InterpreterState};
pub use service::Interpreter;
