//! Call bridge between AMPL's flat numeric convention and the interpreter's callables.

pub mod domain;
pub mod service;

pub use domain::{CallRequest, CallResult, FunctionId};
pub use service::invoke;
