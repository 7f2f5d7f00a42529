//! Shared utilities that glue the interpreter, the bridge and the host ABI together.
pub mod config;
pub mod error;
pub mod log;

pub use error::{BridgeCode, BridgeError, BridgeResult, CallError, RuntimeFault, StartError};
