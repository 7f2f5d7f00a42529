// lib.rs - plugin entry, wires the interpreter lifecycle to AMPL's call ABI
pub mod common;
pub mod interpreter;
pub mod bridge;
pub mod api;

#[cfg(feature = "python")]
pub use api::ffi::funcadd;
