//! Public entry points for the AMPL external-function interface.

pub mod asl;
pub mod ffi;
