//! Error handling primitives shared across the plugin.
//!
//! Nothing here is fatal to the host process: every error ends up as a message in the
//! AMPL `Errmsg` slot plus a sentinel return value.

use std::fmt;

use thiserror::Error;

/// Stable codes attached to log events and error reports.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BridgeCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// The foreign runtime refused to start.
    RuntimeInit = 1,
    /// The user module could not be imported.
    ModuleImport = 2,
    /// A required function is missing from the module or is not callable.
    SymbolResolution = 3,
    /// The numeric argument could not be turned into a foreign value.
    ArgConversion = 4,
    /// The foreign callable raised.
    ForeignCallFailed = 5,
    /// The foreign callable returned something other than three numbers.
    ResultDecode = 6,
    /// The host passed the wrong number of numeric arguments.
    BadArity = 7,
}

/// A failure reported by the foreign runtime itself.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{message}")]
pub struct RuntimeFault {
    pub message: String,
}

impl RuntimeFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The interpreter could not reach the started state.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum StartError {
    #[error("Unable to initialize interpreter: {0}")]
    RuntimeInit(RuntimeFault),
    #[error("Unable to import Python module `{module}`: {fault}")]
    ModuleImport { module: String, fault: RuntimeFault },
    #[error("Unable to import function `{name}` from module `{module}`: {fault}")]
    SymbolResolution {
        module: String,
        name: String,
        fault: RuntimeFault,
    },
}

impl StartError {
    pub fn code(&self) -> BridgeCode {
        match self {
            StartError::RuntimeInit(_) => BridgeCode::RuntimeInit,
            StartError::ModuleImport { .. } => BridgeCode::ModuleImport,
            StartError::SymbolResolution { .. } => BridgeCode::SymbolResolution,
        }
    }
}

/// A started interpreter failed during one invocation.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CallError {
    #[error("Unable to convert argument: {0}")]
    ArgConversion(RuntimeFault),
    #[error("Call to Python function `{name}` failed: {fault}")]
    ForeignCallFailed { name: &'static str, fault: RuntimeFault },
    #[error("Unable to parse return values of `{name}`: {fault}")]
    ResultDecode { name: &'static str, fault: RuntimeFault },
}

impl CallError {
    pub fn code(&self) -> BridgeCode {
        match self {
            CallError::ArgConversion(_) => BridgeCode::ArgConversion,
            CallError::ForeignCallFailed { .. } => BridgeCode::ForeignCallFailed,
            CallError::ResultDecode { .. } => BridgeCode::ResultDecode,
        }
    }
}

/// Everything the host boundary can report.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum BridgeError {
    #[error("{source}{}", ArgSuffix(.arg))]
    Start {
        arg: Option<f64>,
        #[source]
        source: StartError,
    },
    #[error("{source} (arg={arg:e})")]
    Call {
        arg: f64,
        #[source]
        source: CallError,
    },
    #[error("{function} expects exactly one numeric argument, got {given}")]
    BadArity { function: &'static str, given: i32 },
}

/// Result alias used throughout the crate.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    pub fn code(&self) -> BridgeCode {
        match self {
            BridgeError::Start { source, .. } => source.code(),
            BridgeError::Call { source, .. } => source.code(),
            BridgeError::BadArity { .. } => BridgeCode::BadArity,
        }
    }

    /// Numeric value handed back to the host alongside the error message.
    ///
    /// AMPL only looks at `Errmsg`; NaN keeps a failed start from masquerading as a
    /// plausible function value.
    pub fn sentinel(&self) -> f64 {
        match self {
            BridgeError::Start { .. } | BridgeError::BadArity { .. } => f64::NAN,
            BridgeError::Call { .. } => 0.0,
        }
    }
}

struct ArgSuffix<'a>(&'a Option<f64>);

impl fmt::Display for ArgSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.0 {
            Some(arg) => write!(f, " (arg={arg:e})"),
            None => Ok(()),
        }
    }
}
