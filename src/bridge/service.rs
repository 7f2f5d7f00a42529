//! Call bridge: one host evaluation becomes one foreign call.

use std::time::Instant;

use tracing::{debug, warn};

use crate::common::error::{BridgeError, BridgeResult, CallError, RuntimeFault};
use crate::interpreter::{ForeignRuntime, Interpreter};

use super::domain::{CallRequest, CallResult, FunctionId};

/// Evaluate `id` at `request.arg`, starting the interpreter on first use.
///
/// Derivative slots are written only on success. Any failure after start-up shuts the
/// interpreter down so the next call begins from a clean start.
pub fn invoke<R: ForeignRuntime>(
    interp: &mut Interpreter<R>,
    id: FunctionId,
    request: CallRequest<'_>,
) -> BridgeResult<f64> {
    let arg = request.arg;

    if let Err(source) = interp.ensure_started() {
        let err = BridgeError::Start {
            arg: Some(arg),
            source,
        };
        warn!(function = id.name(), arg, code = err.code() as u32, error = %err, "start failed");
        return Err(err);
    }

    let begin = Instant::now();
    match call_started(interp, id, arg) {
        Ok(result) => {
            debug!(
                function = id.name(),
                arg,
                value = result.value,
                dur_us = begin.elapsed().as_micros() as u64,
                "evaluated"
            );
            Ok(request.complete(result))
        }
        Err(source) => {
            let err = BridgeError::Call { arg, source };
            warn!(function = id.name(), arg, code = err.code() as u32, error = %err, "call failed; stopping interpreter");
            interp.shutdown();
            Err(err)
        }
    }
}

fn call_started<R: ForeignRuntime>(
    interp: &Interpreter<R>,
    id: FunctionId,
    arg: f64,
) -> Result<CallResult, CallError> {
    let name = id.name();
    let (runtime, callable) = interp.resolved(id).ok_or_else(|| CallError::ForeignCallFailed {
        name,
        fault: RuntimeFault::new("function is not bound"),
    })?;

    let args = runtime.marshal_arg(arg).map_err(CallError::ArgConversion)?;
    let value = runtime
        .call(callable, args)
        .map_err(|fault| CallError::ForeignCallFailed { name, fault })?;
    runtime
        .decode_triple(value)
        .map_err(|fault| CallError::ResultDecode { name, fault })
}
