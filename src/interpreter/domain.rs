//! Domain definitions for the embedded interpreter: its lifecycle state and the
//! capability a foreign runtime has to provide.

use crate::bridge::domain::CallResult;
use crate::common::error::RuntimeFault;

/// Lifecycle state of the embedded interpreter.
///
/// A start attempt that fails is cleaned up on the spot, so there is no observable
/// failed state: the manager is back to `NotStarted` before the error is returned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InterpreterState {
    NotStarted,
    Started,
}

/// An embeddable runtime that hosts the user functions.
///
/// Handle types own one foreign reference each and release it on drop. Implementations
/// must tolerate handles being dropped while the runtime is still running, which is the
/// only order [`Interpreter`](super::service::Interpreter) uses.
pub trait ForeignRuntime {
    type Module;
    type Callable;
    type Args;
    type Value;

    /// Bring the runtime up. Must leave nothing running on error.
    fn start(&mut self) -> Result<(), RuntimeFault>;

    /// Tear the runtime down. Called at most once per successful `start`.
    fn stop(&mut self);

    fn import_module(&mut self, name: &str) -> Result<Self::Module, RuntimeFault>;

    /// Look up `name` on `module` and check that it can be called.
    fn resolve_callable(
        &mut self,
        module: &Self::Module,
        name: &str,
    ) -> Result<Self::Callable, RuntimeFault>;

    /// Wrap one host number into the runtime's one-element argument container.
    fn marshal_arg(&self, arg: f64) -> Result<Self::Args, RuntimeFault>;

    fn call(&self, callable: &Self::Callable, args: Self::Args) -> Result<Self::Value, RuntimeFault>;

    /// Decode exactly three numbers out of a returned value.
    fn decode_triple(&self, value: Self::Value) -> Result<CallResult, RuntimeFault>;
}
