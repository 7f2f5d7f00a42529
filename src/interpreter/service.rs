//! Lifecycle manager for the embedded interpreter.
//!
//! Owns the runtime, the imported module and one resolved callable per
//! [`FunctionId`]. The call bridge only ever borrows them.

use tracing::info;

use crate::bridge::domain::FunctionId;
use crate::common::error::StartError;

use super::domain::{ForeignRuntime, InterpreterState};

/// Foreign references held while the interpreter is started. Dropping it releases
/// every one of them.
struct Session<R: ForeignRuntime> {
    // Field order is drop order: callables go before the module they came from.
    callables: Vec<R::Callable>,
    _module: R::Module,
}

/// Single owner of the interpreter. One per process; callers serialize access.
pub struct Interpreter<R: ForeignRuntime> {
    runtime: R,
    module: String,
    session: Option<Session<R>>,
    starts: u64,
}

impl<R: ForeignRuntime> Interpreter<R> {
    pub fn new(runtime: R, module: impl Into<String>) -> Self {
        Self {
            runtime,
            module: module.into(),
            session: None,
            starts: 0,
        }
    }

    pub fn state(&self) -> InterpreterState {
        if self.session.is_some() {
            InterpreterState::Started
        } else {
            InterpreterState::NotStarted
        }
    }

    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    /// Number of times the runtime was successfully brought up.
    pub fn starts(&self) -> u64 {
        self.starts
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Start the runtime, import the module and resolve every registered function.
    ///
    /// No-op when already started. On error nothing is left running or held.
    pub fn ensure_started(&mut self) -> Result<(), StartError> {
        if self.is_started() {
            return Ok(());
        }

        self.runtime.start().map_err(StartError::RuntimeInit)?;

        let module = match self.runtime.import_module(&self.module) {
            Ok(module) => module,
            Err(fault) => {
                self.runtime.stop();
                return Err(StartError::ModuleImport {
                    module: self.module.clone(),
                    fault,
                });
            }
        };

        let mut callables = Vec::with_capacity(FunctionId::ALL.len());
        for id in FunctionId::ALL {
            match self.runtime.resolve_callable(&module, id.name()) {
                Ok(callable) => callables.push(callable),
                Err(fault) => {
                    drop(callables);
                    drop(module);
                    self.runtime.stop();
                    return Err(StartError::SymbolResolution {
                        module: self.module.clone(),
                        name: id.name().to_string(),
                        fault,
                    });
                }
            }
        }

        self.session = Some(Session {
            callables,
            _module: module,
        });
        self.starts += 1;
        info!(module = %self.module, starts = self.starts, "interpreter started");
        Ok(())
    }

    /// Release every foreign reference and stop the runtime. Safe to call in any state.
    pub fn shutdown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        drop(session);
        self.runtime.stop();
        info!(module = %self.module, "interpreter stopped");
    }

    /// Borrow the runtime together with the callable bound to `id`.
    pub fn resolved(&self, id: FunctionId) -> Option<(&R, &R::Callable)> {
        let callable = self.session.as_ref()?.callables.get(id.index())?;
        Some((&self.runtime, callable))
    }
}

impl<R: ForeignRuntime> Drop for Interpreter<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::common::error::RuntimeFault;
    use crate::interpreter::testing::{ScriptedRuntime, Script};

    fn interpreter(script: Script) -> Interpreter<ScriptedRuntime> {
        Interpreter::new(ScriptedRuntime::new(script), "amplfunc")
    }

    #[test]
    fn starts_once_and_resolves_every_function() {
        crate::common::log::init_test_logging();
        let mut interp = interpreter(Script::spiral());
        interp.ensure_started().unwrap();
        interp.ensure_started().unwrap();

        assert_eq!(interp.state(), InterpreterState::Started);
        assert_eq!(interp.starts(), 1);
        assert_eq!(interp.runtime().tally().starts(), 1);
        // module plus one handle per function
        assert_eq!(interp.runtime().tally().live_handles(), 3);
        for id in FunctionId::ALL {
            assert!(interp.resolved(id).is_some());
        }
    }

    #[test]
    fn resolves_nothing_unless_started() {
        let mut interp = interpreter(Script::spiral());
        assert!(interp.resolved(FunctionId::Curvex).is_none());

        interp.ensure_started().unwrap();
        let (_, callable) = interp.resolved(FunctionId::Curvey).unwrap();
        assert_eq!(callable.name(), "curvey");

        interp.shutdown();
        assert!(interp.resolved(FunctionId::Curvey).is_none());
    }

    #[test]
    fn runtime_init_failure_leaves_state_untouched() {
        let mut interp = interpreter(Script::spiral().refuse_start());
        let err = interp.ensure_started().unwrap_err();
        assert!(matches!(err, StartError::RuntimeInit(_)));
        assert_eq!(interp.state(), InterpreterState::NotStarted);
        assert_eq!(interp.runtime().tally().stops(), 0);
        assert!(!interp.runtime().tally().running());
    }

    #[test]
    fn import_failure_stops_the_runtime() {
        let mut interp = interpreter(Script::spiral().without_module());
        let err = interp.ensure_started().unwrap_err();
        assert_eq!(
            err,
            StartError::ModuleImport {
                module: "amplfunc".into(),
                fault: RuntimeFault::new("ModuleNotFoundError(\"No module named 'amplfunc'\")"),
            }
        );
        let tally = interp.runtime().tally();
        assert_eq!((tally.starts(), tally.stops()), (1, 1));
        assert!(!tally.running());
        assert_eq!(interp.state(), InterpreterState::NotStarted);
    }

    #[test]
    fn missing_symbol_releases_partial_handles() {
        let mut interp = interpreter(Script::spiral().without_function("curvey"));
        match interp.ensure_started() {
            Err(StartError::SymbolResolution { name, .. }) => assert_eq!(name, "curvey"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        let tally = interp.runtime().tally();
        assert_eq!(tally.live_handles(), 0);
        assert!(!tally.running());
        assert_eq!(interp.state(), InterpreterState::NotStarted);
        assert!(interp.resolved(FunctionId::Curvex).is_none());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut interp = interpreter(Script::spiral());
        interp.shutdown();
        assert_eq!(interp.runtime().tally().stops(), 0);

        interp.ensure_started().unwrap();
        interp.shutdown();
        interp.shutdown();

        let tally = interp.runtime().tally();
        assert_eq!(tally.stops(), 1);
        assert_eq!(tally.live_handles(), 0);
        assert_eq!(tally.handles_released_while_stopped(), 0);
        assert_eq!(interp.state(), InterpreterState::NotStarted);
    }

    #[test]
    fn restarts_after_shutdown() {
        let mut interp = interpreter(Script::spiral());
        interp.ensure_started().unwrap();
        interp.shutdown();
        interp.ensure_started().unwrap();
        assert_eq!(interp.starts(), 2);
        assert_eq!(interp.runtime().tally().live_handles(), 3);
    }

    #[test]
    fn drop_stops_a_running_interpreter() {
        let mut interp = interpreter(Script::spiral());
        interp.ensure_started().unwrap();
        let tally = interp.runtime().tally();
        drop(interp);
        assert_eq!(tally.stops(), 1);
        assert_eq!(tally.live_handles(), 0);
    }

    proptest! {
        #[test]
        fn repeated_ensure_started_starts_once(n in 1usize..32) {
            let mut interp = interpreter(Script::spiral());
            for _ in 0..n {
                interp.ensure_started().unwrap();
            }
            prop_assert_eq!(interp.runtime().tally().starts(), 1);
        }

        #[test]
        fn shutdown_never_faults(ops in proptest::collection::vec(any::<bool>(), 0..24)) {
            let mut interp = interpreter(Script::spiral());
            for start in ops {
                if start {
                    interp.ensure_started().unwrap();
                } else {
                    interp.shutdown();
                }
            }
            interp.shutdown();
            interp.shutdown();
            let tally = interp.runtime().tally();
            prop_assert_eq!(tally.starts(), tally.stops());
            prop_assert_eq!(tally.live_handles(), 0);
        }
    }
}
