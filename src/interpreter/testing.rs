//! Scripted in-process runtime used by the unit tests.
//!
//! Every handle it gives out is counted, so tests can check that start-up happens once,
//! that failures release what they acquired, and that nothing is released after stop.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bridge::domain::CallResult;
use crate::common::error::RuntimeFault;

use super::domain::ForeignRuntime;

type Body = Rc<dyn Fn(f64) -> Result<Vec<f64>, String>>;

/// Counters shared between a runtime and the test that drives it.
#[derive(Default, Debug)]
pub struct Tally {
    starts: Cell<u64>,
    stops: Cell<u64>,
    calls: Cell<u64>,
    running: Cell<bool>,
    live: Cell<i64>,
    late_releases: Cell<u64>,
}

impl Tally {
    pub fn starts(&self) -> u64 {
        self.starts.get()
    }

    pub fn stops(&self) -> u64 {
        self.stops.get()
    }

    pub fn calls(&self) -> u64 {
        self.calls.get()
    }

    pub fn running(&self) -> bool {
        self.running.get()
    }

    pub fn live_handles(&self) -> i64 {
        self.live.get()
    }

    pub fn handles_released_while_stopped(&self) -> u64 {
        self.late_releases.get()
    }
}

/// A counted foreign reference.
#[derive(Debug)]
pub struct Handle {
    name: String,
    tally: Rc<Tally>,
}

impl Handle {
    fn acquire(name: &str, tally: &Rc<Tally>) -> Self {
        tally.live.set(tally.live.get() + 1);
        Self {
            name: name.to_string(),
            tally: Rc::clone(tally),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.tally.live.set(self.tally.live.get() - 1);
        if !self.tally.running.get() {
            self.tally.late_releases.set(self.tally.late_releases.get() + 1);
        }
    }
}

/// What the fake module looks like and how its functions behave.
#[derive(Clone)]
pub struct Script {
    refuse_start: bool,
    has_module: bool,
    functions: HashMap<String, Body>,
    reject_arg: Option<fn(f64) -> bool>,
}

impl Script {
    /// Empty module.
    pub fn empty() -> Self {
        Self {
            refuse_start: false,
            has_module: true,
            functions: HashMap::new(),
            reject_arg: None,
        }
    }

    /// The spiral demo: curvex(t) = t sin t, curvey(t) = t cos t.
    pub fn spiral() -> Self {
        Self::empty()
            .with_function("curvex", |t| {
                let (s, c) = t.sin_cos();
                Ok(vec![t * s, s + t * c, 2.0 * c - t * s])
            })
            .with_function("curvey", |t| {
                let (s, c) = t.sin_cos();
                Ok(vec![t * c, c - t * s, -2.0 * s - t * c])
            })
    }

    pub fn with_function(
        mut self,
        name: &str,
        body: impl Fn(f64) -> Result<Vec<f64>, String> + 'static,
    ) -> Self {
        self.functions.insert(name.to_string(), Rc::new(body));
        self
    }

    pub fn without_function(mut self, name: &str) -> Self {
        self.functions.remove(name);
        self
    }

    pub fn without_module(mut self) -> Self {
        self.has_module = false;
        self
    }

    pub fn refuse_start(mut self) -> Self {
        self.refuse_start = true;
        self
    }

    pub fn reject_arg(mut self, rejects: fn(f64) -> bool) -> Self {
        self.reject_arg = Some(rejects);
        self
    }
}

pub struct ScriptedRuntime {
    script: Script,
    tally: Rc<Tally>,
}

impl ScriptedRuntime {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            tally: Rc::new(Tally::default()),
        }
    }

    pub fn tally(&self) -> Rc<Tally> {
        Rc::clone(&self.tally)
    }
}

impl ForeignRuntime for ScriptedRuntime {
    type Module = Handle;
    type Callable = Handle;
    type Args = f64;
    type Value = Vec<f64>;

    fn start(&mut self) -> Result<(), RuntimeFault> {
        if self.script.refuse_start {
            return Err(RuntimeFault::new("runtime refused to start"));
        }
        assert!(!self.tally.running.get(), "runtime started twice");
        self.tally.starts.set(self.tally.starts.get() + 1);
        self.tally.running.set(true);
        Ok(())
    }

    fn stop(&mut self) {
        assert!(self.tally.running.get(), "runtime stopped while not running");
        self.tally.stops.set(self.tally.stops.get() + 1);
        self.tally.running.set(false);
    }

    fn import_module(&mut self, name: &str) -> Result<Handle, RuntimeFault> {
        if !self.script.has_module {
            return Err(RuntimeFault::new(format!(
                "ModuleNotFoundError(\"No module named '{name}'\")"
            )));
        }
        Ok(Handle::acquire(name, &self.tally))
    }

    fn resolve_callable(&mut self, _module: &Handle, name: &str) -> Result<Handle, RuntimeFault> {
        if !self.script.functions.contains_key(name) {
            return Err(RuntimeFault::new(format!(
                "AttributeError(\"module has no attribute '{name}'\")"
            )));
        }
        Ok(Handle::acquire(name, &self.tally))
    }

    fn marshal_arg(&self, arg: f64) -> Result<f64, RuntimeFault> {
        match self.script.reject_arg {
            Some(rejects) if rejects(arg) => Err(RuntimeFault::new("cannot build float")),
            _ => Ok(arg),
        }
    }

    fn call(&self, callable: &Handle, arg: f64) -> Result<Vec<f64>, RuntimeFault> {
        assert!(self.tally.running.get(), "call on a stopped runtime");
        self.tally.calls.set(self.tally.calls.get() + 1);
        let body = self
            .script
            .functions
            .get(&callable.name)
            .ok_or_else(|| RuntimeFault::new("stale callable"))?;
        body(arg).map_err(RuntimeFault::new)
    }

    fn decode_triple(&self, value: Vec<f64>) -> Result<CallResult, RuntimeFault> {
        match value.as_slice() {
            [v, d1, d2] => Ok(CallResult::from((*v, *d1, *d2))),
            other => Err(RuntimeFault::new(format!(
                "expected 3 numbers, got {}",
                other.len()
            ))),
        }
    }
}
