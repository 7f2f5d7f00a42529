//! CPython backend for the interpreter lifecycle.
//!
//! The interpreter may be finalized and brought up again inside one AMPL session. pyo3
//! keeps interned strings and cached type objects in process-wide cells that do not
//! survive `Py_FinalizeEx`, so this module sticks to builtin types and plain attribute
//! lookups, and never formats a pyo3-built error.
//!
//! When the plugin brings CPython up it parks the main thread state right away, so the
//! GIL is free between calls and any host thread can take it through `with_gil`. The
//! parked state is restored only to finalize.

use std::path::PathBuf;
use std::ptr::NonNull;

use pyo3::exceptions::PyBaseException;
use pyo3::ffi;
use pyo3::prelude::*;
use pyo3::types::{PyList, PyTuple};
use tracing::{debug, warn};

use crate::bridge::domain::CallResult;
use crate::common::config::AppCfg;
use crate::common::error::RuntimeFault;

use super::domain::ForeignRuntime;

/// Owned reference to a Python object, released with the GIL held.
pub struct PyHandle<T = PyAny>(Option<Py<T>>);

impl<T> PyHandle<T> {
    fn new(obj: Py<T>) -> Self {
        Self(Some(obj))
    }

    fn take(mut self) -> Option<Py<T>> {
        self.0.take()
    }
}

impl<T> Drop for PyHandle<T> {
    fn drop(&mut self) {
        let Some(obj) = self.0.take() else {
            return;
        };
        // After finalize the object is already gone; decref would touch freed memory.
        if unsafe { ffi::Py_IsInitialized() } == 0 {
            std::mem::forget(obj);
            return;
        }
        Python::with_gil(|_py| drop(obj));
    }
}

/// Thread state returned by `PyEval_SaveThread` for an interpreter the plugin owns.
struct ParkedThread(NonNull<ffi::PyThreadState>);

// Only handed back to CPython from `stop`, under the plugin lock.
unsafe impl Send for ParkedThread {}

/// Embedded CPython.
pub struct PythonRuntime {
    search_path: Vec<PathBuf>,
    traceback: bool,
    /// Present when `start` brought the interpreter up, so `stop` may finalize it.
    main_thread: Option<ParkedThread>,
}

impl PythonRuntime {
    pub fn new(cfg: &AppCfg) -> Self {
        Self {
            search_path: cfg.search_path.clone(),
            traceback: cfg.traceback,
            main_thread: None,
        }
    }

    /// Describe a Python exception without going through pyo3's formatting helpers.
    fn describe(&self, py: Python<'_>, err: PyErr) -> RuntimeFault {
        if self.traceback {
            err.print(py);
        }
        let value: Bound<'_, PyBaseException> = err.into_value(py).into_bound(py);
        let message = match value.repr() {
            Ok(repr) => repr.to_string_lossy().into_owned(),
            Err(_) => "unprintable Python exception".to_string(),
        };
        RuntimeFault::new(message)
    }

    fn extend_sys_path(&self, py: Python<'_>) -> PyResult<()> {
        if self.search_path.is_empty() {
            return Ok(());
        }
        let path = py.import_bound("sys")?.getattr("path")?;
        for dir in self.search_path.iter().rev() {
            let entry = dir.to_string_lossy().into_owned();
            // A host-owned interpreter survives restarts; don't stack duplicates.
            if path.contains(entry.as_str())? {
                continue;
            }
            path.call_method1("insert", (0, entry))?;
        }
        Ok(())
    }
}

impl ForeignRuntime for PythonRuntime {
    type Module = PyHandle;
    type Callable = PyHandle;
    type Args = PyHandle<PyTuple>;
    type Value = PyHandle;

    fn start(&mut self) -> Result<(), RuntimeFault> {
        let already_running = unsafe { ffi::Py_IsInitialized() } != 0;
        if !already_running {
            // 0: leave signal handling to AMPL.
            unsafe { ffi::Py_InitializeEx(0) };
            if unsafe { ffi::Py_IsInitialized() } == 0 {
                return Err(RuntimeFault::new("Py_InitializeEx did not initialize Python"));
            }
            let tstate = unsafe { ffi::PyEval_SaveThread() };
            self.main_thread = NonNull::new(tstate).map(ParkedThread);
        }
        debug!(owned = self.main_thread.is_some(), "python runtime up");

        let extended = Python::with_gil(|py| {
            self.extend_sys_path(py).map_err(|err| self.describe(py, err))
        });
        if let Err(fault) = extended {
            self.stop();
            return Err(fault);
        }
        Ok(())
    }

    fn stop(&mut self) {
        let Some(parked) = self.main_thread.take() else {
            debug!("python runtime not owned by the plugin; leaving it running");
            return;
        };
        unsafe { ffi::PyEval_RestoreThread(parked.0.as_ptr()) };
        if unsafe { ffi::Py_FinalizeEx() } < 0 {
            warn!("Py_FinalizeEx reported errors while flushing buffered data");
        }
    }

    fn import_module(&mut self, name: &str) -> Result<PyHandle, RuntimeFault> {
        Python::with_gil(|py| match py.import_bound(name) {
            Ok(module) => Ok(PyHandle::new(module.into_any().unbind())),
            Err(err) => Err(self.describe(py, err)),
        })
    }

    fn resolve_callable(&mut self, module: &PyHandle, name: &str) -> Result<PyHandle, RuntimeFault> {
        Python::with_gil(|py| {
            let module = module
                .0
                .as_ref()
                .ok_or_else(|| RuntimeFault::new("module handle already released"))?
                .bind(py);
            let attr = module.getattr(name).map_err(|err| self.describe(py, err))?;
            if !attr.is_callable() {
                return Err(RuntimeFault::new(format!("attribute `{name}` is not callable")));
            }
            Ok(PyHandle::new(attr.unbind()))
        })
    }

    fn marshal_arg(&self, arg: f64) -> Result<PyHandle<PyTuple>, RuntimeFault> {
        Python::with_gil(|py| {
            let built = unsafe {
                Bound::from_owned_ptr_or_err(py, ffi::PyFloat_FromDouble(arg)).and_then(|value| {
                    let tuple = Bound::from_owned_ptr_or_err(py, ffi::PyTuple_New(1))?;
                    // Steals `value`, even on failure.
                    if ffi::PyTuple_SetItem(tuple.as_ptr(), 0, value.into_ptr()) < 0 {
                        return Err(PyErr::fetch(py));
                    }
                    Ok(tuple.downcast_into_unchecked::<PyTuple>())
                })
            };
            match built {
                Ok(args) => Ok(PyHandle::new(args.unbind())),
                Err(err) => Err(self.describe(py, err)),
            }
        })
    }

    fn call(&self, callable: &PyHandle, args: PyHandle<PyTuple>) -> Result<PyHandle, RuntimeFault> {
        Python::with_gil(|py| {
            let callable = callable
                .0
                .as_ref()
                .ok_or_else(|| RuntimeFault::new("callable handle already released"))?
                .bind(py);
            let args = args
                .take()
                .ok_or_else(|| RuntimeFault::new("argument tuple already released"))?
                .into_bound(py);
            match callable.call1(args) {
                Ok(value) => Ok(PyHandle::new(value.unbind())),
                Err(err) => Err(self.describe(py, err)),
            }
        })
    }

    fn decode_triple(&self, value: PyHandle) -> Result<CallResult, RuntimeFault> {
        Python::with_gil(|py| {
            let value = value
                .take()
                .ok_or_else(|| RuntimeFault::new("return value already released"))?
                .into_bound(py);

            let items: Vec<Bound<'_, PyAny>> = if let Ok(tuple) = value.downcast::<PyTuple>() {
                tuple.iter().collect()
            } else if let Ok(list) = value.downcast::<PyList>() {
                list.iter().collect()
            } else {
                return Err(RuntimeFault::new(
                    "expected a tuple or list of three numbers",
                ));
            };

            if items.len() != 3 {
                return Err(RuntimeFault::new(format!(
                    "expected 3 numbers, got {}",
                    items.len()
                )));
            }

            let mut out = [0.0_f64; 3];
            for (slot, item) in out.iter_mut().zip(&items) {
                // Conversion errors are discarded unformatted; see module docs.
                *slot = item.extract::<f64>().map_err(|_| {
                    RuntimeFault::new("return values must be real numbers")
                })?;
            }
            Ok(CallResult::from((out[0], out[1], out[2])))
        })
    }
}
