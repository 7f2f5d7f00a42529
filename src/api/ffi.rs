//! C-compatible API exposed to AMPL.
//!
//! AMPL loads the shared library, calls `funcadd` once, and from then on calls the
//! registered functions on its own thread with an [`ArgList`]. Failure is signalled by
//! setting `Errmsg`; the returned number is only a placeholder in that case.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use tracing::warn;

use crate::bridge::{invoke, CallRequest, FunctionId};
use crate::common::error::BridgeError;
use crate::interpreter::{ForeignRuntime, Interpreter};

use super::asl::{ArgList, Real};

/// What a registered name does when AMPL calls it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Entry {
    Evaluate(FunctionId),
    Initialize,
    Finalize,
}

/// One row of the registration table handed to AMPL's `addfunc`.
#[derive(Copy, Clone, Debug)]
pub struct HostFunction {
    pub name: &'static CStr,
    pub nargs: c_int,
    pub entry: Entry,
}

/// Everything `funcadd` registers.
pub const HOST_FUNCTIONS: [HostFunction; 4] = [
    HostFunction {
        name: c"curvex",
        nargs: 1,
        entry: Entry::Evaluate(FunctionId::Curvex),
    },
    HostFunction {
        name: c"curvey",
        nargs: 1,
        entry: Entry::Evaluate(FunctionId::Curvey),
    },
    HostFunction {
        name: c"py_initialize",
        nargs: 0,
        entry: Entry::Initialize,
    },
    HostFunction {
        name: c"py_finalize",
        nargs: 0,
        entry: Entry::Finalize,
    },
];

thread_local! {
    // Message storage when AMPL gave us no Tempmem; valid until the next failure.
    static FALLBACK_ERRMSG: RefCell<CString> = RefCell::new(CString::default());
}

/// Body of `curvex`/`curvey`.
///
/// # Safety
/// `al` must be null or point to a live argument block whose pointers obey the
/// `funcadd.h` contract for the duration of the call.
pub unsafe fn evaluate<R: ForeignRuntime>(
    interp: &mut Interpreter<R>,
    id: FunctionId,
    al: *mut ArgList,
) -> Real {
    let Some(al) = al.as_mut() else {
        return f64::NAN;
    };
    let Some(arg) = al.first_real() else {
        let err = BridgeError::BadArity {
            function: id.name(),
            given: al.nr,
        };
        warn!(function = id.name(), code = err.code() as u32, "bad arity");
        return report(al, err);
    };

    // TODO: skip the derivative writes when `dig[0]` says AMPL will ignore them.
    let request = CallRequest {
        arg,
        derivative: al.derivs.as_mut(),
        hessian: al.hes.as_mut(),
    };
    match invoke(interp, id, request) {
        Ok(value) => value,
        Err(err) => report(al, err),
    }
}

/// Body of `py_initialize`: start the interpreter ahead of the first evaluation.
///
/// # Safety
/// Same contract as [`evaluate`].
pub unsafe fn initialize<R: ForeignRuntime>(interp: &mut Interpreter<R>, al: *mut ArgList) -> Real {
    let Err(source) = interp.ensure_started() else {
        return 0.0;
    };
    let al = al.as_mut();
    let arg = match &al {
        Some(al) => al.first_real(),
        None => None,
    };
    let err = BridgeError::Start { arg, source };
    warn!(code = err.code() as u32, error = %err, "py_initialize failed");
    match al {
        Some(al) => report(al, err),
        None => err.sentinel(),
    }
}

/// Body of `py_finalize`.
pub fn finalize<R: ForeignRuntime>(interp: &mut Interpreter<R>) -> Real {
    interp.shutdown();
    0.0
}

unsafe fn report(al: &mut ArgList, err: BridgeError) -> Real {
    set_errmsg(al, &err.to_string());
    err.sentinel()
}

/// Copy `msg` into host-owned temporary memory and point `Errmsg` at it.
unsafe fn set_errmsg(al: &mut ArgList, msg: &str) {
    let bytes: Vec<u8> = msg.bytes().filter(|b| *b != 0).collect();

    if let Some(tempmem) = al.ae.as_ref().and_then(|ae| ae.tempmem) {
        let buf = tempmem(al.tmi, bytes.len() + 1);
        if !buf.is_null() {
            ptr::copy_nonoverlapping(bytes.as_ptr(), buf.cast::<u8>(), bytes.len());
            *buf.add(bytes.len()) = 0;
            al.errmsg = buf;
            return;
        }
    }

    let message = CString::new(bytes).unwrap_or_default();
    al.errmsg = FALLBACK_ERRMSG.with(|slot| {
        let mut slot = slot.borrow_mut();
        *slot = message;
        slot.as_ptr() as *mut c_char
    });
}

#[cfg(feature = "python")]
pub use plugin::funcadd;

#[cfg(feature = "python")]
mod plugin {
    use std::os::raw::c_void;
    use std::ptr;
    use std::sync::{Mutex, PoisonError};

    use once_cell::sync::Lazy;
    use tracing::info;

    use super::{evaluate, finalize, initialize, Entry, HOST_FUNCTIONS};
    use crate::api::asl::{AmplExports, ArgList, RFunc, Real, FUNCADD_REAL_VALUED};
    use crate::bridge::FunctionId;
    use crate::common::config::AppCfg;
    use crate::common::log;
    use crate::interpreter::python::PythonRuntime;
    use crate::interpreter::Interpreter;

    // The one interpreter in the process. The lock serializes hosts that call in from
    // more than one thread.
    static PLUGIN: Lazy<Mutex<Interpreter<PythonRuntime>>> = Lazy::new(|| {
        let cfg = AppCfg::load();
        log::init(&cfg.log_filter);
        Mutex::new(Interpreter::new(PythonRuntime::new(&cfg), cfg.module.clone()))
    });

    fn with_plugin<T>(f: impl FnOnce(&mut Interpreter<PythonRuntime>) -> T) -> T {
        let mut guard = PLUGIN.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    unsafe extern "C" fn curvex(al: *mut ArgList) -> Real {
        with_plugin(|interp| evaluate(interp, FunctionId::Curvex, al))
    }

    unsafe extern "C" fn curvey(al: *mut ArgList) -> Real {
        with_plugin(|interp| evaluate(interp, FunctionId::Curvey, al))
    }

    unsafe extern "C" fn py_initialize(al: *mut ArgList) -> Real {
        with_plugin(|interp| initialize(interp, al))
    }

    unsafe extern "C" fn py_finalize(_al: *mut ArgList) -> Real {
        with_plugin(finalize)
    }

    unsafe extern "C" fn shutdown_at_exit(_data: *mut c_void) {
        with_plugin(|interp| interp.shutdown());
    }

    fn entry_point(entry: Entry) -> RFunc {
        match entry {
            Entry::Evaluate(FunctionId::Curvex) => curvex,
            Entry::Evaluate(FunctionId::Curvey) => curvey,
            Entry::Initialize => py_initialize,
            Entry::Finalize => py_finalize,
        }
    }

    /// Registration hook AMPL looks up after loading the library.
    ///
    /// # Safety
    /// `ae` must be the exports table AMPL passes to `funcadd`.
    #[no_mangle]
    pub unsafe extern "C" fn funcadd(ae: *mut AmplExports) {
        let Some(exports) = ae.as_ref() else {
            return;
        };
        let Some(add_func) = exports.add_func else {
            return;
        };
        Lazy::force(&PLUGIN);

        for func in HOST_FUNCTIONS {
            add_func(
                func.name.as_ptr(),
                entry_point(func.entry),
                FUNCADD_REAL_VALUED,
                func.nargs,
                ptr::null_mut(),
                ae,
            );
        }
        if let Some(at_exit) = exports.at_exit {
            at_exit(ae, shutdown_at_exit, ptr::null_mut());
        }
        info!(functions = HOST_FUNCTIONS.len(), "registered external functions");
    }
}
