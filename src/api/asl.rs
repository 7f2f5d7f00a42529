//! `#[repr(C)]` mirrors of the structures AMPL hands to external functions
//! (`funcadd.h` from the AMPL Solver Library).
//!
//! Only the leading part of `AmplExports` is declared. AMPL owns the real allocation and
//! the plugin only reads through the pointer, so the tail never needs a Rust name.

use std::os::raw::{c_char, c_int, c_long, c_void};

/// AMPL's floating-point type.
pub type Real = f64;

/// Opaque temporary-memory bookkeeping owned by AMPL.
#[repr(C)]
pub struct TMInfo {
    _private: [u8; 0],
}

/// Signature of every real-valued external function.
pub type RFunc = unsafe extern "C" fn(al: *mut ArgList) -> Real;

/// Callback run by AMPL on exit or reset.
pub type ExitFunc = unsafe extern "C" fn(data: *mut c_void);

pub type AddFunc = unsafe extern "C" fn(
    name: *const c_char,
    f: RFunc,
    kind: c_int,
    nargs: c_int,
    funcinfo: *mut c_void,
    ae: *mut AmplExports,
);

pub type AtExitFunc = unsafe extern "C" fn(ae: *mut AmplExports, f: ExitFunc, data: *mut c_void);

pub type TempMemFunc = unsafe extern "C" fn(tmi: *mut TMInfo, len: usize) -> *mut c_char;

/// `funcadd` type flag: real valued, numeric arguments only.
pub const FUNCADD_REAL_VALUED: c_int = 0;

#[repr(C)]
pub struct AmplExports {
    pub std_err: *mut c_void,
    pub add_func: Option<AddFunc>,
    pub asl_date: c_long,
    pub fprintf: *const c_void,
    pub printf: *const c_void,
    pub sprintf: *const c_void,
    pub vfprintf: *const c_void,
    pub vsprintf: *const c_void,
    pub strtod: *const c_void,
    pub crypto: *const c_void,
    pub asl: *mut c_char,
    pub at_exit: Option<AtExitFunc>,
    pub at_reset: Option<AtExitFunc>,
    pub tempmem: Option<TempMemFunc>,
}

/// Per-call argument block.
#[repr(C)]
pub struct ArgList {
    /// Number of arguments.
    pub n: c_int,
    /// Number of real input arguments.
    pub nr: c_int,
    pub at: *mut c_int,
    /// Real arguments.
    pub ra: *mut Real,
    pub sa: *mut *const c_char,
    /// First-derivative output, null when AMPL does not want derivatives.
    pub derivs: *mut Real,
    /// Second-derivative output, null when AMPL does not want them.
    pub hes: *mut Real,
    pub dig: *mut c_char,
    pub funcinfo: *mut c_char,
    pub ae: *mut AmplExports,
    pub f: *mut c_void,
    pub tva: *mut c_void,
    /// Set to a message to report failure.
    pub errmsg: *mut c_char,
    pub tmi: *mut TMInfo,
    pub private: *mut c_char,
    pub nin: c_int,
    pub nout: c_int,
    pub nsin: c_int,
    pub nsout: c_int,
}

impl ArgList {
    /// An argument block with every pointer null, as a starting point for callers
    /// that build one by hand.
    pub fn empty() -> Self {
        use std::ptr::null_mut;
        Self {
            n: 0,
            nr: 0,
            at: null_mut(),
            ra: null_mut(),
            sa: null_mut(),
            derivs: null_mut(),
            hes: null_mut(),
            dig: null_mut(),
            funcinfo: null_mut(),
            ae: null_mut(),
            f: null_mut(),
            tva: null_mut(),
            errmsg: null_mut(),
            tmi: null_mut(),
            private: null_mut(),
            nin: 0,
            nout: 0,
            nsin: 0,
            nsout: 0,
        }
    }

    /// The first real argument, if AMPL passed one.
    ///
    /// # Safety
    /// `ra` must point to at least `nr` reals.
    pub unsafe fn first_real(&self) -> Option<Real> {
        if self.nr < 1 || self.ra.is_null() {
            return None;
        }
        Some(*self.ra)
    }
}
