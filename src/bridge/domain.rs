//! Domain definitions for registered functions and the per-call request/result.

/// Functions exposed to AMPL and backed by a callable of the same name in the user module.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FunctionId {
    Curvex,
    Curvey,
}

impl FunctionId {
    /// Every function resolved when the interpreter starts, in slot order.
    pub const ALL: [FunctionId; 2] = [FunctionId::Curvex, FunctionId::Curvey];

    /// Name shared by the AMPL registration and the Python attribute.
    pub fn name(self) -> &'static str {
        match self {
            FunctionId::Curvex => "curvex",
            FunctionId::Curvey => "curvey",
        }
    }

    /// Position of the resolved callable in the interpreter's handle table.
    pub fn index(self) -> usize {
        match self {
            FunctionId::Curvex => 0,
            FunctionId::Curvey => 1,
        }
    }
}

/// Value, first derivative and second derivative returned by a user function.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CallResult {
    pub value: f64,
    pub derivative: f64,
    pub hessian: f64,
}

impl From<(f64, f64, f64)> for CallResult {
    fn from((value, derivative, hessian): (f64, f64, f64)) -> Self {
        Self {
            value,
            derivative,
            hessian,
        }
    }
}

/// Host view of a single evaluation. Output slots are absent when AMPL did not ask
/// for derivatives.
#[derive(Debug)]
pub struct CallRequest<'a> {
    pub arg: f64,
    pub derivative: Option<&'a mut f64>,
    pub hessian: Option<&'a mut f64>,
}

impl<'a> CallRequest<'a> {
    /// Request for the function value only.
    pub fn value_only(arg: f64) -> Self {
        Self {
            arg,
            derivative: None,
            hessian: None,
        }
    }

    pub fn with_derivative(mut self, slot: &'a mut f64) -> Self {
        self.derivative = Some(slot);
        self
    }

    pub fn with_hessian(mut self, slot: &'a mut f64) -> Self {
        self.hessian = Some(slot);
        self
    }

    /// Fill whichever output slots are present and hand back the function value.
    pub fn complete(self, result: CallResult) -> f64 {
        if let Some(slot) = self.derivative {
            *slot = result.derivative;
        }
        if let Some(slot) = self.hessian {
            *slot = result.hessian;
        }
        result.value
    }
}
