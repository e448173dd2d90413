//! Integration settings types.

use serde::{Deserialize, Serialize};

use crate::steppers::{OdeError, StepSizeControl};

/// Available time-stepping schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemeKind {
    /// Forward Euler (1st order, explicit)
    Euler,
    /// Classical RK4 (4th order, explicit)
    RK4,
    /// Strong Stability Preserving RK3 (3rd order, explicit)
    SSPRK3,
    /// Backward Euler (1st order, implicit)
    BDF1,
    /// Second-order backward differentiation formula
    BDF2,
    /// Third-order backward differentiation formula
    BDF3,
}

impl Default for SchemeKind {
    fn default() -> Self {
        SchemeKind::BDF2
    }
}

impl SchemeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemeKind::Euler => "Euler",
            SchemeKind::RK4 => "RK4",
            SchemeKind::SSPRK3 => "SSPRK3",
            SchemeKind::BDF1 => "BDF1",
            SchemeKind::BDF2 => "BDF2",
            SchemeKind::BDF3 => "BDF3",
        }
    }

    pub fn order(&self) -> usize {
        match self {
            SchemeKind::Euler | SchemeKind::BDF1 => 1,
            SchemeKind::BDF2 => 2,
            SchemeKind::SSPRK3 | SchemeKind::BDF3 => 3,
            SchemeKind::RK4 => 4,
        }
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self, SchemeKind::BDF1 | SchemeKind::BDF2 | SchemeKind::BDF3)
    }
}

/// Newton-Raphson settings
///
/// The iteration stops as soon as any tolerance is met.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonSettings {
    /// Maximum number of Newton iterations per solve
    pub max_iterations: usize,

    /// Absolute tolerance on the residual norm
    pub residual_abs_tol: f64,

    /// Tolerance on the residual norm relative to the initial residual norm
    pub residual_rel_tol: f64,

    /// Absolute tolerance on the correction norm
    pub correction_abs_tol: f64,

    /// Tolerance on the correction norm relative to the state norm
    pub correction_rel_tol: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            residual_abs_tol: 1e-6,
            residual_rel_tol: 1e-6,
            correction_abs_tol: 1e-6,
            correction_rel_tol: 1e-6,
        }
    }
}

impl NewtonSettings {
    /// Same tolerance for every criterion
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.residual_abs_tol = tol;
        self.residual_rel_tol = tol;
        self.correction_abs_tol = tol;
        self.correction_rel_tol = tol;
        self
    }

    pub fn validate(&self) -> Result<(), OdeError> {
        if self.max_iterations == 0 {
            return Err(OdeError::InvalidConfiguration(
                "newton max_iterations must be positive".into(),
            ));
        }
        let tolerances = [
            self.residual_abs_tol,
            self.residual_rel_tol,
            self.correction_abs_tol,
            self.correction_rel_tol,
        ];
        if tolerances.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(OdeError::InvalidConfiguration(
                "newton tolerances must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Integration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    /// Time-stepping scheme
    pub scheme: SchemeKind,

    /// Initial time
    pub start_time: f64,

    /// Integration duration
    pub duration: f64,

    /// Time step
    pub dt: f64,

    /// Retry failed steps with a reduced time step
    pub recovery: bool,

    /// Minimum time step when retrying
    pub dt_min: f64,

    /// Factor the time step is divided by on each retry
    pub dt_reduction_factor: f64,

    /// Nonlinear solver settings for implicit schemes
    pub newton: NewtonSettings,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            scheme: SchemeKind::BDF2,
            start_time: 0.0,
            duration: 0.1,
            dt: 0.01,
            recovery: false,
            dt_min: 1e-8,
            dt_reduction_factor: 2.0,
            newton: NewtonSettings::default(),
        }
    }
}

impl IntegratorSettings {
    /// Parse settings from JSON; missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, OdeError> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| OdeError::InvalidConfiguration(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, OdeError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| OdeError::InvalidConfiguration(format!("cannot serialize settings: {e}")))
    }

    pub fn final_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Step-size control for the run; without recovery `dt` is never reduced
    pub fn step_size_control(&self) -> StepSizeControl {
        if self.recovery {
            StepSizeControl::new(self.dt, self.dt_min, self.dt_reduction_factor)
        } else {
            StepSizeControl::fixed(self.dt)
        }
    }

    pub fn validate(&self) -> Result<(), OdeError> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(OdeError::InvalidConfiguration(format!(
                "duration must be finite and non-negative, got {}",
                self.duration
            )));
        }
        self.step_size_control().validate()?;
        self.newton.validate()
    }
}
