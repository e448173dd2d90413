//! Base stepper traits and types

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Step counter. Steps are numbered from 1; step `s` advances `y_{s-1}` to `y_s`.
pub type StepCount = usize;

/// Stepper-related errors
///
/// Numerical failures (`VelocityEvaluationFailure`, `DiscreteTimeResidualFailure`,
/// `ResidualEvaluationFailure`,
/// `NonlinearSolveFailure`, `TimeStepFailure`) can be recovered from by retrying
/// a step with a smaller time step. `TimeStepTooSmall` and `InvalidConfiguration`
/// are fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OdeError {
    #[error("Velocity evaluation failed: {0}")]
    VelocityEvaluationFailure(String),

    #[error("Discrete-time residual evaluation failed unrecoverably: {0}")]
    DiscreteTimeResidualFailure(String),

    #[error("Residual evaluation failed at step {step} (t = {time}): {source}")]
    ResidualEvaluationFailure {
        step: StepCount,
        time: f64,
        #[source]
        source: Box<OdeError>,
    },

    #[error("Nonlinear solve failed after {iterations} iterations: {reason}")]
    NonlinearSolveFailure { iterations: usize, reason: String },

    #[error("Time step {step} failed with dt = {dt}")]
    TimeStepFailure {
        step: StepCount,
        dt: f64,
        #[source]
        source: Box<OdeError>,
    },

    #[error("Timestep {dt} smaller than minimum {dt_min} at step {step}")]
    TimeStepTooSmall { step: StepCount, dt: f64, dt_min: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl OdeError {
    /// Whether a retry with different step parameters can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OdeError::VelocityEvaluationFailure(_)
                | OdeError::DiscreteTimeResidualFailure(_)
                | OdeError::ResidualEvaluationFailure { .. }
                | OdeError::NonlinearSolveFailure { .. }
                | OdeError::TimeStepFailure { .. }
        )
    }

    pub fn is_time_step_failure(&self) -> bool {
        matches!(self, OdeError::TimeStepFailure { .. })
    }

    /// Surface a failure raised inside a step as a single time-step failure.
    ///
    /// A failure that already is a time-step failure (raised by an auxiliary
    /// stepper) is passed through unchanged; fatal errors are never wrapped.
    pub(crate) fn into_time_step_failure(self, step: StepCount, dt: f64) -> OdeError {
        if self.is_time_step_failure() || !self.is_recoverable() {
            return self;
        }
        OdeError::TimeStepFailure {
            step,
            dt,
            source: Box::new(self),
        }
    }
}

/// Lifecycle phase of an implicit stepper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepperPhase {
    /// Steps are delegated to the auxiliary lower-order stepper.
    Bootstrapping,
    /// The full-order residual and Jacobian are in use.
    SteadyState,
    /// The last step failed and every mutated quantity was restored.
    RolledBack,
}

/// The nonlinear system a solver drives to zero.
///
/// Implicit steppers present themselves to solvers through this trait.
pub trait NonlinearSystem {
    fn create_residual(&self) -> DVector<f64>;

    fn create_jacobian(&self) -> DMatrix<f64>;

    fn residual(&self, state: &DVector<f64>, r: &mut DVector<f64>) -> Result<(), OdeError>;

    fn jacobian(&self, state: &DVector<f64>, j: &mut DMatrix<f64>) -> Result<(), OdeError>;
}

/// Nonlinear solver capability required by implicit steppers
///
/// `solve` updates `state` in place so that `system.residual(state) ≈ 0`, or
/// returns [`OdeError::NonlinearSolveFailure`]. The solver must not retain
/// the system or the state past the call.
pub trait NonlinearSolver {
    fn solve<S>(&mut self, system: &S, state: &mut DVector<f64>) -> Result<(), OdeError>
    where
        S: NonlinearSystem + ?Sized;
}

/// Implicit stepper trait
///
/// Implemented by every implicit scheme and by [`NoBootstrap`], the terminal
/// auxiliary stepper of the BDF chain.
pub trait ImplicitStepping {
    /// Number of stencil states the scheme keeps.
    const STENCIL_SIZE: usize;

    /// Order of the method
    fn order(&self) -> usize;

    /// Advance `state` from `current_time` to `current_time + dt`, seeding the
    /// nonlinear solve with `guess`.
    ///
    /// The guess only seeds full-order steps. Steps delegated to an auxiliary
    /// stepper during bootstrap start from the last accepted state.
    fn do_step_with_guess<NS, G>(
        &mut self,
        state: &mut DVector<f64>,
        current_time: f64,
        dt: f64,
        step: StepCount,
        solver: &mut NS,
        guess: G,
    ) -> Result<(), OdeError>
    where
        NS: NonlinearSolver + ?Sized,
        G: FnMut(StepCount, f64, &mut DVector<f64>);

    /// Advance `state`, using the previous accepted state as initial iterate.
    fn do_step<NS>(
        &mut self,
        state: &mut DVector<f64>,
        current_time: f64,
        dt: f64,
        step: StepCount,
        solver: &mut NS,
    ) -> Result<(), OdeError>
    where
        NS: NonlinearSolver + ?Sized,
    {
        self.do_step_with_guess(state, current_time, dt, step, solver, |_, _, _| {})
    }
}

/// Terminal auxiliary stepper for schemes that never bootstrap.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBootstrap;

impl ImplicitStepping for NoBootstrap {
    const STENCIL_SIZE: usize = 0;

    fn order(&self) -> usize {
        0
    }

    fn do_step_with_guess<NS, G>(
        &mut self,
        _state: &mut DVector<f64>,
        _current_time: f64,
        _dt: f64,
        step: StepCount,
        _solver: &mut NS,
        _guess: G,
    ) -> Result<(), OdeError>
    where
        NS: NonlinearSolver + ?Sized,
        G: FnMut(StepCount, f64, &mut DVector<f64>),
    {
        Err(OdeError::InvalidConfiguration(format!(
            "no auxiliary stepper available for step {step}"
        )))
    }
}

/// Anything the advancers can drive one step at a time.
pub trait Steppable {
    /// Order of the method
    fn order(&self) -> usize;

    fn step(
        &mut self,
        state: &mut DVector<f64>,
        current_time: f64,
        dt: f64,
        step: StepCount,
    ) -> Result<(), OdeError>;
}

/// An implicit stepper bound to the nonlinear solver it uses at every step.
pub struct WithSolver<'s, T, NS: ?Sized> {
    stepper: &'s mut T,
    solver: &'s mut NS,
}

impl<'s, T, NS: ?Sized> WithSolver<'s, T, NS> {
    pub fn new(stepper: &'s mut T, solver: &'s mut NS) -> Self {
        Self { stepper, solver }
    }
}

impl<T, NS> Steppable for WithSolver<'_, T, NS>
where
    T: ImplicitStepping,
    NS: NonlinearSolver + ?Sized,
{
    fn order(&self) -> usize {
        self.stepper.order()
    }

    fn step(
        &mut self,
        state: &mut DVector<f64>,
        current_time: f64,
        dt: f64,
        step: StepCount,
    ) -> Result<(), OdeError> {
        self.stepper
            .do_step(state, current_time, dt, step, &mut *self.solver)
    }
}
