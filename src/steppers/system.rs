//! Dynamical system interfaces consumed by the steppers

use nalgebra::{DMatrix, DVector};

use super::{OdeError, StepCount};

/// Continuous-time system `dy/dt = f(y, t)`
///
/// Used by explicit steppers and by implicit steppers with the standard
/// residual/Jacobian policies. A failed evaluation is reported as
/// [`OdeError::VelocityEvaluationFailure`].
pub trait ContinuousTimeSystem {
    /// Allocate a velocity vector
    fn create_velocity(&self) -> DVector<f64>;

    /// Allocate a Jacobian matrix `df/dy`
    fn create_jacobian(&self) -> DMatrix<f64>;

    /// Evaluate `f(state, time)` into `f`
    fn velocity(&self, state: &DVector<f64>, time: f64, f: &mut DVector<f64>)
        -> Result<(), OdeError>;

    /// Evaluate `df/dy(state, time)` into `j`
    fn jacobian(&self, state: &DVector<f64>, time: f64, j: &mut DMatrix<f64>)
        -> Result<(), OdeError>;
}

/// Discrete-time system providing the time-discrete residual directly
///
/// `stencil` holds the stencil states ordered `n`, `n-1`, ... (one to three
/// states for the built-in schemes). An unrecoverable evaluation is reported
/// as [`OdeError::DiscreteTimeResidualFailure`].
pub trait DiscreteTimeSystem {
    fn create_discrete_time_residual(&self) -> DVector<f64>;

    fn create_discrete_time_jacobian(&self) -> DMatrix<f64>;

    fn discrete_time_residual(
        &self,
        step: StepCount,
        time: f64,
        dt: f64,
        r: &mut DVector<f64>,
        trial: &DVector<f64>,
        stencil: &[DVector<f64>],
    ) -> Result<(), OdeError>;

    fn discrete_time_jacobian(
        &self,
        step: StepCount,
        time: f64,
        dt: f64,
        j: &mut DMatrix<f64>,
        trial: &DVector<f64>,
        stencil: &[DVector<f64>],
    ) -> Result<(), OdeError>;
}
