//! Residual and Jacobian policies for implicit steppers
//!
//! A policy turns a dynamical system plus the stencil of past states into the
//! algebraic residual `R(y)` and Jacobian `dR/dy` of the time-discrete
//! equation that the nonlinear solver drives to zero at every step.
//!
//! Two families are provided:
//! - [`StandardResidualPolicy`] / [`StandardJacobianPolicy`] for
//!   [`ContinuousTimeSystem`]s, applying a BDF coefficient table to the velocity
//! - [`DiscreteTimeResidualPolicy`] / [`DiscreteTimeJacobianPolicy`] for
//!   [`DiscreteTimeSystem`]s, forwarding the stencil to the system

use std::ops::Deref;

use nalgebra::{DMatrix, DVector};

use super::{ContinuousTimeSystem, DiscreteTimeSystem, OdeError, StepCount, StencilStates};

/// Coefficients of a constant-step BDF scheme
///
/// The residual is
/// ```text
/// R(y) = y - sum(alpha_j * y_{n-j}; j=0,...,K-1) - beta * h * f(y, t_{n+1})
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BdfCoefficients {
    pub alpha: &'static [f64],
    pub beta: f64,
}

/// Backward Euler
pub const BDF1_COEFFICIENTS: BdfCoefficients = BdfCoefficients {
    alpha: &[1.0],
    beta: 1.0,
};

pub const BDF2_COEFFICIENTS: BdfCoefficients = BdfCoefficients {
    alpha: &[4.0 / 3.0, -1.0 / 3.0],
    beta: 2.0 / 3.0,
};

pub const BDF3_COEFFICIENTS: BdfCoefficients = BdfCoefficients {
    alpha: &[18.0 / 11.0, -9.0 / 11.0, 2.0 / 11.0],
    beta: 6.0 / 11.0,
};

impl BdfCoefficients {
    /// Coefficient table of the BDF scheme using `size` stencil states
    pub fn for_stencil_size(size: usize) -> Option<&'static BdfCoefficients> {
        match size {
            1 => Some(&BDF1_COEFFICIENTS),
            2 => Some(&BDF2_COEFFICIENTS),
            3 => Some(&BDF3_COEFFICIENTS),
            _ => None,
        }
    }

    fn lookup(size: usize) -> Result<&'static BdfCoefficients, OdeError> {
        Self::for_stencil_size(size).ok_or_else(|| {
            OdeError::InvalidConfiguration(format!("no BDF scheme with {size} stencil states"))
        })
    }
}

/// Computes the time-discrete residual for a system of type `Sys`
pub trait ResidualPolicy<Sys: ?Sized> {
    fn create(&self, system: &Sys) -> DVector<f64>;

    #[allow(clippy::too_many_arguments)]
    fn compute<const K: usize>(
        &self,
        predicted: &DVector<f64>,
        stencil: &StencilStates<K>,
        system: &Sys,
        time: f64,
        dt: f64,
        step: StepCount,
        r: &mut DVector<f64>,
    ) -> Result<(), OdeError>;
}

/// Computes the time-discrete Jacobian for a system of type `Sys`
pub trait JacobianPolicy<Sys: ?Sized> {
    fn create(&self, system: &Sys) -> DMatrix<f64>;

    #[allow(clippy::too_many_arguments)]
    fn compute<const K: usize>(
        &self,
        predicted: &DVector<f64>,
        stencil: &StencilStates<K>,
        system: &Sys,
        time: f64,
        dt: f64,
        step: StepCount,
        j: &mut DMatrix<f64>,
    ) -> Result<(), OdeError>;
}

/// BDF residual from the system velocity
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardResidualPolicy;

impl<Sys> ResidualPolicy<Sys> for StandardResidualPolicy
where
    Sys: ContinuousTimeSystem + ?Sized,
{
    fn create(&self, system: &Sys) -> DVector<f64> {
        system.create_velocity()
    }

    fn compute<const K: usize>(
        &self,
        predicted: &DVector<f64>,
        stencil: &StencilStates<K>,
        system: &Sys,
        time: f64,
        dt: f64,
        step: StepCount,
        r: &mut DVector<f64>,
    ) -> Result<(), OdeError> {
        let coeffs = BdfCoefficients::lookup(K)?;

        system
            .velocity(predicted, time, r)
            .map_err(|e| residual_failure(e, step, time))?;

        // r = y - beta*h*f - sum(alpha_j * y_{n-j})
        *r *= -coeffs.beta * dt;
        *r += predicted;
        for (alpha, y_prev) in coeffs.alpha.iter().zip(stencil.as_slice()) {
            r.axpy(-alpha, y_prev, 1.0);
        }
        Ok(())
    }
}

/// BDF Jacobian `I - beta*h*df/dy` from the system Jacobian
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardJacobianPolicy;

impl<Sys> JacobianPolicy<Sys> for StandardJacobianPolicy
where
    Sys: ContinuousTimeSystem + ?Sized,
{
    fn create(&self, system: &Sys) -> DMatrix<f64> {
        system.create_jacobian()
    }

    fn compute<const K: usize>(
        &self,
        predicted: &DVector<f64>,
        _stencil: &StencilStates<K>,
        system: &Sys,
        time: f64,
        dt: f64,
        step: StepCount,
        j: &mut DMatrix<f64>,
    ) -> Result<(), OdeError> {
        let coeffs = BdfCoefficients::lookup(K)?;

        system
            .jacobian(predicted, time, j)
            .map_err(|e| residual_failure(e, step, time))?;

        *j *= -coeffs.beta * dt;
        for i in 0..j.nrows().min(j.ncols()) {
            j[(i, i)] += 1.0;
        }
        Ok(())
    }
}

/// Residual supplied by a [`DiscreteTimeSystem`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscreteTimeResidualPolicy;

impl<Sys> ResidualPolicy<Sys> for DiscreteTimeResidualPolicy
where
    Sys: DiscreteTimeSystem + ?Sized,
{
    fn create(&self, system: &Sys) -> DVector<f64> {
        system.create_discrete_time_residual()
    }

    fn compute<const K: usize>(
        &self,
        predicted: &DVector<f64>,
        stencil: &StencilStates<K>,
        system: &Sys,
        time: f64,
        dt: f64,
        step: StepCount,
        r: &mut DVector<f64>,
    ) -> Result<(), OdeError> {
        system
            .discrete_time_residual(step, time, dt, r, predicted, stencil.as_slice())
            .map_err(|e| residual_failure(e, step, time))
    }
}

/// Jacobian supplied by a [`DiscreteTimeSystem`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscreteTimeJacobianPolicy;

impl<Sys> JacobianPolicy<Sys> for DiscreteTimeJacobianPolicy
where
    Sys: DiscreteTimeSystem + ?Sized,
{
    fn create(&self, system: &Sys) -> DMatrix<f64> {
        system.create_discrete_time_jacobian()
    }

    fn compute<const K: usize>(
        &self,
        predicted: &DVector<f64>,
        stencil: &StencilStates<K>,
        system: &Sys,
        time: f64,
        dt: f64,
        step: StepCount,
        j: &mut DMatrix<f64>,
    ) -> Result<(), OdeError> {
        system
            .discrete_time_jacobian(step, time, dt, j, predicted, stencil.as_slice())
            .map_err(|e| residual_failure(e, step, time))
    }
}

fn residual_failure(err: OdeError, step: StepCount, time: f64) -> OdeError {
    if err.is_recoverable() {
        OdeError::ResidualEvaluationFailure {
            step,
            time,
            source: Box::new(err),
        }
    } else {
        err
    }
}

/// Policy storage chosen at stepper construction
///
/// `Owned` moves the policy into the stepper; `Borrowed` keeps a reference to
/// a policy managed by the caller.
#[derive(Debug)]
pub enum PolicyHandle<'a, P> {
    Owned(P),
    Borrowed(&'a P),
}

impl<'a, P> PolicyHandle<'a, P> {
    pub fn owned(policy: P) -> Self {
        PolicyHandle::Owned(policy)
    }

    pub fn borrowed(policy: &'a P) -> Self {
        PolicyHandle::Borrowed(policy)
    }
}

impl<P> Deref for PolicyHandle<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        match self {
            PolicyHandle::Owned(p) => p,
            PolicyHandle::Borrowed(p) => p,
        }
    }
}

impl<P: Clone> Clone for PolicyHandle<'_, P> {
    fn clone(&self) -> Self {
        match self {
            PolicyHandle::Owned(p) => PolicyHandle::Owned(p.clone()),
            PolicyHandle::Borrowed(p) => PolicyHandle::Borrowed(p),
        }
    }
}

impl<P: Default> Default for PolicyHandle<'_, P> {
    fn default() -> Self {
        PolicyHandle::Owned(P::default())
    }
}
