//! Newton-Raphson solver for the nonlinear systems posed by implicit steppers

use log::trace;
use nalgebra::DVector;

use crate::settings::NewtonSettings;
use crate::steppers::{NonlinearSolver, NonlinearSystem, OdeError};

/// Newton-Raphson iteration with a dense LU solve of the linearized system
///
/// The solve converges when any of the residual or correction tolerances is
/// met. Every failure (non-finite residual, singular Jacobian, iteration limit,
/// recoverable evaluation failure) is reported as
/// [`OdeError::NonlinearSolveFailure`].
#[derive(Debug, Clone, Default)]
pub struct NewtonRaphson {
    settings: NewtonSettings,
    iterations: usize,
}

impl NewtonRaphson {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: NewtonSettings) -> Self {
        Self {
            settings,
            iterations: 0,
        }
    }

    /// Use `tol` for every convergence criterion
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.settings = self.settings.with_tolerance(tol);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.settings.max_iterations = max_iterations;
        self
    }

    pub fn settings(&self) -> &NewtonSettings {
        &self.settings
    }

    pub fn set_residual_abs_tolerance(&mut self, tol: f64) {
        self.settings.residual_abs_tol = tol;
    }

    pub fn set_residual_rel_tolerance(&mut self, tol: f64) {
        self.settings.residual_rel_tol = tol;
    }

    pub fn set_correction_abs_tolerance(&mut self, tol: f64) {
        self.settings.correction_abs_tol = tol;
    }

    pub fn set_correction_rel_tolerance(&mut self, tol: f64) {
        self.settings.correction_rel_tol = tol;
    }

    /// Iterations performed by the last call to `solve`
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn failure(&self, reason: impl Into<String>) -> OdeError {
        OdeError::NonlinearSolveFailure {
            iterations: self.iterations,
            reason: reason.into(),
        }
    }

    fn evaluation_failure(&self, err: OdeError) -> OdeError {
        if err.is_recoverable() {
            self.failure(err.to_string())
        } else {
            err
        }
    }
}

impl NonlinearSolver for NewtonRaphson {
    fn solve<S>(&mut self, system: &S, state: &mut DVector<f64>) -> Result<(), OdeError>
    where
        S: NonlinearSystem + ?Sized,
    {
        let mut r = system.create_residual();
        let mut j = system.create_jacobian();
        let mut initial_norm = 0.0;
        self.iterations = 0;

        while self.iterations < self.settings.max_iterations {
            system
                .residual(state, &mut r)
                .map_err(|e| self.evaluation_failure(e))?;

            let norm = r.norm();
            if !norm.is_finite() {
                return Err(self.failure("residual is not finite"));
            }
            if self.iterations == 0 {
                initial_norm = norm;
            }
            trace!("newton iteration {}: |R| = {:.3e}", self.iterations, norm);

            if norm <= self.settings.residual_abs_tol {
                return Ok(());
            }
            if self.iterations > 0 && norm <= self.settings.residual_rel_tol * initial_norm {
                return Ok(());
            }

            system
                .jacobian(state, &mut j)
                .map_err(|e| self.evaluation_failure(e))?;

            // J * delta = -R
            let delta = match j.clone().lu().solve(&(-&r)) {
                Some(delta) => delta,
                None => return Err(self.failure("singular jacobian")),
            };
            *state += &delta;
            self.iterations += 1;

            let correction = delta.norm();
            if !correction.is_finite() {
                return Err(self.failure("correction is not finite"));
            }
            if correction <= self.settings.correction_abs_tol
                || correction <= self.settings.correction_rel_tol * state.norm()
            {
                return Ok(());
            }
        }

        Err(self.failure(format!(
            "no convergence within {} iterations",
            self.settings.max_iterations
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    /// R(x) = x^2 - a, componentwise
    struct Sqrt {
        a: DVector<f64>,
    }

    impl NonlinearSystem for Sqrt {
        fn create_residual(&self) -> DVector<f64> {
            DVector::zeros(self.a.len())
        }

        fn create_jacobian(&self) -> DMatrix<f64> {
            DMatrix::zeros(self.a.len(), self.a.len())
        }

        fn residual(&self, x: &DVector<f64>, r: &mut DVector<f64>) -> Result<(), OdeError> {
            for i in 0..x.len() {
                r[i] = x[i] * x[i] - self.a[i];
            }
            Ok(())
        }

        fn jacobian(&self, x: &DVector<f64>, j: &mut DMatrix<f64>) -> Result<(), OdeError> {
            j.fill(0.0);
            for i in 0..x.len() {
                j[(i, i)] = 2.0 * x[i];
            }
            Ok(())
        }
    }

    #[test]
    fn test_newton_converges() {
        let system = Sqrt {
            a: DVector::from_vec(vec![2.0, 9.0]),
        };
        let mut x = DVector::from_vec(vec![1.0, 1.0]);
        let mut solver = NewtonRaphson::new().with_tolerance(1e-12);
        solver.solve(&system, &mut x).unwrap();

        assert_relative_eq!(x[0], 2.0_f64.sqrt(), epsilon = 1e-10);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-10);
        assert!(solver.iterations() > 0);
    }

    #[test]
    fn test_already_converged_takes_no_iteration() {
        let system = Sqrt {
            a: DVector::from_vec(vec![4.0]),
        };
        let mut x = DVector::from_vec(vec![2.0]);
        let mut solver = NewtonRaphson::new();
        solver.solve(&system, &mut x).unwrap();
        assert_eq!(solver.iterations(), 0);
    }

    #[test]
    fn test_singular_jacobian_fails() {
        let system = Sqrt {
            a: DVector::from_vec(vec![4.0]),
        };
        let mut x = DVector::from_vec(vec![0.0]);
        let err = NewtonRaphson::new().solve(&system, &mut x).unwrap_err();
        assert!(matches!(err, OdeError::NonlinearSolveFailure { .. }));
    }

    #[test]
    fn test_iteration_limit() {
        let system = Sqrt {
            a: DVector::from_vec(vec![1e6]),
        };
        let mut x = DVector::from_vec(vec![1.0]);
        let mut solver = NewtonRaphson::new()
            .with_tolerance(1e-14)
            .with_max_iterations(2);
        let err = solver.solve(&system, &mut x).unwrap_err();
        assert_eq!(
            err,
            OdeError::NonlinearSolveFailure {
                iterations: 2,
                reason: "no convergence within 2 iterations".into()
            }
        );
    }

    #[test]
    fn test_evaluation_failure_is_mapped() {
        struct Broken;
        impl NonlinearSystem for Broken {
            fn create_residual(&self) -> DVector<f64> {
                DVector::zeros(1)
            }
            fn create_jacobian(&self) -> DMatrix<f64> {
                DMatrix::zeros(1, 1)
            }
            fn residual(&self, _: &DVector<f64>, _: &mut DVector<f64>) -> Result<(), OdeError> {
                Err(OdeError::ResidualEvaluationFailure {
                    step: 4,
                    time: 0.4,
                    source: Box::new(OdeError::VelocityEvaluationFailure("negative density".into())),
                })
            }
            fn jacobian(&self, _: &DVector<f64>, _: &mut DMatrix<f64>) -> Result<(), OdeError> {
                Ok(())
            }
        }

        let mut x = DVector::zeros(1);
        let err = NewtonRaphson::new().solve(&Broken, &mut x).unwrap_err();
        match err {
            OdeError::NonlinearSolveFailure { iterations, reason } => {
                assert_eq!(iterations, 0);
                assert!(reason.contains("negative density"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
