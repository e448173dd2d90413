//! One-dimensional inviscid Burgers equation with a source term
//!
//! ```text
//! du/dt + 1/2 d(u^2)/dx = mu1 * exp(mu2 * x),   x in [0, 100]
//! u(0, t) = mu0,   u(x, 0) = 1
//! ```
//!
//! Discretized with a first-order upwind finite-volume scheme on a uniform
//! grid of cell centers.

use nalgebra::{DMatrix, DVector};

use crate::steppers::{ContinuousTimeSystem, OdeError};

const X_LEFT: f64 = 0.0;
const X_RIGHT: f64 = 100.0;
const INITIAL_VALUE: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct Burgers1d {
    mu: [f64; 3],
    dx: f64,
    x: DVector<f64>,
}

impl Burgers1d {
    /// Parameters of the reference test case
    pub const DEFAULT_PARAMETERS: [f64; 3] = [5.0, 0.02, 0.02];

    /// Model with parameters `mu` on `num_cells` cells
    pub fn new(mu: [f64; 3], num_cells: usize) -> Result<Self, OdeError> {
        if num_cells == 0 {
            return Err(OdeError::InvalidConfiguration(
                "burgers1d needs at least one cell".into(),
            ));
        }
        let dx = (X_RIGHT - X_LEFT) / num_cells as f64;
        let x = DVector::from_fn(num_cells, |i, _| X_LEFT + dx * i as f64 + 0.5 * dx);
        Ok(Self { mu, dx, x })
    }

    pub fn num_cells(&self) -> usize {
        self.x.len()
    }

    /// Cell centers
    pub fn grid(&self) -> &DVector<f64> {
        &self.x
    }

    pub fn initial_state(&self) -> DVector<f64> {
        DVector::from_element(self.num_cells(), INITIAL_VALUE)
    }
}

impl ContinuousTimeSystem for Burgers1d {
    fn create_velocity(&self) -> DVector<f64> {
        DVector::zeros(self.num_cells())
    }

    fn create_jacobian(&self) -> DMatrix<f64> {
        DMatrix::zeros(self.num_cells(), self.num_cells())
    }

    fn velocity(&self, u: &DVector<f64>, _time: f64, f: &mut DVector<f64>) -> Result<(), OdeError> {
        let [mu0, mu1, mu2] = self.mu;
        let half_over_dx = 0.5 / self.dx;

        f[0] = half_over_dx * (mu0 * mu0 - u[0] * u[0]);
        for i in 1..u.len() {
            f[i] = half_over_dx * (u[i - 1] * u[i - 1] - u[i] * u[i]);
        }
        for i in 0..u.len() {
            f[i] += mu1 * (mu2 * self.x[i]).exp();
        }
        Ok(())
    }

    fn jacobian(&self, u: &DVector<f64>, _time: f64, j: &mut DMatrix<f64>) -> Result<(), OdeError> {
        let over_dx = 1.0 / self.dx;

        j.fill(0.0);
        j[(0, 0)] = -over_dx * u[0];
        for i in 1..u.len() {
            j[(i, i - 1)] = over_dx * u[i - 1];
            j[(i, i)] = -over_dx * u[i];
        }
        Ok(())
    }
}
