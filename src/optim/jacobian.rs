//! Numerical differentiation

use nalgebra::{DMatrix, DVector};

use crate::steppers::{ContinuousTimeSystem, OdeError};

/// Jacobian `df/dy` of a continuous-time system by central differences
///
/// Used to check analytic Jacobians.
pub fn finite_difference_jacobian<S>(
    system: &S,
    state: &DVector<f64>,
    time: f64,
) -> Result<DMatrix<f64>, OdeError>
where
    S: ContinuousTimeSystem + ?Sized,
{
    let r = 1e-3;
    let tol = 1e-16;
    let n = state.len();

    let mut f_plus = system.create_velocity();
    let mut f_minus = system.create_velocity();
    let m = f_plus.len();
    let mut jac = DMatrix::<f64>::zeros(m, n);

    let mut x = state.clone();
    for i in 0..n {
        let h = (r * state[i].abs()).max(tol);

        x[i] = state[i] + h;
        system.velocity(&x, time, &mut f_plus)?;
        x[i] = state[i] - h;
        system.velocity(&x, time, &mut f_minus)?;
        x[i] = state[i];

        for j in 0..m {
            jac[(j, i)] = (f_plus[j] - f_minus[j]) / (2.0 * h);
        }
    }

    Ok(jac)
}
