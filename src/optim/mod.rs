//! Nonlinear solvers and numerical differentiation
//!
//! Provides the Newton-Raphson solver used by the implicit steppers and a
//! central-difference Jacobian.

mod jacobian;
pub mod newton;

pub use jacobian::*;
pub use newton::*;
