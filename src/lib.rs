//! odestep - Implicit multistep time integration with transactional steps
//!
//! Steppers for systems of ordinary differential equations, built around
//! implicit BDF schemes whose steps either complete or leave every piece of
//! stepper state exactly as it was, so a failed step can be retried with a
//! smaller time step.
//!
//! # Architecture
//!
//! - A fixed-size stencil of accepted states per scheme (const generics)
//! - Residual/Jacobian policies turning a system into the nonlinear problem
//!   of one step
//! - Pluggable nonlinear solvers (Newton-Raphson provided)
//! - Advancer loops with optional time-step recovery
//!
//! # Example
//!
//! ```rust,ignore
//! use odestep::prelude::*;
//!
//! let app = Burgers1d::new(Burgers1d::DEFAULT_PARAMETERS, 20)?;
//! let mut y = app.initial_state();
//! let mut stepper = create_bdf2_stepper(&y, &app);
//! let mut solver = NewtonRaphson::new();
//!
//! advance_n_steps(&mut stepper.with_solver(&mut solver), &mut y, 0.0, 0.01, 10, |_, _, _| {})?;
//! ```

pub mod apps;
pub mod optim;
pub mod rom;
pub mod settings;
pub mod steppers;

pub use steppers::{OdeError, StepCount};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::apps::Burgers1d;
    pub use crate::optim::NewtonRaphson;
    pub use crate::rom::{GalerkinSystem, LinearDecoder};
    pub use crate::settings::{IntegratorSettings, NewtonSettings, SchemeKind};
    pub use crate::steppers::*;
}
