//! Time steppers
//!
//! Implicit BDF and user-defined multistep steppers with transactional steps,
//! explicit Runge-Kutta steppers and the advancer loops that drive them.

pub mod advance;
pub mod base;
pub mod bdf;
pub mod explicit;
pub mod policy;
pub(crate) mod rollback;
pub mod stencil;
pub mod system;

pub use advance::*;
pub use base::*;
pub use bdf::*;
pub use explicit::*;
pub use policy::*;
pub use stencil::*;
pub use system::*;
