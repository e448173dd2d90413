//! Reduced-order models built on top of the steppers

pub mod galerkin;

pub use galerkin::*;
