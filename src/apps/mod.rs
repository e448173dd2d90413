//! Model problems

mod burgers1d;

pub use burgers1d::Burgers1d;
