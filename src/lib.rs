//! Isogeometric analysis building blocks.
//!
//! Projection and recovery of secondary fields onto spline patches ([`projection`]), Newmark
//! time integration of second-order systems ([`dynamics`]) and a time-stepping driver with
//! restart support ([`solver`]). Geometry, quadrature and linear solvers are reached through the
//! [`spline::SplineBasis`], [`quadrature::QuadratureProvider`] and
//! [`sparse::LinearSystemSolver`] traits.

pub mod assembly;
pub mod config;
pub mod dynamics;
pub mod field;
pub mod projection;
pub mod quadrature;
pub mod restart;
pub mod solver;
pub mod spline;
pub mod time;

pub mod sparse {
    pub use isofem_sparse::*;
}

#[cfg(feature = "proptest")]
pub mod proptest;

pub use isofem_traits::{real, real_from_usize, Real};

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
