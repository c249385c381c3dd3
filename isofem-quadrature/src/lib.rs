//! Quadrature rules for the reference interval `[-1, 1]` and its tensor products.
//!
//! The rules are stored in `f64` and converted to the scalar type of the caller where needed.
//! Tensor-product rules enumerate their points with the *first* parametric direction running
//! fastest, which is the ordering used for tensor-product spline bases.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod tensor;
pub mod univariate;

/// The largest number of Gauss points per direction for which rules are provided.
pub const MAX_GAUSS_POINTS: usize = 10;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that a rule satisfying the given requirements is not available.
    NoRuleAvailable { num_points: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable { num_points } => {
                write!(
                    f,
                    "There is no Gauss rule with {} points available (supported: 1..={})",
                    num_points, MAX_GAUSS_POINTS
                )
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A D-dimensional rule.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// Integrates the given function with the given rule.
pub fn integrate<const D: usize>(rule: &Rule<D>, f: impl Fn(&Point<D>) -> f64) -> f64 {
    let (weights, points) = rule;
    weights
        .iter()
        .zip(points)
        .map(|(w, x)| w * f(x))
        .sum()
}
