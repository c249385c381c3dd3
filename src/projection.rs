//! Projection and recovery of fields onto spline bases.
//!
//! [`FieldProjector`] produces new [`SplineField`](crate::field::SplineField)s from sampled
//! values (regular interpolation), from secondary field evaluators (superconvergent patch
//! recovery and Galerkin L2 projection) and, through [`BoundaryFieldProjector`], from prescribed
//! values on a patch face.

use crate::assembly::EvaluationLock;
use crate::quadrature::{GaussQuadrature, QuadratureError, QuadratureProvider};
use crate::spline::{BasisValues, SplineBasis, SplineError, SplinePatch};
use crate::Real;
use isofem_sparse::{DenseLuSolver, LinearSystemSolver, SolveError};
use nalgebra::Point;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

mod boundary;
mod interpolation;
mod l2;
mod recovery;

pub use boundary::*;
pub use recovery::*;

#[derive(Debug)]
#[non_exhaustive]
pub enum ProjectionError {
    /// Rational bases are not supported.
    RationalBasis,
    /// The number of sample points differs from the number of basis functions.
    SizeMismatch { points: usize, basis_functions: usize },
    /// The value matrix does not have one column per sample point.
    ValueShapeMismatch { points: usize, columns: usize },
    /// Prescribed values do not have the announced number of components.
    ComponentMismatch { expected: usize, actual: usize },
    /// A sample point lies outside the parametric domain.
    PointOutsideDomain { point: usize },
    /// The derivative order of a secondary field is not below the basis order.
    DerivativeOrderTooHigh { order: usize, derivative_order: usize },
    Quadrature(QuadratureError),
    /// The local least-squares fit of a basis function is singular.
    SingularLocalSystem { basis_function: usize },
    Solve(SolveError),
    /// An element with negative parametric measure was encountered.
    Topology { element: usize },
    Spline(SplineError),
    /// The secondary field evaluator failed.
    Evaluation(eyre::Report),
}

impl Display for ProjectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RationalBasis => write!(f, "Projection onto rational bases is not supported"),
            Self::SizeMismatch { points, basis_functions } => write!(
                f,
                "Number of sample points ({}) does not match number of basis functions ({})",
                points, basis_functions
            ),
            Self::ValueShapeMismatch { points, columns } => write!(
                f,
                "Value matrix has {} columns but there are {} sample points",
                columns, points
            ),
            Self::ComponentMismatch { expected, actual } => write!(
                f,
                "Prescribed values have {} components, expected {}",
                actual, expected
            ),
            Self::PointOutsideDomain { point } => {
                write!(f, "Sample point {} is outside the parametric domain", point)
            }
            Self::DerivativeOrderTooHigh { order, derivative_order } => write!(
                f,
                "Cannot recover a field of derivative order {} with a basis of order {}",
                derivative_order, order
            ),
            Self::Quadrature(err) => write!(f, "Quadrature error: {}", err),
            Self::SingularLocalSystem { basis_function } => {
                write!(f, "Singular local fit for basis function {}", basis_function)
            }
            Self::Solve(err) => write!(f, "Failed to solve projection system: {}", err),
            Self::Topology { element } => {
                write!(f, "Element {} has negative parametric measure", element)
            }
            Self::Spline(err) => write!(f, "Spline error: {}", err),
            Self::Evaluation(err) => write!(f, "Failed to evaluate field: {}", err),
        }
    }
}

impl Error for ProjectionError {}

impl From<QuadratureError> for ProjectionError {
    fn from(err: QuadratureError) -> Self {
        Self::Quadrature(err)
    }
}

impl From<SolveError> for ProjectionError {
    fn from(err: SolveError) -> Self {
        Self::Solve(err)
    }
}

impl From<SplineError> for ProjectionError {
    fn from(err: SplineError) -> Self {
        Self::Spline(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionSettings {
    /// Run element loops and local fits on the rayon thread pool.
    pub parallel: bool,
    /// Gauss points per direction for Galerkin projections. Defaults to the basis order.
    pub num_gauss_points: Option<usize>,
}

/// Projection of secondary fields onto the basis of a spline patch.
pub struct FieldProjector<'a, T: Real, B, const D: usize> {
    patch: &'a SplinePatch<T, B, D>,
    quadrature: &'a dyn QuadratureProvider<T>,
    solver: &'a dyn LinearSystemSolver<T>,
    settings: ProjectionSettings,
    lock: EvaluationLock,
}

impl<'a, T: Real, B, const D: usize> FieldProjector<'a, T, B, D> {
    pub fn new(patch: &'a SplinePatch<T, B, D>) -> Self {
        Self {
            patch,
            quadrature: &GaussQuadrature,
            solver: &DenseLuSolver,
            settings: ProjectionSettings::default(),
            lock: EvaluationLock::default(),
        }
    }

    pub fn with_solver(self, solver: &'a dyn LinearSystemSolver<T>) -> Self {
        Self { solver, ..self }
    }

    pub fn with_quadrature(self, quadrature: &'a dyn QuadratureProvider<T>) -> Self {
        Self { quadrature, ..self }
    }

    pub fn with_settings(self, settings: ProjectionSettings) -> Self {
        Self { settings, ..self }
    }

    pub fn patch(&self) -> &SplinePatch<T, B, D> {
        self.patch
    }

    pub fn settings(&self) -> &ProjectionSettings {
        &self.settings
    }
}

impl<'a, T, B, const D: usize> FieldProjector<'a, T, B, D>
where
    T: Real,
    B: SplineBasis<T, D>,
{
    /// Maps a parameter point to physical space, evaluating the basis inside the critical section.
    fn physical_point(&self, xi: &Point<T, D>) -> Result<Point<T, D>, ProjectionError> {
        let basis = self.patch.basis();
        let element = basis.find_element(xi).ok_or(SplineError::PointOutsideDomain)?;
        let mut values = BasisValues::default();
        self.lock.evaluate(basis, element, xi, 0, &mut values);
        Ok(self
            .patch
            .map_with(&basis.element_basis_functions(element), &values))
    }
}
