//! Spline bases and patches.
//!
//! The projection and recovery algorithms only talk to a basis through [`SplineBasis`], which
//! exposes element-wise basis evaluation, element containment queries and support enumeration.
//! [`TensorBSplineBasis`] is a reference tensor-product B-spline implementation of the trait.

use crate::Real;
use nalgebra::{DMatrix, DVector, Point, Scalar};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

mod bspline;
mod patch;

pub use bspline::*;
pub use patch::*;

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SplineError {
    InvalidKnotVector(String),
    ControlPointMismatch { expected: usize, actual: usize },
    PointOutsideDomain,
    SingularJacobian,
    InvalidFaceCode(i32),
}

impl Display for SplineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKnotVector(reason) => write!(f, "Invalid knot vector: {}", reason),
            Self::ControlPointMismatch { expected, actual } => write!(
                f,
                "Expected {} control points (one per basis function), got {}",
                expected, actual
            ),
            Self::PointOutsideDomain => write!(f, "Parameter point is outside the parametric domain"),
            Self::SingularJacobian => write!(f, "Geometry Jacobian is singular"),
            Self::InvalidFaceCode(code) => write!(f, "Invalid face direction code {}", code),
        }
    }
}

impl Error for SplineError {}

/// An axis-aligned box in parameter space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParametricBox<T, const D: usize> {
    pub lower: [T; D],
    pub upper: [T; D],
}

impl<T: Real, const D: usize> ParametricBox<T, D> {
    /// Signed volume of the box. Negative for inverted boxes.
    pub fn volume(&self) -> T {
        (0..D).fold(T::one(), |v, d| v * (self.upper[d] - self.lower[d]))
    }

    /// Signed area of the face orthogonal to `axis`.
    pub fn face_area(&self, axis: usize) -> T {
        (0..D)
            .filter(|&d| d != axis)
            .fold(T::one(), |v, d| v * (self.upper[d] - self.lower[d]))
    }

    /// Maps the reference coordinate `xi_ref` in `[-1, 1]` along `direction` into the box.
    pub fn map_reference_coordinate(&self, direction: usize, xi_ref: f64) -> T {
        let a = self.lower[direction];
        let b = self.upper[direction];
        let half: T = crate::real(0.5);
        half * ((b - a) * crate::real::<T>(xi_ref) + (b + a))
    }
}

/// Basis function values and parametric derivatives at a single parameter point.
///
/// Columns follow the order of [`SplineBasis::element_basis_functions`]. Gradients are stored as
/// a `D x n` matrix and Hessians as a `D*D x n` matrix with row index `a * D + b`.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisValues<T: Scalar> {
    pub values: DVector<T>,
    pub gradients: DMatrix<T>,
    pub hessians: DMatrix<T>,
}

impl<T: Real> Default for BasisValues<T> {
    fn default() -> Self {
        Self {
            values: DVector::zeros(0),
            gradients: DMatrix::zeros(0, 0),
            hessians: DMatrix::zeros(0, 0),
        }
    }
}

impl<T: Real> BasisValues<T> {
    pub fn resize(&mut self, dim: usize, num_functions: usize) {
        self.values = DVector::zeros(num_functions);
        self.gradients = DMatrix::zeros(dim, num_functions);
        self.hessians = DMatrix::zeros(dim * dim, num_functions);
    }

    pub fn num_functions(&self) -> usize {
        self.values.len()
    }

    /// The parametric Hessian of basis function `local` as a `D x D` matrix.
    pub fn hessian(&self, local: usize, dim: usize) -> DMatrix<T> {
        DMatrix::from_fn(dim, dim, |a, b| self.hessians[(a * dim + b, local)])
    }
}

/// A (possibly non-tensor-product) spline basis over a `D`-dimensional parametric domain.
///
/// Elements are the non-empty knot spans. Basis functions and elements are identified by
/// zero-based global indices.
pub trait SplineBasis<T: Real, const D: usize> {
    fn num_basis_functions(&self) -> usize;

    fn num_elements(&self) -> usize;

    /// The order (polynomial degree + 1) in the given parametric direction.
    fn order(&self, direction: usize) -> usize;

    fn is_rational(&self) -> bool {
        false
    }

    /// Whether the basis can be evaluated concurrently from several threads.
    ///
    /// Bases that cache evaluation state internally must return `false`, in which case all
    /// evaluations from parallel loops are serialized.
    fn is_reentrant(&self) -> bool {
        false
    }

    fn parametric_domain(&self) -> ParametricBox<T, D>;

    fn element_domain(&self, element: usize) -> ParametricBox<T, D>;

    /// The element containing the given parameter point, if it lies in the domain.
    fn find_element(&self, xi: &Point<T, D>) -> Option<usize>;

    /// Global indices of the basis functions that are nonzero on the element.
    fn element_basis_functions(&self, element: usize) -> Vec<usize>;

    /// Evaluates the basis functions of `element` at `xi` with parametric derivatives
    /// up to the given order (at most 2).
    fn evaluate(&self, element: usize, xi: &Point<T, D>, derivatives: usize, output: &mut BasisValues<T>);

    /// The Greville (characteristic) parameter point of a basis function.
    fn greville_point(&self, basis_function: usize) -> Point<T, D>;

    /// Elements on which the basis function is nonzero.
    fn direct_support(&self, basis_function: usize) -> Vec<usize>;

    /// Support elements of a basis function, sorted by element index.
    ///
    /// The extended support is the union of the supports of all basis functions overlapping
    /// the given one.
    fn support_elements(&self, basis_function: usize, extended: bool) -> Vec<usize> {
        let direct = self.direct_support(basis_function);
        if !extended {
            return direct;
        }

        let mut elements = BTreeSet::new();
        let mut overlapping = BTreeSet::new();
        for &element in &direct {
            overlapping.extend(self.element_basis_functions(element));
        }
        for other in overlapping {
            elements.extend(self.direct_support(other));
        }
        elements.into_iter().collect()
    }
}

/// A boundary face of a patch, identified by its normal axis and side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Face {
    pub axis: usize,
    pub at_end: bool,
}

impl Face {
    pub const WEST: Face = Face { axis: 0, at_end: false };
    pub const EAST: Face = Face { axis: 0, at_end: true };
    pub const SOUTH: Face = Face { axis: 1, at_end: false };
    pub const NORTH: Face = Face { axis: 1, at_end: true };
    pub const BOTTOM: Face = Face { axis: 2, at_end: false };
    pub const TOP: Face = Face { axis: 2, at_end: true };

    /// Parses a signed face direction code (`-1` WEST, `+1` EAST, `-2` SOUTH, ...).
    pub fn from_code(code: i32, dim: usize) -> Result<Self, SplineError> {
        let axis = code.unsigned_abs() as usize;
        if code == 0 || axis > dim {
            return Err(SplineError::InvalidFaceCode(code));
        }
        Ok(Face {
            axis: axis - 1,
            at_end: code > 0,
        })
    }

    pub fn code(&self) -> i32 {
        let code = self.axis as i32 + 1;
        if self.at_end {
            code
        } else {
            -code
        }
    }

    /// The parametric directions tangential to the face.
    pub fn tangent_directions(&self, dim: usize) -> Vec<usize> {
        (0..dim).filter(|&d| d != self.axis).collect()
    }
}

/// Element and node bookkeeping for one face of a patch.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceTopology {
    pub face: Face,
    /// Elements touching the face.
    pub elements: Vec<usize>,
    /// Global basis function index of each face-local node.
    pub nodes: Vec<usize>,
    /// For each face element, the face-local node of each element basis function,
    /// or `None` for functions vanishing on the face.
    pub element_nodes: Vec<Vec<Option<usize>>>,
}

impl FaceTopology {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}
