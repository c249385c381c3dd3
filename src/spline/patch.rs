use crate::spline::{BasisValues, SplineBasis, SplineError};
use crate::Real;
use nalgebra::{DMatrix, Point};

/// A spline geometry: a basis together with one control point per basis function.
#[derive(Debug, Clone, PartialEq)]
pub struct SplinePatch<T: Real, B, const D: usize> {
    basis: B,
    control_points: Vec<Point<T, D>>,
}

impl<T, B, const D: usize> SplinePatch<T, B, D>
where
    T: Real,
    B: SplineBasis<T, D>,
{
    pub fn new(basis: B, control_points: Vec<Point<T, D>>) -> Result<Self, SplineError> {
        if control_points.len() != basis.num_basis_functions() {
            return Err(SplineError::ControlPointMismatch {
                expected: basis.num_basis_functions(),
                actual: control_points.len(),
            });
        }
        Ok(Self {
            basis,
            control_points,
        })
    }

    /// A patch whose control points are the Greville points of the basis.
    ///
    /// For non-rational B-spline bases this parametrizes the identity map of the parametric
    /// domain.
    pub fn from_greville_points(basis: B) -> Self {
        let control_points = (0..basis.num_basis_functions())
            .map(|i| basis.greville_point(i))
            .collect();
        Self {
            basis,
            control_points,
        }
    }

    pub fn basis(&self) -> &B {
        &self.basis
    }

    pub fn control_points(&self) -> &[Point<T, D>] {
        &self.control_points
    }

    pub fn element_control_points(&self, element: usize) -> Vec<Point<T, D>> {
        self.basis
            .element_basis_functions(element)
            .into_iter()
            .map(|i| self.control_points[i])
            .collect()
    }

    /// Physical point from basis values evaluated on `element`.
    pub fn map_with(&self, element_nodes: &[usize], basis_values: &BasisValues<T>) -> Point<T, D> {
        let mut x = Point::origin();
        for (local, &node) in element_nodes.iter().enumerate() {
            x.coords += self.control_points[node].coords * basis_values.values[local];
        }
        x
    }

    /// Parametric Jacobian `dX/dxi` (a `D x D` matrix) from basis gradients on an element.
    pub fn jacobian_with(&self, element_nodes: &[usize], basis_values: &BasisValues<T>) -> DMatrix<T> {
        let mut jacobian = DMatrix::zeros(D, D);
        for (local, &node) in element_nodes.iter().enumerate() {
            let x = &self.control_points[node];
            for i in 0..D {
                for a in 0..D {
                    jacobian[(i, a)] += x[i] * basis_values.gradients[(a, local)];
                }
            }
        }
        jacobian
    }

    /// Maps a parameter point to physical space.
    ///
    /// The basis is evaluated directly. Concurrent callers of a non-reentrant basis must serialize
    /// their calls.
    pub fn point(&self, xi: &Point<T, D>) -> Result<Point<T, D>, SplineError> {
        let element = self
            .basis
            .find_element(xi)
            .ok_or(SplineError::PointOutsideDomain)?;
        let mut values = BasisValues::default();
        self.basis.evaluate(element, xi, 0, &mut values);
        Ok(self.map_with(&self.basis.element_basis_functions(element), &values))
    }

    /// Parametric Jacobian at a parameter point.
    pub fn jacobian(&self, xi: &Point<T, D>) -> Result<DMatrix<T>, SplineError> {
        let element = self
            .basis
            .find_element(xi)
            .ok_or(SplineError::PointOutsideDomain)?;
        let mut values = BasisValues::default();
        self.basis.evaluate(element, xi, 1, &mut values);
        Ok(self.jacobian_with(&self.basis.element_basis_functions(element), &values))
    }
}
