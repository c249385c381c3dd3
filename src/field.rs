//! Sampled fields, secondary field evaluators and spline fields.

use crate::projection::ProjectionError;
use crate::spline::{BasisValues, SplineBasis, SplineError, SplinePatch};
use crate::Real;
use nalgebra::{DMatrix, DVector, Point};

/// Field values at an ordered set of parameter points of a patch.
///
/// `values` is an `ncomponents x npoints` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledField<T: Real, const D: usize> {
    points: Vec<Point<T, D>>,
    values: DMatrix<T>,
}

impl<T: Real, const D: usize> SampledField<T, D> {
    pub fn try_new(points: Vec<Point<T, D>>, values: DMatrix<T>) -> Result<Self, ProjectionError> {
        if values.ncols() != points.len() {
            return Err(ProjectionError::ValueShapeMismatch {
                points: points.len(),
                columns: values.ncols(),
            });
        }
        Ok(Self { points, values })
    }

    /// Samples a function of the parameter point.
    pub fn from_fn(points: Vec<Point<T, D>>, num_components: usize, f: impl Fn(&Point<T, D>) -> DVector<T>) -> Self {
        let mut values = DMatrix::zeros(num_components, points.len());
        for (j, xi) in points.iter().enumerate() {
            values.set_column(j, &f(xi));
        }
        Self { points, values }
    }

    pub fn points(&self) -> &[Point<T, D>] {
        &self.points
    }

    pub fn values(&self) -> &DMatrix<T> {
        &self.values
    }

    pub fn num_components(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

/// A problem-specific secondary solution field (stresses, fluxes, ...) evaluated element-wise.
pub trait SecondaryField<T: Real, const D: usize>: Sync {
    /// The order of the highest solution derivative the field depends on.
    fn derivative_order(&self) -> usize;

    fn num_components(&self) -> usize;

    /// Evaluates the field at points of one geometry element.
    ///
    /// `parameters` and `physical` hold the same points in parameter and physical coordinates.
    /// Returns an `ncomponents x npoints` matrix.
    fn evaluate(&self, element: usize, parameters: &[Point<T, D>], physical: &[Point<T, D>]) -> eyre::Result<DMatrix<T>>;

    /// Whether `evaluate` may run concurrently with itself and with evaluations of the patch basis.
    ///
    /// Fields that evaluate non-reentrant bases return `false` and are then evaluated inside the
    /// critical section of the projector.
    fn is_reentrant(&self) -> bool {
        true
    }
}

/// A secondary field given analytically as a function of the physical point.
pub struct FnSecondaryField<F> {
    num_components: usize,
    derivative_order: usize,
    function: F,
}

impl<F> FnSecondaryField<F> {
    pub fn new(num_components: usize, derivative_order: usize, function: F) -> Self {
        Self {
            num_components,
            derivative_order,
            function,
        }
    }
}

impl<T, F, const D: usize> SecondaryField<T, D> for FnSecondaryField<F>
where
    T: Real,
    F: Fn(&Point<T, D>) -> DVector<T> + Sync,
{
    fn derivative_order(&self) -> usize {
        self.derivative_order
    }

    fn num_components(&self) -> usize {
        self.num_components
    }

    fn evaluate(&self, _element: usize, _parameters: &[Point<T, D>], physical: &[Point<T, D>]) -> eyre::Result<DMatrix<T>> {
        let mut values = DMatrix::zeros(self.num_components, physical.len());
        for (j, x) in physical.iter().enumerate() {
            let value = (self.function)(x);
            if value.len() != self.num_components {
                eyre::bail!(
                    "field function returned {} components, expected {}",
                    value.len(),
                    self.num_components
                );
            }
            values.set_column(j, &value);
        }
        Ok(values)
    }
}

/// A vector-valued spline function: a basis with one coefficient column per basis function.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineField<T: Real, B, const D: usize> {
    basis: B,
    coefficients: DMatrix<T>,
}

impl<T, B, const D: usize> SplineField<T, B, D>
where
    T: Real,
    B: SplineBasis<T, D>,
{
    /// Creates a field from an `ncomponents x nbasis` coefficient matrix.
    pub fn try_new(basis: B, coefficients: DMatrix<T>) -> Result<Self, SplineError> {
        if coefficients.ncols() != basis.num_basis_functions() {
            return Err(SplineError::ControlPointMismatch {
                expected: basis.num_basis_functions(),
                actual: coefficients.ncols(),
            });
        }
        Ok(Self { basis, coefficients })
    }

    pub fn basis(&self) -> &B {
        &self.basis
    }

    pub fn coefficients(&self) -> &DMatrix<T> {
        &self.coefficients
    }

    pub fn num_components(&self) -> usize {
        self.coefficients.nrows()
    }

    fn evaluate_basis(&self, xi: &Point<T, D>, derivatives: usize) -> Result<(Vec<usize>, BasisValues<T>), SplineError> {
        let element = self
            .basis
            .find_element(xi)
            .ok_or(SplineError::PointOutsideDomain)?;
        let mut values = BasisValues::default();
        self.basis.evaluate(element, xi, derivatives, &mut values);
        Ok((self.basis.element_basis_functions(element), values))
    }

    fn element_coefficients(&self, nodes: &[usize]) -> DMatrix<T> {
        self.coefficients.select_columns(nodes)
    }

    pub fn value(&self, xi: &Point<T, D>) -> Result<DVector<T>, SplineError> {
        let (nodes, basis) = self.evaluate_basis(xi, 0)?;
        Ok(self.element_coefficients(&nodes) * &basis.values)
    }

    /// The field value at the Greville point of a basis function.
    pub fn value_at_node(&self, basis_function: usize) -> Result<DVector<T>, SplineError> {
        self.value(&self.basis.greville_point(basis_function))
    }

    /// The `ncomponents x D` gradient with respect to the parameters.
    pub fn parametric_gradient(&self, xi: &Point<T, D>) -> Result<DMatrix<T>, SplineError> {
        let (nodes, basis) = self.evaluate_basis(xi, 1)?;
        Ok(self.element_coefficients(&nodes) * basis.gradients.transpose())
    }

    /// The `ncomponents x D` gradient with respect to physical coordinates.
    ///
    /// The geometry may be defined on a different basis than the field.
    pub fn gradient<G>(&self, xi: &Point<T, D>, geometry: &SplinePatch<T, G, D>) -> Result<DMatrix<T>, SplineError>
    where
        G: SplineBasis<T, D>,
    {
        let inverse = geometry
            .jacobian(xi)?
            .try_inverse()
            .ok_or(SplineError::SingularJacobian)?;
        Ok(self.parametric_gradient(xi)? * inverse)
    }

    /// Parametric second derivatives, one `D x D` matrix per component.
    pub fn hessian(&self, xi: &Point<T, D>) -> Result<Vec<DMatrix<T>>, SplineError> {
        let (nodes, basis) = self.evaluate_basis(xi, 2)?;
        let coefficients = self.element_coefficients(&nodes);
        let hessians = (0..self.num_components())
            .map(|c| {
                let mut h = DMatrix::zeros(D, D);
                for local in 0..nodes.len() {
                    h += basis.hessian(local, D) * coefficients[(c, local)];
                }
                h
            })
            .collect();
        Ok(hessians)
    }
}

/// The physical gradient of a scalar or vector primary solution field.
///
/// Components are ordered as `(c, a) -> c * D + a` for solution component `c` and physical
/// direction `a`.
pub struct SolutionGradientField<'a, T: Real, B, G, const D: usize> {
    solution: &'a SplineField<T, B, D>,
    geometry: &'a SplinePatch<T, G, D>,
}

impl<'a, T, B, G, const D: usize> SolutionGradientField<'a, T, B, G, D>
where
    T: Real,
    B: SplineBasis<T, D>,
    G: SplineBasis<T, D>,
{
    pub fn new(solution: &'a SplineField<T, B, D>, geometry: &'a SplinePatch<T, G, D>) -> Self {
        Self { solution, geometry }
    }
}

impl<'a, T, B, G, const D: usize> SecondaryField<T, D> for SolutionGradientField<'a, T, B, G, D>
where
    T: Real,
    B: SplineBasis<T, D> + Sync,
    G: SplineBasis<T, D> + Sync,
{
    fn derivative_order(&self) -> usize {
        1
    }

    fn num_components(&self) -> usize {
        self.solution.num_components() * D
    }

    fn is_reentrant(&self) -> bool {
        self.solution.basis().is_reentrant() && self.geometry.basis().is_reentrant()
    }

    fn evaluate(&self, _element: usize, parameters: &[Point<T, D>], _physical: &[Point<T, D>]) -> eyre::Result<DMatrix<T>> {
        let mut values = DMatrix::zeros(SecondaryField::<T, D>::num_components(self), parameters.len());
        for (j, xi) in parameters.iter().enumerate() {
            let gradient = self.solution.gradient(xi, self.geometry)?;
            for c in 0..gradient.nrows() {
                for a in 0..D {
                    values[(c * D + a, j)] = gradient[(c, a)];
                }
            }
        }
        Ok(values)
    }
}
