use crate::field::{SampledField, SecondaryField, SplineField};
use crate::projection::{FieldProjector, ProjectionError};
use crate::spline::{BasisValues, SplineBasis};
use crate::Real;
use log::debug;
use nalgebra::{DMatrix, Point};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

impl<'a, T, B, const D: usize> FieldProjector<'a, T, B, D>
where
    T: Real,
    B: SplineBasis<T, D> + Clone,
{
    /// Interpolates sampled values exactly with the patch basis.
    ///
    /// There must be exactly one sample point per basis function. Row `i` of the collocation
    /// matrix holds the basis functions of the element containing sample point `i`, and all
    /// field components are solved for at once.
    pub fn regular_interpolation(&self, samples: &SampledField<T, D>) -> Result<SplineField<T, B, D>, ProjectionError> {
        let basis = self.patch.basis();
        if basis.is_rational() {
            return Err(ProjectionError::RationalBasis);
        }

        let n = basis.num_basis_functions();
        if samples.num_points() != n {
            return Err(ProjectionError::SizeMismatch {
                points: samples.num_points(),
                basis_functions: n,
            });
        }

        let mut collocation = CooMatrix::new(n, n);
        let mut values = BasisValues::default();
        for (i, xi) in samples.points().iter().enumerate() {
            let element = basis
                .find_element(xi)
                .ok_or(ProjectionError::PointOutsideDomain { point: i })?;
            self.lock.evaluate(basis, element, xi, 0, &mut values);
            for (local, j) in basis.element_basis_functions(element).into_iter().enumerate() {
                let value = values.values[local];
                if value != T::zero() {
                    collocation.push(i, j, value);
                }
            }
        }

        let matrix = CsrMatrix::from(&collocation);
        let mut coefficients = samples.values().transpose();
        self.solver.solve(&matrix, &mut coefficients)?;
        debug!(
            "Interpolated {} components onto {} basis functions",
            samples.num_components(),
            n
        );

        Ok(SplineField::try_new(basis.clone(), coefficients.transpose())?)
    }

    /// Samples a secondary field at the Greville points and interpolates the samples.
    pub fn project_solution<F>(&self, field: &F) -> Result<SplineField<T, B, D>, ProjectionError>
    where
        F: SecondaryField<T, D> + ?Sized,
    {
        let basis = self.patch.basis();
        let n = basis.num_basis_functions();
        let greville: Vec<Point<T, D>> = (0..n).map(|i| basis.greville_point(i)).collect();

        let mut values = DMatrix::zeros(field.num_components(), n);
        for (i, xi) in greville.iter().enumerate() {
            let element = basis
                .find_element(xi)
                .ok_or(ProjectionError::PointOutsideDomain { point: i })?;
            let x = self.physical_point(xi)?;
            let value = field
                .evaluate(element, &[*xi], &[x])
                .map_err(ProjectionError::Evaluation)?;
            if value.shape() != (field.num_components(), 1) {
                return Err(ProjectionError::ValueShapeMismatch {
                    points: 1,
                    columns: value.ncols(),
                });
            }
            values.set_column(i, &value.column(0));
        }

        self.regular_interpolation(&SampledField::try_new(greville, values)?)
    }
}
