use crate::assembly::{map_elements, ElementContribution, GlobalProjectionSystem};
use crate::field::{SecondaryField, SplineField};
use crate::projection::{FieldProjector, ProjectionError};
use crate::quadrature::element_quadrature;
use crate::spline::{BasisValues, SplineBasis};
use crate::{real, Real};
use log::debug;
use nalgebra::DMatrix;

impl<'a, T, B, const D: usize> FieldProjector<'a, T, B, D>
where
    T: Real,
    B: SplineBasis<T, D> + Clone + Sync,
{
    fn element_l2_contribution<F>(
        &self,
        field: &F,
        element: usize,
        continuous: bool,
    ) -> Result<ElementContribution<T>, ProjectionError>
    where
        F: SecondaryField<T, D> + ?Sized,
    {
        let basis = self.patch.basis();
        let num_points: [usize; D] = std::array::from_fn(|d| {
            if continuous {
                self.settings.num_gauss_points.unwrap_or(basis.order(d))
            } else {
                basis.order(d).saturating_sub(1)
            }
        });

        let domain = basis.element_domain(element);
        let volume = domain.volume();
        if volume < T::zero() {
            return Err(ProjectionError::Topology { element });
        }
        // Scaling from the reference cube [-1, 1]^D
        let scale = (0..D).fold(volume, |acc, _| acc * real::<T>(0.5));

        let rule = element_quadrature(self.quadrature, &domain, num_points, [None; D])?;
        let nodes = basis.element_basis_functions(element);
        let n = nodes.len();

        let mut basis_values = BasisValues::default();
        let mut point_basis = Vec::with_capacity(rule.len());
        let mut physical = Vec::with_capacity(rule.len());
        let mut point_weights = Vec::with_capacity(rule.len());
        for (xi, &w) in rule.points.iter().zip(&rule.weights) {
            self.lock.evaluate(basis, element, xi, usize::from(continuous), &mut basis_values);
            let weight = if continuous {
                let jacobian = self.patch.jacobian_with(&nodes, &basis_values);
                scale * w * jacobian.determinant()
            } else {
                T::one()
            };
            physical.push(self.patch.map_with(&nodes, &basis_values));
            point_basis.push(basis_values.values.clone());
            point_weights.push(weight);
        }

        let values = self
            .lock
            .run(field.is_reentrant(), || field.evaluate(element, &rule.points, &physical))
            .map_err(ProjectionError::Evaluation)?;
        if values.shape() != (field.num_components(), physical.len()) {
            return Err(ProjectionError::ValueShapeMismatch {
                points: physical.len(),
                columns: values.ncols(),
            });
        }

        let mut matrix = DMatrix::zeros(n, n);
        let mut rhs = DMatrix::zeros(n, field.num_components());
        for (q, (phi, &weight)) in point_basis.iter().zip(&point_weights).enumerate() {
            if weight == T::zero() {
                continue;
            }
            matrix.ger(weight, phi, phi, T::one());
            rhs.ger(weight, phi, &values.column(q), T::one());
        }

        Ok(ElementContribution {
            nodes: nodes.into_iter().map(Some).collect(),
            matrix,
            rhs,
        })
    }

    /// Galerkin L2 projection of a secondary field onto the patch basis.
    ///
    /// The continuous variant integrates with Gauss quadrature including the geometry Jacobian.
    /// The discrete variant sums unweighted samples at `order - 1` Gauss points per direction.
    pub fn l2_projection<F>(&self, field: &F, continuous: bool) -> Result<SplineField<T, B, D>, ProjectionError>
    where
        F: SecondaryField<T, D> + ?Sized,
    {
        let basis = self.patch.basis();
        if basis.is_rational() {
            return Err(ProjectionError::RationalBasis);
        }

        let elements: Vec<usize> = (0..basis.num_elements()).collect();
        let contributions = map_elements(&elements, self.settings.parallel, |&element| {
            self.element_l2_contribution(field, element, continuous)
        })?;

        let mut system = GlobalProjectionSystem::new(basis.num_basis_functions(), field.num_components());
        for contribution in &contributions {
            system.add_element_contribution(contribution);
        }
        let coefficients = system.solve(self.solver)?;
        debug!(
            "L2 projection ({}) onto {} basis functions",
            if continuous { "continuous" } else { "discrete" },
            basis.num_basis_functions()
        );

        Ok(SplineField::try_new(basis.clone(), coefficients.transpose())?)
    }
}
