use crate::assembly::{map_elements, ElementContribution, EvaluationLock, GlobalProjectionSystem};
use crate::projection::{ProjectionError, ProjectionSettings};
use crate::quadrature::{element_quadrature, GaussQuadrature, QuadratureProvider};
use crate::spline::{BasisValues, FaceTopology, SplineBasis, SplineError, SplinePatch};
use crate::{real, Real};
use isofem_sparse::{LinearSystemSolver, SparseCholeskySolver};
use log::debug;
use nalgebra::{DMatrix, DVector, Point};

/// Prescribed values on a boundary, as a function of the physical point and time.
pub trait BoundaryValues<T: Real, const D: usize>: Sync {
    fn num_components(&self) -> usize;

    fn value(&self, x: &Point<T, D>, time: T) -> DVector<T>;
}

/// The same value everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantValues<T: Real>(pub DVector<T>);

impl<T: Real, const D: usize> BoundaryValues<T, D> for ConstantValues<T> {
    fn num_components(&self) -> usize {
        self.0.len()
    }

    fn value(&self, _x: &Point<T, D>, _time: T) -> DVector<T> {
        self.0.clone()
    }
}

/// Values given by a closure `f(x, t)`.
pub struct FnBoundaryValues<F> {
    num_components: usize,
    function: F,
}

impl<F> FnBoundaryValues<F> {
    pub fn new(num_components: usize, function: F) -> Self {
        Self {
            num_components,
            function,
        }
    }
}

impl<T, F, const D: usize> BoundaryValues<T, D> for FnBoundaryValues<F>
where
    T: Real,
    F: Fn(&Point<T, D>, T) -> DVector<T> + Sync,
{
    fn num_components(&self) -> usize {
        self.num_components
    }

    fn value(&self, x: &Point<T, D>, time: T) -> DVector<T> {
        (self.function)(x, time)
    }
}

/// The basis a face projection is expressed in.
#[derive(Debug)]
pub enum ProjectionBasis<'b, S> {
    /// The solution uses the geometry basis.
    Geometry,
    /// The solution uses a separate spline basis over the same parametric domain,
    /// with its own element numbering.
    Mixed(&'b S),
}

impl<'b, S> Clone for ProjectionBasis<'b, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'b, S> Copy for ProjectionBasis<'b, S> {}

/// Galerkin projection of prescribed values onto the basis functions of a patch face.
pub struct BoundaryFieldProjector<'a, T: Real, B, const D: usize> {
    patch: &'a SplinePatch<T, B, D>,
    quadrature: &'a dyn QuadratureProvider<T>,
    solver: &'a dyn LinearSystemSolver<T>,
    settings: ProjectionSettings,
    lock: EvaluationLock,
}

impl<'a, T, B, const D: usize> BoundaryFieldProjector<'a, T, B, D>
where
    T: Real,
    B: SplineBasis<T, D> + Sync,
{
    pub fn new(patch: &'a SplinePatch<T, B, D>) -> Self {
        Self {
            patch,
            quadrature: &GaussQuadrature,
            solver: &SparseCholeskySolver,
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

    /// Projects prescribed values onto the face, with the solution in the geometry basis.
    ///
    /// Returns one coefficient vector per value component, in face-local node order.
    pub fn project_face<V>(&self, face: &FaceTopology, values: &V, time: T) -> Result<Vec<DVector<T>>, ProjectionError>
    where
        V: BoundaryValues<T, D> + ?Sized,
    {
        self.project_face_in(face, ProjectionBasis::<B>::Geometry, values, time)
    }

    /// Projects prescribed values onto the face in the given solution basis.
    ///
    /// For a mixed basis, `face` must describe the elements and nodes of the solution basis.
    pub fn project_face_in<S, V>(
        &self,
        face: &FaceTopology,
        basis: ProjectionBasis<'_, S>,
        values: &V,
        time: T,
    ) -> Result<Vec<DVector<T>>, ProjectionError>
    where
        S: SplineBasis<T, D> + Sync,
        V: BoundaryValues<T, D> + ?Sized,
    {
        let face_elements: Vec<usize> = (0..face.elements.len()).collect();
        let contributions = map_elements(&face_elements, self.settings.parallel, |&ie| match basis {
            ProjectionBasis::Geometry => {
                self.face_element_contribution(face, ie, self.patch.basis(), false, values, time)
            }
            ProjectionBasis::Mixed(solution_basis) => {
                self.face_element_contribution(face, ie, solution_basis, true, values, time)
            }
        })?;

        let mut system = GlobalProjectionSystem::new(face.num_nodes(), values.num_components());
        for contribution in &contributions {
            system.add_element_contribution(contribution);
        }
        let coefficients = system.solve(self.solver)?;
        debug!(
            "Projected {} components onto {} nodes of face {}",
            values.num_components(),
            face.num_nodes(),
            face.face.code()
        );

        Ok(coefficients
            .column_iter()
            .map(|column| column.clone_owned())
            .collect())
    }

    fn face_element_contribution<S, V>(
        &self,
        face: &FaceTopology,
        face_element: usize,
        solution_basis: &S,
        mixed: bool,
        values: &V,
        time: T,
    ) -> Result<ElementContribution<T>, ProjectionError>
    where
        S: SplineBasis<T, D>,
        V: BoundaryValues<T, D> + ?Sized,
    {
        let geometry = self.patch.basis();
        let element = face.elements[face_element];
        let element_nodes = &face.element_nodes[face_element];
        let axis = face.face.axis;
        let tangents = face.face.tangent_directions(D);

        let domain = solution_basis.element_domain(element);
        // Face area in parameter space, scaled to the reference square
        let area = tangents
            .iter()
            .fold(domain.face_area(axis), |acc, _| acc * real::<T>(0.5));
        if area < T::zero() {
            return Err(ProjectionError::Topology { element });
        }

        let patch_domain = geometry.parametric_domain();
        let mut pinned = [None; D];
        pinned[axis] = Some(if face.face.at_end {
            patch_domain.upper[axis]
        } else {
            patch_domain.lower[axis]
        });
        let num_points = std::array::from_fn(|d| self.settings.num_gauss_points.unwrap_or(solution_basis.order(d)));
        let rule = element_quadrature(self.quadrature, &domain, num_points, pinned)?;

        let n = element_nodes.len();
        let m = values.num_components();
        let mut matrix = DMatrix::zeros(n, n);
        let mut rhs = DMatrix::zeros(n, m);
        let mut geometry_values = BasisValues::default();
        let mut solution_values = BasisValues::default();

        for (xi, &w) in rule.points.iter().zip(&rule.weights) {
            let geometry_element = if mixed {
                geometry
                    .find_element(xi)
                    .ok_or(SplineError::PointOutsideDomain)?
            } else {
                element
            };
            let geometry_nodes = geometry.element_basis_functions(geometry_element);
            self.lock.evaluate(geometry, geometry_element, xi, 1, &mut geometry_values);

            let jacobian = self.patch.jacobian_with(&geometry_nodes, &geometry_values);
            let weight = area * w * surface_measure(&jacobian, &tangents);
            if weight == T::zero() {
                continue;
            }

            let x = self.patch.map_with(&geometry_nodes, &geometry_values);
            let phi = if mixed {
                self.lock.evaluate(solution_basis, element, xi, 0, &mut solution_values);
                &solution_values.values
            } else {
                &geometry_values.values
            };

            let value = values.value(&x, time);
            if value.len() != m {
                return Err(ProjectionError::ComponentMismatch {
                    expected: m,
                    actual: value.len(),
                });
            }
            matrix.ger(weight, phi, phi, T::one());
            rhs.ger(weight, phi, &value, T::one());
        }

        Ok(ElementContribution {
            nodes: element_nodes.clone(),
            matrix,
            rhs,
        })
    }
}

/// Surface measure `sqrt(det(Jtᵀ Jt))` of the tangential Jacobian columns.
fn surface_measure<T: Real>(jacobian: &DMatrix<T>, tangents: &[usize]) -> T {
    if tangents.is_empty() {
        return T::one();
    }
    let tangential = jacobian.select_columns(tangents);
    let metric = tangential.transpose() * &tangential;
    metric.determinant().max(T::zero()).sqrt()
}
