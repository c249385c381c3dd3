use super::WrappedBasis;
use isofem::field::{FnSecondaryField, SampledField, SplineField};
use isofem::nalgebra::{DMatrix, DVector, Point1, Point2};
use isofem::projection::{FieldProjector, ProjectionError};
use isofem::proptest::bspline_basis_1d;
use isofem::sparse::SolveError;
use isofem::spline::{SplineBasis, SplinePatch, TensorBSplineBasis};
use matrixcompare::assert_matrix_eq;
use proptest::collection::vec;
use proptest::prelude::*;

fn quadratic_patch() -> SplinePatch<f64, TensorBSplineBasis<f64, 2>, 2> {
    let basis = TensorBSplineBasis::open_uniform([3, 3], [3, 2]).unwrap();
    SplinePatch::from_greville_points(basis)
}

fn greville_points<B: SplineBasis<f64, 2>>(basis: &B) -> Vec<Point2<f64>> {
    (0..basis.num_basis_functions())
        .map(|i| basis.greville_point(i))
        .collect()
}

fn polynomial(xi: &Point2<f64>) -> DVector<f64> {
    let (x, y) = (xi.x, xi.y);
    DVector::from_vec(vec![1.0 + 2.0 * x - y * y, x * y])
}

#[test]
fn interpolation_reproduces_polynomials_in_spline_space() {
    let patch = quadratic_patch();
    let samples = SampledField::from_fn(greville_points(patch.basis()), 2, polynomial);
    let field = FieldProjector::new(&patch)
        .regular_interpolation(&samples)
        .unwrap();

    assert_eq!(field.num_components(), 2);
    assert_eq!(field.coefficients().ncols(), patch.basis().num_basis_functions());
    for &(u, v) in &[(0.0, 0.0), (0.2, 0.7), (0.5, 0.5), (0.9, 0.1), (1.0, 1.0)] {
        let xi = Point2::new(u, v);
        assert_matrix_eq!(field.value(&xi).unwrap(), polynomial(&xi), comp = abs, tol = 1e-12);
    }

    // Interpolation conditions hold at the sample points
    for i in 0..samples.num_points() {
        let value = field.value_at_node(i).unwrap();
        assert_matrix_eq!(value, samples.values().column(i), comp = abs, tol = 1e-12);
    }
}

#[test]
fn interpolated_field_derivatives() {
    let patch = quadratic_patch();
    let samples = SampledField::from_fn(greville_points(patch.basis()), 2, polynomial);
    let field = FieldProjector::new(&patch)
        .regular_interpolation(&samples)
        .unwrap();

    let xi = Point2::new(0.3, 0.6);
    let expected_gradient = DMatrix::from_row_slice(2, 2, &[2.0, -2.0 * 0.6, 0.6, 0.3]);
    assert_matrix_eq!(field.parametric_gradient(&xi).unwrap(), expected_gradient, comp = abs, tol = 1e-11);
    assert_matrix_eq!(field.gradient(&xi, &patch).unwrap(), expected_gradient, comp = abs, tol = 1e-11);

    let hessians = field.hessian(&xi).unwrap();
    assert_eq!(hessians.len(), 2);
    let expected_first = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 0.0, -2.0]);
    let expected_second = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
    assert_matrix_eq!(hessians[0].clone(), expected_first, comp = abs, tol = 1e-10);
    assert_matrix_eq!(hessians[1].clone(), expected_second, comp = abs, tol = 1e-10);
}

#[test]
fn physical_gradient_accounts_for_geometry() {
    // Geometry x = 2u, y = 3v
    let basis = TensorBSplineBasis::<f64, 2>::open_uniform([2, 2], [2, 2]).unwrap();
    let control_points = greville_points(&basis)
        .into_iter()
        .map(|p| Point2::new(2.0 * p.x, 3.0 * p.y))
        .collect();
    let patch = SplinePatch::new(basis.clone(), control_points).unwrap();

    // u(xi) = xi_1 + xi_2, i.e. u(x) = x / 2 + y / 3
    let coefficients = DMatrix::from_fn(1, basis.num_basis_functions(), |_, i| {
        let g = basis.greville_point(i);
        g.x + g.y
    });
    let field = SplineField::try_new(basis, coefficients).unwrap();
    let gradient = field.gradient(&Point2::new(0.4, 0.8), &patch).unwrap();
    assert_matrix_eq!(gradient, DMatrix::from_row_slice(1, 2, &[0.5, 1.0 / 3.0]), comp = abs, tol = 1e-12);
}

#[test]
fn project_solution_samples_field_at_greville_points() {
    let patch = quadratic_patch();
    let secondary = FnSecondaryField::new(2, 0, polynomial);
    let field = FieldProjector::new(&patch)
        .project_solution(&secondary)
        .unwrap();
    let xi = Point2::new(0.45, 0.15);
    assert_matrix_eq!(field.value(&xi).unwrap(), polynomial(&xi), comp = abs, tol = 1e-12);
}

#[test]
fn interpolation_rejects_invalid_input() {
    let patch = quadratic_patch();
    let projector = FieldProjector::new(&patch);
    let mut points = greville_points(patch.basis());

    let too_few = SampledField::from_fn(points[1..].to_vec(), 1, |_| DVector::zeros(1));
    assert!(matches!(
        projector.regular_interpolation(&too_few),
        Err(ProjectionError::SizeMismatch {
            points: 19,
            basis_functions: 20
        })
    ));

    let shape = SampledField::try_new(points.clone(), DMatrix::zeros(1, 3));
    assert!(matches!(
        shape,
        Err(ProjectionError::ValueShapeMismatch { points: 20, columns: 3 })
    ));

    let mut outside = points.clone();
    outside[5] = Point2::new(2.0, 0.5);
    let outside = SampledField::from_fn(outside, 1, |_| DVector::zeros(1));
    assert!(matches!(
        projector.regular_interpolation(&outside),
        Err(ProjectionError::PointOutsideDomain { point: 5 })
    ));

    // Repeated sample points give a singular collocation matrix
    points[3] = points[2];
    let repeated = SampledField::from_fn(points, 1, |_| DVector::from_element(1, 1.0));
    assert!(matches!(
        projector.regular_interpolation(&repeated),
        Err(ProjectionError::Solve(SolveError::Singular))
    ));
}

#[test]
fn interpolation_rejects_rational_basis() {
    let mut basis = WrappedBasis::new(TensorBSplineBasis::<f64, 2>::open_uniform([2, 2], [1, 1]).unwrap());
    basis.rational = true;
    let patch = SplinePatch::from_greville_points(basis);
    let samples = SampledField::from_fn(greville_points(patch.basis()), 1, |_| DVector::zeros(1));
    assert!(matches!(
        FieldProjector::new(&patch).regular_interpolation(&samples),
        Err(ProjectionError::RationalBasis)
    ));
}

proptest! {
    #[test]
    fn interpolation_recovers_spline_coefficients(
        (basis, coefficients) in bspline_basis_1d(4, 6)
            .prop_flat_map(|basis| {
                let n = basis.num_basis_functions();
                (Just(basis), vec(-1.0..1.0f64, n))
            })
    ) {
        let n = basis.num_basis_functions();
        let coefficients = DMatrix::from_row_slice(1, n, &coefficients);
        let spline = SplineField::try_new(basis.clone(), coefficients.clone()).unwrap();
        let points: Vec<Point1<f64>> = (0..n).map(|i| basis.greville_point(i)).collect();
        let samples = SampledField::from_fn(points, 1, |xi| spline.value(xi).unwrap());

        let patch = SplinePatch::from_greville_points(basis);
        let interpolated = FieldProjector::new(&patch).regular_interpolation(&samples).unwrap();
        let difference = (interpolated.coefficients() - &coefficients).amax();
        prop_assert!(difference <= 1e-9, "coefficient difference {}", difference);
    }
}
