use super::WrappedBasis;
use isofem::field::FnSecondaryField;
use isofem::nalgebra::{DVector, Point2};
use isofem::projection::{FieldProjector, ProjectionError, ProjectionSettings};
use isofem::quadrature::QuadratureError;
use isofem::sparse::ConjugateGradientSolver;
use isofem::spline::{SplineBasis, SplinePatch, TensorBSplineBasis};
use matrixcompare::assert_matrix_eq;

const SAMPLE_POINTS: [(f64, f64); 5] = [(0.0, 0.0), (0.15, 0.85), (0.5, 0.5), (0.71, 0.33), (1.0, 1.0)];

fn scaled_patch(orders: [usize; 2], elements: [usize; 2]) -> SplinePatch<f64, TensorBSplineBasis<f64, 2>, 2> {
    let basis = TensorBSplineBasis::open_uniform(orders, elements).unwrap();
    let control_points = (0..basis.num_basis_functions())
        .map(|i| {
            let g = basis.greville_point(i);
            Point2::new(2.0 * g.x, 3.0 * g.y)
        })
        .collect();
    SplinePatch::new(basis, control_points).unwrap()
}

#[test]
fn continuous_projection_reproduces_field_in_spline_space() {
    let patch = scaled_patch([2, 3], [3, 2]);
    // In parameter coordinates this is 2u + 18 u v², which lies in the spline space
    let f = |x: &Point2<f64>| DVector::from_element(1, x.x + x.x * x.y * x.y);
    let field = FnSecondaryField::new(1, 0, f);

    let projected = FieldProjector::new(&patch).l2_projection(&field, true).unwrap();
    for &(u, v) in &SAMPLE_POINTS {
        let xi = Point2::new(u, v);
        let x = patch.point(&xi).unwrap();
        assert_matrix_eq!(projected.value(&xi).unwrap(), f(&x), comp = abs, tol = 1e-10);
    }
}

#[test]
fn discrete_projection_reproduces_field_in_spline_space() {
    let basis = TensorBSplineBasis::<f64, 2>::open_uniform([3, 3], [3, 3]).unwrap();
    let patch = SplinePatch::from_greville_points(basis);
    let f = |x: &Point2<f64>| DVector::from_vec(vec![x.x * x.y + x.y * x.y, 1.0 - x.x]);
    let field = FnSecondaryField::new(2, 0, f);

    let projected = FieldProjector::new(&patch).l2_projection(&field, false).unwrap();
    assert_eq!(projected.num_components(), 2);
    for &(u, v) in &SAMPLE_POINTS {
        let xi = Point2::new(u, v);
        assert_matrix_eq!(projected.value(&xi).unwrap(), f(&xi), comp = abs, tol = 1e-10);
    }
}

#[test]
fn projection_with_custom_solver_and_quadrature_order() {
    let patch = scaled_patch([3, 2], [2, 4]);
    let f = |x: &Point2<f64>| DVector::from_element(1, 0.5 * x.x * x.x - x.y);
    let field = FnSecondaryField::new(1, 0, f);
    let settings = ProjectionSettings {
        num_gauss_points: Some(4),
        parallel: true,
    };
    let solver = ConjugateGradientSolver::new(1e-12);

    let projected = FieldProjector::new(&patch)
        .with_settings(settings)
        .with_solver(&solver)
        .l2_projection(&field, true)
        .unwrap();
    for &(u, v) in &SAMPLE_POINTS {
        let xi = Point2::new(u, v);
        let x = patch.point(&xi).unwrap();
        assert_matrix_eq!(projected.value(&xi).unwrap(), f(&x), comp = abs, tol = 1e-8);
    }
}

#[test]
fn inverted_element_is_a_topology_error() {
    let mut basis = WrappedBasis::new(TensorBSplineBasis::<f64, 2>::open_uniform([2, 2], [2, 2]).unwrap());
    basis.inverted = Some((1, 0));
    let patch = SplinePatch::from_greville_points(basis);
    let field = FnSecondaryField::new(1, 0, |x: &Point2<f64>| DVector::from_element(1, x.x));

    let projector = FieldProjector::new(&patch);
    assert!(matches!(
        projector.l2_projection(&field, true),
        Err(ProjectionError::Topology { element: 1 })
    ));
    assert!(matches!(
        projector.l2_projection(&field, false),
        Err(ProjectionError::Topology { element: 1 })
    ));
}

#[test]
fn missing_quadrature_rule_is_reported() {
    let patch = scaled_patch([2, 2], [2, 2]);
    let field = FnSecondaryField::new(1, 0, |x: &Point2<f64>| DVector::from_element(1, x.y));
    let settings = ProjectionSettings {
        num_gauss_points: Some(0),
        ..Default::default()
    };
    assert!(matches!(
        FieldProjector::new(&patch)
            .with_settings(settings)
            .l2_projection(&field, true),
        Err(ProjectionError::Quadrature(QuadratureError::NoRuleAvailable { num_points: 0 }))
    ));
}
