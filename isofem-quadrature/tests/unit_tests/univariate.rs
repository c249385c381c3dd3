use isofem_quadrature::integrate;
use isofem_quadrature::univariate::{gauss, try_gauss};
use isofem_quadrature::{Error, MAX_GAUSS_POINTS};

use matrixcompare::assert_scalar_eq;

#[test]
fn gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=40 {
        let expected_polynomial_degree = 2 * n - 1;
        let rule = gauss(n);

        assert!(rule.0.iter().all(|&w| w > 0.0));

        for alpha in 0..=expected_polynomial_degree as i32 {
            let monomial = |x: f64| x.powi(alpha);
            let monomial_integral = (1.0 - (-1.0f64).powi(alpha + 1)) / (alpha as f64 + 1.0);
            let estimated_integral = integrate(&rule, |x| monomial(x[0]));

            assert_scalar_eq!(estimated_integral, monomial_integral, comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn gauss_points_are_sorted_and_symmetric() {
    for n in 1..=MAX_GAUSS_POINTS {
        let (weights, points) = gauss(n);
        for i in 1..n {
            assert!(points[i - 1][0] < points[i][0]);
        }
        for i in 0..n {
            assert_scalar_eq!(points[i][0], -points[n - 1 - i][0], comp = abs, tol = 1e-15);
            assert_scalar_eq!(weights[i], weights[n - 1 - i], comp = abs, tol = 1e-15);
        }
    }
}

#[test]
fn try_gauss_rejects_unsupported_point_counts() {
    assert_eq!(try_gauss(0), Err(Error::NoRuleAvailable { num_points: 0 }));
    assert_eq!(
        try_gauss(MAX_GAUSS_POINTS + 1),
        Err(Error::NoRuleAvailable {
            num_points: MAX_GAUSS_POINTS + 1
        })
    );
    assert!(try_gauss(MAX_GAUSS_POINTS).is_ok());
}
