use isofem_quadrature::integrate;
use isofem_quadrature::tensor::{expand_tensor_grid, tensor_gauss, uniform_tensor_gauss};
use matrixcompare::assert_scalar_eq;

fn monomial_integral_1d(alpha: i32) -> f64 {
    (1.0 - (-1.0f64).powi(alpha + 1)) / (alpha as f64 + 1.0)
}

#[test]
fn tensor_grid_runs_first_direction_fastest() {
    let grid = expand_tensor_grid(&[vec![0.0, 1.0, 2.0], vec![10.0, 20.0]]);
    assert_eq!(
        grid,
        vec![
            [0.0, 10.0],
            [1.0, 10.0],
            [2.0, 10.0],
            [0.0, 20.0],
            [1.0, 20.0],
            [2.0, 20.0]
        ]
    );
}

#[test]
fn anisotropic_gauss_rules_satisfy_expected_accuracy() {
    for nx in 1..=5 {
        for ny in 1..=5 {
            let rule = tensor_gauss([nx, ny]).unwrap();
            assert_eq!(rule.0.len(), nx * ny);
            assert!(rule.0.iter().all(|&w| w > 0.0));

            for alpha in 0..=(2 * nx - 1) as i32 {
                for beta in 0..=(2 * ny - 1) as i32 {
                    let expected = monomial_integral_1d(alpha) * monomial_integral_1d(beta);
                    let estimated = integrate(&rule, |&[x, y]| x.powi(alpha) * y.powi(beta));
                    assert_scalar_eq!(estimated, expected, comp = abs, tol = 1e-14);
                }
            }
        }
    }
}

#[test]
fn hexahedral_gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=4 {
        let degree = (2 * n - 1) as i32;
        let rule = uniform_tensor_gauss::<3>(n).unwrap();
        for alpha in 0..=degree {
            for beta in 0..=degree {
                for gamma in 0..=degree {
                    let expected =
                        monomial_integral_1d(alpha) * monomial_integral_1d(beta) * monomial_integral_1d(gamma);
                    let estimated = integrate(&rule, |&[x, y, z]| x.powi(alpha) * y.powi(beta) * z.powi(gamma));
                    assert_scalar_eq!(estimated, expected, comp = abs, tol = 1e-13);
                }
            }
        }
    }
}

#[test]
fn unsupported_point_counts_are_reported() {
    assert!(tensor_gauss([2, 0]).is_err());
    assert!(uniform_tensor_gauss::<2>(11).is_err());
}
