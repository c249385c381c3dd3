//! Quadrature rules for the one-dimensional domain `[-1, 1]`.

use crate::{Error, Rule, MAX_GAUSS_POINTS};
use std::f64::consts::PI;

/// Recurrence relation for Legendre polynomials.
///
/// Note: we use a formula for which derivatives are *not* defined at |x| == 1, so it is only
/// suitable for evaluation in the open interval (-1, 1).
#[derive(Debug, Default)]
struct LegendreRecurrence {
    n: usize,
    x: f64,
    // p_n(x)
    p1: f64,
    // p_{n - 1}(x)
    p2: f64,
}

impl LegendreRecurrence {
    fn evaluate(n: usize, x: f64) -> Self {
        //  m P_m(x) = (2m - 1) * x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p1 = 1.0;
        let mut p2 = 0.0;
        let mut p3;
        for m in 1..=n {
            let m = m as f64;
            p3 = p2;
            p2 = p1;
            p1 = ((2.0 * m - 1.0) * x * p2 - (m - 1.0) * p3) / m;
        }

        Self { n, x, p1, p2 }
    }

    fn value(&self) -> f64 {
        self.p1
    }

    fn derivative(&self) -> f64 {
        let Self { n, x, p1, p2 } = &self;
        let n = *n as f64;
        // dp_n/dx (x) = n * (x * p_n(x) - p_{n - 1}(x)) / (x^2 - 1)
        n * (x * p1 - p2) / (x * x - 1.0)
    }

    fn value_and_derivative(&self) -> (f64, f64) {
        (self.value(), self.derivative())
    }
}

/// Gauss quadrature for the reference interval [-1, 1].
///
/// Returns the [Gauss quadrature rule] with the given number of points, ordered by increasing
/// abscissa. Given `n` points, the rule integrates polynomials of order up to `2 n - 1` exactly.
///
/// # Panics
///
/// Panics if zero points are requested.
///
/// [Gauss quadrature rule]: https://en.wikipedia.org/wiki/Gaussian_quadrature
pub fn gauss(num_points: usize) -> Rule<1> {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    // Loosely based on Numerical Recipes, Third Edition (2007)
    let m = (n + 1) / 2;

    let mut points = vec![[0.0]; n];
    let mut weights = vec![0.0; n];

    // Only the first m roots are computed, the rest follow by symmetry
    for i in 0..m {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let (mut p, mut dp) = LegendreRecurrence::evaluate(n, x).value_and_derivative();

        for _ in 0..100 {
            let dx = -p / dp;
            x += dx;
            let (p_new, dp_new) = LegendreRecurrence::evaluate(n, x).value_and_derivative();
            p = p_new;
            dp = dp_new;
            if dx.abs() <= 1e-15 {
                break;
            }
        }

        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        // The initial guesses approach the roots from the right end of the interval
        points[i] = [-x];
        points[n - i - 1] = [x];
        weights[i] = w;
        weights[n - i - 1] = w;
    }

    if n % 2 == 1 {
        points[n / 2] = [0.0];
    }

    (weights, points)
}

/// Gauss quadrature restricted to the supported range `1..=MAX_GAUSS_POINTS`.
pub fn try_gauss(num_points: usize) -> Result<Rule<1>, Error> {
    if (1..=MAX_GAUSS_POINTS).contains(&num_points) {
        Ok(gauss(num_points))
    } else {
        Err(Error::NoRuleAvailable { num_points })
    }
}
