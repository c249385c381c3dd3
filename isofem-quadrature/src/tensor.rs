//! Quadrature rules on `[-1, 1]^D` formed as tensor products of 1D Gauss rules.

use crate::univariate::try_gauss;
use crate::{Error, Rule};

/// Expands per-direction coordinate lists into a tensor grid.
///
/// The first direction runs fastest, so for `D = 2` the grid is
/// `(x_0, y_0), (x_1, y_0), ..., (x_0, y_1), ...`.
pub fn expand_tensor_grid<T: Copy, const D: usize>(coordinates: &[Vec<T>; D]) -> Vec<[T; D]> {
    let total: usize = coordinates.iter().map(Vec::len).product();
    let mut points = Vec::with_capacity(total);
    for linear in 0..total {
        let mut index = [0; D];
        let mut remainder = linear;
        for d in 0..D {
            let n = coordinates[d].len();
            index[d] = remainder % n;
            remainder /= n;
        }
        points.push(std::array::from_fn(|d| coordinates[d][index[d]]));
    }
    points
}

/// A tensor-product Gauss rule with a possibly different number of points per direction.
pub fn tensor_gauss<const D: usize>(num_points_per_dim: [usize; D]) -> Result<Rule<D>, Error> {
    let mut rules = Vec::with_capacity(D);
    for n in num_points_per_dim {
        rules.push(try_gauss(n)?);
    }

    let abscissae: [Vec<f64>; D] = std::array::from_fn(|d| rules[d].1.iter().map(|&[x]| x).collect());
    let weights_1d: [Vec<f64>; D] = std::array::from_fn(|d| rules[d].0.clone());

    let points = expand_tensor_grid(&abscissae);
    let weights = expand_tensor_grid(&weights_1d)
        .into_iter()
        .map(|w| w.iter().product())
        .collect();

    Ok((weights, points))
}

/// A Gauss rule with the same number of points in every direction.
pub fn uniform_tensor_gauss<const D: usize>(num_points_per_dim: usize) -> Result<Rule<D>, Error> {
    tensor_gauss([num_points_per_dim; D])
}
