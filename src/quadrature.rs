//! Gauss quadrature on spline elements.

use crate::spline::ParametricBox;
use crate::{real, Real};
use isofem_quadrature::tensor::expand_tensor_grid;
use isofem_quadrature::univariate::try_gauss;
use nalgebra::Point;
use std::array;

pub use isofem_quadrature::{Error as QuadratureError, MAX_GAUSS_POINTS};

/// Source of univariate quadrature rules on the reference interval `[-1, 1]`.
pub trait QuadratureProvider<T>: Sync {
    /// Abscissae of the `n`-point rule, in increasing order.
    fn points(&self, n: usize) -> Result<Vec<T>, QuadratureError>;

    /// Weights of the `n`-point rule.
    fn weights(&self, n: usize) -> Result<Vec<T>, QuadratureError>;
}

/// Gauss-Legendre rules with `1..=MAX_GAUSS_POINTS` points.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussQuadrature;

impl<T: Real> QuadratureProvider<T> for GaussQuadrature {
    fn points(&self, n: usize) -> Result<Vec<T>, QuadratureError> {
        let (_, points) = try_gauss(n)?;
        Ok(points.into_iter().map(|[x]| real(x)).collect())
    }

    fn weights(&self, n: usize) -> Result<Vec<T>, QuadratureError> {
        let (weights, _) = try_gauss(n)?;
        Ok(weights.into_iter().map(real).collect())
    }
}

/// Tensor-product rule on a single element.
///
/// Points are in element parameter coordinates. Weights are products of the reference weights
/// and do *not* include the scaling from the reference cube to the element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementQuadrature<T: Real, const D: usize> {
    pub points: Vec<Point<T, D>>,
    pub weights: Vec<T>,
}

impl<T: Real, const D: usize> ElementQuadrature<T, D> {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Gauss point parameters along `direction` inside an element.
pub fn element_gauss_parameters<T: Real, const D: usize>(
    domain: &ParametricBox<T, D>,
    direction: usize,
    reference_points: &[T],
) -> Vec<T> {
    let half: T = real(0.5);
    let (a, b) = (domain.lower[direction], domain.upper[direction]);
    reference_points
        .iter()
        .map(|&xi| half * ((b - a) * xi + (b + a)))
        .collect()
}

/// Builds a tensor Gauss rule on an element with `num_points[d]` points in direction `d`.
///
/// A direction with a `pinned` coordinate uses that single coordinate with unit weight instead,
/// which restricts the rule to a face of the element.
pub fn element_quadrature<T: Real, const D: usize>(
    provider: &dyn QuadratureProvider<T>,
    domain: &ParametricBox<T, D>,
    num_points: [usize; D],
    pinned: [Option<T>; D],
) -> Result<ElementQuadrature<T, D>, QuadratureError> {
    let mut coordinates: [Vec<T>; D] = array::from_fn(|_| Vec::new());
    let mut weights: [Vec<T>; D] = array::from_fn(|_| Vec::new());
    for d in 0..D {
        if let Some(value) = pinned[d] {
            coordinates[d] = vec![value];
            weights[d] = vec![T::one()];
        } else {
            coordinates[d] = element_gauss_parameters(domain, d, &provider.points(num_points[d])?);
            weights[d] = provider.weights(num_points[d])?;
        }
    }

    let points = expand_tensor_grid(&coordinates)
        .into_iter()
        .map(Point::from)
        .collect();
    let weights = expand_tensor_grid(&weights)
        .into_iter()
        .map(|w| w.iter().fold(T::one(), |acc, &w_d| acc * w_d))
        .collect();
    Ok(ElementQuadrature { points, weights })
}
