use crate::spline::{KnotVector, TensorBSplineBasis};
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::Point2;

/// Open knot vectors on `[0, 1]` with randomly spaced interior knots.
pub fn open_knot_vector(orders: impl Strategy<Value = usize>, max_elements: usize) -> impl Strategy<Value = KnotVector<f64>> {
    (orders, 1..=max_elements.max(1))
        .prop_flat_map(|(order, num_elements)| (Just(order), vec(0.2..1.0, num_elements)))
        .prop_filter_map("knot vector must be valid", |(order, lengths)| {
            // Element lengths are bounded away from zero, so that no interior knot is repeated
            let total: f64 = lengths.iter().sum();
            let mut knots = vec![0.0; order];
            let mut position = 0.0;
            for length in &lengths[..lengths.len() - 1] {
                position += length / total;
                knots.push(position);
            }
            knots.extend(std::iter::repeat(1.0).take(order));
            KnotVector::try_new(order, knots).ok()
        })
}

pub fn bspline_basis_1d(max_order: usize, max_elements: usize) -> impl Strategy<Value = TensorBSplineBasis<f64, 1>> {
    open_knot_vector(1..=max_order.max(1), max_elements).prop_map(|knots| TensorBSplineBasis::new([knots]))
}

pub fn bspline_basis_2d(max_order: usize, max_elements: usize) -> impl Strategy<Value = TensorBSplineBasis<f64, 2>> {
    let orders = 1..=max_order.max(1);
    (
        open_knot_vector(orders.clone(), max_elements),
        open_knot_vector(orders, max_elements),
    )
        .prop_map(|(u, v)| TensorBSplineBasis::new([u, v]))
}

/// Points in the unit square.
pub fn unit_point2() -> impl Strategy<Value = Point2<f64>> {
    [0.0..=1.0, 0.0..=1.0].prop_map(|[x, y]| Point2::new(x, y))
}
