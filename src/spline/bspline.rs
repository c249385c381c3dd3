use crate::spline::{BasisValues, Face, FaceTopology, ParametricBox, SplineBasis, SplineError};
use crate::{real, real_from_usize, Real};
use itertools::Itertools;
use nalgebra::{DMatrix, Point};
use std::array;

/// A non-decreasing knot vector for a univariate B-spline basis of a given order.
#[derive(Debug, Clone, PartialEq)]
pub struct KnotVector<T> {
    knots: Vec<T>,
    order: usize,
}

impl<T: Real> KnotVector<T> {
    pub fn try_new(order: usize, knots: Vec<T>) -> Result<Self, SplineError> {
        if order == 0 {
            return Err(SplineError::InvalidKnotVector("order must be positive".to_string()));
        }
        if knots.len() < 2 * order {
            return Err(SplineError::InvalidKnotVector(format!(
                "order {} requires at least {} knots, got {}",
                order,
                2 * order,
                knots.len()
            )));
        }
        if knots.windows(2).any(|w| w[1] < w[0]) {
            return Err(SplineError::InvalidKnotVector("knots must be non-decreasing".to_string()));
        }
        let n = knots.len() - order;
        if !(knots[order - 1] < knots[n]) {
            return Err(SplineError::InvalidKnotVector("parametric domain is empty".to_string()));
        }
        Ok(Self { knots, order })
    }

    /// An open (clamped) knot vector with uniformly spaced interior knots.
    pub fn open_uniform(order: usize, num_elements: usize, start: T, end: T) -> Result<Self, SplineError> {
        if num_elements == 0 {
            return Err(SplineError::InvalidKnotVector("at least one element is required".to_string()));
        }
        let mut knots = vec![start; order.max(1)];
        let h = (end - start) / real_from_usize::<T>(num_elements);
        for i in 1..num_elements {
            knots.push(start + h * real_from_usize::<T>(i));
        }
        knots.extend(std::iter::repeat(end).take(order.max(1)));
        Self::try_new(order, knots)
    }

    pub fn knots(&self) -> &[T] {
        &self.knots
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn degree(&self) -> usize {
        self.order - 1
    }

    pub fn num_basis_functions(&self) -> usize {
        self.knots.len() - self.order
    }

    pub fn start(&self) -> T {
        self.knots[self.degree()]
    }

    pub fn end(&self) -> T {
        self.knots[self.num_basis_functions()]
    }

    /// Knot span indices `i` with `knots[i] < knots[i + 1]` inside the domain.
    pub fn element_spans(&self) -> Vec<usize> {
        (self.degree()..self.num_basis_functions())
            .filter(|&i| self.knots[i] < self.knots[i + 1])
            .collect()
    }

    /// The span `i` with `knots[i] <= u < knots[i + 1]`, using the last span at the domain end.
    pub fn find_span(&self, u: T) -> Option<usize> {
        let (start, end) = (self.start(), self.end());
        let tol = (end - start) * T::default_epsilon() * real::<T>(16.0);
        if u < start - tol || u > end + tol {
            return None;
        }
        let spans = self.element_spans();
        let position = spans.partition_point(|&i| self.knots[i] <= u);
        Some(spans[position.saturating_sub(1)])
    }

    /// The Greville abscissa of basis function `i`.
    pub fn greville(&self, i: usize) -> T {
        if self.order == 1 {
            return (self.knots[i] + self.knots[i + 1]) * real::<T>(0.5);
        }
        let sum = self.knots[i + 1..i + self.order]
            .iter()
            .fold(T::zero(), |acc, &k| acc + k);
        sum / real_from_usize::<T>(self.degree())
    }

    /// Values and derivatives of the `order` basis functions nonzero on `span`.
    ///
    /// Returns a `3 x order` matrix where row `k` holds the `k`-th derivative. Derivatives
    /// beyond `num_derivatives` (or beyond the degree) are zero. This is algorithm A2.3 of
    /// Piegl and Tiller, *The NURBS Book*.
    pub fn basis_derivatives(&self, span: usize, u: T, num_derivatives: usize) -> DMatrix<T> {
        let p = self.degree();
        let knots = &self.knots;
        let nd = num_derivatives.min(p).min(2);
        let mut ders = DMatrix::zeros(3, p + 1);

        let mut ndu = DMatrix::zeros(p + 1, p + 1);
        let mut left = vec![T::zero(); p + 1];
        let mut right = vec![T::zero(); p + 1];
        ndu[(0, 0)] = T::one();
        for j in 1..=p {
            left[j] = u - knots[span + 1 - j];
            right[j] = knots[span + j] - u;
            let mut saved = T::zero();
            for r in 0..j {
                // Lower triangle holds knot differences, upper triangle the basis functions
                ndu[(j, r)] = right[r + 1] + left[j - r];
                let temp = ndu[(r, j - 1)] / ndu[(j, r)];
                ndu[(r, j)] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            ndu[(j, j)] = saved;
        }

        for j in 0..=p {
            ders[(0, j)] = ndu[(j, p)];
        }

        let p_i = p as isize;
        let mut a = DMatrix::zeros(2, p + 1);
        for r in 0..=p_i {
            let (mut s1, mut s2) = (0, 1);
            a.fill(T::zero());
            a[(0, 0)] = T::one();
            for k in 1..=nd as isize {
                let mut d = T::zero();
                let rk = r - k;
                let pk = p_i - k;
                if r >= k {
                    a[(s2, 0)] = a[(s1, 0)] / ndu[((pk + 1) as usize, rk as usize)];
                    d = a[(s2, 0)] * ndu[(rk as usize, pk as usize)];
                }
                let j1 = if rk >= -1 { 1 } else { -rk };
                let j2 = if r - 1 <= pk { k - 1 } else { p_i - r };
                for j in j1..=j2 {
                    let (j, rkj) = (j as usize, (rk + j) as usize);
                    a[(s2, j)] = (a[(s1, j)] - a[(s1, j - 1)]) / ndu[((pk + 1) as usize, rkj)];
                    d += a[(s2, j)] * ndu[(rkj, pk as usize)];
                }
                if r <= pk {
                    a[(s2, k as usize)] = -a[(s1, (k - 1) as usize)] / ndu[((pk + 1) as usize, r as usize)];
                    d += a[(s2, k as usize)] * ndu[(r as usize, pk as usize)];
                }
                ders[(k as usize, r as usize)] = d;
                std::mem::swap(&mut s1, &mut s2);
            }
        }

        let mut factor = real_from_usize::<T>(p);
        for k in 1..=nd {
            for j in 0..=p {
                ders[(k, j)] *= factor;
            }
            factor *= real_from_usize::<T>(p - k);
        }

        ders
    }
}

/// A tensor-product B-spline basis.
///
/// Basis functions and elements are numbered with the first parametric direction running
/// fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBSplineBasis<T, const D: usize> {
    knots: [KnotVector<T>; D],
    spans: [Vec<usize>; D],
}

impl<T: Real, const D: usize> TensorBSplineBasis<T, D> {
    pub fn new(knots: [KnotVector<T>; D]) -> Self {
        let spans = array::from_fn(|d| knots[d].element_spans());
        Self { knots, spans }
    }

    /// Open uniform knot vectors on `[0, 1]` in every direction.
    pub fn open_uniform(orders: [usize; D], num_elements: [usize; D]) -> Result<Self, SplineError> {
        let mut knots = Vec::with_capacity(D);
        for d in 0..D {
            knots.push(KnotVector::open_uniform(orders[d], num_elements[d], T::zero(), T::one())?);
        }
        let knots: [KnotVector<T>; D] = knots
            .try_into()
            .map_err(|_| SplineError::InvalidKnotVector("dimension mismatch".to_string()))?;
        Ok(Self::new(knots))
    }

    pub fn knot_vector(&self, direction: usize) -> &KnotVector<T> {
        &self.knots[direction]
    }

    /// Greville parameters of the univariate basis in the given direction.
    pub fn greville_parameters(&self, direction: usize) -> Vec<T> {
        let knots = &self.knots[direction];
        (0..knots.num_basis_functions())
            .map(|i| knots.greville(i))
            .collect()
    }

    fn num_functions_per_dim(&self) -> [usize; D] {
        array::from_fn(|d| self.knots[d].num_basis_functions())
    }

    fn num_elements_per_dim(&self) -> [usize; D] {
        array::from_fn(|d| self.spans[d].len())
    }

    fn element_multi_index(&self, element: usize) -> [usize; D] {
        unravel(element, &self.num_elements_per_dim())
    }

    fn basis_multi_index(&self, basis_function: usize) -> [usize; D] {
        unravel(basis_function, &self.num_functions_per_dim())
    }

    fn element_spans(&self, element: usize) -> [usize; D] {
        let index = self.element_multi_index(element);
        array::from_fn(|d| self.spans[d][index[d]])
    }

    /// Face bookkeeping for the given face of the patch.
    ///
    /// Face nodes are the basis functions that do not vanish identically on the face, numbered
    /// in increasing global index.
    pub fn face_topology(&self, face: Face) -> FaceTopology {
        let axis = face.axis;
        let knots = &self.knots[axis];
        let (u, span_position) = if face.at_end {
            (knots.end(), self.spans[axis].len() - 1)
        } else {
            (knots.start(), 0)
        };
        let span = self.spans[axis][span_position];
        let values = knots.basis_derivatives(span, u, 0);
        let p = knots.degree();
        let nonzero_on_face: Vec<usize> = (0..=p)
            .filter(|&j| values[(0, j)] != T::zero())
            .map(|j| span - p + j)
            .collect();

        let elements: Vec<usize> = (0..self.num_elements())
            .filter(|&e| self.element_multi_index(e)[axis] == span_position)
            .collect();

        let mut nodes: Vec<usize> = (0..self.num_basis_functions())
            .filter(|&i| nonzero_on_face.contains(&self.basis_multi_index(i)[axis]))
            .collect();
        nodes.sort_unstable();

        let element_nodes = elements
            .iter()
            .map(|&e| {
                self.element_basis_functions(e)
                    .into_iter()
                    .map(|i| nodes.binary_search(&i).ok())
                    .collect()
            })
            .collect();

        FaceTopology {
            face,
            elements,
            nodes,
            element_nodes,
        }
    }
}

fn unravel<const D: usize>(mut index: usize, dims: &[usize; D]) -> [usize; D] {
    let mut multi = [0; D];
    for d in 0..D {
        multi[d] = index % dims[d];
        index /= dims[d];
    }
    multi
}

fn ravel<const D: usize>(multi: &[usize; D], dims: &[usize; D]) -> usize {
    let mut index = 0;
    for d in (0..D).rev() {
        index = index * dims[d] + multi[d];
    }
    index
}

impl<T: Real, const D: usize> SplineBasis<T, D> for TensorBSplineBasis<T, D> {
    fn num_basis_functions(&self) -> usize {
        self.num_functions_per_dim().iter().product()
    }

    fn num_elements(&self) -> usize {
        self.num_elements_per_dim().iter().product()
    }

    fn order(&self, direction: usize) -> usize {
        self.knots[direction].order()
    }

    fn is_reentrant(&self) -> bool {
        true
    }

    fn parametric_domain(&self) -> ParametricBox<T, D> {
        ParametricBox {
            lower: array::from_fn(|d| self.knots[d].start()),
            upper: array::from_fn(|d| self.knots[d].end()),
        }
    }

    fn element_domain(&self, element: usize) -> ParametricBox<T, D> {
        let spans = self.element_spans(element);
        ParametricBox {
            lower: array::from_fn(|d| self.knots[d].knots()[spans[d]]),
            upper: array::from_fn(|d| self.knots[d].knots()[spans[d] + 1]),
        }
    }

    fn find_element(&self, xi: &Point<T, D>) -> Option<usize> {
        let mut multi = [0; D];
        for d in 0..D {
            let span = self.knots[d].find_span(xi[d])?;
            multi[d] = self.spans[d].binary_search(&span).ok()?;
        }
        Some(ravel(&multi, &self.num_elements_per_dim()))
    }

    fn element_basis_functions(&self, element: usize) -> Vec<usize> {
        let spans = self.element_spans(element);
        let orders: [usize; D] = array::from_fn(|d| self.order(d));
        let dims = self.num_functions_per_dim();
        let num_local: usize = orders.iter().product();
        (0..num_local)
            .map(|local| {
                let l = unravel(local, &orders);
                let multi = array::from_fn(|d| spans[d] + l[d] + 1 - orders[d]);
                ravel(&multi, &dims)
            })
            .collect()
    }

    fn evaluate(&self, element: usize, xi: &Point<T, D>, derivatives: usize, output: &mut BasisValues<T>) {
        let spans = self.element_spans(element);
        let orders: [usize; D] = array::from_fn(|d| self.order(d));
        let univariate: Vec<DMatrix<T>> = (0..D)
            .map(|d| self.knots[d].basis_derivatives(spans[d], xi[d], derivatives))
            .collect();

        let num_local: usize = orders.iter().product();
        output.resize(D, num_local);

        for local in 0..num_local {
            let l = unravel(local, &orders);
            let product = |derivative_orders: [usize; D]| {
                (0..D).fold(T::one(), |acc, d| acc * univariate[d][(derivative_orders[d], l[d])])
            };

            output.values[local] = product([0; D]);
            if derivatives >= 1 {
                for a in 0..D {
                    let mut k = [0; D];
                    k[a] += 1;
                    output.gradients[(a, local)] = product(k);
                }
            }
            if derivatives >= 2 {
                for a in 0..D {
                    for b in 0..D {
                        let mut k = [0; D];
                        k[a] += 1;
                        k[b] += 1;
                        output.hessians[(a * D + b, local)] = product(k);
                    }
                }
            }
        }
    }

    fn greville_point(&self, basis_function: usize) -> Point<T, D> {
        let multi = self.basis_multi_index(basis_function);
        Point::from(array::from_fn(|d| self.knots[d].greville(multi[d])))
    }

    fn direct_support(&self, basis_function: usize) -> Vec<usize> {
        let multi = self.basis_multi_index(basis_function);
        // Per direction, the positions of the element spans inside [i, i + order)
        let ranges: Vec<Vec<usize>> = (0..D)
            .map(|d| {
                let (first, last) = (multi[d], multi[d] + self.order(d) - 1);
                self.spans[d]
                    .iter()
                    .enumerate()
                    .filter(|(_, &span)| span >= first && span <= last)
                    .map(|(position, _)| position)
                    .collect()
            })
            .collect();

        let element_dims = self.num_elements_per_dim();
        let mut elements: Vec<usize> = ranges
            .iter()
            .map(|positions| positions.iter().copied())
            .multi_cartesian_product()
            .map(|positions| ravel(&array::from_fn(|d| positions[d]), &element_dims))
            .collect();
        elements.sort_unstable();
        elements
    }
}
