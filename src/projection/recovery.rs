use crate::assembly::map_elements;
use crate::field::{SampledField, SecondaryField, SplineField};
use crate::projection::{FieldProjector, ProjectionError};
use crate::quadrature::element_quadrature;
use crate::spline::{BasisValues, SplineBasis};
use crate::Real;
use isofem_sparse::{solve_dense_in_place, SolveError};
use log::{debug, trace};
use nalgebra::{DMatrix, DVector, DVectorView, Point, SVector};

/// The small least-squares system `A c = B` fitting a local polynomial around one basis function.
///
/// `a` is the `npol x npol` Gram matrix of the monomials over all sample points and `b` holds
/// one column per field component.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFit<T: Real> {
    pub a: DMatrix<T>,
    pub b: DMatrix<T>,
    num_samples: usize,
}

impl<T: Real> LocalFit<T> {
    pub fn new(num_monomials: usize, num_components: usize) -> Self {
        Self {
            a: DMatrix::zeros(num_monomials, num_monomials),
            b: DMatrix::zeros(num_monomials, num_components),
            num_samples: 0,
        }
    }

    /// Accumulates `A += P Pᵀ` and `B += P sᵀ` for monomial values `P` and field value `s`.
    pub fn add_sample(&mut self, monomials: &DVector<T>, value: DVectorView<T>) {
        self.a.ger(T::one(), monomials, monomials, T::one());
        self.b.ger(T::one(), monomials, &value, T::one());
        self.num_samples += 1;
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn num_monomials(&self) -> usize {
        self.a.nrows()
    }

    /// Numerical rank of the Gram matrix, counting singular values above `tolerance`.
    pub fn rank(&self, tolerance: T) -> usize {
        self.a.clone().svd(false, false).rank(tolerance)
    }

    /// Solves for the polynomial coefficients, one column per component.
    pub fn solve(self) -> Result<DMatrix<T>, SolveError> {
        let mut coefficients = self.b;
        solve_dense_in_place(self.a, &mut coefficients)?;
        Ok(coefficients)
    }
}

/// Evaluates the tensor-product monomials `Π_d x_d^{k_d}` with `0 <= k_d < counts[d]`.
///
/// The exponent of the first direction runs fastest.
pub fn evaluate_monomials<T: Real, const D: usize>(x: &SVector<T, D>, counts: &[usize; D]) -> DVector<T> {
    let total: usize = counts.iter().product();
    let mut monomials = DVector::zeros(total);
    for (linear, monomial) in monomials.iter_mut().enumerate() {
        let mut remainder = linear;
        let mut value = T::one();
        for d in 0..D {
            let exponent = remainder % counts[d];
            remainder /= counts[d];
            for _ in 0..exponent {
                value *= x[d];
            }
        }
        *monomial = value;
    }
    monomials
}

/// Physical sample points and field values on one element.
struct ElementSamples<T: Real, const D: usize> {
    physical: Vec<Point<T, D>>,
    values: DMatrix<T>,
}

/// Per-direction sample point counts and monomial counts for recovery.
struct RecoveryLayout<const D: usize> {
    num_points: [usize; D],
    num_monomials: [usize; D],
}

impl<'a, T, B, const D: usize> FieldProjector<'a, T, B, D>
where
    T: Real,
    B: SplineBasis<T, D> + Clone + Sync,
{
    fn recovery_layout<F>(&self, field: &F) -> Result<RecoveryLayout<D>, ProjectionError>
    where
        F: SecondaryField<T, D> + ?Sized,
    {
        let basis = self.patch.basis();
        let m = field.derivative_order();
        let mut num_points = [0; D];
        let mut num_monomials = [0; D];
        for d in 0..D {
            let order = basis.order(d);
            if order <= m {
                return Err(ProjectionError::DerivativeOrderTooHigh {
                    order,
                    derivative_order: m,
                });
            }
            num_points[d] = order - m;
            num_monomials[d] = order - m + 1;
        }
        Ok(RecoveryLayout {
            num_points,
            num_monomials,
        })
    }

    fn sample_element<F>(&self, field: &F, element: usize, num_points: [usize; D]) -> Result<ElementSamples<T, D>, ProjectionError>
    where
        F: SecondaryField<T, D> + ?Sized,
    {
        let basis = self.patch.basis();
        let domain = basis.element_domain(element);
        let rule = element_quadrature(self.quadrature, &domain, num_points, [None; D])?;
        let nodes = basis.element_basis_functions(element);

        let mut basis_values = BasisValues::default();
        let physical: Vec<_> = rule
            .points
            .iter()
            .map(|xi| {
                self.lock.evaluate(basis, element, xi, 0, &mut basis_values);
                self.patch.map_with(&nodes, &basis_values)
            })
            .collect();

        let values = self
            .lock
            .run(field.is_reentrant(), || field.evaluate(element, &rule.points, &physical))
            .map_err(ProjectionError::Evaluation)?;
        if values.shape() != (field.num_components(), physical.len()) {
            return Err(ProjectionError::ValueShapeMismatch {
                points: physical.len(),
                columns: values.ncols(),
            });
        }
        Ok(ElementSamples { physical, values })
    }

    fn fit_from_samples(
        &self,
        basis_function: usize,
        samples: &[&ElementSamples<T, D>],
        layout: &RecoveryLayout<D>,
        num_components: usize,
    ) -> Result<LocalFit<T>, ProjectionError> {
        let basis = self.patch.basis();
        let center = self.physical_point(&basis.greville_point(basis_function))?;
        let num_monomials = layout.num_monomials.iter().product();
        let mut fit = LocalFit::new(num_monomials, num_components);
        for element_samples in samples {
            for (j, x) in element_samples.physical.iter().enumerate() {
                let monomials = evaluate_monomials(&(x.coords - center.coords), &layout.num_monomials);
                fit.add_sample(&monomials, element_samples.values.column(j));
            }
        }
        Ok(fit)
    }

    /// Assembles the local polynomial fit of a basis function over the given elements.
    ///
    /// Recovery always uses the extended support as element set. Other element sets, such as
    /// the direct support, can be inspected through this method.
    pub fn local_fit<F>(&self, field: &F, basis_function: usize, elements: &[usize]) -> Result<LocalFit<T>, ProjectionError>
    where
        F: SecondaryField<T, D> + ?Sized,
    {
        let layout = self.recovery_layout(field)?;
        let samples = elements
            .iter()
            .map(|&element| self.sample_element(field, element, layout.num_points))
            .collect::<Result<Vec<_>, _>>()?;
        let samples: Vec<_> = samples.iter().collect();
        self.fit_from_samples(basis_function, &samples, &layout, field.num_components())
    }

    /// Recovers one value per basis function at its Greville point by superconvergent
    /// patch recovery.
    ///
    /// For a field depending on derivatives of order `m`, a polynomial with `order - m + 1`
    /// monomials per direction, centred at the physical image `G` of the Greville point, is fitted
    /// in the least-squares sense to field samples at `order - m` Gauss points per direction in
    /// every element of the *extended* support. The recovered value is the constant coefficient,
    /// i.e. the fit evaluated at `G`.
    pub fn recover_nodal_values<F>(&self, field: &F) -> Result<SampledField<T, D>, ProjectionError>
    where
        F: SecondaryField<T, D> + ?Sized,
    {
        let basis = self.patch.basis();
        if basis.is_rational() {
            return Err(ProjectionError::RationalBasis);
        }
        let layout = self.recovery_layout(field)?;
        let num_components = field.num_components();
        let parallel = self.settings.parallel;

        let elements: Vec<usize> = (0..basis.num_elements()).collect();
        let samples = map_elements(&elements, parallel, |&element| {
            self.sample_element(field, element, layout.num_points)
        })?;

        let basis_functions: Vec<usize> = (0..basis.num_basis_functions()).collect();
        let recovered = map_elements(&basis_functions, parallel, |&i| {
            // TODO: Only extend the support when the direct support gives too few samples
            // for a well-posed fit, once this has been validated for repeated knots.
            let support = basis.support_elements(i, true);
            let support_samples: Vec<_> = support.iter().map(|&e| &samples[e]).collect();
            let fit = self.fit_from_samples(i, &support_samples, &layout, num_components)?;
            trace!(
                "Local fit for basis function {}: {} elements, {} samples, {} monomials",
                i,
                support.len(),
                fit.num_samples(),
                fit.num_monomials()
            );
            let coefficients = fit
                .solve()
                .map_err(|_| ProjectionError::SingularLocalSystem { basis_function: i })?;
            Ok::<_, ProjectionError>(coefficients.row(0).transpose())
        })?;

        let mut values = DMatrix::zeros(num_components, basis_functions.len());
        for (i, value) in recovered.iter().enumerate() {
            values.set_column(i, value);
        }
        debug!("Recovered {} nodal values by patch recovery", basis_functions.len());

        let greville = basis_functions.iter().map(|&i| basis.greville_point(i)).collect();
        SampledField::try_new(greville, values)
    }

    /// Superconvergent patch recovery of a secondary field onto the patch basis.
    ///
    /// The recovered Greville values are turned into control point values by
    /// [regular interpolation](Self::regular_interpolation). Any singular local fit aborts the
    /// whole recovery.
    pub fn sc_recovery<F>(&self, field: &F) -> Result<SplineField<T, B, D>, ProjectionError>
    where
        F: SecondaryField<T, D> + ?Sized,
    {
        let nodal_values = self.recover_nodal_values(field)?;
        self.regular_interpolation(&nodal_values)
    }
}
