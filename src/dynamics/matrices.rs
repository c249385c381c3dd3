use crate::dynamics::NewmarkParameters;
use crate::Real;
use nalgebra::DVector;
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// `y = A x` for a sparse matrix and a dense vector.
pub(crate) fn csr_mul_vector<T: Real>(a: &CsrMatrix<T>, x: &DVector<T>) -> DVector<T> {
    let mut y = DVector::zeros(a.nrows());
    spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(a), Op::NoOp(x));
    y
}

/// The system quantities assembled by a dynamic model for the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct NewmarkMatrices<T: Real> {
    pub mass: CsrMatrix<T>,
    pub stiffness: CsrMatrix<T>,
    /// The force residual `F_ext - F_int`.
    pub force: DVector<T>,
}

impl<T: Real> NewmarkMatrices<T> {
    pub fn new(mass: CsrMatrix<T>, stiffness: CsrMatrix<T>, force: DVector<T>) -> Self {
        Self { mass, stiffness, force }
    }

    pub fn num_dofs(&self) -> usize {
        self.force.len()
    }

    /// The Newton iteration matrix
    ///
    /// $$ N = (\alpha_m + \alpha_f \alpha_1 \gamma h) M + \alpha_f (\alpha_2 \gamma + \beta h) h K, $$
    ///
    /// divided by $\beta h^2$ when displacement increments are the unknowns.
    pub fn newton_matrix(&self, parameters: &NewmarkParameters<T>, dt: T) -> CsrMatrix<T> {
        let NewmarkParameters {
            alpha_m,
            alpha_f,
            beta,
            gamma,
            alpha1,
            alpha2,
            solve_displacement,
        } = *parameters;
        let h = dt;

        let mut mass_factor = alpha_m + alpha_f * alpha1 * gamma * h;
        let mut stiffness_factor = alpha_f * (alpha2 * gamma + beta * h) * h;
        if solve_displacement {
            let scale = T::one() / (beta * h * h);
            mass_factor *= scale;
            stiffness_factor *= scale;
        }

        let n = self.num_dofs();
        let mut coo = CooMatrix::new(n, n);
        for (i, j, &m_ij) in self.mass.triplet_iter() {
            coo.push(i, j, m_ij * mass_factor);
        }
        for (i, j, &k_ij) in self.stiffness.triplet_iter() {
            coo.push(i, j, k_ij * stiffness_factor);
        }
        CsrMatrix::from(&coo)
    }

    /// The effective residual `F - M a - alpha1 M v - alpha2 K v`.
    ///
    /// Damping terms are only included for positive coefficients.
    pub fn rhs_vector(&self, parameters: &NewmarkParameters<T>, velocity: &DVector<T>, acceleration: &DVector<T>) -> DVector<T> {
        let mut rhs = self.force.clone();
        rhs -= csr_mul_vector(&self.mass, acceleration);
        if parameters.alpha1 > T::zero() {
            rhs.axpy(-parameters.alpha1, &csr_mul_vector(&self.mass, velocity), T::one());
        }
        if parameters.alpha2 > T::zero() {
            rhs.axpy(-parameters.alpha2, &csr_mul_vector(&self.stiffness, velocity), T::one());
        }
        rhs
    }

    /// The inertia force `M a`.
    pub fn inertia_force(&self, acceleration: &DVector<T>) -> DVector<T> {
        csr_mul_vector(&self.mass, acceleration)
    }
}
