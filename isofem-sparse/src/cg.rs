use crate::{check_dimensions, LinearSystemSolver, SolveError};
use isofem_traits::Real;
use log::debug;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;

/// Relative residual tolerance `||r|| <= tol * ||b||`.
///
/// Note that we use the *approximate* residual given by Conjugate-Gradient. For ill-conditioned
/// problems, it is possible that CG's residual converges, but the real residual does not.
#[derive(Debug, Clone, Copy)]
pub struct RelativeResidualCriterion<T> {
    pub tol: T,
}

impl<T: Real> RelativeResidualCriterion<T> {
    pub fn new(tol: T) -> Self {
        Self { tol }
    }

    fn has_converged(&self, b_norm: T, approx_residual: &DVector<T>) -> bool {
        approx_residual.norm() <= self.tol * b_norm
    }
}

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
struct CgWorkspace<T: Real> {
    r: DVector<T>,
    z: DVector<T>,
    p: DVector<T>,
    Ap: DVector<T>,
}

impl<T: Real> CgWorkspace<T> {
    fn new(dim: usize) -> Self {
        Self {
            r: DVector::zeros(dim),
            z: DVector::zeros(dim),
            p: DVector::zeros(dim),
            Ap: DVector::zeros(dim),
        }
    }
}

/// Jacobi-preconditioned Conjugate Gradient for symmetric positive definite systems.
///
/// Each right-hand side column is solved independently, starting from a zero initial guess.
#[derive(Debug, Clone, Copy)]
pub struct ConjugateGradientSolver<T> {
    criterion: RelativeResidualCriterion<T>,
    max_iter: Option<usize>,
}

impl<T: Real> ConjugateGradientSolver<T> {
    pub fn new(tol: T) -> Self {
        Self {
            criterion: RelativeResidualCriterion::new(tol),
            max_iter: None,
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }

    /// Solves `A x = b` for a single column, returning the number of iterations.
    #[allow(non_snake_case)]
    pub fn solve_column(
        &self,
        a: &CsrMatrix<T>,
        inverse_diagonal: &DVector<T>,
        b: DVectorView<T>,
        mut x: DVectorViewMut<T>,
    ) -> Result<usize, SolveError> {
        let mut workspace = CgWorkspace::new(b.len());
        let CgWorkspace { r, z, p, Ap } = &mut workspace;

        x.fill(T::zero());
        let b_norm = b.norm();
        if b_norm == T::zero() {
            return Ok(0);
        }

        // r = b - Ax = b, since x = 0
        r.copy_from(&b);
        // z = Pr
        z.copy_from(r);
        z.component_mul_assign(inverse_diagonal);
        p.copy_from(z);

        let mut zTr = z.dot(r);
        let mut num_iterations = 0;

        while !self.criterion.has_converged(b_norm, r) {
            if let Some(max_iter) = self.max_iter {
                if num_iterations >= max_iter {
                    return Err(SolveError::MaxIterationsReached { max_iter });
                }
            }

            // Ap = A * p
            spmm_csr_dense(T::zero(), &mut *Ap, T::one(), Op::NoOp(a), Op::NoOp(&*p));
            let pAp = p.dot(Ap);

            if pAp <= T::zero() || zTr <= T::zero() {
                return Err(SolveError::IndefiniteOperator);
            }

            let alpha = zTr / pAp;
            x.zip_apply(&*p, |x_i, p_i| *x_i += alpha * p_i);
            r.zip_apply(&*Ap, |r_i, Ap_i| *r_i -= alpha * Ap_i);
            num_iterations += 1;

            z.copy_from(r);
            z.component_mul_assign(inverse_diagonal);
            let zTr_next = z.dot(r);
            let beta = zTr_next / zTr;

            // p <- z + beta * p
            p.zip_apply(&*z, |p_i, z_i| *p_i = z_i + beta * *p_i);

            zTr = zTr_next;
        }

        Ok(num_iterations)
    }
}

impl<T: Real> LinearSystemSolver<T> for ConjugateGradientSolver<T> {
    fn solve(&self, matrix: &CsrMatrix<T>, rhs: &mut DMatrix<T>) -> Result<(), SolveError> {
        check_dimensions(matrix, rhs)?;

        let mut inverse_diagonal = DVector::zeros(matrix.nrows());
        for (i, row) in matrix.row_iter().enumerate() {
            let diagonal = row.get_entry(i).map(|entry| entry.into_value()).unwrap_or(T::zero());
            if diagonal <= T::zero() {
                return Err(SolveError::IndefiniteOperator);
            }
            inverse_diagonal[i] = T::one() / diagonal;
        }

        for j in 0..rhs.ncols() {
            let b = rhs.column(j).clone_owned();
            let iterations = self.solve_column(matrix, &inverse_diagonal, DVectorView::from(&b), rhs.column_mut(j))?;
            debug!("CG converged in {} iterations for column {}", iterations, j);
        }
        Ok(())
    }
}
