use crate::{check_dimensions, LinearSystemSolver, SolveError};
use isofem_traits::Real;
use nalgebra::DMatrix;
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};

/// Sparse direct solver for symmetric positive definite systems such as Gram matrices.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparseCholeskySolver;

impl<T: Real> LinearSystemSolver<T> for SparseCholeskySolver {
    fn solve(&self, matrix: &CsrMatrix<T>, rhs: &mut DMatrix<T>) -> Result<(), SolveError> {
        check_dimensions(matrix, rhs)?;
        if matrix.nrows() == 0 {
            return Ok(());
        }
        let csc = CscMatrix::from(matrix);
        let factorization = CscCholesky::factor(&csc).map_err(|_| SolveError::NotPositiveDefinite)?;
        factorization.solve_mut(&mut *rhs);
        if rhs.iter().any(|x| !x.is_finite()) {
            return Err(SolveError::NonFinite);
        }
        Ok(())
    }
}
