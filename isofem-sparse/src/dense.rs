use crate::{check_dimensions, LinearSystemSolver, SolveError};
use isofem_traits::{real_from_usize, Real};
use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;

/// Solves a small dense system `A X = B` in place by LU factorization with partial pivoting.
///
/// The system is reported singular if any pivot is negligible relative to the largest pivot.
pub fn solve_dense_in_place<T: Real>(matrix: DMatrix<T>, rhs: &mut DMatrix<T>) -> Result<(), SolveError> {
    let n = matrix.nrows();
    if !matrix.is_square() || n != rhs.nrows() {
        return Err(SolveError::DimensionMismatch {
            rows: n,
            cols: matrix.ncols(),
            rhs_rows: rhs.nrows(),
        });
    }
    if n == 0 {
        return Ok(());
    }

    let lu = matrix.lu();
    let pivots = lu.u().diagonal();
    let max_pivot = pivots.iter().fold(T::zero(), |max, p| max.max(p.abs()));
    let tolerance = max_pivot * T::default_epsilon() * real_from_usize::<T>(n);
    if max_pivot == T::zero() || pivots.iter().any(|p| p.abs() <= tolerance) {
        return Err(SolveError::Singular);
    }

    if !lu.solve_mut(rhs) {
        return Err(SolveError::Singular);
    }
    if rhs.iter().any(|x| !x.is_finite()) {
        return Err(SolveError::NonFinite);
    }
    Ok(())
}

/// Direct solver that densifies the system matrix and factorizes it with LU.
///
/// Suitable for the small, possibly unsymmetric systems arising from spline interpolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseLuSolver;

impl<T: Real> LinearSystemSolver<T> for DenseLuSolver {
    fn solve(&self, matrix: &CsrMatrix<T>, rhs: &mut DMatrix<T>) -> Result<(), SolveError> {
        check_dimensions(matrix, rhs)?;
        solve_dense_in_place(DMatrix::from(matrix), rhs)
    }
}
