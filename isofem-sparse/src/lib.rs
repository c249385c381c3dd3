//! Linear system solvers used by `isofem`.
//!
//! All solvers implement [`LinearSystemSolver`], which solves `A X = B` in place for a sparse
//! system matrix and a dense right-hand side with one column per field component.

use isofem_traits::Real;
use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

mod cg;
mod cholesky;
mod dense;

pub use cg::*;
pub use cholesky::*;
pub use dense::*;

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SolveError {
    /// The system matrix is not square or does not match the right-hand side.
    DimensionMismatch {
        rows: usize,
        cols: usize,
        rhs_rows: usize,
    },
    /// The system matrix is (numerically) singular.
    Singular,
    /// The Cholesky factorization failed.
    NotPositiveDefinite,
    /// The operator was found to be indefinite during an iterative solve.
    IndefiniteOperator,
    /// An iterative solve failed to converge.
    MaxIterationsReached { max_iter: usize },
    /// The solution contains non-finite entries.
    NonFinite,
}

impl Display for SolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { rows, cols, rhs_rows } => write!(
                f,
                "Cannot solve system with {}x{} matrix and right-hand side with {} rows",
                rows, cols, rhs_rows
            ),
            Self::Singular => write!(f, "System matrix is singular"),
            Self::NotPositiveDefinite => write!(f, "System matrix is not positive definite"),
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite"),
            Self::MaxIterationsReached { max_iter } => {
                write!(f, "Max iterations ({}) reached.", max_iter)
            }
            Self::NonFinite => write!(f, "Solution contains non-finite values"),
        }
    }
}

impl Error for SolveError {}

/// Solves `A X = B` in place, overwriting `B` with `X`.
pub trait LinearSystemSolver<T: Real>: Send + Sync {
    fn solve(&self, matrix: &CsrMatrix<T>, rhs: &mut DMatrix<T>) -> Result<(), SolveError>;
}

impl<'a, T, S> LinearSystemSolver<T> for &'a S
where
    T: Real,
    S: ?Sized + LinearSystemSolver<T>,
{
    fn solve(&self, matrix: &CsrMatrix<T>, rhs: &mut DMatrix<T>) -> Result<(), SolveError> {
        <S as LinearSystemSolver<T>>::solve(self, matrix, rhs)
    }
}

impl<T: Real> LinearSystemSolver<T> for Box<dyn LinearSystemSolver<T>> {
    fn solve(&self, matrix: &CsrMatrix<T>, rhs: &mut DMatrix<T>) -> Result<(), SolveError> {
        self.as_ref().solve(matrix, rhs)
    }
}

fn check_dimensions<T>(matrix: &CsrMatrix<T>, rhs: &DMatrix<T>) -> Result<(), SolveError> {
    if matrix.nrows() != matrix.ncols() || matrix.nrows() != rhs.nrows() {
        Err(SolveError::DimensionMismatch {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            rhs_rows: rhs.nrows(),
        })
    } else {
        Ok(())
    }
}
