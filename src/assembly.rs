//! Element loops and accumulation of global projection systems.

use crate::spline::{BasisValues, SplineBasis};
use crate::Real;
use isofem_sparse::{LinearSystemSolver, SolveError};
use nalgebra::{DMatrix, Point};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use parking_lot::Mutex;
use rayon::prelude::*;

/// Serializes basis evaluations for bases that are not reentrant.
///
/// Reentrant bases are evaluated without taking the lock.
#[derive(Debug, Default)]
pub struct EvaluationLock {
    lock: Mutex<()>,
}

impl EvaluationLock {
    pub fn evaluate<T, B, const D: usize>(
        &self,
        basis: &B,
        element: usize,
        xi: &Point<T, D>,
        derivatives: usize,
        output: &mut BasisValues<T>,
    ) where
        T: Real,
        B: SplineBasis<T, D>,
    {
        self.run(basis.is_reentrant(), || basis.evaluate(element, xi, derivatives, output))
    }

    /// Runs `f` inside the critical section unless `reentrant` is set.
    ///
    /// `f` must not call back into this lock.
    pub fn run<R>(&self, reentrant: bool, f: impl FnOnce() -> R) -> R {
        if reentrant {
            f()
        } else {
            let _guard = self.lock.lock();
            f()
        }
    }
}

/// Applies `f` to each item, in parallel when requested, collecting results in input order.
///
/// The first error encountered aborts the loop.
pub fn map_elements<I, R, E, F>(items: &[I], parallel: bool, f: F) -> Result<Vec<R>, E>
where
    I: Sync,
    R: Send,
    E: Send,
    F: Fn(&I) -> Result<R, E> + Sync + Send,
{
    if parallel {
        items.par_iter().map(|item| f(item)).collect()
    } else {
        items.iter().map(|item| f(item)).collect()
    }
}

/// A local contribution to a global projection system.
///
/// `nodes[i]` is the global row/column of local row `i`, or `None` for rows that are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementContribution<T: Real> {
    pub nodes: Vec<Option<usize>>,
    pub matrix: DMatrix<T>,
    pub rhs: DMatrix<T>,
}

/// A global Gram-type system `A X = B` keyed by basis function index.
///
/// `B` has one column per field component.
#[derive(Debug, Clone)]
pub struct GlobalProjectionSystem<T: Real> {
    matrix: CooMatrix<T>,
    rhs: DMatrix<T>,
}

impl<T: Real> GlobalProjectionSystem<T> {
    pub fn new(num_nodes: usize, num_components: usize) -> Self {
        Self {
            matrix: CooMatrix::new(num_nodes, num_nodes),
            rhs: DMatrix::zeros(num_nodes, num_components),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.rhs.nrows()
    }

    pub fn add_element_contribution(&mut self, contribution: &ElementContribution<T>) {
        let nodes = &contribution.nodes;
        for (i_local, i_global) in nodes.iter().enumerate() {
            let Some(i_global) = *i_global else { continue };
            for (j_local, j_global) in nodes.iter().enumerate() {
                if let Some(j_global) = *j_global {
                    self.matrix
                        .push(i_global, j_global, contribution.matrix[(i_local, j_local)]);
                }
            }
            for k in 0..self.rhs.ncols() {
                self.rhs[(i_global, k)] += contribution.rhs[(i_local, k)];
            }
        }
    }

    pub fn matrix(&self) -> CsrMatrix<T> {
        CsrMatrix::from(&self.matrix)
    }

    pub fn rhs(&self) -> &DMatrix<T> {
        &self.rhs
    }

    /// Solves the system, returning the `nnodes x ncomponents` solution.
    pub fn solve(self, solver: &dyn LinearSystemSolver<T>) -> Result<DMatrix<T>, SolveError> {
        let matrix = CsrMatrix::from(&self.matrix);
        let mut solution = self.rhs;
        solver.solve(&matrix, &mut solution)?;
        Ok(solution)
    }
}
