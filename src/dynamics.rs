//! Newmark and generalized-alpha time integration of second-order dynamic systems.
//!
//! The semi-discrete equation of motion
//!
//! $$ M a + C v + F_{\mathrm{int}}(u) = F_{\mathrm{ext}}, \qquad C = \alpha_1 M + \alpha_2 K $$
//!
//! is integrated by a predictor-corrector scheme with displacement increments as primary
//! unknowns. The model providing `M`, `K` and the force residual is reached through
//! [`DynamicModel`].

use crate::time::TimeStep;
use crate::Real;
use isofem_sparse::SolveError;
use nalgebra::DVector;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

mod driver;
mod matrices;
mod parameters;

pub use driver::*;
pub use matrices::*;
pub use parameters::*;

/// A spatially discretized dynamic problem.
pub trait DynamicModel<T: Real> {
    fn num_dofs(&self) -> usize;

    /// The minimum number of solution vectors the model needs.
    fn num_solutions(&self) -> usize {
        3
    }

    /// Receives an integration parameter from the time integrator.
    ///
    /// Index 0 is the mass-proportional damping `alpha1`, index 1 the stiffness-proportional
    /// damping `alpha2` and index 2 the numerical dissipation `0.5 - gamma`.
    fn set_integration_parameter(&mut self, _index: usize, _value: T) {}

    /// Assembles the mass and stiffness matrices and the force residual `F_ext - F_int` for the
    /// current solution state. `solution` ends with displacement, velocity and acceleration.
    fn assemble(&mut self, time_step: &TimeStep<T>, solution: &[DVector<T>]) -> eyre::Result<NewmarkMatrices<T>>;

    /// Pushes a new displacement into the model state.
    fn update_configuration(&mut self, displacement: &DVector<T>) -> eyre::Result<()>;

    fn save_model(&mut self) -> eyre::Result<()> {
        Ok(())
    }

    fn save_step(&mut self, _time_step: &TimeStep<T>, _solution: &[DVector<T>]) -> eyre::Result<()> {
        Ok(())
    }
}

/// The phase of the current time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Initialized,
    Predicted,
    Corrected,
}

#[derive(Debug)]
#[non_exhaustive]
pub enum StepError {
    /// Fewer than three solution levels are available.
    InsufficientHistory { levels: usize },
    /// The operation is not valid in the current phase of the step.
    InvalidPhase { phase: StepPhase },
    /// A vector does not match the number of degrees of freedom.
    DimensionMismatch { expected: usize, actual: usize },
    /// No system has been assembled for the current step.
    NotAssembled,
    /// The Newton iterations did not converge.
    Diverged { iterations: usize },
    Solve(SolveError),
    /// The model failed to assemble or to accept a new configuration.
    Model(eyre::Report),
}

impl Display for StepError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientHistory { levels } => {
                write!(f, "Predictor-corrector requires 3 solution levels, have {}", levels)
            }
            Self::InvalidPhase { phase } => write!(f, "Operation not allowed in phase {:?}", phase),
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "Expected vector of length {}, got {}", expected, actual)
            }
            Self::NotAssembled => write!(f, "No system has been assembled"),
            Self::Diverged { iterations } => {
                write!(f, "Failed to converge within {} iterations", iterations)
            }
            Self::Solve(err) => write!(f, "Failed to solve Newton system: {}", err),
            Self::Model(err) => write!(f, "Model error: {}", err),
        }
    }
}

impl Error for StepError {}

impl From<SolveError> for StepError {
    fn from(err: SolveError) -> Self {
        Self::Solve(err)
    }
}
