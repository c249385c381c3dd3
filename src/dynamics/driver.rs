use crate::dynamics::{DynamicModel, NewmarkMatrices, NewmarkParameters, StepError, StepPhase};
use crate::restart::{RestartError, SerializedState};
use crate::time::TimeStep;
use crate::{real, Real};
use isofem_sparse::{DenseLuSolver, LinearSystemSolver};
use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Convergence control of the Newton iterations within a time step.
///
/// A step has converged when the norm of the effective residual is at most
/// `max(absolute_tolerance, relative_tolerance * r0)`, with `r0` the norm of the predicted residual.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSettings<T> {
    pub max_iterations: usize,
    pub relative_tolerance: T,
    pub absolute_tolerance: T,
}

impl<T: Real> Default for IterationSettings<T> {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            relative_tolerance: real(1e-8),
            absolute_tolerance: real(1e-12),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StepReport<T> {
    /// Number of linear solves performed.
    pub iterations: usize,
    /// Norm of the effective residual at convergence.
    pub residual_norm: T,
}

const LEVELS_NAME: &str = "NewmarkDriver::levels";
const INERTIA_NAME: &str = "NewmarkDriver::inertia";

fn level_name(index: usize) -> String {
    format!("NewmarkDriver::solution{}", index)
}

/// Predictor-corrector driver for the Newmark family of time integrators.
///
/// The solution history holds the current displacement in level 0 and the velocity and
/// acceleration in the last two levels. Any levels in between hold older displacements.
pub struct NewmarkDriver<T: Real, M> {
    model: M,
    parameters: NewmarkParameters<T>,
    iteration: IterationSettings<T>,
    solver: Box<dyn LinearSystemSolver<T>>,
    solution: Vec<DVector<T>>,
    incremental_displacement: DVector<T>,
    predicted_velocity: DVector<T>,
    predicted_acceleration: DVector<T>,
    inertia_force: Option<DVector<T>>,
    system: Option<NewmarkMatrices<T>>,
    phase: StepPhase,
}

impl<T, M> NewmarkDriver<T, M>
where
    T: Real,
    M: DynamicModel<T>,
{
    pub fn new(model: M, parameters: NewmarkParameters<T>) -> Self {
        Self {
            model,
            parameters,
            iteration: IterationSettings::default(),
            solver: Box::new(DenseLuSolver),
            solution: Vec::new(),
            incremental_displacement: DVector::zeros(0),
            predicted_velocity: DVector::zeros(0),
            predicted_acceleration: DVector::zeros(0),
            inertia_force: None,
            system: None,
            phase: StepPhase::Initialized,
        }
    }

    pub fn with_solver(self, solver: impl LinearSystemSolver<T> + 'static) -> Self {
        Self {
            solver: Box::new(solver),
            ..self
        }
    }

    pub fn with_iteration_settings(self, iteration: IterationSettings<T>) -> Self {
        Self { iteration, ..self }
    }

    /// Allocates `max(history_depth, model.num_solutions())` zeroed solution levels and passes
    /// the damping and dissipation parameters on to the model.
    pub fn init(&mut self, history_depth: usize) {
        let NewmarkParameters {
            alpha1, alpha2, gamma, ..
        } = self.parameters;
        self.model.set_integration_parameter(0, alpha1);
        self.model.set_integration_parameter(1, alpha2);
        self.model.set_integration_parameter(2, real::<T>(0.5) - gamma);

        let n = self.model.num_dofs();
        let levels = history_depth.max(self.model.num_solutions());
        self.solution = vec![DVector::zeros(n); levels];
        self.incremental_displacement = DVector::zeros(n);
        self.predicted_velocity = DVector::zeros(n);
        self.predicted_acceleration = DVector::zeros(n);
        self.inertia_force = None;
        self.system = None;
        self.phase = StepPhase::Initialized;
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn parameters(&self) -> &NewmarkParameters<T> {
        &self.parameters
    }

    pub fn iteration_settings(&self) -> &IterationSettings<T> {
        &self.iteration
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn solution(&self) -> &[DVector<T>] {
        &self.solution
    }

    /// Mutable access to the solution levels, e.g. for prescribing initial conditions.
    pub fn solution_mut(&mut self) -> &mut [DVector<T>] {
        &mut self.solution
    }

    pub fn displacement(&self) -> Option<&DVector<T>> {
        self.solution.first()
    }

    pub fn velocity(&self) -> Option<&DVector<T>> {
        self.solution.len().checked_sub(2).map(|i| &self.solution[i])
    }

    pub fn acceleration(&self) -> Option<&DVector<T>> {
        self.solution.last()
    }

    /// The inertia force `M a` of the last converged step, if any.
    pub fn inertia_force(&self) -> Option<&DVector<T>> {
        self.inertia_force.as_ref()
    }

    /// The system assembled last within the current step.
    pub fn system(&self) -> Option<&NewmarkMatrices<T>> {
        self.system.as_ref()
    }

    fn check_history(&self) -> Result<(), StepError> {
        if self.solution.len() < 3 {
            Err(StepError::InsufficientHistory {
                levels: self.solution.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Shifts the displacement history by one level and optionally advances the clock.
    ///
    /// Returns `false` if the clock could not be advanced past the stop time.
    pub fn advance_step(&mut self, time_step: &mut TimeStep<T>, update_time: bool) -> bool {
        let levels = self.solution.len();
        if levels > 3 {
            for n in (1..=levels - 3).rev() {
                let (older, newer) = self.solution.split_at_mut(n);
                newer[0].copy_from(&older[n - 1]);
            }
        }
        self.system = None;
        self.phase = StepPhase::Initialized;

        if update_time {
            time_step.increment()
        } else {
            true
        }
    }

    /// Computes the predicted velocity and acceleration from the previous converged state,
    /// keeping the displacement fixed.
    pub fn predict_step(&mut self, time_step: &TimeStep<T>) -> Result<(), StepError> {
        self.check_history()?;
        if self.phase != StepPhase::Initialized {
            return Err(StepError::InvalidPhase { phase: self.phase });
        }

        let NewmarkParameters { beta, gamma, .. } = self.parameters;
        let dt = time_step.time.dt;
        let one = T::one();
        let half = real::<T>(0.5);
        let i_a = self.solution.len() - 1;
        let i_v = self.solution.len() - 2;

        let (v, a) = (&self.solution[i_v], &self.solution[i_a]);
        // Newmark relations at zero displacement increment, up to sign
        let mut velocity = v * (gamma / beta - one);
        velocity.axpy((half * gamma / beta - one) * dt, a, one);
        let mut acceleration = a * (half / beta - one);
        acceleration.axpy(one / (beta * dt), v, one);

        velocity.neg_mut();
        acceleration.neg_mut();
        self.solution[i_v].copy_from(&velocity);
        self.solution[i_a].copy_from(&acceleration);
        self.predicted_velocity = velocity;
        self.predicted_acceleration = acceleration;
        self.incremental_displacement.fill(T::zero());
        self.phase = StepPhase::Predicted;

        trace!("Predicted velocity: {}", self.predicted_velocity);
        trace!("Predicted acceleration: {}", self.predicted_acceleration);
        Ok(())
    }

    /// Applies a displacement increment and updates velocity and acceleration accordingly.
    ///
    /// On convergence the inertia force of the assembled system is stored for the effective
    /// residual of the next step. The new displacement is always pushed to the model.
    pub fn correct_step(
        &mut self,
        time_step: &TimeStep<T>,
        increment: &DVector<T>,
        converged: bool,
    ) -> Result<(), StepError> {
        self.check_history()?;
        if self.phase == StepPhase::Initialized {
            return Err(StepError::InvalidPhase { phase: self.phase });
        }
        let n = self.incremental_displacement.len();
        if increment.len() != n {
            return Err(StepError::DimensionMismatch {
                expected: n,
                actual: increment.len(),
            });
        }

        let NewmarkParameters { beta, gamma, .. } = self.parameters;
        let dt = time_step.time.dt;
        let one = T::one();
        let i_a = self.solution.len() - 1;
        let i_v = self.solution.len() - 2;

        self.incremental_displacement += increment;
        self.solution[0] += increment;

        let mut velocity = self.predicted_velocity.clone();
        velocity.axpy(gamma / (beta * dt), &self.incremental_displacement, one);
        let mut acceleration = self.predicted_acceleration.clone();
        acceleration.axpy(one / (beta * dt * dt), &self.incremental_displacement, one);
        self.solution[i_v] = velocity;
        self.solution[i_a] = acceleration;

        if converged {
            if let Some(system) = &self.system {
                self.inertia_force = Some(system.inertia_force(&self.solution[i_a]));
            }
        }
        self.phase = StepPhase::Corrected;

        self.model
            .update_configuration(&self.solution[0])
            .map_err(StepError::Model)
    }

    /// Asks the model for the system matrices of the current state.
    pub fn assemble(&mut self, time_step: &TimeStep<T>) -> Result<&NewmarkMatrices<T>, StepError> {
        let system = self
            .model
            .assemble(time_step, &self.solution)
            .map_err(StepError::Model)?;
        let n = self.incremental_displacement.len();
        for actual in [system.force.len(), system.mass.nrows(), system.stiffness.nrows()] {
            if actual != n {
                return Err(StepError::DimensionMismatch { expected: n, actual });
            }
        }
        Ok(&*self.system.insert(system))
    }

    /// The Newton matrix of the last assembled system.
    pub fn newton_matrix(&self, time_step: &TimeStep<T>) -> Result<CsrMatrix<T>, StepError> {
        let system = self.system.as_ref().ok_or(StepError::NotAssembled)?;
        Ok(system.newton_matrix(&self.parameters, time_step.time.dt))
    }

    /// The effective residual of the last assembled system.
    ///
    /// Includes the inertia force of the previous converged step scaled by `gamma - 0.5`.
    pub fn rhs_vector(&self) -> Result<DVector<T>, StepError> {
        self.check_history()?;
        let system = self.system.as_ref().ok_or(StepError::NotAssembled)?;
        let levels = self.solution.len();
        let mut rhs = system.rhs_vector(
            &self.parameters,
            &self.solution[levels - 2],
            &self.solution[levels - 1],
        );
        if let Some(inertia) = &self.inertia_force {
            rhs.axpy(self.parameters.gamma - real::<T>(0.5), inertia, T::one());
        }
        Ok(rhs)
    }

    /// Solves one time step with Newton iterations.
    pub fn solve_step(&mut self, time_step: &TimeStep<T>) -> Result<StepReport<T>, StepError> {
        self.predict_step(time_step)?;

        let IterationSettings {
            max_iterations,
            relative_tolerance,
            absolute_tolerance,
        } = self.iteration;
        let NewmarkParameters {
            beta,
            solve_displacement,
            ..
        } = self.parameters;
        let dt = time_step.time.dt;
        let mut tolerance = absolute_tolerance;

        for iteration in 0..=max_iterations {
            self.assemble(time_step)?;
            let rhs = self.rhs_vector()?;
            let residual_norm = rhs.norm();
            if iteration == 0 {
                tolerance = tolerance.max(relative_tolerance * residual_norm);
            }
            debug!("Newton iteration {}: residual norm {}", iteration, residual_norm);

            if residual_norm <= tolerance {
                let zero = DVector::zeros(rhs.len());
                self.correct_step(time_step, &zero, true)?;
                return Ok(StepReport {
                    iterations: iteration,
                    residual_norm,
                });
            }
            if iteration == max_iterations {
                break;
            }

            let matrix = self.newton_matrix(time_step)?;
            let mut increment = DMatrix::from_column_slice(rhs.len(), 1, rhs.as_slice());
            self.solver.solve(&matrix, &mut increment)?;
            let mut increment = increment.column(0).into_owned();
            if !solve_displacement {
                increment *= beta * dt * dt;
            }
            self.correct_step(time_step, &increment, false)?;
        }

        Err(StepError::Diverged {
            iterations: max_iterations,
        })
    }

    pub fn save_model(&mut self) -> eyre::Result<()> {
        self.model.save_model()
    }

    pub fn save_step(&mut self, time_step: &TimeStep<T>) -> eyre::Result<()> {
        self.model.save_step(time_step, &self.solution)
    }

    /// Stores every solution level and the inertia force.
    pub fn serialize(&self, data: &mut SerializedState) -> Result<(), RestartError>
    where
        T: Serialize,
    {
        data.insert_value(LEVELS_NAME, &self.solution.len())?;
        for (i, level) in self.solution.iter().enumerate() {
            data.insert_value(&level_name(i), level.as_slice())?;
        }
        if let Some(inertia) = &self.inertia_force {
            data.insert_value(INERTIA_NAME, inertia.as_slice())?;
        }
        Ok(())
    }

    /// Restores the solution history written by [`serialize`](Self::serialize).
    ///
    /// The number of levels and their lengths must match the initialized driver. The restored
    /// displacement is pushed to the model.
    pub fn deserialize(&mut self, data: &SerializedState) -> Result<(), RestartError>
    where
        T: DeserializeOwned,
    {
        let levels: usize = data.value(LEVELS_NAME)?;
        if levels != self.solution.len() {
            return Err(RestartError::Corrupt {
                name: LEVELS_NAME.to_string(),
                message: format!("expected {} levels, found {}", self.solution.len(), levels),
            });
        }

        let n = self.incremental_displacement.len();
        let read_vector = |name: &str| -> Result<DVector<T>, RestartError> {
            let values: Vec<T> = data.value(name)?;
            if values.len() != n {
                return Err(RestartError::Corrupt {
                    name: name.to_string(),
                    message: format!("expected {} values, found {}", n, values.len()),
                });
            }
            Ok(DVector::from_vec(values))
        };

        let solution = (0..levels)
            .map(|i| read_vector(&level_name(i)))
            .collect::<Result<Vec<_>, _>>()?;
        let inertia_force = match data.blob(INERTIA_NAME) {
            Some(_) => Some(read_vector(INERTIA_NAME)?),
            None => None,
        };

        self.solution = solution;
        self.inertia_force = inertia_force;
        self.system = None;
        self.phase = StepPhase::Initialized;
        self.model
            .update_configuration(&self.solution[0])
            .map_err(|err| RestartError::Corrupt {
                name: level_name(0),
                message: err.to_string(),
            })
    }
}
