//! Time-stepping orchestration with result output and restart.

use crate::dynamics::{DynamicModel, NewmarkDriver, StepError};
use crate::restart::{RestartError, RestartStore, SerializedState};
use crate::time::TimeStep;
use crate::Real;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A solver advancing a problem one time step at a time.
pub trait StepSolver<T: Real> {
    /// Prepares the solution state for the next step. The clock has already been advanced.
    fn advance_step(&mut self, time_step: &mut TimeStep<T>) -> bool;

    fn solve_step(&mut self, time_step: &TimeStep<T>) -> Result<(), StepError>;

    fn save_model(&mut self) -> eyre::Result<()>;

    fn save_step(&mut self, time_step: &TimeStep<T>) -> eyre::Result<()>;

    fn serialize(&self, data: &mut SerializedState) -> Result<(), RestartError>;

    fn deserialize(&mut self, data: &SerializedState) -> Result<(), RestartError>;
}

impl<T, M> StepSolver<T> for NewmarkDriver<T, M>
where
    T: Real + Serialize + DeserializeOwned,
    M: DynamicModel<T>,
{
    fn advance_step(&mut self, time_step: &mut TimeStep<T>) -> bool {
        NewmarkDriver::advance_step(self, time_step, false)
    }

    fn solve_step(&mut self, time_step: &TimeStep<T>) -> Result<(), StepError> {
        NewmarkDriver::solve_step(self, time_step).map(|_| ())
    }

    fn save_model(&mut self) -> eyre::Result<()> {
        NewmarkDriver::save_model(self)
    }

    fn save_step(&mut self, time_step: &TimeStep<T>) -> eyre::Result<()> {
        NewmarkDriver::save_step(self, time_step)
    }

    fn serialize(&self, data: &mut SerializedState) -> Result<(), RestartError> {
        NewmarkDriver::serialize(self, data)
    }

    fn deserialize(&mut self, data: &SerializedState) -> Result<(), RestartError> {
        NewmarkDriver::deserialize(self, data)
    }
}

/// Outcome of a complete time integration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// The model or the initial state could not be saved.
    InitialSaveFailed,
    /// A step failed to converge.
    Diverged,
    /// A step failed to converge and saving the diverged state failed, or saving a converged
    /// step failed.
    DivergedSaveOrOutputFailed,
}

impl ExitStatus {
    /// The process exit code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::InitialSaveFailed => 2,
            Self::Diverged => 3,
            Self::DivergedSaveOrOutputFailed => 4,
        }
    }
}

impl Display for ExitStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let description = match self {
            Self::Success => "success",
            Self::InitialSaveFailed => "failed to save initial state",
            Self::Diverged => "time step diverged",
            Self::DivergedSaveOrOutputFailed => "failed to save results",
        };
        write!(f, "{} (exit code {})", description, self.code())
    }
}

/// External request to stop the time integration after the current step.
pub trait StopSignal: Send + Sync {
    fn should_stop(&self) -> bool;
}

impl StopSignal for AtomicBool {
    fn should_stop(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Runs a [`StepSolver`] from the start to the stop time of a [`TimeStep`].
pub struct TimeIntegrationSolver<T: Real, S> {
    time_step: TimeStep<T>,
    solver: S,
    save_diverged: bool,
    save_initial: bool,
    restart_interval: usize,
    restart_store: Option<Box<dyn RestartStore>>,
    stop_signal: Option<Arc<dyn StopSignal>>,
}

impl<T, S> TimeIntegrationSolver<T, S>
where
    T: Real + Serialize + DeserializeOwned,
    S: StepSolver<T>,
{
    pub fn new(time_step: TimeStep<T>, solver: S) -> Self {
        Self {
            time_step,
            solver,
            save_diverged: false,
            save_initial: true,
            restart_interval: 0,
            restart_store: None,
            stop_signal: None,
        }
    }

    /// Whether to save the state of a diverged step before terminating.
    pub fn with_save_diverged(self, save_diverged: bool) -> Self {
        Self { save_diverged, ..self }
    }

    /// Whether to save the initial state along with the model.
    pub fn with_save_initial(self, save_initial: bool) -> Self {
        Self { save_initial, ..self }
    }

    /// Writes restart data to `store` every `interval` steps. An interval of zero disables
    /// restart dumps.
    pub fn with_restart_store(self, store: impl RestartStore + 'static, interval: usize) -> Self {
        Self {
            restart_store: Some(Box::new(store)),
            restart_interval: interval,
            ..self
        }
    }

    pub fn with_stop_signal(self, signal: Arc<dyn StopSignal>) -> Self {
        Self {
            stop_signal: Some(signal),
            ..self
        }
    }

    pub fn time_step(&self) -> &TimeStep<T> {
        &self.time_step
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    pub fn restart_store(&self) -> Option<&dyn RestartStore> {
        self.restart_store.as_deref()
    }

    pub fn into_solver(self) -> S {
        self.solver
    }

    fn advance_step(&mut self) -> bool {
        self.time_step.increment() && self.solver.advance_step(&mut self.time_step)
    }

    fn save_state(&mut self, initial: bool) -> eyre::Result<()> {
        if initial {
            self.solver.save_model()?;
            if !self.save_initial {
                return Ok(());
            }
        }
        self.solver.save_step(&self.time_step)?;

        let step = self.time_step.step;
        if self.restart_interval > 0 && step % self.restart_interval == 0 {
            if let Some(store) = self.restart_store.as_mut() {
                let mut data = SerializedState::new();
                let serialized = self
                    .time_step
                    .serialize(&mut data)
                    .and_then(|_| self.solver.serialize(&mut data));
                match serialized {
                    Ok(()) => store.write(step, &data)?,
                    Err(err) => warn!("Skipping restart data for step {}: {}", step, err),
                }
            }
        }
        Ok(())
    }

    /// Runs the time integration until the stop time is reached or a stop is requested.
    pub fn solve(&mut self) -> ExitStatus {
        if let Err(err) = self.save_state(true) {
            warn!("Failed to save initial state: {}", err);
            return ExitStatus::InitialSaveFailed;
        }

        while self.advance_step() {
            let time = self.time_step.time;
            info!("Step {}: t = {}, dt = {}", self.time_step.step, time.t, time.dt);

            if let Err(err) = self.solver.solve_step(&self.time_step) {
                warn!("Step {} failed: {}", self.time_step.step, err);
                if self.save_diverged {
                    if let Err(err) = self.solver.save_step(&self.time_step) {
                        warn!("Failed to save diverged state: {}", err);
                        return ExitStatus::DivergedSaveOrOutputFailed;
                    }
                }
                return ExitStatus::Diverged;
            }

            if let Err(err) = self.save_state(false) {
                warn!("Failed to save step {}: {}", self.time_step.step, err);
                return ExitStatus::DivergedSaveOrOutputFailed;
            }

            if let Some(signal) = &self.stop_signal {
                if signal.should_stop() {
                    info!("Stop requested after step {}", self.time_step.step);
                    break;
                }
            }
        }

        ExitStatus::Success
    }

    pub fn serialize(&self, data: &mut SerializedState) -> Result<(), RestartError> {
        self.time_step.serialize(data)?;
        self.solver.serialize(data)
    }

    /// Restores the clock and the solver state. The clock is left untouched if either fails.
    pub fn deserialize(&mut self, data: &SerializedState) -> Result<(), RestartError> {
        let mut time_step = self.time_step;
        time_step.deserialize(data)?;
        self.solver.deserialize(data)?;
        self.time_step = time_step;
        Ok(())
    }

    /// Restores the state of `step` (the latest stored step if `None`) from `store`.
    ///
    /// Returns the step to resume from, or zero if the store holds no restart data.
    pub fn restart(&mut self, store: &dyn RestartStore, step: Option<usize>) -> Result<usize, RestartError> {
        let (step, data) = match store.read(step)? {
            Some(state) => state,
            None => return Ok(0),
        };
        info!("Restarting from serialized state of step {}", step);
        self.deserialize(&data).map_err(|err| {
            warn!("Failed to restore restart data: {}", err);
            err
        })?;
        Ok(step + 1)
    }
}
