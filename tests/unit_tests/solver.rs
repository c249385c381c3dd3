use super::dynamics::{energy, released_oscillator};
use isofem::dynamics::{NewmarkParameters, StepError};
use isofem::restart::{InMemoryRestartStore, JsonRestartFile, RestartError, RestartStore, SerializedState};
use isofem::solver::{ExitStatus, StepSolver, TimeIntegrationSolver};
use isofem::time::TimeStep;
use matrixcompare::assert_scalar_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const VALUE_NAME: &str = "ScriptedSolver::value";

/// A step solver whose failures are scripted by step number.
#[derive(Debug, Default)]
struct ScriptedSolver {
    diverge_at: Option<usize>,
    fail_model_save: bool,
    fail_save_at: Option<usize>,
    fail_serialize: bool,
    saved: Vec<usize>,
    solved: Vec<usize>,
    value: f64,
}

impl StepSolver<f64> for ScriptedSolver {
    fn advance_step(&mut self, _time_step: &mut TimeStep<f64>) -> bool {
        true
    }

    fn solve_step(&mut self, time_step: &TimeStep<f64>) -> Result<(), StepError> {
        self.solved.push(time_step.step);
        if self.diverge_at == Some(time_step.step) {
            return Err(StepError::Diverged { iterations: 5 });
        }
        self.value += 1.0;
        Ok(())
    }

    fn save_model(&mut self) -> eyre::Result<()> {
        if self.fail_model_save {
            eyre::bail!("model output unavailable");
        }
        Ok(())
    }

    fn save_step(&mut self, time_step: &TimeStep<f64>) -> eyre::Result<()> {
        if self.fail_save_at == Some(time_step.step) {
            eyre::bail!("step output unavailable");
        }
        self.saved.push(time_step.step);
        Ok(())
    }

    fn serialize(&self, data: &mut SerializedState) -> Result<(), RestartError> {
        if self.fail_serialize {
            return Err(RestartError::Write("value cannot be encoded".to_string()));
        }
        data.insert_value(VALUE_NAME, &self.value)
    }

    fn deserialize(&mut self, data: &SerializedState) -> Result<(), RestartError> {
        self.value = data.value(VALUE_NAME)?;
        Ok(())
    }
}

/// A restart store that rejects every write.
struct ReadOnlyStore;

impl RestartStore for ReadOnlyStore {
    fn write(&mut self, _step: usize, _state: &SerializedState) -> Result<(), RestartError> {
        Err(RestartError::Write("read-only store".to_string()))
    }

    fn read(&self, _step: Option<usize>) -> Result<Option<(usize, SerializedState)>, RestartError> {
        Ok(None)
    }
}

fn four_steps() -> TimeStep<f64> {
    TimeStep::new(0.0, 1.0, 0.25)
}

fn run(solver: ScriptedSolver, save_diverged: bool) -> (ExitStatus, ScriptedSolver) {
    let mut integrator = TimeIntegrationSolver::new(four_steps(), solver).with_save_diverged(save_diverged);
    let status = integrator.solve();
    (status, integrator.into_solver())
}

#[test]
fn successful_run_saves_every_step() {
    let (status, solver) = run(ScriptedSolver::default(), false);
    assert_eq!(status, ExitStatus::Success);
    assert_eq!(status.code(), 0);
    assert_eq!(solver.solved, vec![1, 2, 3, 4]);
    assert_eq!(solver.saved, vec![0, 1, 2, 3, 4]);
    assert_eq!(solver.value, 4.0);

    let mut integrator = TimeIntegrationSolver::new(four_steps(), ScriptedSolver::default()).with_save_initial(false);
    assert_eq!(integrator.solve(), ExitStatus::Success);
    assert_eq!(integrator.solver().saved, vec![1, 2, 3, 4]);
    assert_eq!(integrator.time_step().step, 4);
}

#[test]
fn failed_initial_save() {
    let solver = ScriptedSolver {
        fail_model_save: true,
        ..Default::default()
    };
    let (status, solver) = run(solver, false);
    assert_eq!(status.code(), 2);
    assert!(solver.solved.is_empty());

    let solver = ScriptedSolver {
        fail_save_at: Some(0),
        ..Default::default()
    };
    let (status, _) = run(solver, false);
    assert_eq!(status, ExitStatus::InitialSaveFailed);
}

#[test]
fn diverged_step_terminates_integration() {
    let diverging = || ScriptedSolver {
        diverge_at: Some(2),
        ..Default::default()
    };

    let (status, solver) = run(diverging(), false);
    assert_eq!(status, ExitStatus::Diverged);
    assert_eq!(status.code(), 3);
    assert_eq!(solver.solved, vec![1, 2]);
    assert_eq!(solver.saved, vec![0, 1]);

    let (status, solver) = run(diverging(), true);
    assert_eq!(status.code(), 3);
    assert_eq!(solver.saved, vec![0, 1, 2]);

    let solver = ScriptedSolver {
        fail_save_at: Some(2),
        ..diverging()
    };
    let (status, _) = run(solver, true);
    assert_eq!(status, ExitStatus::DivergedSaveOrOutputFailed);
    assert_eq!(status.code(), 4);
}

#[test]
fn failed_step_output() {
    let solver = ScriptedSolver {
        fail_save_at: Some(3),
        ..Default::default()
    };
    let (status, solver) = run(solver, false);
    assert_eq!(status.code(), 4);
    assert_eq!(solver.solved, vec![1, 2, 3]);
}

#[test]
fn stop_signal_ends_integration_after_current_step() {
    let signal = Arc::new(AtomicBool::new(false));
    let mut integrator =
        TimeIntegrationSolver::new(four_steps(), ScriptedSolver::default()).with_stop_signal(signal.clone());
    signal.store(true, Ordering::Relaxed);
    assert_eq!(integrator.solve(), ExitStatus::Success);
    assert_eq!(integrator.solver().solved, vec![1]);
}

#[test]
fn restart_dumps_are_written_at_interval() {
    let mut integrator = TimeIntegrationSolver::new(four_steps(), ScriptedSolver::default())
        .with_restart_store(InMemoryRestartStore::new(), 2);
    assert_eq!(integrator.solve(), ExitStatus::Success);

    let store = integrator.restart_store().unwrap();
    for step in [0, 2, 4] {
        assert!(store.read(Some(step)).unwrap().is_some());
    }
    assert!(matches!(store.read(Some(1)), Err(RestartError::Read(_))));
    let (latest, data) = store.read(None).unwrap().unwrap();
    assert_eq!(latest, 4);
    assert_eq!(data.value::<f64>(VALUE_NAME).unwrap(), 4.0);
}

#[test]
fn restart_restores_time_step_and_solver_state() {
    let mut store = InMemoryRestartStore::new();
    let mut integrator = TimeIntegrationSolver::new(four_steps(), ScriptedSolver::default());
    assert_eq!(integrator.restart(&store, None), Ok(0));

    let mut state = SerializedState::new();
    let mut time_step = four_steps();
    time_step.increment();
    time_step.increment();
    time_step.serialize(&mut state).unwrap();
    state.insert_value(VALUE_NAME, &2.0).unwrap();
    store.write(2, &state).unwrap();

    assert_eq!(integrator.restart(&store, Some(2)), Ok(3));
    assert_eq!(integrator.time_step().step, 2);
    assert_scalar_eq!(integrator.time_step().time.t, 0.5);
    assert_eq!(integrator.solver().value, 2.0);

    // Resuming runs the remaining steps only
    assert_eq!(integrator.solve(), ExitStatus::Success);
    assert_eq!(integrator.solver().solved, vec![3, 4]);
    assert_eq!(integrator.solver().value, 4.0);
}

#[test]
fn restart_failures_have_negative_codes() {
    let mut integrator = TimeIntegrationSolver::new(four_steps(), ScriptedSolver::default());

    let mut store = InMemoryRestartStore::new();
    store.write(0, &SerializedState::new()).unwrap();
    let err = integrator.restart(&store, None).unwrap_err();
    assert!(matches!(err, RestartError::MissingBlob(_)));
    assert_eq!(err.code(), -2);

    let missing = JsonRestartFile::new(std::env::temp_dir().join("isofem-no-such-restart-file.json"));
    let err = integrator.restart(&missing, None).unwrap_err();
    assert!(matches!(err, RestartError::Read(_)));
    assert_eq!(err.code(), -1);
}

#[test]
fn failed_restart_leaves_clock_untouched() {
    let mut state = SerializedState::new();
    let mut time_step = four_steps();
    for _ in 0..3 {
        time_step.increment();
    }
    time_step.serialize(&mut state).unwrap();
    let mut store = InMemoryRestartStore::new();
    store.write(3, &state).unwrap();

    let mut integrator = TimeIntegrationSolver::new(four_steps(), ScriptedSolver::default());
    let err = integrator.restart(&store, Some(3)).unwrap_err();
    assert_eq!(err.code(), -2);
    assert_eq!(integrator.time_step(), &four_steps());

    // Starting fresh after the failed restart runs every step
    assert_eq!(integrator.solve(), ExitStatus::Success);
    assert_eq!(integrator.solver().solved, vec![1, 2, 3, 4]);
}

#[test]
fn unserializable_state_skips_restart_dump() {
    let solver = ScriptedSolver {
        fail_serialize: true,
        ..Default::default()
    };
    let mut integrator =
        TimeIntegrationSolver::new(four_steps(), solver).with_restart_store(InMemoryRestartStore::new(), 2);
    assert_eq!(integrator.solve(), ExitStatus::Success);
    assert_eq!(integrator.solver().saved, vec![0, 1, 2, 3, 4]);
    assert_eq!(integrator.restart_store().unwrap().read(None), Ok(None));

    // A store that cannot be written is still an output failure
    let mut integrator =
        TimeIntegrationSolver::new(four_steps(), ScriptedSolver::default()).with_restart_store(ReadOnlyStore, 2);
    assert_eq!(integrator.solve(), ExitStatus::InitialSaveFailed);
    let mut integrator = TimeIntegrationSolver::new(four_steps(), ScriptedSolver::default())
        .with_save_initial(false)
        .with_restart_store(ReadOnlyStore, 2);
    assert_eq!(integrator.solve(), ExitStatus::DivergedSaveOrOutputFailed);
    assert_eq!(integrator.solver().solved, vec![1, 2]);
}

#[test]
fn newmark_integration_of_oscillator() {
    let driver = released_oscillator(NewmarkParameters::average_acceleration());
    let mut integrator =
        TimeIntegrationSolver::new(TimeStep::new(0.0, 1.0, 0.1), driver).with_restart_store(InMemoryRestartStore::new(), 5);
    assert_eq!(integrator.solve(), ExitStatus::Success);
    assert_eq!(integrator.time_step().step, 10);

    let driver = integrator.solver();
    assert_eq!(driver.model().saved_steps, (0..=10).collect::<Vec<_>>());
    assert_scalar_eq!(energy(driver), 2.0, comp = abs, tol = 1e-9);
    // The trapezoidal rule rotates the phase by 2 atan(ωh/2) per step
    let theta = 2.0 * (0.1f64).atan();
    assert_scalar_eq!(driver.displacement().unwrap()[0], (10.0 * theta).cos(), comp = abs, tol = 1e-9);

    // Restarting from the step 5 dump and integrating again reproduces the final state
    let dumps = integrator.restart_store().unwrap();
    let mut resumed = TimeIntegrationSolver::new(
        TimeStep::new(0.0, 1.0, 0.1),
        released_oscillator(NewmarkParameters::average_acceleration()),
    );
    assert_eq!(resumed.restart(dumps, Some(5)), Ok(6));
    assert_eq!(resumed.solve(), ExitStatus::Success);
    assert_scalar_eq!(
        resumed.solver().displacement().unwrap()[0],
        integrator.solver().displacement().unwrap()[0],
        comp = abs,
        tol = 1e-12
    );
}
