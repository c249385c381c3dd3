use isofem::restart::{InMemoryRestartStore, JsonRestartFile, RestartError, RestartStore, SerializedState};
use isofem::time::TimeStep;
use std::fs;

#[test]
fn serialized_state_stores_named_values() {
    let mut state = SerializedState::new();
    assert!(state.is_empty());
    state.insert_value("b", &vec![1.0, 2.5]).unwrap();
    state.insert_value("a", &7usize).unwrap();
    state.insert_blob("raw", vec![1, 2, 3]);

    assert_eq!(state.len(), 3);
    assert_eq!(state.names().collect::<Vec<_>>(), vec!["a", "b", "raw"]);
    assert_eq!(state.value::<Vec<f64>>("b").unwrap(), vec![1.0, 2.5]);
    assert_eq!(state.value::<usize>("a").unwrap(), 7);
    assert_eq!(state.blob("raw"), Some(&[1u8, 2, 3][..]));

    assert_eq!(
        state.value::<f64>("missing"),
        Err(RestartError::MissingBlob("missing".to_string()))
    );
    let err = state.value::<f64>("raw").unwrap_err();
    assert!(matches!(err, RestartError::Corrupt { ref name, .. } if name == "raw"));
    assert_eq!(err.code(), -2);
}

#[test]
fn time_step_round_trip() {
    let mut time_step = TimeStep::new(0.5, 2.0, 0.125);
    time_step.increment();
    time_step.increment();

    let mut state = SerializedState::new();
    time_step.serialize(&mut state).unwrap();
    let mut restored = TimeStep::new(0.0, 1.0, 1.0);
    restored.deserialize(&state).unwrap();
    assert_eq!(restored, time_step);
    assert_eq!(restored.step, 2);
    assert_eq!(restored.time.t, 0.75);
}

#[test]
fn time_step_stops_at_stop_time() {
    let mut time_step = TimeStep::new(0.0, 1.0, 0.1);
    let mut steps = 0;
    while time_step.increment() {
        steps += 1;
    }
    assert_eq!(steps, 10);
    assert_eq!(time_step.step, 10);
    assert!(!time_step.has_next());
}

#[test]
fn time_step_without_positive_step_size_never_advances() {
    for dt in [0.0, -0.1] {
        let mut time_step = TimeStep::new(0.0, 1.0, dt);
        assert!(!time_step.has_next());
        assert!(!time_step.increment());
        assert_eq!(time_step.step, 0);
        assert_eq!(time_step.time.t, 0.0);
    }
}

#[test]
fn in_memory_store_selects_steps() {
    let mut store = InMemoryRestartStore::new();
    assert_eq!(store.read(None), Ok(None));

    for step in [3, 1, 7] {
        let mut state = SerializedState::new();
        state.insert_value("step", &step).unwrap();
        store.write(step, &state).unwrap();
    }
    assert_eq!(store.steps().collect::<Vec<_>>(), vec![1, 3, 7]);

    let (step, state) = store.read(None).unwrap().unwrap();
    assert_eq!(step, 7);
    assert_eq!(state.value::<usize>("step").unwrap(), 7);
    let (step, _) = store.read(Some(3)).unwrap().unwrap();
    assert_eq!(step, 3);

    let err = store.read(Some(4)).unwrap_err();
    assert!(matches!(err, RestartError::Read(_)));
    assert_eq!(err.code(), -1);
}

#[test]
fn json_restart_file_round_trip() {
    let path = std::env::temp_dir().join(format!("isofem-restart-{}.json", std::process::id()));
    let _ = fs::remove_file(&path);
    let mut file = JsonRestartFile::new(&path);
    assert!(matches!(file.read(None), Err(RestartError::Read(_))));

    let mut first = SerializedState::new();
    first.insert_value("solution", &vec![0.1, 0.2, 0.3]).unwrap();
    file.write(5, &first).unwrap();
    let mut second = SerializedState::new();
    second.insert_value("solution", &vec![1.0 / 3.0]).unwrap();
    file.write(10, &second).unwrap();

    // A fresh handle sees both states
    let reopened = JsonRestartFile::new(file.path());
    assert_eq!(reopened.read(Some(5)).unwrap(), Some((5, first)));
    let (step, state) = reopened.read(None).unwrap().unwrap();
    assert_eq!(step, 10);
    assert_eq!(state.value::<Vec<f64>>("solution").unwrap(), vec![1.0 / 3.0]);

    fs::remove_file(&path).unwrap();
}
