use isofem::config::{ConfigError, SolverConfig};
use isofem::dynamics::{IterationSettings, NewmarkParameters};
use matrixcompare::assert_scalar_eq;

#[test]
fn empty_configuration_uses_defaults() {
    let config = SolverConfig::from_json_str("{}").unwrap();
    assert_eq!(config, SolverConfig::default());
    assert!(config.post_processing.save_initial);
    assert!(!config.post_processing.save_diverged);
    assert_eq!(config.post_processing.restart_interval, 0);
    assert!(!config.projection.parallel);

    assert_eq!(config.newmark_parameters::<f64>(), NewmarkParameters::default());
    assert_eq!(config.iteration_settings::<f64>(), IterationSettings::default());
    let time_step = config.time_step::<f64>();
    assert_eq!(time_step.step, 0);
    assert_eq!(time_step.time.t, 0.0);
    assert_eq!(time_step.stop_time, 1.0);
}

#[test]
fn full_configuration() {
    let json = r#"{
        "time": { "start": 1.0, "stop": 3.0, "dt": 0.05 },
        "newmark": { "beta": 0.25, "gamma": 0.5, "alpha1": 0.1, "alpha2": 0.02, "solve_displacement": false },
        "iterations": { "max_iterations": 8, "relative_tolerance": 1e-6 },
        "post_processing": { "save_diverged": true, "restart_interval": 10, "save_initial": false },
        "projection": { "parallel": true, "num_gauss_points": 4 }
    }"#;
    let config = SolverConfig::from_json_str(json).unwrap();

    let parameters = config.newmark_parameters::<f64>();
    assert_eq!(
        parameters,
        NewmarkParameters::average_acceleration()
            .with_rayleigh_damping(0.1, 0.02)
            .with_solve_displacement(false)
    );

    let iteration = config.iteration_settings::<f64>();
    assert_eq!(iteration.max_iterations, 8);
    assert_eq!(iteration.relative_tolerance, 1e-6);
    assert_eq!(iteration.absolute_tolerance, IterationSettings::<f64>::default().absolute_tolerance);

    let time_step = config.time_step::<f64>();
    assert_eq!(time_step.start_time, 1.0);
    assert_eq!(time_step.time.dt, 0.05);

    assert!(config.post_processing.save_diverged);
    assert!(!config.post_processing.save_initial);
    assert_eq!(config.post_processing.restart_interval, 10);
    assert_eq!(config.projection.num_gauss_points, Some(4));
}

#[test]
fn integration_scheme_selection() {
    let config = SolverConfig::from_json_str(r#"{ "newmark": { "alpha": -0.2 } }"#).unwrap();
    let parameters = config.newmark_parameters::<f64>();
    assert_scalar_eq!(parameters.beta, 0.36, comp = abs, tol = 1e-14);
    assert_scalar_eq!(parameters.gamma, 0.7, comp = abs, tol = 1e-14);

    let config = SolverConfig::from_json_str(r#"{ "newmark": { "alpha_m": 1.0, "alpha_f": 0.9 } }"#).unwrap();
    let parameters = config.newmark_parameters::<f64>();
    assert_eq!(parameters.alpha_m, 1.0);
    assert_eq!(parameters.alpha_f, 0.9);
    assert_scalar_eq!(parameters.beta, 0.3025, comp = abs, tol = 1e-14);
}

fn validation_error(json: &str) -> ConfigError {
    let config: SolverConfig = serde_json::from_str(json).unwrap();
    config.validate().unwrap_err()
}

#[test]
fn invalid_configurations_are_rejected() {
    assert_eq!(
        validation_error(r#"{ "time": { "dt": 0.0 } }"#),
        ConfigError::InvalidValue {
            name: "time.dt",
            value: 0.0
        }
    );
    assert_eq!(
        validation_error(r#"{ "time": { "start": 2.0, "stop": 1.0 } }"#),
        ConfigError::InvalidValue {
            name: "time.stop",
            value: 1.0
        }
    );
    assert!(matches!(
        validation_error(r#"{ "newmark": { "beta": 0.25 } }"#),
        ConfigError::IncompleteGroup { .. }
    ));
    assert!(matches!(
        validation_error(r#"{ "newmark": { "alpha_f": 0.9 } }"#),
        ConfigError::IncompleteGroup { .. }
    ));
    assert_eq!(
        validation_error(r#"{ "newmark": { "alpha": -0.1, "beta": 0.25, "gamma": 0.5 } }"#),
        ConfigError::ConflictingEntries {
            first: "alpha",
            second: "beta"
        }
    );
    assert_eq!(
        validation_error(r#"{ "newmark": { "beta": 0.25, "gamma": 0.5, "alpha_m": 1.0, "alpha_f": 1.0 } }"#),
        ConfigError::ConflictingEntries {
            first: "beta",
            second: "alpha_m"
        }
    );
    assert_eq!(
        validation_error(r#"{ "newmark": { "alpha2": -1.0 } }"#),
        ConfigError::InvalidValue {
            name: "newmark.alpha2",
            value: -1.0
        }
    );
    assert_eq!(
        validation_error(r#"{ "projection": { "num_gauss_points": 0 } }"#),
        ConfigError::InvalidValue {
            name: "projection.num_gauss_points",
            value: 0.0
        }
    );
}

#[test]
fn parse_errors_carry_context() {
    let err = SolverConfig::from_json_str(r#"{ "time": { "dt": "fast" } }"#).unwrap_err();
    assert!(err.to_string().contains("Failed to parse solver configuration"));

    let err = SolverConfig::from_json_str(r#"{ "time": { "dt": -1.0 } }"#).unwrap_err();
    assert!(err.to_string().contains("Invalid solver configuration"));
    assert!(err.downcast_ref::<ConfigError>().is_some());
}
