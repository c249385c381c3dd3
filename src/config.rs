//! Solver configuration read from JSON.
//!
//! ```json
//! {
//!     "time": { "start": 0.0, "stop": 1.0, "dt": 0.01 },
//!     "newmark": { "alpha": -0.1, "alpha1": 0.0, "alpha2": 0.0 },
//!     "iterations": { "max_iterations": 20, "relative_tolerance": 1e-8, "absolute_tolerance": 1e-12 },
//!     "post_processing": { "save_diverged": true, "restart_interval": 10 },
//!     "projection": { "parallel": true }
//! }
//! ```
//!
//! Every section and every entry is optional. The Newmark scheme is chosen from the given
//! entries: `alpha_m` and `alpha_f` select the generalized-alpha scheme, `beta` and `gamma` the
//! classical Newmark scheme, and otherwise `alpha` (default `-0.1`) determines `beta` and
//! `gamma`.

use crate::dynamics::{IterationSettings, NewmarkParameters};
use crate::projection::ProjectionSettings;
use crate::time::TimeStep;
use crate::{real, Real};
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A value is outside its admissible range.
    InvalidValue { name: &'static str, value: f64 },
    /// Only part of a group of entries that must be given together is present.
    IncompleteGroup { names: &'static str },
    /// Entries selecting different integration schemes are given.
    ConflictingEntries { first: &'static str, second: &'static str },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { name, value } => write!(f, "Invalid value {} for \"{}\"", value, name),
            Self::IncompleteGroup { names } => write!(f, "Entries {} must be given together", names),
            Self::ConflictingEntries { first, second } => {
                write!(f, "Entries \"{}\" and \"{}\" cannot be combined", first, second)
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    pub start: f64,
    pub stop: f64,
    pub dt: f64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            start: 0.0,
            stop: 1.0,
            dt: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewmarkConfig {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    pub alpha_m: Option<f64>,
    pub alpha_f: Option<f64>,
    pub alpha1: f64,
    pub alpha2: f64,
    pub solve_displacement: bool,
}

impl Default for NewmarkConfig {
    fn default() -> Self {
        Self {
            alpha: None,
            beta: None,
            gamma: None,
            alpha_m: None,
            alpha_f: None,
            alpha1: 0.0,
            alpha2: 0.0,
            solve_displacement: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationConfig {
    pub max_iterations: usize,
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
}

impl Default for IterationConfig {
    fn default() -> Self {
        let IterationSettings {
            max_iterations,
            relative_tolerance,
            absolute_tolerance,
        } = IterationSettings::default();
        Self {
            max_iterations,
            relative_tolerance,
            absolute_tolerance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessingConfig {
    /// Save the state of a step that failed to converge.
    pub save_diverged: bool,
    /// Steps between restart dumps, zero disables them.
    pub restart_interval: usize,
    pub save_initial: bool,
}

impl Default for PostProcessingConfig {
    fn default() -> Self {
        Self {
            save_diverged: false,
            restart_interval: 0,
            save_initial: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub time: TimeConfig,
    pub newmark: NewmarkConfig,
    pub iterations: IterationConfig,
    pub post_processing: PostProcessingConfig,
    pub projection: ProjectionSettings,
}

fn check(name: &'static str, value: f64, admissible: bool) -> Result<(), ConfigError> {
    if value.is_finite() && admissible {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue { name, value })
    }
}

impl SolverConfig {
    /// Parses and validates a configuration.
    pub fn from_json_str(json: &str) -> eyre::Result<Self> {
        let config: Self = serde_json::from_str(json).wrap_err("Failed to parse solver configuration")?;
        config.validate().wrap_err("Invalid solver configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let TimeConfig { start, stop, dt } = self.time;
        check("time.start", start, true)?;
        check("time.stop", stop, stop >= start)?;
        check("time.dt", dt, dt > 0.0)?;

        let newmark = &self.newmark;
        if newmark.beta.is_some() != newmark.gamma.is_some() {
            return Err(ConfigError::IncompleteGroup {
                names: "\"beta\" and \"gamma\"",
            });
        }
        if newmark.alpha_m.is_some() != newmark.alpha_f.is_some() {
            return Err(ConfigError::IncompleteGroup {
                names: "\"alpha_m\" and \"alpha_f\"",
            });
        }
        let explicit_newmark = newmark.beta.is_some();
        let generalized = newmark.alpha_m.is_some();
        if newmark.alpha.is_some() && explicit_newmark {
            return Err(ConfigError::ConflictingEntries {
                first: "alpha",
                second: "beta",
            });
        }
        if newmark.alpha.is_some() && generalized {
            return Err(ConfigError::ConflictingEntries {
                first: "alpha",
                second: "alpha_m",
            });
        }
        if explicit_newmark && generalized {
            return Err(ConfigError::ConflictingEntries {
                first: "beta",
                second: "alpha_m",
            });
        }

        if let Some(beta) = newmark.beta {
            check("newmark.beta", beta, beta > 0.0)?;
        }
        if let Some(gamma) = newmark.gamma {
            check("newmark.gamma", gamma, gamma > 0.0)?;
        }
        if let Some(alpha) = newmark.alpha {
            check("newmark.alpha", alpha, alpha < 1.0)?;
        }
        for (name, value) in [("newmark.alpha_m", newmark.alpha_m), ("newmark.alpha_f", newmark.alpha_f)] {
            if let Some(value) = value {
                check(name, value, value > 0.0)?;
            }
        }
        check("newmark.alpha1", newmark.alpha1, newmark.alpha1 >= 0.0)?;
        check("newmark.alpha2", newmark.alpha2, newmark.alpha2 >= 0.0)?;

        let iterations = &self.iterations;
        check(
            "iterations.relative_tolerance",
            iterations.relative_tolerance,
            iterations.relative_tolerance >= 0.0,
        )?;
        check(
            "iterations.absolute_tolerance",
            iterations.absolute_tolerance,
            iterations.absolute_tolerance >= 0.0,
        )?;

        if self.projection.num_gauss_points == Some(0) {
            return Err(ConfigError::InvalidValue {
                name: "projection.num_gauss_points",
                value: 0.0,
            });
        }
        Ok(())
    }

    pub fn newmark_parameters<T: Real>(&self) -> NewmarkParameters<T> {
        let newmark = &self.newmark;
        let parameters: NewmarkParameters<T> = match (newmark.alpha_m, newmark.alpha_f, newmark.beta, newmark.gamma) {
            (Some(alpha_m), Some(alpha_f), _, _) => {
                NewmarkParameters::generalized_alpha(real(alpha_m), real(alpha_f))
            }
            (_, _, Some(beta), Some(gamma)) => NewmarkParameters::newmark(real(beta), real(gamma)),
            _ => NewmarkParameters::from_alpha(real(newmark.alpha.unwrap_or(-0.1))),
        };
        parameters
            .with_rayleigh_damping(real(newmark.alpha1), real(newmark.alpha2))
            .with_solve_displacement(newmark.solve_displacement)
    }

    pub fn time_step<T: Real>(&self) -> TimeStep<T> {
        TimeStep::new(real(self.time.start), real(self.time.stop), real(self.time.dt))
    }

    pub fn iteration_settings<T: Real>(&self) -> IterationSettings<T> {
        IterationSettings {
            max_iterations: self.iterations.max_iterations,
            relative_tolerance: real(self.iterations.relative_tolerance),
            absolute_tolerance: real(self.iterations.absolute_tolerance),
        }
    }
}
