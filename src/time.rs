//! The time-stepping clock.

use crate::restart::{RestartError, SerializedState};
use crate::{real, Real};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Current time and step size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeDomain<T> {
    pub t: T,
    pub dt: T,
}

/// Time step bookkeeping for a simulation running from `start_time` to `stop_time`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeStep<T> {
    /// Number of completed increments.
    pub step: usize,
    pub time: TimeDomain<T>,
    pub start_time: T,
    pub stop_time: T,
}

const SERIALIZED_NAME: &str = "TimeStep";

impl<T: Real> TimeStep<T> {
    pub fn new(start_time: T, stop_time: T, dt: T) -> Self {
        Self {
            step: 0,
            time: TimeDomain { t: start_time, dt },
            start_time,
            stop_time,
        }
    }

    /// Whether another full step fits before the stop time.
    ///
    /// A clock with a non-positive step size never advances.
    pub fn has_next(&self) -> bool {
        if self.time.dt <= T::zero() {
            return false;
        }
        // Allow for round-off in the accumulated time
        self.time.t + self.time.dt * (T::one() - real::<T>(1e-10)) <= self.stop_time
    }

    /// Advances the clock by one step. Returns `false` when the stop time has been reached.
    pub fn increment(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.step += 1;
        self.time.t += self.time.dt;
        true
    }

    pub fn serialize(&self, data: &mut SerializedState) -> Result<(), RestartError>
    where
        T: Serialize,
    {
        data.insert_value(SERIALIZED_NAME, self)
    }

    pub fn deserialize(&mut self, data: &SerializedState) -> Result<(), RestartError>
    where
        T: DeserializeOwned,
    {
        *self = data.value(SERIALIZED_NAME)?;
        Ok(())
    }
}
