//! Restart state as a container of named blobs, and stores for it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RestartError {
    /// The restart data could not be read.
    Read(String),
    /// The restart data could not be written.
    Write(String),
    /// A required blob is missing.
    MissingBlob(String),
    /// A blob could not be decoded or does not match the receiving state.
    Corrupt { name: String, message: String },
}

impl RestartError {
    /// Negative status code reported for a failed restart.
    pub fn code(&self) -> i32 {
        match self {
            Self::Read(_) | Self::Write(_) => -1,
            Self::MissingBlob(_) | Self::Corrupt { .. } => -2,
        }
    }
}

impl Display for RestartError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(message) => write!(f, "Failed to read restart data: {}", message),
            Self::Write(message) => write!(f, "Failed to write restart data: {}", message),
            Self::MissingBlob(name) => write!(f, "Restart data has no entry \"{}\"", name),
            Self::Corrupt { name, message } => {
                write!(f, "Restart entry \"{}\" is corrupt: {}", name, message)
            }
        }
    }
}

impl Error for RestartError {}

/// Named binary blobs making up the restart state of one time step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedState {
    blobs: BTreeMap<String, Vec<u8>>,
}

impl SerializedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_blob(&mut self, name: impl Into<String>, blob: Vec<u8>) {
        self.blobs.insert(name.into(), blob);
    }

    pub fn blob(&self, name: &str) -> Option<&[u8]> {
        self.blobs.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Encodes a value and stores it under the given name.
    pub fn insert_value<S: Serialize + ?Sized>(&mut self, name: &str, value: &S) -> Result<(), RestartError> {
        let blob = serde_json::to_vec(value).map_err(|err| RestartError::Corrupt {
            name: name.to_string(),
            message: err.to_string(),
        })?;
        self.insert_blob(name, blob);
        Ok(())
    }

    /// Decodes the value stored under the given name.
    pub fn value<V: DeserializeOwned>(&self, name: &str) -> Result<V, RestartError> {
        let blob = self
            .blob(name)
            .ok_or_else(|| RestartError::MissingBlob(name.to_string()))?;
        serde_json::from_slice(blob).map_err(|err| RestartError::Corrupt {
            name: name.to_string(),
            message: err.to_string(),
        })
    }
}

/// Persistent storage of restart states keyed by time step.
pub trait RestartStore {
    fn write(&mut self, step: usize, state: &SerializedState) -> Result<(), RestartError>;

    /// Reads the state of the given step, or of the latest stored step if `step` is `None`.
    ///
    /// Returns `Ok(None)` if the store holds no state at all.
    fn read(&self, step: Option<usize>) -> Result<Option<(usize, SerializedState)>, RestartError>;
}

fn select_state(
    states: &BTreeMap<usize, SerializedState>,
    step: Option<usize>,
) -> Result<Option<(usize, SerializedState)>, RestartError> {
    if states.is_empty() {
        return Ok(None);
    }
    match step {
        None => Ok(states
            .iter()
            .next_back()
            .map(|(&step, state)| (step, state.clone()))),
        Some(step) => states
            .get(&step)
            .map(|state| Some((step, state.clone())))
            .ok_or_else(|| RestartError::Read(format!("no restart state stored for step {}", step))),
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRestartStore {
    states: BTreeMap<usize, SerializedState>,
}

impl InMemoryRestartStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.states.keys().copied()
    }
}

impl RestartStore for InMemoryRestartStore {
    fn write(&mut self, step: usize, state: &SerializedState) -> Result<(), RestartError> {
        self.states.insert(step, state.clone());
        Ok(())
    }

    fn read(&self, step: Option<usize>) -> Result<Option<(usize, SerializedState)>, RestartError> {
        select_state(&self.states, step)
    }
}

/// Restart states stored together in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonRestartFile {
    path: PathBuf,
}

impl JsonRestartFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<usize, SerializedState>, RestartError> {
        let content = fs::read(&self.path).map_err(|err| RestartError::Read(format!("{}: {}", self.path.display(), err)))?;
        serde_json::from_slice(&content).map_err(|err| RestartError::Read(format!("{}: {}", self.path.display(), err)))
    }
}

impl RestartStore for JsonRestartFile {
    fn write(&mut self, step: usize, state: &SerializedState) -> Result<(), RestartError> {
        let mut states = if self.path.exists() {
            self.load()?
        } else {
            BTreeMap::new()
        };
        states.insert(step, state.clone());
        let content = serde_json::to_vec(&states).map_err(|err| RestartError::Write(err.to_string()))?;
        fs::write(&self.path, content).map_err(|err| RestartError::Write(format!("{}: {}", self.path.display(), err)))
    }

    fn read(&self, step: Option<usize>) -> Result<Option<(usize, SerializedState)>, RestartError> {
        select_state(&self.load()?, step)
    }
}
