//! Key/value partitions of the working state.

use crate::errors::StateError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn decode<T: DeserializeOwned>(
    key: &str,
    value: serde_json::Value,
) -> Result<T, StateError> {
    serde_json::from_value(value).map_err(|e| StateError::TypeMismatch {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// The mutable partition shared by every step of a flight.
///
/// Values written by one step are visible to all later steps and to the
/// writer's own `compensate`. Overwrites are allowed so that a replayed step
/// can publish the same record again.
#[derive(Debug, Default)]
pub struct FlightMap {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl FlightMap {
    /// Creates a new empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map from existing data.
    #[must_use]
    pub fn from_data(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Gets the raw JSON value for a key.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<serde_json::Value> {
        self.data.read().get(key).cloned()
    }

    /// Reads a required value.
    ///
    /// # Errors
    ///
    /// Returns `StateError::MissingRequiredField` if the key is absent or null,
    /// and `StateError::TypeMismatch` if it does not decode as `T`.
    pub fn get_required<T: DeserializeOwned>(&self, key: &str) -> Result<T, StateError> {
        match self.get_raw(key) {
            Some(serde_json::Value::Null) | None => Err(StateError::missing(key, "working")),
            Some(value) => decode(key, value),
        }
    }

    /// Reads an optional value.
    ///
    /// # Errors
    ///
    /// Returns `StateError::TypeMismatch` if the value does not decode as `T`.
    pub fn get_optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
        match self.get_raw(key) {
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(value) => decode(key, value).map(Some),
        }
    }

    /// Stores a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Serialization` if the value cannot be encoded.
    pub fn put<T: Serialize + ?Sized>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), StateError> {
        let value =
            serde_json::to_value(value).map_err(|e| StateError::Serialization(e.to_string()))?;
        self.put_raw(key, value);
        Ok(())
    }

    /// Stores a raw JSON value, replacing any previous one.
    pub fn put_raw(&self, key: impl Into<String>, value: serde_json::Value) {
        self.data.write().insert(key.into(), value);
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Clone for FlightMap {
    fn clone(&self) -> Self {
        Self {
            data: RwLock::new(self.data.read().clone()),
        }
    }
}

/// The immutable partition, fixed when a job is submitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputParameters {
    values: HashMap<String, serde_json::Value>,
}

impl InputParameters {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates parameters from existing data.
    #[must_use]
    pub fn from_data(values: HashMap<String, serde_json::Value>) -> Self {
        Self { values }
    }

    /// Adds a parameter. Only usable while the parameters are being built.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub(crate) fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    /// Gets the raw JSON value for a key.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Reads a required parameter.
    ///
    /// # Errors
    ///
    /// Returns `StateError::MissingRequiredField` if the key is absent or null,
    /// and `StateError::TypeMismatch` if it does not decode as `T`.
    pub fn get_required<T: DeserializeOwned>(&self, key: &str) -> Result<T, StateError> {
        match self.values.get(key) {
            Some(serde_json::Value::Null) | None => Err(StateError::missing(key, "inputs")),
            Some(value) => decode(key, value.clone()),
        }
    }

    /// Reads an optional parameter.
    ///
    /// # Errors
    ///
    /// Returns `StateError::TypeMismatch` if the value does not decode as `T`.
    pub fn get_optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
        match self.values.get(key) {
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(value) => decode(key, value.clone()).map(Some),
        }
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns a copy of all parameters.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        self.values.clone()
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
