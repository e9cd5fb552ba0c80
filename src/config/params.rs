//! Opaque parameter sets handed to service makers and `reconfigure`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::FrameworkError;

/// JSON object of named parameters.
///
/// The framework never interprets a parameter set; it passes it unchanged
/// to whichever service it was configured for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: Map<String, Value>,
}

impl ParameterSet {
    /// Create an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed value of `key`.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Configuration` if the key is missing or has the
    /// wrong type.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, FrameworkError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| FrameworkError::Configuration(format!("missing parameter `{key}`")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| FrameworkError::Configuration(format!("parameter `{key}` invalid: {e}")))
    }

    /// Typed value of `key`, or `default` when the key is absent.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Configuration` if the key is present with the wrong type.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, FrameworkError> {
        if self.values.contains_key(key) {
            self.get(key)
        } else {
            Ok(default)
        }
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Configuration` if `value` cannot be represented as JSON.
    pub fn put<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<(), FrameworkError> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| FrameworkError::Configuration(format!("parameter `{key}` invalid: {e}")))?;
        self.values.insert(key, value);
        Ok(())
    }

    /// Builder-style [`ParameterSet::put`] for values that always serialise.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Whether the set holds no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Map<String, Value>> for ParameterSet {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}
