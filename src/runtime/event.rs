//! Event data model handed between sources, modules and lifecycle signals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one event within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EventId {
    /// Run number.
    pub run: u32,
    /// Subrun number within the run.
    pub subrun: u32,
    /// Event number within the subrun.
    pub event: u64,
}

impl EventId {
    /// Create an event id.
    #[must_use]
    pub const fn new(run: u32, subrun: u32, event: u64) -> Self {
        Self { run, subrun, event }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run: {} subRun: {} event: {}", self.run, self.subrun, self.event)
    }
}

/// An event as produced by an [`EventSource`](super::EventSource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identity of the event.
    pub id: EventId,
    /// Opaque event data; modules read and extend it.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    /// Create an event with an empty object payload.
    #[must_use]
    pub fn new(id: EventId) -> Self {
        Self {
            id,
            payload: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Static description of a configured module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleDescription {
    /// Configuration label of the module instance.
    pub label: String,
    /// Module type name.
    pub type_name: String,
}

impl ModuleDescription {
    /// Create a module description.
    pub fn new(label: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            type_name: type_name.into(),
        }
    }
}

impl fmt::Display for ModuleDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.label)
    }
}
