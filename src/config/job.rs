//! Job-level configuration: schedule/thread counts and configured services.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::ParameterSet;
use crate::core::{FrameworkError, ScheduleCount, ScheduleID};

/// Environment variable holding the schedule count.
pub const NUM_SCHEDULES_ENV: &str = "SCHEDULES_NUM_SCHEDULES";
/// Environment variable holding the worker thread count.
pub const NUM_THREADS_ENV: &str = "SCHEDULES_NUM_THREADS";

/// One configured service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Name the service maker was registered under.
    pub service_type: String,
    /// Parameters passed to the maker.
    #[serde(default)]
    pub params: ParameterSet,
}

impl ServiceConfig {
    /// Create a service entry.
    pub fn new(service_type: impl Into<String>, params: ParameterSet) -> Self {
        Self {
            service_type: service_type.into(),
            params,
        }
    }
}

/// Root job configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Number of concurrently running schedules.
    pub num_schedules: usize,
    /// Number of worker threads.
    pub num_threads: usize,
    /// Services in construction order.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            num_schedules: 1,
            num_threads: 1,
            services: Vec::new(),
        }
    }
}

impl JobConfig {
    /// Create a configuration with no services.
    #[must_use]
    pub const fn new(num_schedules: usize, num_threads: usize) -> Self {
        Self {
            num_schedules,
            num_threads,
            services: Vec::new(),
        }
    }

    /// Append a configured service.
    #[must_use]
    pub fn with_service(mut self, service_type: impl Into<String>, params: ParameterSet) -> Self {
        self.services.push(ServiceConfig::new(service_type, params));
        self
    }

    /// Validate counts and service names.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Configuration` describing the first problem found.
    pub fn validate(&self) -> Result<(), FrameworkError> {
        if self.num_schedules == 0 {
            return Err(FrameworkError::Configuration(
                "num_schedules must be greater than 0".into(),
            ));
        }
        if self.num_schedules > ScheduleID::max_schedules() {
            return Err(FrameworkError::Configuration(format!(
                "num_schedules must not exceed {}",
                ScheduleID::max_schedules()
            )));
        }
        if self.num_threads == 0 {
            return Err(FrameworkError::Configuration(
                "num_threads must be greater than 0".into(),
            ));
        }
        let mut seen = HashSet::new();
        for service in &self.services {
            if service.service_type.is_empty() {
                return Err(FrameworkError::Configuration(
                    "service_type must not be empty".into(),
                ));
            }
            if !seen.insert(service.service_type.as_str()) {
                return Err(FrameworkError::Configuration(format!(
                    "service `{}` configured more than once",
                    service.service_type
                )));
            }
        }
        Ok(())
    }

    /// Parse job configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Configuration` on parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, FrameworkError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| FrameworkError::Configuration(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build a configuration from the environment, loading `.env` first.
    ///
    /// The schedule count defaults to 1 and the thread count to the number
    /// of logical CPUs.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Configuration` if a variable is not a number or the
    /// result fails validation.
    pub fn from_env() -> Result<Self, FrameworkError> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        let cfg = Self {
            num_schedules: env_count(NUM_SCHEDULES_ENV)?.unwrap_or(1),
            num_threads: env_count(NUM_THREADS_ENV)?.unwrap_or_else(num_cpus::get),
            services: Vec::new(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Configured entry for `service_type`.
    #[must_use]
    pub fn service(&self, service_type: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.service_type == service_type)
    }
}

impl ScheduleCount for JobConfig {
    fn num_schedules(&self) -> usize {
        self.num_schedules
    }
}

fn env_count(var: &str) -> Result<Option<usize>, FrameworkError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| FrameworkError::Configuration(format!("{var}={raw:?} is not a count: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_counts() {
        assert!(JobConfig::new(2, 4).validate().is_ok());
        assert!(JobConfig::new(0, 4).validate().is_err());
        assert!(JobConfig::new(2, 0).validate().is_err());
        assert!(JobConfig::new(usize::from(u16::MAX) + 1, 1).validate().is_err());
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let cfg = JobConfig::new(1, 1)
            .with_service("Tracer", ParameterSet::new())
            .with_service("Tracer", ParameterSet::new());
        assert!(matches!(cfg.validate(), Err(FrameworkError::Configuration(_))));
    }

    #[test]
    fn test_from_json_str() {
        let cfg = JobConfig::from_json_str(
            r#"{
                "num_schedules": 3,
                "num_threads": 2,
                "services": [{"service_type": "Tracer", "params": {"indentation": "--"}}]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.num_schedules(), 3);
        let tracer = cfg.service("Tracer").unwrap();
        assert_eq!(tracer.params.get::<String>("indentation").unwrap(), "--");
        assert!(JobConfig::from_json_str("{").is_err());
        assert!(JobConfig::from_json_str(r#"{"num_schedules":0,"num_threads":1}"#).is_err());
    }
}
