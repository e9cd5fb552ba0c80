//! Error types for schedule, signal and service operations.

use thiserror::Error;

/// Errors produced by framework components.
///
/// All variants are raised synchronously at the point of violation and are
/// never retried by the framework itself.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// Invalid configuration value (e.g. a schedule index at or above the sentinel).
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Operation not permitted in the current state.
    #[error("logic error: {0}")]
    Logic(String),
    /// Schedule index outside the configured range.
    #[error("out of range: {0}")]
    OutOfRange(String),
    /// Raw lookup failure in the services manager.
    #[error("not found: {0}")]
    NotFound(String),
    /// A service handle could not resolve its service.
    #[error("service not found: unable to resolve service of type `{type_name}`")]
    ServiceNotFound {
        /// Type name of the requested service.
        type_name: &'static str,
        /// Underlying lookup failure.
        #[source]
        source: Box<FrameworkError>,
    },
    /// A service maker returned an error.
    #[error("failed to construct service of type `{type_name}`")]
    ServiceCreation {
        /// Type name of the service being constructed.
        type_name: &'static str,
        /// Error returned by the maker.
        #[source]
        source: anyhow::Error,
    },
    /// A task panicked while executing.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
    /// The task pool no longer accepts work.
    #[error("task pool has been shut down")]
    PoolShutdown,
}

impl FrameworkError {
    /// Wrap a lookup failure with the type name of the requested service.
    pub fn service_not_found(type_name: &'static str, source: Self) -> Self {
        Self::ServiceNotFound {
            type_name,
            source: Box::new(source),
        }
    }
}

/// Application-facing result using anyhow for user-supplied code
/// (service constructors, module processing).
pub type AppResult<T> = Result<T, anyhow::Error>;
