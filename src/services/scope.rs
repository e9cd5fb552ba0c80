//! Service scopes and the marker types used to request them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Concurrency contract of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceScope {
    /// One instance with no concurrency guarantee; only usable in jobs with
    /// one schedule and one thread.
    Legacy,
    /// One instance that must be safe to call from every schedule at once.
    Shared,
    /// One instance per schedule; each schedule only touches its own.
    PerSchedule,
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Legacy => "legacy",
            Self::Shared => "shared",
            Self::PerSchedule => "per-schedule",
        };
        f.write_str(name)
    }
}

/// What a manager built over a parent token does with a configured service
/// the parent already provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceOverlap {
    /// Refuse the configuration.
    #[default]
    OverlapIsError,
    /// Keep the parent's service and ignore the configured one.
    TokenOverrides,
    /// Drop the parent's service in favour of the configured one.
    ConfigurationOverrides,
}

/// Scope requested by a [`ServiceHandle`](super::ServiceHandle).
pub trait ScopeMarker: Send + Sync + 'static {
    /// Scope this marker stands for.
    const SCOPE: ServiceScope;

    /// Whether a handle of this scope may resolve a service of `scope`.
    #[must_use]
    fn accepts(scope: ServiceScope) -> bool {
        scope == Self::SCOPE
    }
}

/// Requests a legacy service; shared services are accepted too.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyScope;

/// Requests a shared service.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedScope;

/// Requests the current schedule's instance of a per-schedule service.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerScheduleScope;

impl ScopeMarker for LegacyScope {
    const SCOPE: ServiceScope = ServiceScope::Legacy;

    fn accepts(scope: ServiceScope) -> bool {
        matches!(scope, ServiceScope::Legacy | ServiceScope::Shared)
    }
}

impl ScopeMarker for SharedScope {
    const SCOPE: ServiceScope = ServiceScope::Shared;
}

impl ScopeMarker for PerScheduleScope {
    const SCOPE: ServiceScope = ServiceScope::PerSchedule;
}
