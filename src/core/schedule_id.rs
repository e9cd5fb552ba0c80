//! Validated identifier for one of the N parallel schedules.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::FrameworkError;

/// Raw representation of a schedule identifier.
pub type ScheduleIdSize = u16;

/// Identifier of one schedule, or the invalid sentinel.
///
/// Valid values lie in `[0, ScheduleIdSize::MAX - 1]`; `ScheduleIdSize::MAX`
/// is reserved for "invalid" and sorts after every valid id.
///
/// ```
/// use prometheus_schedules::core::ScheduleID;
///
/// let sid = ScheduleID::new(2).unwrap();
/// assert_eq!(sid.id(), 2);
/// assert!(sid.is_valid());
/// assert!(!ScheduleID::default().is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleID {
    id: ScheduleIdSize,
}

impl ScheduleID {
    const INVALID: ScheduleIdSize = ScheduleIdSize::MAX;

    /// Construct from a raw index.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Configuration` if `id` is at or above the sentinel.
    pub fn new(id: usize) -> Result<Self, FrameworkError> {
        match ScheduleIdSize::try_from(id) {
            Ok(raw) if raw != Self::INVALID => Ok(Self { id: raw }),
            _ => Err(FrameworkError::Configuration(format!(
                "schedule id {id} exceeds the maximum of {}",
                Self::INVALID - 1
            ))),
        }
    }

    /// The invalid sentinel.
    #[must_use]
    pub const fn invalid() -> Self {
        Self { id: Self::INVALID }
    }

    /// Smallest valid id.
    #[must_use]
    pub const fn first() -> Self {
        Self { id: 0 }
    }

    /// Largest valid id.
    #[must_use]
    pub const fn last() -> Self {
        Self {
            id: Self::INVALID - 1,
        }
    }

    /// Largest number of schedules a job can run.
    #[must_use]
    pub const fn max_schedules() -> usize {
        Self::INVALID as usize
    }

    /// The following id. `last().next()` and `invalid().next()` are invalid.
    #[must_use]
    pub const fn next(self) -> Self {
        Self {
            id: self.id.saturating_add(1),
        }
    }

    /// Raw value, for use as an index or map key.
    #[must_use]
    pub const fn id(self) -> usize {
        self.id as usize
    }

    /// Whether this is a real schedule rather than the sentinel.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.id != Self::INVALID
    }
}

impl Default for ScheduleID {
    fn default() -> Self {
        Self::invalid()
    }
}

impl TryFrom<usize> for ScheduleID {
    type Error = FrameworkError;

    fn try_from(id: usize) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl fmt::Display for ScheduleID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.id)
        } else {
            f.write_str("invalid")
        }
    }
}

/// Iterator over the ids `0..n`.
pub fn schedule_ids(n: usize) -> impl Iterator<Item = ScheduleID> {
    let n = n.min(ScheduleID::max_schedules());
    (0..n).filter_map(|i| ScheduleID::new(i).ok())
}
