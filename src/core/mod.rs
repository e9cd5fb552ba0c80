//! Schedule identity, per-schedule storage and the current-schedule oracle.

pub mod context;
pub mod error;
pub mod per_schedule;
pub mod schedule_id;

pub use context::{ContextGuard, ScheduleContext};
pub use error::{AppResult, FrameworkError};
pub use per_schedule::{PerScheduleContainer, ScheduleCount};
pub use schedule_id::{schedule_ids, ScheduleID, ScheduleIdSize};
