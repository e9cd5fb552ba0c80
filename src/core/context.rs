//! Current-schedule oracle.
//!
//! A [`ScheduleContext`] answers "which schedule does the calling code
//! belong to?" from anywhere inside schedule-scoped work, including
//! sub-tasks spawned for intra-module parallelism. It is explicitly
//! constructed per job and shared by `Arc`; there is no process-wide
//! instance.
//!
//! # Lookup
//!
//! 1. If no schedule-dispatch loop is active, the answer is
//!    [`ScheduleID::invalid`] without inspecting any task.
//! 2. Otherwise the currently executing pool task and its parents are
//!    walked until a schedule marker task is found. Ordinary sub-tasks are
//!    walked through.
//! 3. With the `tokio-runtime` feature, a schedule installed on the current
//!    tokio task via [`ScheduleContext::scope_async`] is used when no pool
//!    task is executing.
//!
//! An invalid answer is not an error: it means the caller is not running
//! inside schedule-scoped work.

use std::sync::atomic::{AtomicBool, Ordering};

use super::{ScheduleCount, ScheduleID};
use crate::runtime::task;

#[cfg(feature = "tokio-runtime")]
tokio::task_local! {
    static ASYNC_SCHEDULE: ScheduleID;
}

/// Per-job oracle recording whether schedules are running and resolving
/// the schedule of the calling task.
#[derive(Debug)]
pub struct ScheduleContext {
    in_context: AtomicBool,
    num_schedules: usize,
}

impl ScheduleContext {
    /// Create a context for a job with `num_schedules` schedules, not yet active.
    #[must_use]
    pub const fn new(num_schedules: usize) -> Self {
        Self {
            in_context: AtomicBool::new(false),
            num_schedules,
        }
    }

    /// Mark the schedule-dispatch loop as active. Returns the previous state.
    pub fn set_context(&self) -> bool {
        self.in_context.swap(true, Ordering::AcqRel)
    }

    /// Mark the schedule-dispatch loop as inactive. Returns the previous state.
    pub fn reset_context(&self) -> bool {
        self.in_context.swap(false, Ordering::AcqRel)
    }

    /// Whether a schedule-dispatch loop is active.
    pub fn in_context(&self) -> bool {
        self.in_context.load(Ordering::Acquire)
    }

    /// Activate the context until the returned guard is dropped, at which
    /// point the previous state is restored.
    #[must_use = "the context is deactivated when the guard is dropped"]
    pub fn enter(&self) -> ContextGuard<'_> {
        let previous = self.set_context();
        ContextGuard {
            context: self,
            previous,
        }
    }

    /// Schedule of the calling code, or invalid when there is none.
    pub fn current_schedule_id(&self) -> ScheduleID {
        if !self.in_context() {
            return ScheduleID::invalid();
        }
        if let Some(sid) = task::current_schedule_marker() {
            return sid;
        }
        #[cfg(feature = "tokio-runtime")]
        if let Ok(sid) = ASYNC_SCHEDULE.try_with(|sid| *sid) {
            return sid;
        }
        ScheduleID::invalid()
    }

    /// Run `fut` with `sid` installed as the schedule of the current tokio task.
    #[cfg(feature = "tokio-runtime")]
    pub async fn scope_async<F>(sid: ScheduleID, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        ASYNC_SCHEDULE.scope(sid, fut).await
    }
}

impl ScheduleCount for ScheduleContext {
    fn num_schedules(&self) -> usize {
        self.num_schedules
    }
}

/// Restores the previous context state on drop.
#[derive(Debug)]
pub struct ContextGuard<'a> {
    context: &'a ScheduleContext,
    previous: bool,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if !self.previous {
            self.context.reset_context();
        }
    }
}
