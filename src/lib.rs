//! # Prometheus Schedules
//!
//! Schedule-aware concurrency, ordered signal dispatch and scoped services
//! for multi-schedule batch event processing.
//!
//! A job runs N independent schedules concurrently. Each schedule pulls one
//! event at a time and runs the configured modules over it, while services
//! provide cross-cutting capabilities either as one shared instance or as
//! one instance per schedule.
//!
//! ## Core Problem Solved
//!
//! Code running deep inside a schedule (in a module, a service callback or
//! a sub-task spawned for intra-module parallelism) needs to know which
//! schedule it belongs to, and services need to observe the job's
//! lifecycle with a deterministic ordering:
//!
//! - **Current schedule**: [`core::ScheduleContext`] recovers the
//!   [`core::ScheduleID`] of the calling task by walking its parent tasks
//!   to the schedule's marker task
//! - **Ordered signals**: [`signals::GlobalSignal`] and
//!   [`signals::LocalSignal`] fire their slots FIFO or LIFO, job-wide or
//!   per schedule
//! - **Scoped services**: [`services::ServiceHandle`] resolves a legacy,
//!   shared or per-schedule service and refuses scope mismatches
//! - **Per-schedule storage**: [`core::PerScheduleContainer`] holds one
//!   slot per schedule behind a short-lived lock
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use prometheus_schedules::config::JobConfig;
//! use prometheus_schedules::runtime::{EventProcessor, QueueSource};
//! use prometheus_schedules::services::ServiceToken;
//!
//! let processor = EventProcessor::new(
//!     JobConfig::new(2, 2),
//!     ServiceToken::empty(),
//!     Vec::new(),
//!     Arc::new(QueueSource::numbered(1, 10)),
//! )?;
//! let summary = processor.run()?;
//! assert_eq!(summary.total_events(), 10);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! For complete examples, see:
//! - `tests/event_processor_test.rs` - End-to-end runs with services
//! - `tests/signal_dispatch_test.rs` - Ordering and schedule isolation

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Schedule identity, per-schedule storage, the current-schedule oracle and errors.
pub mod core;
/// Configuration models for jobs and services.
pub mod config;
/// Builders to construct runtime components from configuration.
pub mod builders;
/// Ordered notification channels and the lifecycle signal registry.
pub mod signals;
/// Service construction, ownership and scoped lookup.
pub mod services;
/// Task pool, event data model and the multi-schedule event loop.
pub mod runtime;
/// Shared utilities.
pub mod util;
