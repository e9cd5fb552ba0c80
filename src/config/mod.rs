//! Configuration models for jobs and services.

pub mod job;
pub mod params;

pub use job::{JobConfig, ServiceConfig, NUM_SCHEDULES_ENV, NUM_THREADS_ENV};
pub use params::ParameterSet;
