//! Unit tests for individual components

mod builders_test;
mod config_test;
mod error_test;
mod per_schedule_test;
mod schedule_id_test;
