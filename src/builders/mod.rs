//! Builders that assemble runtime components from configuration.

pub mod services_builder;

pub use services_builder::{build_services, build_services_with_parent};
