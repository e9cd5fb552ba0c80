//! Tests for service builders

use std::sync::Arc;

use prometheus_schedules::builders::build_services;
use prometheus_schedules::config::{JobConfig, ParameterSet};
use prometheus_schedules::core::{FrameworkError, ScheduleContext};
use prometheus_schedules::services::{Service, ServiceMakers};

struct Legacy;
impl Service for Legacy {}

#[test]
fn test_build_empty_job() {
    let token = build_services(
        &JobConfig::new(2, 2),
        &ServiceMakers::new(),
        Arc::new(ScheduleContext::new(2)),
    )
    .unwrap();
    assert!(token.manager().unwrap().is_empty());
}

#[test]
fn test_legacy_service_rejected_in_parallel_job() {
    let mut makers = ServiceMakers::new();
    makers.register_legacy("Legacy", |_, _| Ok(Arc::new(Legacy)));
    let cfg = JobConfig::new(2, 2).with_service("Legacy", ParameterSet::new());
    assert!(matches!(
        build_services(&cfg, &makers, Arc::new(ScheduleContext::new(2))),
        Err(FrameworkError::Logic(_))
    ));

    let serial = JobConfig::new(1, 1).with_service("Legacy", ParameterSet::new());
    assert!(build_services(&serial, &makers, Arc::new(ScheduleContext::new(1))).is_ok());
}

#[test]
fn test_invalid_config_rejected() {
    assert!(matches!(
        build_services(
            &JobConfig::new(0, 1),
            &ServiceMakers::new(),
            Arc::new(ScheduleContext::new(0)),
        ),
        Err(FrameworkError::Configuration(_))
    ));
}
