//! Tests for configuration validation

use prometheus_schedules::config::{JobConfig, ParameterSet, ServiceConfig};
use prometheus_schedules::core::ScheduleCount;

#[test]
fn test_job_config_validation() {
    assert!(JobConfig::new(4, 8).validate().is_ok());
    assert!(JobConfig::default().validate().is_ok());
}

#[test]
fn test_job_config_invalid_counts() {
    assert!(JobConfig::new(0, 1).validate().is_err());
    assert!(JobConfig::new(1, 0).validate().is_err());
}

#[test]
fn test_job_config_empty_service_name() {
    let mut cfg = JobConfig::new(1, 1);
    cfg.services.push(ServiceConfig::new("", ParameterSet::new()));
    assert!(cfg.validate().is_err());
}

#[test]
fn test_job_config_from_json() {
    let cfg = JobConfig::from_json_str(r#"{"num_schedules": 2, "num_threads": 3}"#).unwrap();
    assert_eq!(cfg.num_schedules(), 2);
    assert_eq!(cfg.num_threads, 3);
    assert!(cfg.services.is_empty());
}

#[test]
fn test_job_config_round_trip() {
    let cfg = JobConfig::new(2, 2).with_service("Tracer", ParameterSet::new().with("indentation", ".."));
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(JobConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_parameter_set_typed_access() {
    let params = ParameterSet::new().with("threshold", 0.5).with("label", "calo");
    assert!((params.get::<f64>("threshold").unwrap() - 0.5).abs() < f64::EPSILON);
    assert_eq!(params.get::<String>("label").unwrap(), "calo");
    assert!(params.get::<bool>("label").is_err());
    assert!(!params.is_empty());
}
