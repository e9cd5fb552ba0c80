//! Tests for error types

use std::error::Error as _;

use prometheus_schedules::core::FrameworkError;

#[test]
fn test_error_display() {
    assert_eq!(
        FrameworkError::Configuration("bad".into()).to_string(),
        "configuration error: bad"
    );
    assert_eq!(FrameworkError::Logic("twice".into()).to_string(), "logic error: twice");
    assert_eq!(
        FrameworkError::OutOfRange("sid 3".into()).to_string(),
        "out of range: sid 3"
    );
    assert_eq!(
        FrameworkError::PoolShutdown.to_string(),
        "task pool has been shut down"
    );
}

#[test]
fn test_service_creation_keeps_maker_error() {
    let err = FrameworkError::ServiceCreation {
        type_name: "demo::Db",
        source: anyhow::anyhow!("connection refused"),
    };
    assert_eq!(err.to_string(), "failed to construct service of type `demo::Db`");
    assert_eq!(
        err.source().map(ToString::to_string).as_deref(),
        Some("connection refused")
    );
}

#[test]
fn test_errors_convert_into_anyhow() {
    let result: anyhow::Result<()> = Err(FrameworkError::NotFound("x".into()).into());
    let err = result.unwrap_err();
    assert!(err.downcast_ref::<FrameworkError>().is_some());
}
