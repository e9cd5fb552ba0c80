//! Tests for per-schedule storage

use prometheus_schedules::config::JobConfig;
use prometheus_schedules::core::{FrameworkError, PerScheduleContainer, ScheduleID};

#[test]
fn test_resize_then_second_resize_fails() {
    let c: PerScheduleContainer<i32> = PerScheduleContainer::new();
    c.resize(3).unwrap();
    assert_eq!(c.size(), 3);
    assert!(c.is_valid());
    assert!(matches!(c.resize(3), Err(FrameworkError::Logic(_))));
}

#[test]
fn test_expand_from_job_config() {
    let c: PerScheduleContainer<Vec<u8>> = PerScheduleContainer::new();
    c.expand_to_num_schedules(&JobConfig::new(4, 1)).unwrap();
    assert_eq!(c.size(), 4);
}

#[test]
fn test_for_each_and_take_all() {
    let c: PerScheduleContainer<usize> = PerScheduleContainer::new();
    c.resize(3).unwrap();
    c.for_each(|sid, v| *v = sid.id() * 10);
    assert_eq!(*c.at(ScheduleID::new(2).unwrap()).unwrap(), 20);
    assert_eq!(c.take_all(), vec![0, 10, 20]);
    assert_eq!(c.size(), 0);
    assert!(c.is_valid());
}
