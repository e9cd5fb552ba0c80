//! Tests for schedule identity

use prometheus_schedules::core::{schedule_ids, ScheduleID, ScheduleIdSize};

#[test]
fn test_every_valid_index_round_trips() {
    for n in 0..usize::from(ScheduleIdSize::MAX) {
        let sid = ScheduleID::new(n).unwrap();
        assert_eq!(sid.id(), n);
        assert!(sid.is_valid());
    }
}

#[test]
fn test_sentinel_rejected() {
    assert!(ScheduleID::new(usize::from(ScheduleIdSize::MAX)).is_err());
    assert!(ScheduleID::new(usize::from(ScheduleIdSize::MAX) + 1).is_err());
    assert!(ScheduleID::try_from(usize::MAX).is_err());
}

#[test]
fn test_first_last_next() {
    assert!(ScheduleID::first() < ScheduleID::last());
    assert_eq!(ScheduleID::first().next(), ScheduleID::new(1).unwrap());
    assert!(!ScheduleID::last().next().is_valid());
    assert!(!ScheduleID::default().is_valid());
}

#[test]
fn test_schedule_ids_iterates_in_order() {
    let ids: Vec<usize> = schedule_ids(4).map(ScheduleID::id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
}

#[test]
fn test_serde_is_transparent() {
    let sid = ScheduleID::new(5).unwrap();
    assert_eq!(serde_json::to_string(&sid).unwrap(), "5");
    let back: ScheduleID = serde_json::from_str("5").unwrap();
    assert_eq!(back, sid);
}
