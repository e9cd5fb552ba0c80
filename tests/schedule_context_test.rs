//! Integration tests for resolving the current schedule from pool tasks

use std::sync::Arc;

use prometheus_schedules::core::{schedule_ids, ScheduleContext, ScheduleID};
use prometheus_schedules::runtime::TaskPool;

#[test]
fn test_invalid_outside_any_schedule() {
    let context = ScheduleContext::new(2);
    assert!(!context.current_schedule_id().is_valid());

    let pool = TaskPool::new(2).unwrap();
    let context = Arc::new(context);
    let ctx = Arc::clone(&context);
    let sid = pool.spawn(move || ctx.current_schedule_id()).unwrap().join().unwrap();
    assert!(!sid.is_valid());
}

#[test]
fn test_invalid_when_context_inactive() {
    let pool = TaskPool::new(1).unwrap();
    let context = Arc::new(ScheduleContext::new(1));
    let ctx = Arc::clone(&context);
    let sid = pool
        .spawn_schedule(ScheduleID::first(), move || ctx.current_schedule_id())
        .unwrap()
        .join()
        .unwrap();
    assert!(!sid.is_valid());
}

#[test]
fn test_nested_subtask_resolves_its_schedule() {
    let pool = Arc::new(TaskPool::new(4).unwrap());
    let context = Arc::new(ScheduleContext::new(3));
    let _active = context.enter();

    let handles: Vec<_> = schedule_ids(3)
        .map(|sid| {
            let pool_inner = Arc::clone(&pool);
            let ctx = Arc::clone(&context);
            pool.spawn_schedule(sid, move || {
                let child_pool = Arc::clone(&pool_inner);
                let ctx_child = Arc::clone(&ctx);
                let child = pool_inner
                    .spawn(move || {
                        let ctx_grandchild = Arc::clone(&ctx_child);
                        child_pool
                            .spawn(move || ctx_grandchild.current_schedule_id())
                            .unwrap()
                            .join()
                            .unwrap()
                    })
                    .unwrap();
                (ctx.current_schedule_id(), child.join().unwrap())
            })
            .unwrap()
        })
        .collect();

    for (sid, handle) in schedule_ids(3).zip(handles) {
        let (own, nested) = handle.join().unwrap();
        assert_eq!(own, sid);
        assert_eq!(nested, sid);
    }
}

#[test]
fn test_spawn_schedule_rejects_invalid_id() {
    let pool = TaskPool::new(1).unwrap();
    assert!(pool.spawn_schedule(ScheduleID::invalid(), || ()).is_err());
}

#[test]
fn test_panicking_task_reported() {
    let pool = TaskPool::new(1).unwrap();
    let handle = pool.spawn(|| panic!("boom")).unwrap();
    let err = handle.join().unwrap_err();
    assert!(err.to_string().contains("boom"));
    // The worker survives the panic.
    assert_eq!(pool.spawn(|| 7).unwrap().join().unwrap(), 7);
}

#[cfg(feature = "tokio-runtime")]
#[tokio::test]
async fn test_async_scope_installs_schedule() {
    let context = Arc::new(ScheduleContext::new(2));
    let _active = context.enter();
    let sid = ScheduleID::new(1).unwrap();
    let ctx = Arc::clone(&context);
    let seen = ScheduleContext::scope_async(sid, async move { ctx.current_schedule_id() }).await;
    assert_eq!(seen, sid);
    assert!(!context.current_schedule_id().is_valid());
}
