//! Typed, scope-aware service lookup.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use super::maker::typed;
use super::{LegacyScope, ScopeMarker, ServiceInterface, ServiceScope, ServiceToken};
use crate::core::{FrameworkError, ScheduleID};

/// Accessor for service `T` resolved once, at construction, through a
/// [`ServiceToken`].
///
/// `T` is a service type or a `dyn` interface a service was registered
/// under. `S` is the scope the caller expects: [`LegacyScope`] (the default)
/// accepts legacy and shared services, `SharedScope` only shared ones and
/// `PerScheduleScope` resolves the instance of the calling schedule.
pub struct ServiceHandle<T: ?Sized + ServiceInterface, S: ScopeMarker = LegacyScope> {
    instance: Arc<T>,
    _scope: PhantomData<fn() -> S>,
}

impl<T: ?Sized + ServiceInterface, S: ScopeMarker> ServiceHandle<T, S> {
    /// Resolve `T`. Per-schedule services resolve the instance of the
    /// schedule the caller is running in.
    ///
    /// # Errors
    ///
    /// `FrameworkError::ServiceNotFound` wrapping the lookup failure: a
    /// missing service, a scope mismatch, or a per-schedule lookup from
    /// outside any schedule.
    pub fn new(token: &ServiceToken) -> Result<Self, FrameworkError> {
        Self::resolve(token, None).map_err(|e| FrameworkError::service_not_found(type_name::<T>(), e))
    }

    /// Resolve `T`, using schedule `sid` for per-schedule services.
    ///
    /// # Errors
    ///
    /// As [`ServiceHandle::new`].
    pub fn for_schedule(token: &ServiceToken, sid: ScheduleID) -> Result<Self, FrameworkError> {
        Self::resolve(token, Some(sid)).map_err(|e| FrameworkError::service_not_found(type_name::<T>(), e))
    }

    fn resolve(token: &ServiceToken, sid: Option<ScheduleID>) -> Result<Self, FrameworkError> {
        let manager = token
            .manager()
            .ok_or_else(|| FrameworkError::NotFound("service token is empty".into()))?;
        let wrapper = manager.wrapper::<T>()?;
        let scope = wrapper.scope();
        if !S::accepts(scope) {
            return Err(FrameworkError::Logic(format!(
                "service is {scope} but was requested as {}",
                S::SCOPE
            )));
        }
        let wrapper = typed::<T>(&wrapper)?;
        let instance = if scope == ServiceScope::PerSchedule {
            let sid = sid.unwrap_or_else(|| manager.context().current_schedule_id());
            if !sid.is_valid() {
                return Err(FrameworkError::Logic(
                    "per-schedule service requested outside of any schedule".into(),
                ));
            }
            Arc::clone(wrapper.instance_for(sid)?)
        } else {
            Arc::clone(wrapper.instance()?)
        };
        Ok(Self {
            instance,
            _scope: PhantomData,
        })
    }

    /// The resolved service.
    #[must_use]
    pub fn get(&self) -> &T {
        &self.instance
    }

    /// Shared ownership of the resolved service.
    #[must_use]
    pub fn shared(&self) -> Arc<T> {
        Arc::clone(&self.instance)
    }
}

impl<T: ?Sized + ServiceInterface, S: ScopeMarker> Deref for ServiceHandle<T, S> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.instance
    }
}

impl<T: ?Sized + ServiceInterface, S: ScopeMarker> Clone for ServiceHandle<T, S> {
    fn clone(&self) -> Self {
        Self {
            instance: Arc::clone(&self.instance),
            _scope: PhantomData,
        }
    }
}

impl<T: ?Sized + ServiceInterface, S: ScopeMarker> fmt::Debug for ServiceHandle<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("type", &type_name::<T>())
            .field("scope", &S::SCOPE)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ScheduleContext;
    use crate::runtime::TaskPool;
    use crate::services::{PerScheduleScope, Service, ServiceWrapper, ServicesManager, SharedScope};
    use std::error::Error as _;

    struct Geometry {
        name: &'static str,
    }
    impl Service for Geometry {}

    struct Cache {
        sid: ScheduleID,
    }
    impl Service for Cache {}

    fn token(num_schedules: usize) -> ServiceToken {
        let ctx = Arc::new(ScheduleContext::new(num_schedules));
        let manager = ServicesManager::new(ctx, 1);
        manager
            .put(ServiceWrapper::shared(Arc::new(Geometry { name: "geo" })))
            .unwrap();
        manager
            .put(ServiceWrapper::per_schedule(
                crate::core::schedule_ids(num_schedules)
                    .map(|sid| Arc::new(Cache { sid }))
                    .collect(),
            ))
            .unwrap();
        ServiceToken::new(manager)
    }

    #[test]
    fn test_shared_through_legacy_and_shared_handles() {
        let token = token(2);
        let legacy: ServiceHandle<Geometry> = ServiceHandle::new(&token).unwrap();
        let shared: ServiceHandle<Geometry, SharedScope> = ServiceHandle::new(&token).unwrap();
        assert_eq!(legacy.name, "geo");
        assert!(Arc::ptr_eq(&legacy.shared(), &shared.shared()));
    }

    #[test]
    fn test_scope_mismatch_wrapped() {
        let token = token(2);
        let err = ServiceHandle::<Geometry, PerScheduleScope>::new(&token).unwrap_err();
        match &err {
            FrameworkError::ServiceNotFound { type_name, source } => {
                assert!(type_name.ends_with("Geometry"));
                assert!(matches!(**source, FrameworkError::Logic(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(err.source().is_some());
    }

    #[test]
    fn test_missing_service_wrapped() {
        struct Absent;
        impl Service for Absent {}
        let err = ServiceHandle::<Absent>::new(&token(1)).unwrap_err();
        assert!(matches!(err, FrameworkError::ServiceNotFound { .. }));
        let err = ServiceHandle::<Absent>::new(&ServiceToken::empty()).unwrap_err();
        assert!(matches!(err, FrameworkError::ServiceNotFound { .. }));
    }

    #[test]
    fn test_per_schedule_outside_schedule_fails() {
        let token = token(2);
        assert!(ServiceHandle::<Cache, PerScheduleScope>::new(&token).is_err());
        let explicit =
            ServiceHandle::<Cache, PerScheduleScope>::for_schedule(&token, ScheduleID::new(1).unwrap())
                .unwrap();
        assert_eq!(explicit.sid.id(), 1);
    }

    #[test]
    fn test_per_schedule_resolves_current_schedule() {
        let token = token(2);
        let manager = Arc::clone(token.manager().unwrap());
        let _active = manager.context().enter();
        let pool = TaskPool::new(2).unwrap();
        let handles: Vec<_> = crate::core::schedule_ids(2)
            .map(|sid| {
                let token = token.clone();
                pool.spawn_schedule(sid, move || {
                    ServiceHandle::<Cache, PerScheduleScope>::new(&token)
                        .map(|cache| cache.sid)
                        .unwrap()
                })
                .unwrap()
            })
            .collect();
        let seen: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(seen, vec![ScheduleID::new(0).unwrap(), ScheduleID::new(1).unwrap()]);
        pool.shutdown();
    }
}
