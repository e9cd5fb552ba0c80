//! Type-erased ownership of constructed services.
//!
//! [`ServiceWrapper<T>`] holds the instance (or per-schedule instances) of
//! one service type, or of one `dyn` interface a service is exposed as.
//! [`ServiceWrapperBase`] erases `T` so the services manager can store
//! wrappers of every type in one table and reconfigure them without knowing
//! their types.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::ServiceScope;
use crate::config::ParameterSet;
use crate::core::{FrameworkError, ScheduleID};

/// A service that can be owned by the services manager.
pub trait Service: Send + Sync + 'static {
    /// Apply new parameters. The default ignores them.
    fn reconfigure(&self, _params: &ParameterSet) {}
}

/// Anything a service can be looked up as: a concrete [`Service`] or a
/// `dyn` interface one implements.
pub trait ServiceInterface: Send + Sync + 'static {}

impl<T: ?Sized + Send + Sync + 'static> ServiceInterface for T {}

enum Instances<T: ?Sized> {
    Single(Arc<T>),
    PerSchedule(Vec<Arc<T>>),
}

/// Owner of the instance(s) of service type `T`.
pub struct ServiceWrapper<T: ?Sized + ServiceInterface> {
    scope: ServiceScope,
    instances: Instances<T>,
    reconfigure: Option<fn(&T, &ParameterSet)>,
}

impl<T: Service> ServiceWrapper<T> {
    /// Wrap a legacy service.
    #[must_use]
    pub fn legacy(instance: Arc<T>) -> Self {
        Self::concrete(ServiceScope::Legacy, Instances::Single(instance))
    }

    /// Wrap a shared service.
    #[must_use]
    pub fn shared(instance: Arc<T>) -> Self {
        Self::concrete(ServiceScope::Shared, Instances::Single(instance))
    }

    /// Wrap per-schedule instances; element `i` belongs to schedule `i`.
    #[must_use]
    pub fn per_schedule(instances: Vec<Arc<T>>) -> Self {
        Self::concrete(ServiceScope::PerSchedule, Instances::PerSchedule(instances))
    }

    fn concrete(scope: ServiceScope, instances: Instances<T>) -> Self {
        Self {
            scope,
            instances,
            reconfigure: Some(T::reconfigure),
        }
    }
}

impl<T: ?Sized + ServiceInterface> ServiceWrapper<T> {
    /// View the instances of a service through interface `T`. Reconfiguring
    /// the view does nothing; the service itself is reconfigured through its
    /// own wrapper.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` if a legacy or shared view is not given
    /// exactly one instance.
    pub fn interface(scope: ServiceScope, mut instances: Vec<Arc<T>>) -> Result<Self, FrameworkError> {
        let instances = match (scope, instances.len()) {
            (ServiceScope::PerSchedule, _) => Instances::PerSchedule(instances),
            (_, 1) => Instances::Single(instances.remove(0)),
            (_, count) => {
                return Err(FrameworkError::Logic(format!(
                    "{scope} interface `{}` needs one instance, got {count}",
                    type_name::<T>()
                )))
            }
        };
        Ok(Self {
            scope,
            instances,
            reconfigure: None,
        })
    }

    /// Scope chosen at construction.
    #[must_use]
    pub const fn scope(&self) -> ServiceScope {
        self.scope
    }

    /// The single instance of a legacy or shared service.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` for a per-schedule service.
    pub fn instance(&self) -> Result<&Arc<T>, FrameworkError> {
        match &self.instances {
            Instances::Single(instance) => Ok(instance),
            Instances::PerSchedule(_) => Err(FrameworkError::Logic(format!(
                "service `{}` is per-schedule and needs a schedule id",
                type_name::<T>()
            ))),
        }
    }

    /// The instance belonging to schedule `sid` of a per-schedule service.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` for a single-instance service,
    /// `FrameworkError::OutOfRange` if `sid` has no instance.
    pub fn instance_for(&self, sid: ScheduleID) -> Result<&Arc<T>, FrameworkError> {
        match &self.instances {
            Instances::PerSchedule(instances) => instances.get(sid.id()).ok_or_else(|| {
                FrameworkError::OutOfRange(format!(
                    "schedule {sid} has no instance of `{}` ({} instances)",
                    type_name::<T>(),
                    instances.len()
                ))
            }),
            Instances::Single(_) => Err(FrameworkError::Logic(format!(
                "service `{}` is {} and has no per-schedule instances",
                type_name::<T>(),
                self.scope
            ))),
        }
    }

    /// Every instance held.
    pub fn instances(&self) -> impl Iterator<Item = &Arc<T>> {
        let all: &[Arc<T>] = match &self.instances {
            Instances::Single(instance) => std::slice::from_ref(instance),
            Instances::PerSchedule(instances) => instances,
        };
        all.iter()
    }
}

impl<T: ?Sized + ServiceInterface> fmt::Debug for ServiceWrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceWrapper")
            .field("type", &type_name::<T>())
            .field("scope", &self.scope)
            .field("instances", &self.instances().count())
            .finish()
    }
}

trait ErasedService: Send + Sync {
    fn scope(&self) -> ServiceScope;
    fn type_name(&self) -> &'static str;
    fn reconfigure_hook(&self, params: &ParameterSet);
    fn as_any(&self) -> &dyn Any;
}

impl<T: ?Sized + ServiceInterface> ErasedService for ServiceWrapper<T> {
    fn scope(&self) -> ServiceScope {
        self.scope
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn reconfigure_hook(&self, params: &ParameterSet) {
        if let Some(reconfigure) = self.reconfigure {
            for instance in self.instances() {
                reconfigure(&**instance, params);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A [`ServiceWrapper`] of any service type.
pub struct ServiceWrapperBase {
    service_type: TypeId,
    inner: Box<dyn ErasedService>,
}

impl ServiceWrapperBase {
    /// Erase the type of `wrapper`.
    #[must_use]
    pub fn new<T: ?Sized + ServiceInterface>(wrapper: ServiceWrapper<T>) -> Self {
        Self {
            service_type: TypeId::of::<T>(),
            inner: Box::new(wrapper),
        }
    }

    /// `TypeId` of the wrapped service type.
    #[must_use]
    pub const fn service_type(&self) -> TypeId {
        self.service_type
    }

    /// Name of the wrapped service type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    /// Scope of the wrapped service.
    #[must_use]
    pub fn scope(&self) -> ServiceScope {
        self.inner.scope()
    }

    /// Pass `params` to every wrapped instance.
    pub fn reconfigure(&self, params: &ParameterSet) {
        debug!(service = self.type_name(), "reconfiguring service");
        self.inner.reconfigure_hook(params);
    }

    /// Typed view of the wrapper, if it holds a `T`.
    #[must_use]
    pub fn downcast_ref<T: ?Sized + ServiceInterface>(&self) -> Option<&ServiceWrapper<T>> {
        self.inner.as_any().downcast_ref()
    }
}

impl<T: ?Sized + ServiceInterface> From<ServiceWrapper<T>> for ServiceWrapperBase {
    fn from(wrapper: ServiceWrapper<T>) -> Self {
        Self::new(wrapper)
    }
}

impl fmt::Debug for ServiceWrapperBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceWrapperBase")
            .field("type", &self.type_name())
            .field("scope", &self.scope())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Gain {
        factor: Mutex<f64>,
    }

    impl Service for Gain {
        fn reconfigure(&self, params: &ParameterSet) {
            if let Ok(factor) = params.get::<f64>("factor") {
                *self.factor.lock() = factor;
            }
        }
    }

    struct Plain;
    impl Service for Plain {}

    #[test]
    fn test_reconfigure_through_erased_wrapper() {
        let gain = Arc::new(Gain::default());
        let base = ServiceWrapperBase::new(ServiceWrapper::shared(Arc::clone(&gain)));
        base.reconfigure(&ParameterSet::new().with("factor", 2.5));
        assert!((*gain.factor.lock() - 2.5).abs() < f64::EPSILON);
        assert_eq!(base.scope(), ServiceScope::Shared);
        assert_eq!(base.service_type(), TypeId::of::<Gain>());
    }

    #[test]
    fn test_reconfigure_reaches_every_schedule_instance() {
        let instances: Vec<_> = (0..3).map(|_| Arc::new(Gain::default())).collect();
        let base = ServiceWrapperBase::new(ServiceWrapper::per_schedule(instances.clone()));
        base.reconfigure(&ParameterSet::new().with("factor", 4.0));
        for gain in &instances {
            assert!((*gain.factor.lock() - 4.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_default_reconfigure_is_noop() {
        let base = ServiceWrapperBase::new(ServiceWrapper::legacy(Arc::new(Plain)));
        base.reconfigure(&ParameterSet::new().with("anything", 1));
        assert!(base.downcast_ref::<Plain>().is_some());
        assert!(base.downcast_ref::<Gain>().is_none());
    }

    #[test]
    fn test_instance_access_by_scope() {
        let wrapper = ServiceWrapper::per_schedule(vec![Arc::new(Plain), Arc::new(Plain)]);
        assert!(wrapper.instance_for(ScheduleID::first()).is_ok());
        assert!(matches!(
            wrapper.instance_for(ScheduleID::new(2).unwrap()),
            Err(FrameworkError::OutOfRange(_))
        ));
        assert!(matches!(wrapper.instance(), Err(FrameworkError::Logic(_))));

        let shared = ServiceWrapper::shared(Arc::new(Plain));
        assert!(shared.instance().is_ok());
        assert!(matches!(
            shared.instance_for(ScheduleID::first()),
            Err(FrameworkError::Logic(_))
        ));
    }

    trait Scaled: Send + Sync {
        fn factor(&self) -> f64;
    }
    impl Scaled for Gain {
        fn factor(&self) -> f64 {
            *self.factor.lock()
        }
    }

    #[test]
    fn test_interface_view_ignores_reconfigure() {
        let gain = Arc::new(Gain::default());
        *gain.factor.lock() = 1.5;
        let scaled: Arc<dyn Scaled> = gain.clone();
        let view = ServiceWrapper::interface(ServiceScope::Shared, vec![scaled]).unwrap();
        let base = ServiceWrapperBase::new(view);
        assert_eq!(base.service_type(), TypeId::of::<dyn Scaled>());
        base.reconfigure(&ParameterSet::new().with("factor", 3.0));
        let scaled = base.downcast_ref::<dyn Scaled>().unwrap().instance().unwrap();
        assert!((scaled.factor() - 1.5).abs() < f64::EPSILON);

        assert!(matches!(
            ServiceWrapper::<dyn Scaled>::interface(ServiceScope::Shared, Vec::new()),
            Err(FrameworkError::Logic(_))
        ));
    }
}
