//! Named service makers and the context they build services in.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Service, ServiceInterface, ServiceScope, ServiceWrapper, ServiceWrapperBase, ServicesManager};
use crate::config::ParameterSet;
use crate::core::{schedule_ids, AppResult, FrameworkError, ScheduleContext, ScheduleID};
use crate::signals::ActivityRegistry;

pub(crate) type BuildFn = Arc<
    dyn Fn(&ParameterSet, &mut ServiceBuildContext<'_>) -> Result<ServiceWrapperBase, FrameworkError>
        + Send
        + Sync,
>;

/// What a service maker may use while building its service.
///
/// Makers run during single-threaded setup; they register on the job's
/// lifecycle signals through [`ServiceBuildContext::registry`] and may ask
/// for other services, which are built on demand.
pub struct ServiceBuildContext<'a> {
    manager: &'a ServicesManager,
    registry: &'a mut ActivityRegistry,
    schedule: ScheduleID,
}

impl<'a> ServiceBuildContext<'a> {
    pub(crate) fn new(manager: &'a ServicesManager, registry: &'a mut ActivityRegistry) -> Self {
        Self {
            manager,
            registry,
            schedule: ScheduleID::invalid(),
        }
    }

    /// The job's lifecycle signals.
    pub fn registry(&mut self) -> &mut ActivityRegistry {
        &mut *self.registry
    }

    /// Number of schedules in the job.
    #[must_use]
    pub fn num_schedules(&self) -> usize {
        self.manager.num_schedules()
    }

    /// Schedule the instance being built belongs to; invalid for
    /// single-instance services.
    #[must_use]
    pub const fn schedule_id(&self) -> ScheduleID {
        self.schedule
    }

    /// The job's current-schedule oracle.
    #[must_use]
    pub fn context(&self) -> &Arc<ScheduleContext> {
        self.manager.context()
    }

    /// A legacy or shared service, building it first if needed.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` on a circular dependency or a per-schedule
    /// service; `FrameworkError::NotFound` if `U` is not configured; any
    /// error from building `U`.
    pub fn service<U: ?Sized + ServiceInterface>(&mut self) -> Result<Arc<U>, FrameworkError> {
        let wrapper = self.manager.resolve::<U>(Some(&mut *self.registry))?;
        typed::<U>(&wrapper)?.instance().map(Arc::clone)
    }

    /// Schedule `sid`'s instance of a per-schedule service, building it first
    /// if needed.
    ///
    /// # Errors
    ///
    /// As [`ServiceBuildContext::service`], plus `FrameworkError::OutOfRange`
    /// for an unknown schedule.
    pub fn service_for<U: ?Sized + ServiceInterface>(&mut self, sid: ScheduleID) -> Result<Arc<U>, FrameworkError> {
        let wrapper = self.manager.resolve::<U>(Some(&mut *self.registry))?;
        typed::<U>(&wrapper)?.instance_for(sid).map(Arc::clone)
    }
}

impl fmt::Debug for ServiceBuildContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBuildContext")
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

pub(crate) fn typed<T: ?Sized + ServiceInterface>(wrapper: &ServiceWrapperBase) -> Result<&ServiceWrapper<T>, FrameworkError> {
    wrapper.downcast_ref::<T>().ok_or_else(|| {
        FrameworkError::Logic(format!(
            "service registered as `{}` holds `{}`",
            type_name::<T>(),
            wrapper.type_name()
        ))
    })
}

/// Builds the interface view of a service from the service's own wrapper.
#[derive(Clone)]
pub(crate) struct InterfaceMaker {
    pub(crate) service_type: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) build: BuildFn,
}

/// Recipe for building one service type.
#[derive(Clone)]
pub struct ServiceMaker {
    pub(crate) service_type: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) scope: ServiceScope,
    pub(crate) build: BuildFn,
    pub(crate) interface: Option<InterfaceMaker>,
}

impl ServiceMaker {
    /// Scope of the services this maker builds.
    #[must_use]
    pub const fn scope(&self) -> ServiceScope {
        self.scope
    }

    /// Name of the service type this maker builds.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Name of the interface the service is also registered under, if any.
    #[must_use]
    pub fn interface_name(&self) -> Option<&'static str> {
        self.interface.as_ref().map(|interface| interface.type_name)
    }
}

impl fmt::Debug for ServiceMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceMaker")
            .field("type", &self.type_name)
            .field("scope", &self.scope)
            .field("interface", &self.interface_name())
            .finish_non_exhaustive()
    }
}

/// Table of service makers by configuration name.
#[derive(Debug, Clone, Default)]
pub struct ServiceMakers {
    makers: HashMap<String, ServiceMaker>,
}

impl ServiceMakers {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a maker for a legacy service.
    pub fn register_legacy<T, F>(&mut self, name: impl Into<String>, make: F) -> &mut Self
    where
        T: Service,
        F: Fn(&ParameterSet, &mut ServiceBuildContext<'_>) -> AppResult<Arc<T>> + Send + Sync + 'static,
    {
        self.insert_single(name, ServiceScope::Legacy, make)
    }

    /// Register a maker for a shared service.
    pub fn register_shared<T, F>(&mut self, name: impl Into<String>, make: F) -> &mut Self
    where
        T: Service,
        F: Fn(&ParameterSet, &mut ServiceBuildContext<'_>) -> AppResult<Arc<T>> + Send + Sync + 'static,
    {
        self.insert_single(name, ServiceScope::Shared, make)
    }

    /// Register a maker for a per-schedule service. `make` is called once per
    /// schedule with that schedule's id.
    pub fn register_per_schedule<T, F>(&mut self, name: impl Into<String>, make: F) -> &mut Self
    where
        T: Service,
        F: Fn(&ParameterSet, &mut ServiceBuildContext<'_>, ScheduleID) -> AppResult<Arc<T>>
            + Send
            + Sync
            + 'static,
    {
        let build: BuildFn = Arc::new(move |params: &ParameterSet, ctx: &mut ServiceBuildContext<'_>| {
            let mut instances = Vec::with_capacity(ctx.num_schedules());
            for sid in schedule_ids(ctx.num_schedules()) {
                ctx.schedule = sid;
                let made = make(params, ctx, sid);
                ctx.schedule = ScheduleID::invalid();
                instances.push(made.map_err(|source| FrameworkError::ServiceCreation {
                    type_name: type_name::<T>(),
                    source,
                })?);
            }
            Ok(ServiceWrapperBase::new(ServiceWrapper::per_schedule(instances)))
        });
        self.insert::<T>(name, ServiceScope::PerSchedule, build)
    }

    /// Register a maker for a shared service that can also be looked up as
    /// interface `I`. `upcast` converts the built service to the interface,
    /// usually `|service| service as Arc<dyn I>`.
    pub fn register_shared_as<I, T, F>(
        &mut self,
        name: impl Into<String>,
        make: F,
        upcast: fn(Arc<T>) -> Arc<I>,
    ) -> &mut Self
    where
        I: ?Sized + ServiceInterface,
        T: Service,
        F: Fn(&ParameterSet, &mut ServiceBuildContext<'_>) -> AppResult<Arc<T>> + Send + Sync + 'static,
    {
        let name = name.into();
        self.insert_single(name.clone(), ServiceScope::Shared, make);
        self.expose::<I, T>(&name, upcast)
    }

    /// Register a maker for a per-schedule service that can also be looked up
    /// as interface `I`.
    pub fn register_per_schedule_as<I, T, F>(
        &mut self,
        name: impl Into<String>,
        make: F,
        upcast: fn(Arc<T>) -> Arc<I>,
    ) -> &mut Self
    where
        I: ?Sized + ServiceInterface,
        T: Service,
        F: Fn(&ParameterSet, &mut ServiceBuildContext<'_>, ScheduleID) -> AppResult<Arc<T>>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        self.register_per_schedule(name.clone(), make);
        self.expose::<I, T>(&name, upcast)
    }

    fn expose<I, T>(&mut self, name: &str, upcast: fn(Arc<T>) -> Arc<I>) -> &mut Self
    where
        I: ?Sized + ServiceInterface,
        T: Service,
    {
        let build: BuildFn = Arc::new(move |_: &ParameterSet, ctx: &mut ServiceBuildContext<'_>| {
            let base = ctx.manager.resolve::<T>(Some(&mut *ctx.registry))?;
            let wrapper = typed::<T>(&base)?;
            let instances = wrapper.instances().map(|instance| upcast(Arc::clone(instance))).collect();
            Ok(ServiceWrapperBase::new(ServiceWrapper::<I>::interface(
                wrapper.scope(),
                instances,
            )?))
        });
        if let Some(maker) = self.makers.get_mut(name) {
            maker.interface = Some(InterfaceMaker {
                service_type: TypeId::of::<I>(),
                type_name: type_name::<I>(),
                build,
            });
        }
        self
    }

    fn insert_single<T, F>(&mut self, name: impl Into<String>, scope: ServiceScope, make: F) -> &mut Self
    where
        T: Service,
        F: Fn(&ParameterSet, &mut ServiceBuildContext<'_>) -> AppResult<Arc<T>> + Send + Sync + 'static,
    {
        let build: BuildFn = Arc::new(move |params: &ParameterSet, ctx: &mut ServiceBuildContext<'_>| {
            let instance = make(params, ctx).map_err(|source| FrameworkError::ServiceCreation {
                type_name: type_name::<T>(),
                source,
            })?;
            let wrapper = match scope {
                ServiceScope::Legacy => ServiceWrapper::legacy(instance),
                _ => ServiceWrapper::shared(instance),
            };
            Ok(ServiceWrapperBase::new(wrapper))
        });
        self.insert::<T>(name, scope, build)
    }

    fn insert<T: Service>(&mut self, name: impl Into<String>, scope: ServiceScope, build: BuildFn) -> &mut Self {
        self.makers.insert(
            name.into(),
            ServiceMaker {
                service_type: TypeId::of::<T>(),
                type_name: type_name::<T>(),
                scope,
                build,
                interface: None,
            },
        );
        self
    }

    /// Maker registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServiceMaker> {
        self.makers.get(name)
    }

    /// Whether a maker is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.makers.contains_key(name)
    }
}
