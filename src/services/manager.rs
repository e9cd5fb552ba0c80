//! The job's table of services.
//!
//! Services are keyed by type. Configured services are built lazily on
//! first lookup (or all at once by [`ServicesManager::force_creation`]);
//! premade services are inserted with [`ServicesManager::put`]. A maker may
//! look up other services while it runs, so the table sits behind a
//! re-entrant lock and the `RefCell` borrow is released before any maker
//! is called. Services are released in reverse order of creation.
//!
//! A manager built with [`ServicesManager::with_parent`] starts with every
//! service of the parent token; [`ServiceOverlap`] decides what happens when
//! the configuration names one of them again.

use std::any::{type_name, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, info, warn};

use super::maker::{typed, BuildFn, ServiceBuildContext, ServiceMaker};
use super::{
    Service, ServiceInterface, ServiceOverlap, ServiceScope, ServiceToken, ServiceWrapper, ServiceWrapperBase,
};
use crate::config::{ParameterSet, ServiceConfig};
use crate::core::{FrameworkError, ScheduleContext, ScheduleCount, ScheduleID};
use crate::signals::{ActivityRegistry, SharedRegistry};

struct ServiceEntry {
    name: Option<String>,
    type_name: &'static str,
    scope: ServiceScope,
    params: ParameterSet,
    build: Option<BuildFn>,
    wrapper: Option<Arc<ServiceWrapperBase>>,
    constructing: bool,
    inherited: bool,
}

#[derive(Default)]
struct ServiceTable {
    entries: HashMap<TypeId, ServiceEntry>,
    names: HashMap<String, TypeId>,
    requested_order: Vec<TypeId>,
    creation_order: Vec<TypeId>,
}

impl ServiceTable {
    fn forget(&mut self, service_type: TypeId) {
        self.entries.remove(&service_type);
        self.names.retain(|_, id| *id != service_type);
        self.requested_order.retain(|id| *id != service_type);
        self.creation_order.retain(|id| *id != service_type);
    }
}

/// Owner of every service of one job and of the job's lifecycle signals.
pub struct ServicesManager {
    table: ReentrantMutex<RefCell<ServiceTable>>,
    registry: RwLock<ActivityRegistry>,
    context: Arc<ScheduleContext>,
    num_threads: usize,
    overlap: ServiceOverlap,
    parent: Option<Arc<ServicesManager>>,
}

impl ServicesManager {
    /// Create an empty manager for the job described by `context`.
    #[must_use]
    pub fn new(context: Arc<ScheduleContext>, num_threads: usize) -> Self {
        let num_schedules = context.num_schedules();
        Self {
            table: ReentrantMutex::new(RefCell::new(ServiceTable::default())),
            registry: RwLock::new(ActivityRegistry::new(num_schedules)),
            context,
            num_threads,
            overlap: ServiceOverlap::default(),
            parent: None,
        }
    }

    /// Create a manager that starts with every service of `parent`.
    ///
    /// The parent's configured services are built first, then shared with
    /// the new manager, and the parent's signal slots are copied into the new
    /// registry so inherited services keep seeing the job's lifecycle.
    /// `overlap` decides what [`ServicesManager::add_configured`] and
    /// [`ServicesManager::put`] do with a service the parent already has. An
    /// empty token gives a plain manager.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` if the parent was built for a different number
    /// of schedules or holds a legacy service this job cannot use; any error
    /// from building the parent's services.
    pub fn with_parent(
        parent: &ServiceToken,
        overlap: ServiceOverlap,
        context: Arc<ScheduleContext>,
        num_threads: usize,
    ) -> Result<Self, FrameworkError> {
        let mut manager = Self::new(context, num_threads);
        manager.overlap = overlap;
        let Some(parent) = parent.manager() else {
            return Ok(manager);
        };
        if parent.num_schedules() != manager.num_schedules() {
            return Err(FrameworkError::Logic(format!(
                "parent services were built for {} schedules, not {}",
                parent.num_schedules(),
                manager.num_schedules()
            )));
        }
        parent.force_creation()?;

        let inherited: Vec<(TypeId, ServiceEntry)> = {
            let guard = parent.table.lock();
            let table = guard.borrow();
            let inherited = table
                .creation_order
                .iter()
                .filter_map(|id| table.entries.get(id).map(|entry| (*id, entry)))
                .filter_map(|(id, entry)| {
                    entry.wrapper.as_ref().map(|wrapper| {
                        (
                            id,
                            ServiceEntry {
                                name: entry.name.clone(),
                                type_name: entry.type_name,
                                scope: entry.scope,
                                params: entry.params.clone(),
                                build: None,
                                wrapper: Some(Arc::clone(wrapper)),
                                constructing: false,
                                inherited: true,
                            },
                        )
                    })
                })
                .collect();
            inherited
        };
        for (_, entry) in &inherited {
            manager.check_scope(entry.scope, entry.type_name)?;
        }
        manager.registry.get_mut().copy_slots_from(&parent.registry.read())?;

        let count = inherited.len();
        let table = manager.table.get_mut().get_mut();
        for (id, entry) in inherited {
            if let Some(name) = &entry.name {
                table.names.insert(name.clone(), id);
                table.requested_order.push(id);
            }
            table.creation_order.push(id);
            table.entries.insert(id, entry);
        }
        manager.parent = Some(Arc::clone(parent));
        debug!(services = count, overlap = ?overlap, "services inherited from parent token");
        Ok(manager)
    }

    /// Number of schedules in the job.
    #[must_use]
    pub fn num_schedules(&self) -> usize {
        self.context.num_schedules()
    }

    /// Number of worker threads in the job.
    #[must_use]
    pub const fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// The job's current-schedule oracle.
    #[must_use]
    pub const fn context(&self) -> &Arc<ScheduleContext> {
        &self.context
    }

    /// The job's lifecycle signals. Write during setup, read afterwards.
    #[must_use]
    pub const fn registry(&self) -> &RwLock<ActivityRegistry> {
        &self.registry
    }

    fn check_scope(&self, scope: ServiceScope, type_name: &'static str) -> Result<(), FrameworkError> {
        if scope == ServiceScope::Legacy && (self.num_schedules() > 1 || self.num_threads > 1) {
            warn!(
                service = type_name,
                num_schedules = self.num_schedules(),
                num_threads = self.num_threads,
                "legacy service rejected"
            );
            return Err(FrameworkError::Logic(format!(
                "legacy service `{type_name}` cannot be used with {} schedules and {} threads",
                self.num_schedules(),
                self.num_threads
            )));
        }
        Ok(())
    }

    // Applies the overlap policy to inherited entries among `claimed`.
    // Returns whether the new service should still be added.
    fn take_over(&self, table: &mut ServiceTable, claimed: &[TypeId], service: &str) -> Result<bool, FrameworkError> {
        let mut overlapping: Vec<TypeId> = claimed
            .iter()
            .copied()
            .filter(|id| table.entries.get(id).is_some_and(|entry| entry.inherited))
            .collect();
        overlapping.dedup();
        if overlapping.is_empty() {
            return Ok(true);
        }
        match self.overlap {
            ServiceOverlap::OverlapIsError => Err(FrameworkError::Configuration(format!(
                "service `{service}` is provided by both the parent token and the configuration"
            ))),
            ServiceOverlap::TokenOverrides => {
                debug!(service, "parent token service kept");
                Ok(false)
            }
            ServiceOverlap::ConfigurationOverrides => {
                for id in overlapping {
                    table.forget(id);
                }
                debug!(service, "parent token service replaced");
                Ok(true)
            }
        }
    }

    /// Register a configured service to be built by `maker` on demand. A
    /// maker with an interface also registers the interface view.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` if the name or service type is already
    /// registered, or for a legacy service in a multi-schedule or
    /// multi-threaded job. `FrameworkError::Configuration` if the parent
    /// token already provides the service and overlaps are errors.
    pub fn add_configured(&self, config: &ServiceConfig, maker: &ServiceMaker) -> Result<(), FrameworkError> {
        self.check_scope(maker.scope, maker.type_name)?;
        let guard = self.table.lock();
        let mut table = guard.borrow_mut();
        let mut claimed = vec![maker.service_type];
        claimed.extend(maker.interface.as_ref().map(|interface| interface.service_type));
        claimed.extend(table.names.get(&config.service_type).copied());
        if !self.take_over(&mut table, &claimed, &config.service_type)? {
            return Ok(());
        }
        if table.names.contains_key(&config.service_type) {
            return Err(FrameworkError::Logic(format!(
                "service `{}` is already configured",
                config.service_type
            )));
        }
        if table.entries.contains_key(&maker.service_type) {
            return Err(FrameworkError::Logic(format!(
                "a service of type `{}` is already registered",
                maker.type_name
            )));
        }
        if let Some(interface) = &maker.interface {
            if table.entries.contains_key(&interface.service_type) {
                return Err(FrameworkError::Logic(format!(
                    "interface `{}` is already registered",
                    interface.type_name
                )));
            }
        }
        table.entries.insert(
            maker.service_type,
            ServiceEntry {
                name: Some(config.service_type.clone()),
                type_name: maker.type_name,
                scope: maker.scope,
                params: config.params.clone(),
                build: Some(Arc::clone(&maker.build)),
                wrapper: None,
                constructing: false,
                inherited: false,
            },
        );
        table.names.insert(config.service_type.clone(), maker.service_type);
        table.requested_order.push(maker.service_type);
        if let Some(interface) = &maker.interface {
            table.entries.insert(
                interface.service_type,
                ServiceEntry {
                    name: None,
                    type_name: interface.type_name,
                    scope: maker.scope,
                    params: ParameterSet::new(),
                    build: Some(Arc::clone(&interface.build)),
                    wrapper: None,
                    constructing: false,
                    inherited: false,
                },
            );
            table.requested_order.push(interface.service_type);
        }
        debug!(
            service = %config.service_type,
            scope = %maker.scope,
            interface = maker.interface.as_ref().map(|interface| interface.type_name),
            "service configured"
        );
        Ok(())
    }

    /// Insert a premade service.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` if a service of type `T` already exists, or
    /// for a legacy service in a multi-schedule or multi-threaded job.
    /// Inherited services follow the manager's [`ServiceOverlap`].
    pub fn put<T: Service>(&self, wrapper: ServiceWrapper<T>) -> Result<(), FrameworkError> {
        self.put_base(ServiceWrapperBase::new(wrapper))
    }

    /// Insert a premade, type-erased service.
    ///
    /// # Errors
    ///
    /// As [`ServicesManager::put`].
    pub fn put_base(&self, wrapper: ServiceWrapperBase) -> Result<(), FrameworkError> {
        let type_name = wrapper.type_name();
        let scope = wrapper.scope();
        self.check_scope(scope, type_name)?;
        let service_type = wrapper.service_type();
        let guard = self.table.lock();
        let mut table = guard.borrow_mut();
        if !self.take_over(&mut table, &[service_type], type_name)? {
            return Ok(());
        }
        if table.entries.contains_key(&service_type) {
            return Err(FrameworkError::Logic(format!(
                "a service of type `{type_name}` already exists"
            )));
        }
        table.entries.insert(
            service_type,
            ServiceEntry {
                name: None,
                type_name,
                scope,
                params: ParameterSet::new(),
                build: None,
                wrapper: Some(Arc::new(wrapper)),
                constructing: false,
                inherited: false,
            },
        );
        table.creation_order.push(service_type);
        debug!(service = type_name, scope = %scope, "premade service added");
        Ok(())
    }

    /// Build every configured service that does not exist yet, in
    /// configuration order.
    ///
    /// # Errors
    ///
    /// The first construction error.
    pub fn force_creation(&self) -> Result<(), FrameworkError> {
        let requested = {
            let guard = self.table.lock();
            let order = guard.borrow().requested_order.clone();
            order
        };
        for service_type in requested {
            self.resolve_id(service_type, "configured service", None)?;
        }
        info!(services = self.len(), "services created");
        Ok(())
    }

    /// The single instance of legacy or shared service `T`.
    ///
    /// # Errors
    ///
    /// `FrameworkError::NotFound` if `T` is not registered,
    /// `FrameworkError::Logic` if `T` is per-schedule, or any construction error.
    pub fn get<T: ?Sized + ServiceInterface>(&self) -> Result<Arc<T>, FrameworkError> {
        let wrapper = self.resolve::<T>(None)?;
        typed::<T>(&wrapper)?.instance().map(Arc::clone)
    }

    /// Schedule `sid`'s instance of per-schedule service `T`.
    ///
    /// # Errors
    ///
    /// As [`ServicesManager::get`], plus `FrameworkError::OutOfRange` for an
    /// unknown schedule.
    pub fn get_for<T: ?Sized + ServiceInterface>(&self, sid: ScheduleID) -> Result<Arc<T>, FrameworkError> {
        let wrapper = self.resolve::<T>(None)?;
        typed::<T>(&wrapper)?.instance_for(sid).map(Arc::clone)
    }

    /// Type-erased wrapper of service `T`, building it if needed.
    ///
    /// # Errors
    ///
    /// As [`ServicesManager::get`].
    pub fn wrapper<T: ?Sized + ServiceInterface>(&self) -> Result<Arc<ServiceWrapperBase>, FrameworkError> {
        self.resolve::<T>(None)
    }

    /// Whether a service of type `T` is registered, built or not.
    #[must_use]
    pub fn is_available<T: ?Sized + ServiceInterface>(&self) -> bool {
        let guard = self.table.lock();
        let available = guard.borrow().entries.contains_key(&TypeId::of::<T>());
        available
    }

    /// Whether service `T` came from the parent token.
    #[must_use]
    pub fn is_inherited<T: ?Sized + ServiceInterface>(&self) -> bool {
        let guard = self.table.lock();
        let inherited = guard
            .borrow()
            .entries
            .get(&TypeId::of::<T>())
            .is_some_and(|entry| entry.inherited);
        inherited
    }

    /// The manager this one inherited its services from, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<&Arc<ServicesManager>> {
        self.parent.as_ref()
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        let guard = self.table.lock();
        let len = guard.borrow().entries.len();
        len
    }

    /// Whether no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the parameters of configured service `service_type`, pass
    /// them to the service if it exists, then fire
    /// `post_services_reconfigure`.
    ///
    /// # Errors
    ///
    /// `FrameworkError::NotFound` if no service is configured under that name.
    pub fn reconfigure(&self, service_type: &str, params: ParameterSet) -> Result<(), FrameworkError> {
        let wrapper = {
            let guard = self.table.lock();
            let mut table = guard.borrow_mut();
            let id = table
                .names
                .get(service_type)
                .copied()
                .ok_or_else(|| FrameworkError::NotFound(format!("no service configured as `{service_type}`")))?;
            let entry = table
                .entries
                .get_mut(&id)
                .ok_or_else(|| FrameworkError::NotFound(format!("no service configured as `{service_type}`")))?;
            entry.params = params.clone();
            entry.wrapper.clone()
        };
        if let Some(wrapper) = wrapper {
            wrapper.reconfigure(&params);
        }
        self.registry.read_recursive().post_services_reconfigure.invoke(&());
        info!(service = service_type, "service reconfigured");
        Ok(())
    }

    /// Parameters of every configured service, in configuration order.
    #[must_use]
    pub fn parameter_sets(&self) -> Vec<(String, ParameterSet)> {
        let guard = self.table.lock();
        let table = guard.borrow();
        table
            .requested_order
            .iter()
            .filter_map(|id| table.entries.get(id))
            .filter_map(|entry| entry.name.clone().map(|name| (name, entry.params.clone())))
            .collect()
    }

    pub(crate) fn resolve<T: ?Sized + ServiceInterface>(
        &self,
        registry: Option<&mut ActivityRegistry>,
    ) -> Result<Arc<ServiceWrapperBase>, FrameworkError> {
        self.resolve_id(TypeId::of::<T>(), type_name::<T>(), registry)
    }

    fn resolve_id(
        &self,
        service_type: TypeId,
        requested: &'static str,
        registry: Option<&mut ActivityRegistry>,
    ) -> Result<Arc<ServiceWrapperBase>, FrameworkError> {
        // Held across the maker call so concurrent lookups wait for construction.
        let guard = self.table.lock();
        let (build, params, type_name) = {
            let mut table = guard.borrow_mut();
            let entry = table.entries.get_mut(&service_type).ok_or_else(|| {
                FrameworkError::NotFound(format!("no service of type `{requested}` is registered"))
            })?;
            if let Some(wrapper) = &entry.wrapper {
                return Ok(Arc::clone(wrapper));
            }
            if entry.constructing {
                return Err(FrameworkError::Logic(format!(
                    "circular dependency while constructing service `{}`",
                    entry.type_name
                )));
            }
            let build = entry.build.clone().ok_or_else(|| {
                FrameworkError::NotFound(format!("service `{}` has no maker", entry.type_name))
            })?;
            entry.constructing = true;
            (build, entry.params.clone(), entry.type_name)
        };

        debug!(service = type_name, "constructing service");
        let built = match registry {
            Some(registry) => self.construct(&build, &params, registry),
            None => match self.registry.try_write() {
                Some(mut registry) => self.construct(&build, &params, &mut registry),
                None => Err(FrameworkError::Logic(format!(
                    "service `{type_name}` cannot be constructed while lifecycle signals are being dispatched"
                ))),
            },
        };

        let mut table = guard.borrow_mut();
        if let Some(entry) = table.entries.get_mut(&service_type) {
            entry.constructing = false;
        }
        let wrapper = Arc::new(built?);
        if let Some(entry) = table.entries.get_mut(&service_type) {
            entry.wrapper = Some(Arc::clone(&wrapper));
        }
        table.creation_order.push(service_type);
        debug!(service = type_name, scope = %wrapper.scope(), "service constructed");
        Ok(wrapper)
    }

    fn construct(
        &self,
        build: &BuildFn,
        params: &ParameterSet,
        registry: &mut ActivityRegistry,
    ) -> Result<ServiceWrapperBase, FrameworkError> {
        let mut ctx = ServiceBuildContext::new(self, registry);
        build(params, &mut ctx)
    }
}

impl SharedRegistry for ServicesManager {
    fn with_registry(&self, f: &mut dyn FnMut(&ActivityRegistry)) {
        f(&self.registry.read_recursive());
    }
}

impl fmt::Debug for ServicesManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicesManager")
            .field("num_schedules", &self.num_schedules())
            .field("num_threads", &self.num_threads)
            .field("services", &self.len())
            .field("overlap", &self.overlap)
            .field("has_parent", &self.parent.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for ServicesManager {
    fn drop(&mut self) {
        // Slots may hold the last strong references to services.
        self.registry.get_mut().clear_all();
        let table = self.table.get_mut().get_mut();
        let order = std::mem::take(&mut table.creation_order);
        for service_type in order.into_iter().rev() {
            if let Some(wrapper) = table
                .entries
                .get_mut(&service_type)
                .and_then(|entry| entry.wrapper.take())
            {
                debug!(service = wrapper.type_name(), "releasing service");
                drop(wrapper);
            }
        }
    }
}
