//! Shared handle to a job's services.

use std::sync::Arc;

use super::{Service, ServiceWrapper, ServicesManager};
use crate::core::{FrameworkError, ScheduleContext};
use crate::signals::{ActivityRegistry, SharedRegistry};

/// Reference-counted handle to a [`ServicesManager`].
///
/// Clones share the same manager. Every delegated operation on an empty
/// token does nothing.
#[derive(Debug, Clone, Default)]
pub struct ServiceToken {
    manager: Option<Arc<ServicesManager>>,
}

impl ServiceToken {
    /// Token sharing `manager`.
    #[must_use]
    pub fn new(manager: ServicesManager) -> Self {
        Self {
            manager: Some(Arc::new(manager)),
        }
    }

    /// Token sharing an already shared manager.
    #[must_use]
    pub const fn from_shared(manager: Arc<ServicesManager>) -> Self {
        Self {
            manager: Some(manager),
        }
    }

    /// Token with no manager.
    #[must_use]
    pub const fn empty() -> Self {
        Self { manager: None }
    }

    /// Token for a fresh manager holding only `wrapper`.
    ///
    /// # Errors
    ///
    /// As [`ServicesManager::put`].
    pub fn create_containing<T: Service>(
        wrapper: ServiceWrapper<T>,
        context: Arc<ScheduleContext>,
        num_threads: usize,
    ) -> Result<Self, FrameworkError> {
        let manager = ServicesManager::new(context, num_threads);
        manager.put(wrapper)?;
        Ok(Self::new(manager))
    }

    /// Whether the token has no manager.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.manager.is_none()
    }

    /// The shared manager, if any.
    #[must_use]
    pub const fn manager(&self) -> Option<&Arc<ServicesManager>> {
        self.manager.as_ref()
    }

    /// Make `source` re-fire its signals into the services' registry.
    ///
    /// # Errors
    ///
    /// Propagates range errors from [`ActivityRegistry::forward_to`].
    pub fn connect(&self, source: &mut ActivityRegistry) -> Result<(), FrameworkError> {
        match &self.manager {
            Some(manager) => source.forward_to(manager),
            None => Ok(()),
        }
    }

    /// Make the services' registry re-fire its signals into `target`.
    ///
    /// # Errors
    ///
    /// Propagates range errors from [`ActivityRegistry::forward_to`].
    pub fn connect_to<R: SharedRegistry>(&self, target: &Arc<R>) -> Result<(), FrameworkError> {
        match &self.manager {
            Some(manager) => manager.registry().write().forward_to(target),
            None => Ok(()),
        }
    }

    /// Merge the services' slots into `target`.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` if the schedule counts differ.
    pub fn copy_slots_to(&self, target: &mut ActivityRegistry) -> Result<(), FrameworkError> {
        match &self.manager {
            Some(manager) => target.copy_slots_from(&manager.registry().read()),
            None => Ok(()),
        }
    }

    /// Merge `source`'s slots into the services' registry.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` if the schedule counts differ.
    pub fn copy_slots_from(&self, source: &ActivityRegistry) -> Result<(), FrameworkError> {
        match &self.manager {
            Some(manager) => manager.registry().write().copy_slots_from(source),
            None => Ok(()),
        }
    }
}
