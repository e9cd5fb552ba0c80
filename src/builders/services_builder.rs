//! Builder to construct a job's services from configuration.

use std::sync::Arc;

use tracing::info;

use crate::config::JobConfig;
use crate::core::{FrameworkError, ScheduleContext, ScheduleCount};
use crate::services::{ServiceMakers, ServiceOverlap, ServiceToken, ServicesManager};

/// Register every service configured in `cfg` with a new manager, using
/// the makers in `makers`, and return a token sharing it.
///
/// Services are not built here; they are built on first lookup or by
/// [`ServicesManager::force_creation`].
///
/// # Errors
///
/// `FrameworkError::Configuration` if `cfg` is invalid or its schedule count
/// disagrees with `context`, `FrameworkError::NotFound` if no maker is
/// registered for a configured service, `FrameworkError::Logic` for scope
/// violations.
pub fn build_services(
    cfg: &JobConfig,
    makers: &ServiceMakers,
    context: Arc<ScheduleContext>,
) -> Result<ServiceToken, FrameworkError> {
    check_context(cfg, &context)?;
    let manager = ServicesManager::new(context, cfg.num_threads);
    configure(cfg, makers, manager)
}

/// Like [`build_services`], but the new manager starts with every service
/// of `parent`; `overlap` decides what happens when `cfg` configures one of
/// them again.
///
/// # Errors
///
/// As [`build_services`], plus the errors of [`ServicesManager::with_parent`]
/// and `FrameworkError::Configuration` for an overlap refused by `overlap`.
pub fn build_services_with_parent(
    cfg: &JobConfig,
    makers: &ServiceMakers,
    parent: &ServiceToken,
    overlap: ServiceOverlap,
    context: Arc<ScheduleContext>,
) -> Result<ServiceToken, FrameworkError> {
    check_context(cfg, &context)?;
    let manager = ServicesManager::with_parent(parent, overlap, context, cfg.num_threads)?;
    configure(cfg, makers, manager)
}

fn check_context(cfg: &JobConfig, context: &ScheduleContext) -> Result<(), FrameworkError> {
    cfg.validate()?;
    if context.num_schedules() != cfg.num_schedules() {
        return Err(FrameworkError::Configuration(format!(
            "schedule context has {} schedules but the job configures {}",
            context.num_schedules(),
            cfg.num_schedules()
        )));
    }
    Ok(())
}

fn configure(
    cfg: &JobConfig,
    makers: &ServiceMakers,
    manager: ServicesManager,
) -> Result<ServiceToken, FrameworkError> {
    for service in &cfg.services {
        let maker = makers.get(&service.service_type).ok_or_else(|| {
            FrameworkError::NotFound(format!(
                "no maker registered for service `{}`",
                service.service_type
            ))
        })?;
        manager.add_configured(service, maker)?;
    }
    info!(
        services = cfg.services.len(),
        num_schedules = cfg.num_schedules,
        num_threads = cfg.num_threads,
        inherited = manager.parent().is_some(),
        "services configured"
    );
    Ok(ServiceToken::new(manager))
}
