//! Multi-schedule event loop.
//!
//! [`EventProcessor::run`] spawns one schedule marker task per schedule on
//! its [`TaskPool`]. Each schedule pulls events from the shared source and
//! runs every module over them, firing the per-schedule lifecycle signals
//! around each step. Modules may spawn sub-tasks through their
//! [`ModuleContext`]; code in those sub-tasks still resolves the owning
//! schedule through the job's [`ScheduleContext`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{Event, EventSource, ModuleDescription, TaskHandle, TaskPool};
use crate::config::JobConfig;
use crate::core::{
    schedule_ids, AppResult, FrameworkError, PerScheduleContainer, ScheduleContext, ScheduleCount,
    ScheduleID,
};
use crate::services::ServiceToken;
use crate::signals::ActivityRegistry;

/// A unit of per-event work.
pub trait Module: Send + Sync {
    /// Static description used in lifecycle signals.
    fn description(&self) -> &ModuleDescription;

    /// Process `event`. Called concurrently from every schedule.
    ///
    /// # Errors
    ///
    /// Any failure; the job stops and `job_failure` fires.
    fn process(&self, event: &mut Event, ctx: &ModuleContext<'_>) -> AppResult<()>;
}

/// What a module may use while processing one event.
#[derive(Debug)]
pub struct ModuleContext<'a> {
    sid: ScheduleID,
    services: &'a ServiceToken,
    pool: &'a Arc<TaskPool>,
}

impl ModuleContext<'_> {
    /// Schedule processing the event.
    #[must_use]
    pub const fn schedule_id(&self) -> ScheduleID {
        self.sid
    }

    /// The job's services.
    #[must_use]
    pub const fn services(&self) -> &ServiceToken {
        self.services
    }

    /// Spawn a sub-task of the current schedule.
    ///
    /// # Errors
    ///
    /// `FrameworkError::PoolShutdown` if the pool is shutting down.
    pub fn spawn<F, R>(&self, f: F) -> Result<TaskHandle<R>, FrameworkError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.pool.spawn(f)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Identifier of this run.
    pub run_id: Uuid,
    /// Events processed by each schedule, indexed by schedule id.
    pub events_per_schedule: Vec<u64>,
}

impl RunSummary {
    /// Events processed across all schedules.
    #[must_use]
    pub fn total_events(&self) -> u64 {
        self.events_per_schedule.iter().sum()
    }
}

/// State shared by every schedule task of one run.
struct ScheduleEnv {
    registry: Arc<ActivityRegistry>,
    services: ServiceToken,
    modules: Arc<[Arc<dyn Module>]>,
    source: Arc<dyn EventSource>,
    pool: Arc<TaskPool>,
    counts: Arc<PerScheduleContainer<u64>>,
    failed: Arc<AtomicBool>,
}

impl ScheduleEnv {
    fn run_schedule(&self, sid: ScheduleID) -> AppResult<()> {
        debug!(schedule = %sid, "schedule started");
        let result = self.event_loop(sid);
        if result.is_err() {
            self.failed.store(true, Ordering::Release);
        }
        debug!(schedule = %sid, ok = result.is_ok(), "schedule finished");
        result
    }

    fn event_loop(&self, sid: ScheduleID) -> AppResult<()> {
        let reg = &self.registry;
        let ctx = ModuleContext {
            sid,
            services: &self.services,
            pool: &self.pool,
        };
        while !self.failed.load(Ordering::Acquire) {
            reg.pre_source_event.invoke(sid, &())?;
            let Some(mut event) = self.source.next_event().context("event source failed")? else {
                break;
            };
            let id = event.id;
            reg.post_source_event.invoke(sid, &id)?;
            reg.pre_process_event.invoke(sid, &id)?;
            for module in self.modules.iter() {
                let md = module.description();
                reg.pre_module.invoke(sid, md)?;
                module
                    .process(&mut event, &ctx)
                    .with_context(|| format!("module {md} failed on {id}"))?;
                reg.post_module.invoke(sid, md)?;
            }
            reg.post_process_event.invoke(sid, &id)?;
            self.counts.with(sid, |count| *count += 1)?;
        }
        Ok(())
    }
}

/// Runs a job's modules over its events on N concurrent schedules.
pub struct EventProcessor {
    config: JobConfig,
    services: ServiceToken,
    modules: Arc<[Arc<dyn Module>]>,
    source: Arc<dyn EventSource>,
    registry: ActivityRegistry,
    context: Arc<ScheduleContext>,
    pool: Arc<TaskPool>,
}

impl EventProcessor {
    /// Create a processor and connect its lifecycle signals to `services`.
    ///
    /// The schedule context is taken from the services manager when there
    /// is one.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Configuration` for an invalid configuration, a
    /// schedule count that disagrees with the services, or a failure to
    /// start the worker threads.
    pub fn new(
        config: JobConfig,
        services: ServiceToken,
        modules: Vec<Arc<dyn Module>>,
        source: Arc<dyn EventSource>,
    ) -> Result<Self, FrameworkError> {
        config.validate()?;
        let context = match services.manager() {
            Some(manager) => Arc::clone(manager.context()),
            None => Arc::new(ScheduleContext::new(config.num_schedules)),
        };
        if context.num_schedules() != config.num_schedules() {
            return Err(FrameworkError::Configuration(format!(
                "services were built for {} schedules but the job runs {}",
                context.num_schedules(),
                config.num_schedules()
            )));
        }
        let mut registry = ActivityRegistry::new(config.num_schedules);
        services.connect(&mut registry)?;
        let pool = Arc::new(TaskPool::new(config.num_threads)?);
        Ok(Self {
            config,
            services,
            modules: modules.into(),
            source,
            registry,
            context,
            pool,
        })
    }

    /// The framework-side lifecycle signals, for watchers outside the services.
    pub fn registry_mut(&mut self) -> &mut ActivityRegistry {
        &mut self.registry
    }

    /// The job's current-schedule oracle.
    #[must_use]
    pub const fn context(&self) -> &Arc<ScheduleContext> {
        &self.context
    }

    /// The job's services.
    #[must_use]
    pub const fn services(&self) -> &ServiceToken {
        &self.services
    }

    /// Run the job until the source is exhausted or an error occurs.
    ///
    /// # Errors
    ///
    /// The first error raised by service construction, the source, a module
    /// or a schedule task. `job_failure` fires before it is returned.
    pub fn run(&self) -> AppResult<RunSummary> {
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            num_schedules = self.config.num_schedules,
            num_threads = self.config.num_threads,
            modules = self.modules.len(),
            "job starting"
        );
        let registry = Arc::new(self.registry.clone());
        match self.run_schedules(&registry) {
            Ok(events_per_schedule) => {
                registry.post_end_job.invoke(&());
                let summary = RunSummary {
                    run_id,
                    events_per_schedule,
                };
                info!(%run_id, events = summary.total_events(), "job finished");
                Ok(summary)
            }
            Err(e) => {
                error!(%run_id, error = %format!("{e:#}"), "job failed");
                registry.job_failure.invoke(&());
                Err(e)
            }
        }
    }

    fn run_schedules(&self, registry: &Arc<ActivityRegistry>) -> AppResult<Vec<u64>> {
        if let Some(manager) = self.services.manager() {
            manager.force_creation()?;
        }
        for module in self.modules.iter() {
            registry.pre_module_construction.invoke(module.description());
            registry.post_module_construction.invoke(module.description());
        }
        registry.post_begin_job.invoke(&());

        let counts = PerScheduleContainer::new();
        counts.expand_to_num_schedules(&self.config)?;
        let env = Arc::new(ScheduleEnv {
            registry: Arc::clone(registry),
            services: self.services.clone(),
            modules: Arc::clone(&self.modules),
            source: Arc::clone(&self.source),
            pool: Arc::clone(&self.pool),
            counts: Arc::new(counts),
            failed: Arc::new(AtomicBool::new(false)),
        });

        let _active = self.context.enter();
        let mut handles = Vec::with_capacity(self.config.num_schedules);
        for sid in schedule_ids(self.config.num_schedules) {
            let task_env = Arc::clone(&env);
            match self.pool.spawn_schedule(sid, move || task_env.run_schedule(sid)) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    env.failed.store(true, Ordering::Release);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(e.into());
                }
            }
        }

        let mut first_error: Option<anyhow::Error> = None;
        for handle in handles {
            let outcome = match handle.join() {
                Ok(result) => result,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        Ok(env.counts.snapshot())
    }
}

impl std::fmt::Debug for EventProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("config", &self.config)
            .field("modules", &self.modules.len())
            .finish_non_exhaustive()
    }
}

impl Drop for EventProcessor {
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::QueueSource;
    use parking_lot::Mutex;

    struct Tagger {
        md: ModuleDescription,
        context: Arc<ScheduleContext>,
    }

    impl Module for Tagger {
        fn description(&self) -> &ModuleDescription {
            &self.md
        }

        fn process(&self, event: &mut Event, ctx: &ModuleContext<'_>) -> AppResult<()> {
            let context = Arc::clone(&self.context);
            let seen = ctx.spawn(move || context.current_schedule_id())?.join()?;
            anyhow::ensure!(seen == ctx.schedule_id(), "sub-task saw {seen}");
            event.payload["schedule"] = serde_json::json!(seen.id());
            Ok(())
        }
    }

    struct Failing {
        md: ModuleDescription,
    }

    impl Module for Failing {
        fn description(&self) -> &ModuleDescription {
            &self.md
        }

        fn process(&self, event: &mut Event, _ctx: &ModuleContext<'_>) -> AppResult<()> {
            anyhow::ensure!(event.id.event != 3, "bad event");
            Ok(())
        }
    }

    #[test]
    fn test_all_events_processed_across_schedules() {
        let context = Arc::new(ScheduleContext::new(3));
        let token = ServiceToken::new(crate::services::ServicesManager::new(Arc::clone(&context), 2));
        let tagger: Arc<dyn Module> = Arc::new(Tagger {
            md: ModuleDescription::new("tag", "Tagger"),
            context,
        });
        let processor = EventProcessor::new(
            JobConfig::new(3, 2),
            token,
            vec![tagger],
            Arc::new(QueueSource::numbered(1, 20)),
        )
        .unwrap();
        let summary = processor.run().unwrap();
        assert_eq!(summary.events_per_schedule.len(), 3);
        assert_eq!(summary.total_events(), 20);
    }

    #[test]
    fn test_failure_fires_job_failure() {
        let failing: Arc<dyn Module> = Arc::new(Failing {
            md: ModuleDescription::new("f", "Failing"),
        });
        let mut processor = EventProcessor::new(
            JobConfig::new(1, 1),
            ServiceToken::empty(),
            vec![failing],
            Arc::new(QueueSource::numbered(1, 5)),
        )
        .unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        processor
            .registry_mut()
            .job_failure
            .watch(move |_: &()| l.lock().push("failure"));
        let l = Arc::clone(&log);
        processor
            .registry_mut()
            .post_end_job
            .watch(move |_: &()| l.lock().push("end"));

        let err = processor.run().unwrap_err();
        assert!(format!("{err:#}").contains("bad event"));
        assert_eq!(*log.lock(), vec!["failure"]);
    }

    #[test]
    fn test_schedule_spawn_failure_reported() {
        let processor = EventProcessor::new(
            JobConfig::new(2, 1),
            ServiceToken::empty(),
            Vec::new(),
            Arc::new(QueueSource::numbered(1, 4)),
        )
        .unwrap();
        processor.pool.shutdown();
        let err = processor.run().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FrameworkError>(),
            Some(FrameworkError::PoolShutdown)
        ));
    }

    #[test]
    fn test_schedule_count_mismatch_rejected() {
        let token = ServiceToken::new(crate::services::ServicesManager::new(
            Arc::new(ScheduleContext::new(2)),
            1,
        ));
        assert!(matches!(
            EventProcessor::new(
                JobConfig::new(3, 1),
                token,
                Vec::new(),
                Arc::new(QueueSource::default()),
            ),
            Err(FrameworkError::Configuration(_))
        ));
    }
}
