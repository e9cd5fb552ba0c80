//! Shared service that logs every lifecycle transition it observes.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use super::{Service, ServiceMakers};
use crate::config::ParameterSet;
use crate::core::{schedule_ids, AppResult, FrameworkError, ScheduleID};
use crate::runtime::{EventId, ModuleDescription};
use crate::signals::{ActivityRegistry, LocalSignal, SignalResponse};

/// Configuration name of the tracer.
pub const TRACER_SERVICE: &str = "Tracer";

const DEFAULT_INDENTATION: &str = "++";

/// Logs job, event and module transitions at `info`, indented by nesting
/// depth.
///
/// Parameters: `indentation` (string repeated once per depth level,
/// default `"++"`) and `capture` (keep the formatted lines for
/// [`Tracer::lines`], default `false`).
#[derive(Debug)]
pub struct Tracer {
    indentation: RwLock<String>,
    captured: Option<Mutex<Vec<String>>>,
}

impl Tracer {
    /// Create a tracer from its parameters.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Configuration` for mistyped parameters.
    pub fn from_params(params: &ParameterSet) -> Result<Self, FrameworkError> {
        let indentation = params.get_or("indentation", DEFAULT_INDENTATION.to_string())?;
        let capture = params.get_or("capture", false)?;
        Ok(Self {
            indentation: RwLock::new(indentation),
            captured: capture.then(|| Mutex::new(Vec::new())),
        })
    }

    /// Register the tracer's maker under [`TRACER_SERVICE`].
    pub fn register(makers: &mut ServiceMakers) {
        makers.register_shared(TRACER_SERVICE, |params, ctx| -> AppResult<Arc<Self>> {
            let tracer = Arc::new(Self::from_params(params)?);
            tracer.connect(ctx.registry())?;
            Ok(tracer)
        });
    }

    /// Watch every signal of `registry`.
    ///
    /// # Errors
    ///
    /// Propagates range errors from the per-schedule signals.
    pub fn connect(self: &Arc<Self>, registry: &mut ActivityRegistry) -> Result<(), FrameworkError> {
        registry.post_begin_job.watch_method(self, Self::on_post_begin_job);
        registry.post_end_job.watch_method(self, Self::on_post_end_job);
        registry.job_failure.watch_method(self, Self::on_job_failure);
        registry
            .pre_module_construction
            .watch_method(self, Self::on_pre_module_construction);
        registry
            .post_module_construction
            .watch_method(self, Self::on_post_module_construction);
        registry
            .post_services_reconfigure
            .watch_method(self, Self::on_post_services_reconfigure);

        self.watch_local(&mut registry.pre_source_event, |t, sid, _: &()| {
            t.record(2, sid, "starting: source event", "");
        })?;
        self.watch_local(&mut registry.post_source_event, |t, sid, id: &EventId| {
            t.record(2, sid, "finished: source event", &id.to_string());
        })?;
        self.watch_local(&mut registry.pre_process_event, |t, sid, id: &EventId| {
            t.record(2, sid, "starting: process event", &id.to_string());
        })?;
        self.watch_local(&mut registry.post_process_event, |t, sid, id: &EventId| {
            t.record(2, sid, "finished: process event", &id.to_string());
        })?;
        self.watch_local(&mut registry.pre_module, |t, sid, md: &ModuleDescription| {
            t.record(3, sid, "starting: module", &md.to_string());
        })?;
        self.watch_local(&mut registry.post_module, |t, sid, md: &ModuleDescription| {
            t.record(3, sid, "finished: module", &md.to_string());
        })
    }

    fn watch_local<P, A>(
        self: &Arc<Self>,
        signal: &mut LocalSignal<P, A>,
        f: fn(&Self, ScheduleID, &A),
    ) -> Result<(), FrameworkError>
    where
        P: SignalResponse,
        A: ?Sized + 'static,
    {
        for sid in schedule_ids(signal.num_schedules()) {
            let tracer = Arc::downgrade(self);
            signal.watch(sid, move |args: &A| {
                if let Some(tracer) = tracer.upgrade() {
                    f(&tracer, sid, args);
                }
            })?;
        }
        Ok(())
    }

    fn on_post_begin_job(&self, _: &()) {
        self.record(1, ScheduleID::invalid(), "finished: begin job", "");
    }

    fn on_post_end_job(&self, _: &()) {
        self.record(1, ScheduleID::invalid(), "finished: end job", "");
    }

    fn on_job_failure(&self, _: &()) {
        self.record(1, ScheduleID::invalid(), "job failure", "");
    }

    fn on_pre_module_construction(&self, md: &ModuleDescription) {
        self.record(1, ScheduleID::invalid(), "starting: constructing module", &md.to_string());
    }

    fn on_post_module_construction(&self, md: &ModuleDescription) {
        self.record(1, ScheduleID::invalid(), "finished: constructing module", &md.to_string());
    }

    fn on_post_services_reconfigure(&self, _: &()) {
        self.record(1, ScheduleID::invalid(), "finished: services reconfigure", "");
    }

    fn record(&self, depth: usize, sid: ScheduleID, what: &str, detail: &str) {
        let mut line = self.indentation.read().repeat(depth);
        line.push(' ');
        line.push_str(what);
        if !detail.is_empty() {
            line.push_str(": ");
            line.push_str(detail);
        }
        if sid.is_valid() {
            info!(schedule = %sid, "{line}");
        } else {
            info!("{line}");
        }
        if let Some(captured) = &self.captured {
            captured.lock().push(line);
        }
    }

    /// Lines recorded so far when `capture` is enabled.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.captured
            .as_ref()
            .map(|captured| captured.lock().clone())
            .unwrap_or_default()
    }
}

impl Service for Tracer {
    fn reconfigure(&self, params: &ParameterSet) {
        if let Ok(indentation) = params.get::<String>("indentation") {
            *self.indentation.write() = indentation;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capturing() -> Arc<Tracer> {
        Arc::new(Tracer::from_params(&ParameterSet::new().with("capture", true)).unwrap())
    }

    #[test]
    fn test_records_with_depth() {
        let tracer = capturing();
        let mut reg = ActivityRegistry::new(2);
        tracer.connect(&mut reg).unwrap();
        reg.post_begin_job.invoke(&());
        reg.pre_module
            .invoke(ScheduleID::first(), &ModuleDescription::new("a", "Analyzer"))
            .unwrap();
        assert_eq!(
            tracer.lines(),
            vec![
                "++ finished: begin job".to_string(),
                "++++++ starting: module: Analyzer:a".to_string(),
            ]
        );
    }

    #[test]
    fn test_reconfigure_changes_indentation() {
        let tracer = capturing();
        tracer.reconfigure(&ParameterSet::new().with("indentation", "-"));
        let mut reg = ActivityRegistry::new(1);
        tracer.connect(&mut reg).unwrap();
        reg.post_end_job.invoke(&());
        assert_eq!(tracer.lines(), vec!["- finished: end job".to_string()]);
    }

    #[test]
    fn test_capture_off_by_default() {
        let tracer = Arc::new(Tracer::from_params(&ParameterSet::new()).unwrap());
        let mut reg = ActivityRegistry::new(1);
        tracer.connect(&mut reg).unwrap();
        reg.job_failure.invoke(&());
        assert!(tracer.lines().is_empty());
    }

    #[test]
    fn test_bad_parameter_type() {
        let params = ParameterSet::new().with("indentation", 3);
        assert!(matches!(
            Tracer::from_params(&params),
            Err(FrameworkError::Configuration(_))
        ));
    }
}
