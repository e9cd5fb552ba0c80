//! Bundle of job lifecycle signals that services subscribe to.
//!
//! Job-wide transitions are [`GlobalSignal`]s; transitions that happen
//! independently on every schedule are [`LocalSignal`]s sized for the
//! job's schedule count. "Pre" signals are FIFO and "post" signals are
//! LIFO, so watchers unwind in the reverse order they wound up.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::warn;

use super::global::Slot;
use super::{Fifo, GlobalSignal, Lifo, LocalSignal};
use crate::core::FrameworkError;
use crate::runtime::{EventId, ModuleDescription};

/// A registry shared behind some synchronisation that slots can fire into.
pub trait SharedRegistry: Send + Sync + 'static {
    /// Run `f` with shared access to the registry.
    fn with_registry(&self, f: &mut dyn FnMut(&ActivityRegistry));
}

impl SharedRegistry for RwLock<ActivityRegistry> {
    fn with_registry(&self, f: &mut dyn FnMut(&ActivityRegistry)) {
        // Forwarded slots may fire while the caller already holds a read guard.
        f(&self.read_recursive());
    }
}

macro_rules! activity_signals {
    (
        global { $( $(#[$gdoc:meta])* $gname:ident : $gpolicy:ty => $garg:ty; )* }
        local { $( $(#[$ldoc:meta])* $lname:ident : $lpolicy:ty => $larg:ty; )* }
    ) => {
        /// Lifecycle signals of one job.
        #[derive(Debug, Clone)]
        pub struct ActivityRegistry {
            num_schedules: usize,
            $( $(#[$gdoc])* pub $gname: GlobalSignal<$gpolicy, $garg>, )*
            $( $(#[$ldoc])* pub $lname: LocalSignal<$lpolicy, $larg>, )*
        }

        impl ActivityRegistry {
            /// Create a registry with empty signals for `num_schedules` schedules.
            #[must_use]
            pub fn new(num_schedules: usize) -> Self {
                Self {
                    num_schedules,
                    $( $gname: GlobalSignal::new(), )*
                    $( $lname: LocalSignal::new(num_schedules), )*
                }
            }

            /// Merge every signal of `other` into ours, as if its slots were
            /// registered after ours.
            ///
            /// # Errors
            ///
            /// `FrameworkError::Logic` if the registries were built for
            /// different schedule counts.
            pub fn copy_slots_from(&mut self, other: &Self) -> Result<(), FrameworkError> {
                if self.num_schedules != other.num_schedules {
                    return Err(FrameworkError::Logic(format!(
                        "cannot merge an activity registry for {} schedules into one for {}",
                        other.num_schedules, self.num_schedules
                    )));
                }
                $( self.$gname.copy_slots_from(&other.$gname); )*
                $( self.$lname.copy_slots_from(&other.$lname)?; )*
                Ok(())
            }

            /// Register slots that re-fire each of our signals into `target`.
            ///
            /// Only a weak reference to `target` is kept. Forwarding chains
            /// must not form a cycle.
            ///
            /// # Errors
            ///
            /// Propagates range errors from registering the per-schedule slots.
            pub fn forward_to<T: SharedRegistry>(&mut self, target: &Arc<T>) -> Result<(), FrameworkError> {
                let target: Weak<T> = Arc::downgrade(target);
                $(
                    let weak = Weak::clone(&target);
                    let slot: Slot<$garg> = Arc::new(move |args: &$garg| {
                        if let Some(target) = weak.upgrade() {
                            target.with_registry(&mut |registry: &ActivityRegistry| registry.$gname.invoke(args));
                        }
                    });
                    self.$gname.connect_slot(slot);
                )*
                $(
                    let schedules: Vec<_> = self.$lname.schedules().collect();
                    for sid in schedules {
                        let weak = Weak::clone(&target);
                        let slot: Slot<$larg> = Arc::new(move |args: &$larg| {
                            if let Some(target) = weak.upgrade() {
                                target.with_registry(&mut |registry: &ActivityRegistry| {
                                    if let Err(e) = registry.$lname.invoke(sid, args) {
                                        warn!(signal = stringify!($lname), error = %e, "forwarded signal dropped");
                                    }
                                });
                            }
                        });
                        self.$lname.connect_slot(sid, slot)?;
                    }
                )*
                Ok(())
            }

            /// Remove every slot from every signal.
            pub fn clear_all(&mut self) {
                $( self.$gname.clear(); )*
                $( self.$lname.clear_all(); )*
            }

            /// Total number of slots across all signals and schedules.
            #[must_use]
            pub fn slot_count(&self) -> usize {
                let mut total = 0;
                $( total += self.$gname.len(); )*
                $(
                    for sid in self.$lname.schedules() {
                        total += self.$lname.len(sid).unwrap_or(0);
                    }
                )*
                total
            }
        }
    };
}

activity_signals! {
    global {
        /// Fired once after every module has been constructed.
        post_begin_job: Fifo => ();
        /// Fired once after the last event has been processed.
        post_end_job: Lifo => ();
        /// Fired once when the job stops because of an error.
        job_failure: Lifo => ();
        /// Fired before a module is constructed.
        pre_module_construction: Fifo => ModuleDescription;
        /// Fired after a module has been constructed.
        post_module_construction: Lifo => ModuleDescription;
        /// Fired after a service accepted new parameters.
        post_services_reconfigure: Fifo => ();
    }
    local {
        /// Fired on a schedule before it asks the source for an event.
        pre_source_event: Fifo => ();
        /// Fired on a schedule after it received an event from the source.
        post_source_event: Lifo => EventId;
        /// Fired on a schedule before its modules see an event.
        pre_process_event: Fifo => EventId;
        /// Fired on a schedule after its modules processed an event.
        post_process_event: Lifo => EventId;
        /// Fired on a schedule before a module processes an event.
        pre_module: Fifo => ModuleDescription;
        /// Fired on a schedule after a module processed an event.
        post_module: Lifo => ModuleDescription;
    }
}

impl ActivityRegistry {
    /// Number of schedules the per-schedule signals were built for.
    #[must_use]
    pub const fn num_schedules(&self) -> usize {
        self.num_schedules
    }
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new(1)
    }
}
