//! Mutex-guarded container holding one element per schedule.
//!
//! The container starts invalid (empty) and becomes valid exactly once,
//! through [`PerScheduleContainer::resize`] or
//! [`PerScheduleContainer::expand_to_num_schedules`].
//!
//! # Locking
//!
//! Every method takes the internal lock for the duration of that call
//! only. Element guards returned by [`PerScheduleContainer::at`] keep the
//! lock until they are dropped. Nothing spans two calls: a read followed
//! by a write from the same thread is not atomic with respect to other
//! threads, and callers that need that must coordinate externally.
//!
//! ```
//! use prometheus_schedules::core::{PerScheduleContainer, ScheduleID};
//!
//! let counts: PerScheduleContainer<u64> = PerScheduleContainer::new();
//! counts.resize(2).unwrap();
//! *counts.at(ScheduleID::first()).unwrap() += 1;
//! assert_eq!(counts.snapshot(), vec![1, 0]);
//! ```

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use super::{FrameworkError, ScheduleID};

/// Source of the number of schedules a job runs.
pub trait ScheduleCount {
    /// Number of schedules configured for the job.
    fn num_schedules(&self) -> usize;
}

struct Slots<T> {
    valid: bool,
    items: Vec<T>,
}

/// One `T` per schedule, indexed by [`ScheduleID`].
pub struct PerScheduleContainer<T> {
    slots: Mutex<Slots<T>>,
}

impl<T> Default for PerScheduleContainer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PerScheduleContainer<T> {
    /// Create an invalid, empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                valid: false,
                items: Vec::new(),
            }),
        }
    }

    /// Whether the container has been sized.
    pub fn is_valid(&self) -> bool {
        self.slots.lock().valid
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.slots.lock().items.len()
    }

    /// Append an element.
    pub fn emplace_back(&self, value: T) {
        self.slots.lock().items.push(value);
    }

    /// Bounds-checked element access. The returned guard holds the lock.
    ///
    /// # Errors
    ///
    /// `FrameworkError::OutOfRange` if `sid` has no element.
    pub fn at(&self, sid: ScheduleID) -> Result<MappedMutexGuard<'_, T>, FrameworkError> {
        let guard = self.slots.lock();
        let len = guard.items.len();
        MutexGuard::try_map(guard, |slots| slots.items.get_mut(sid.id())).map_err(|_| {
            FrameworkError::OutOfRange(format!(
                "schedule {sid} is outside a container of {len} elements"
            ))
        })
    }

    /// Element access returning `None` for an out-of-range id.
    pub fn get(&self, sid: ScheduleID) -> Option<MappedMutexGuard<'_, T>> {
        self.at(sid).ok()
    }

    /// Apply `f` to the element for `sid` under the lock.
    ///
    /// # Errors
    ///
    /// `FrameworkError::OutOfRange` if `sid` has no element.
    pub fn with<R>(&self, sid: ScheduleID, f: impl FnOnce(&mut T) -> R) -> Result<R, FrameworkError> {
        let mut guard = self.at(sid)?;
        Ok(f(&mut guard))
    }

    /// Visit every element in schedule order under a single lock acquisition.
    pub fn for_each(&self, mut f: impl FnMut(ScheduleID, &mut T)) {
        let mut guard = self.slots.lock();
        for (index, item) in guard.items.iter_mut().enumerate() {
            if let Ok(sid) = ScheduleID::new(index) {
                f(sid, item);
            }
        }
    }

    /// Drain all elements, leaving the container valid but empty.
    pub fn take_all(&self) -> Vec<T> {
        std::mem::take(&mut self.slots.lock().items)
    }
}

impl<T: Default> PerScheduleContainer<T> {
    /// Size the container to `n` default elements.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` if the container is already valid.
    pub fn resize(&self, n: usize) -> Result<(), FrameworkError> {
        let mut guard = self.slots.lock();
        if guard.valid {
            return Err(FrameworkError::Logic(format!(
                "attempt to resize a per-schedule container already holding {} elements",
                guard.items.len()
            )));
        }
        guard.items.resize_with(n, T::default);
        guard.valid = true;
        Ok(())
    }

    /// Size the container to the job's schedule count.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` if the container is already valid.
    pub fn expand_to_num_schedules(&self, source: &impl ScheduleCount) -> Result<(), FrameworkError> {
        self.resize(source.num_schedules())
    }
}

impl<T: Clone> PerScheduleContainer<T> {
    /// Copy of all elements in schedule order.
    pub fn snapshot(&self) -> Vec<T> {
        self.slots.lock().items.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    struct Three;

    impl ScheduleCount for Three {
        fn num_schedules(&self) -> usize {
            3
        }
    }

    #[test]
    fn test_starts_invalid() {
        let c: PerScheduleContainer<u32> = PerScheduleContainer::new();
        assert!(!c.is_valid());
        assert_eq!(c.size(), 0);
    }

    #[test]
    fn test_resize_once() {
        let c: PerScheduleContainer<u32> = PerScheduleContainer::new();
        c.resize(3).unwrap();
        assert!(c.is_valid());
        assert_eq!(c.size(), 3);
        assert!(matches!(c.resize(3), Err(FrameworkError::Logic(_))));
        assert!(matches!(
            c.expand_to_num_schedules(&Three),
            Err(FrameworkError::Logic(_))
        ));
    }

    #[test]
    fn test_expand_to_num_schedules() {
        let c: PerScheduleContainer<String> = PerScheduleContainer::new();
        c.expand_to_num_schedules(&Three).unwrap();
        assert_eq!(c.size(), 3);
    }

    #[test]
    fn test_at_out_of_range() {
        let c: PerScheduleContainer<u32> = PerScheduleContainer::new();
        c.resize(2).unwrap();
        assert!(c.at(ScheduleID::new(1).unwrap()).is_ok());
        assert!(matches!(
            c.at(ScheduleID::new(2).unwrap()),
            Err(FrameworkError::OutOfRange(_))
        ));
        assert!(c.get(ScheduleID::invalid()).is_none());
    }

    #[test]
    fn test_emplace_back_extends() {
        let c: PerScheduleContainer<u32> = PerScheduleContainer::new();
        c.resize(1).unwrap();
        c.emplace_back(9);
        assert_eq!(c.snapshot(), vec![0, 9]);
    }

    #[test]
    fn test_disjoint_elements_from_threads() {
        let c: Arc<PerScheduleContainer<u64>> = Arc::new(PerScheduleContainer::new());
        c.resize(4).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let c = Arc::clone(&c);
                thread::spawn(move || {
                    let sid = ScheduleID::new(i).unwrap();
                    for _ in 0..1000 {
                        *c.at(sid).unwrap() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(c.snapshot(), vec![1000; 4]);
    }

    /// The lock covers one call at a time. A read in one call followed by a
    /// write in another can interleave with other threads; only the
    /// single-call form below is atomic.
    #[test]
    fn test_lock_scope_is_one_call() {
        let c: Arc<PerScheduleContainer<u64>> = Arc::new(PerScheduleContainer::new());
        c.resize(1).unwrap();
        let sid = ScheduleID::first();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&c);
                thread::spawn(move || {
                    for _ in 0..500 {
                        c.with(sid, |v| *v += 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*c.at(sid).unwrap(), 4000);
    }
}
