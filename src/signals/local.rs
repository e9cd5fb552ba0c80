//! Per-schedule notification channel.
//!
//! A [`LocalSignal`] holds one independent slot list per schedule; the
//! schedule count is fixed at construction. Registration and invocation
//! follow the same borrow discipline as [`GlobalSignal`](super::GlobalSignal).

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::global::{make_method_slot, make_slot, Slot};
use super::policy::SignalResponse;
use crate::core::{schedule_ids, FrameworkError, ScheduleID};

/// Ordered multi-subscriber channel with one slot list per schedule.
pub struct LocalSignal<P: SignalResponse, A: ?Sized = ()> {
    signals: Vec<VecDeque<Slot<A>>>,
    _policy: PhantomData<fn() -> P>,
}

impl<P: SignalResponse, A: ?Sized + 'static> LocalSignal<P, A> {
    /// Create a signal with `num_schedules` empty slot lists.
    #[must_use]
    pub fn new(num_schedules: usize) -> Self {
        Self {
            signals: (0..num_schedules).map(|_| VecDeque::new()).collect(),
            _policy: PhantomData,
        }
    }

    /// Number of schedules this signal was built for.
    #[must_use]
    pub fn num_schedules(&self) -> usize {
        self.signals.len()
    }

    fn list(&self, sid: ScheduleID) -> Result<&VecDeque<Slot<A>>, FrameworkError> {
        let n = self.signals.len();
        self.signals
            .get(sid.id())
            .ok_or_else(|| out_of_range(sid, n))
    }

    fn list_mut(&mut self, sid: ScheduleID) -> Result<&mut VecDeque<Slot<A>>, FrameworkError> {
        let n = self.signals.len();
        self.signals
            .get_mut(sid.id())
            .ok_or_else(|| out_of_range(sid, n))
    }

    /// Register a callable on schedule `sid` only.
    ///
    /// # Errors
    ///
    /// `FrameworkError::OutOfRange` if `sid` is not below the schedule count.
    pub fn watch<F, R>(&mut self, sid: ScheduleID, slot: F) -> Result<(), FrameworkError>
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        P::connect(self.list_mut(sid)?, make_slot(slot));
        Ok(())
    }

    /// Register `method` bound to `target` on schedule `sid` only.
    ///
    /// # Errors
    ///
    /// `FrameworkError::OutOfRange` if `sid` is not below the schedule count.
    pub fn watch_method<T, R>(
        &mut self,
        sid: ScheduleID,
        target: &Arc<T>,
        method: fn(&T, &A) -> R,
    ) -> Result<(), FrameworkError>
    where
        T: Send + Sync + 'static,
        R: 'static,
    {
        P::connect(self.list_mut(sid)?, make_method_slot(target, method));
        Ok(())
    }

    /// Register an independent copy of `slot` on every schedule.
    pub fn watch_all<F, R>(&mut self, slot: F)
    where
        F: Fn(&A) -> R + Clone + Send + Sync + 'static,
    {
        for list in &mut self.signals {
            P::connect(list, make_slot(slot.clone()));
        }
    }

    /// Register `method` bound to `target` on every schedule.
    pub fn watch_all_method<T, R>(&mut self, target: &Arc<T>, method: fn(&T, &A) -> R)
    where
        T: Send + Sync + 'static,
        R: 'static,
    {
        for list in &mut self.signals {
            P::connect(list, make_method_slot(target, method));
        }
    }

    /// Call every slot of schedule `sid` once, in list order.
    ///
    /// # Errors
    ///
    /// `FrameworkError::OutOfRange` if `sid` is not below the schedule count.
    pub fn invoke(&self, sid: ScheduleID, args: &A) -> Result<(), FrameworkError> {
        for slot in self.list(sid)? {
            slot(args);
        }
        Ok(())
    }

    /// Remove the slots of schedule `sid`.
    ///
    /// # Errors
    ///
    /// `FrameworkError::OutOfRange` if `sid` is not below the schedule count.
    pub fn clear(&mut self, sid: ScheduleID) -> Result<(), FrameworkError> {
        self.list_mut(sid)?.clear();
        Ok(())
    }

    /// Remove the slots of every schedule.
    pub fn clear_all(&mut self) {
        for list in &mut self.signals {
            list.clear();
        }
    }

    /// Number of slots registered on schedule `sid`.
    ///
    /// # Errors
    ///
    /// `FrameworkError::OutOfRange` if `sid` is not below the schedule count.
    pub fn len(&self, sid: ScheduleID) -> Result<usize, FrameworkError> {
        Ok(self.list(sid)?.len())
    }

    /// Merge `other`'s per-schedule slots as if registered after ours.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` if the two signals have different schedule
    /// counts.
    pub fn copy_slots_from(&mut self, other: &Self) -> Result<(), FrameworkError> {
        if self.signals.len() != other.signals.len() {
            return Err(FrameworkError::Logic(format!(
                "cannot merge a local signal for {} schedules into one for {}",
                other.signals.len(),
                self.signals.len()
            )));
        }
        for (ours, theirs) in self.signals.iter_mut().zip(&other.signals) {
            P::merge(ours, theirs);
        }
        Ok(())
    }

    pub(crate) fn connect_slot(&mut self, sid: ScheduleID, slot: Slot<A>) -> Result<(), FrameworkError> {
        P::connect(self.list_mut(sid)?, slot);
        Ok(())
    }

    pub(crate) fn schedules(&self) -> impl Iterator<Item = ScheduleID> {
        schedule_ids(self.signals.len())
    }
}

fn out_of_range(sid: ScheduleID, num_schedules: usize) -> FrameworkError {
    FrameworkError::OutOfRange(format!(
        "schedule {sid} is outside a local signal for {num_schedules} schedules"
    ))
}

impl<P: SignalResponse, A: ?Sized> Clone for LocalSignal<P, A> {
    fn clone(&self) -> Self {
        Self {
            signals: self.signals.clone(),
            _policy: PhantomData,
        }
    }
}

impl<P: SignalResponse, A: ?Sized> fmt::Debug for LocalSignal<P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sizes: Vec<usize> = self.signals.iter().map(VecDeque::len).collect();
        f.debug_struct("LocalSignal")
            .field("policy", &P::RESPONSE)
            .field("slots", &sizes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{Fifo, Lifo};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sid(n: usize) -> ScheduleID {
        ScheduleID::new(n).unwrap()
    }

    #[test]
    fn test_schedules_are_isolated() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let mut s: LocalSignal<Fifo, u32> = LocalSignal::new(3);
        for n in 0..3 {
            let hits = Arc::clone(&hits);
            s.watch(sid(n), move |v: &u32| hits.lock().push((n, *v))).unwrap();
        }
        s.invoke(sid(1), &9).unwrap();
        assert_eq!(*hits.lock(), vec![(1, 9)]);
    }

    #[test]
    fn test_lifo_order_per_schedule() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let mut s: LocalSignal<Lifo> = LocalSignal::new(2);
        for n in 1..=3 {
            let out = Arc::clone(&out);
            s.watch(sid(0), move |_: &()| out.lock().push(n)).unwrap();
        }
        s.invoke(sid(0), &()).unwrap();
        s.invoke(sid(1), &()).unwrap();
        assert_eq!(*out.lock(), vec![3, 2, 1]);
    }

    #[test]
    fn test_watch_all_fires_once_per_schedule() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut s: LocalSignal<Fifo> = LocalSignal::new(3);
        let c = Arc::clone(&count);
        s.watch_all(move |_: &()| c.fetch_add(1, Ordering::SeqCst));
        for n in 0..3 {
            s.invoke(sid(n), &()).unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_out_of_range() {
        let mut s: LocalSignal<Fifo> = LocalSignal::new(3);
        assert!(matches!(
            s.watch(sid(3), |_: &()| ()),
            Err(FrameworkError::OutOfRange(_))
        ));
        assert!(matches!(
            s.invoke(ScheduleID::invalid(), &()),
            Err(FrameworkError::OutOfRange(_))
        ));
        assert!(matches!(s.clear(sid(7)), Err(FrameworkError::OutOfRange(_))));
    }

    #[test]
    fn test_clear_and_clear_all() {
        let mut s: LocalSignal<Fifo> = LocalSignal::new(2);
        s.watch_all(|_: &()| ());
        s.clear(sid(0)).unwrap();
        assert_eq!(s.len(sid(0)).unwrap(), 0);
        assert_eq!(s.len(sid(1)).unwrap(), 1);
        s.clear_all();
        assert_eq!(s.len(sid(1)).unwrap(), 0);
    }

    #[test]
    fn test_copy_slots_mismatched_counts() {
        let mut a: LocalSignal<Fifo> = LocalSignal::new(2);
        let b: LocalSignal<Fifo> = LocalSignal::new(3);
        assert!(matches!(a.copy_slots_from(&b), Err(FrameworkError::Logic(_))));
    }
}
