//! Job-wide notification channel.
//!
//! # Threading
//!
//! Registration (`watch*`, `clear`) takes `&mut self` and is expected to
//! happen during single-threaded setup; `invoke` takes `&self` and may be
//! called from any thread afterwards. The borrow rules therefore rule out
//! registration racing an invocation on the same instance.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use prometheus_schedules::signals::{Fifo, GlobalSignal};
//!
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let mut signal: GlobalSignal<Fifo, str> = GlobalSignal::new();
//! let sink = Arc::clone(&log);
//! signal.watch(move |text: &str| sink.lock().unwrap().push(text.to_owned()));
//! signal.invoke("begin");
//! assert_eq!(*log.lock().unwrap(), vec!["begin".to_string()]);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use super::policy::SignalResponse;

/// Type-erased callable registered on a signal.
pub(crate) type Slot<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// Adapt any callable into a slot, discarding its return value.
pub(crate) fn make_slot<A, R, F>(f: F) -> Slot<A>
where
    A: ?Sized + 'static,
    F: Fn(&A) -> R + Send + Sync + 'static,
{
    Arc::new(move |args: &A| {
        let _ = f(args);
    })
}

/// Adapt a method on a shared target into a slot.
///
/// The slot holds only a weak reference; once the target is dropped the
/// slot does nothing.
pub(crate) fn make_method_slot<A, T, R>(target: &Arc<T>, method: fn(&T, &A) -> R) -> Slot<A>
where
    A: ?Sized + 'static,
    T: Send + Sync + 'static,
    R: 'static,
{
    let target: Weak<T> = Arc::downgrade(target);
    Arc::new(move |args: &A| {
        if let Some(target) = target.upgrade() {
            let _ = method(&target, args);
        }
    })
}

/// Ordered multi-subscriber channel with one slot list for the whole job.
///
/// `A` is the argument type handed to every slot by reference; use a tuple
/// or small struct for several values and `()` for none.
pub struct GlobalSignal<P: SignalResponse, A: ?Sized = ()> {
    slots: VecDeque<Slot<A>>,
    _policy: PhantomData<fn() -> P>,
}

impl<P: SignalResponse, A: ?Sized + 'static> GlobalSignal<P, A> {
    /// Create a signal with no slots.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: VecDeque::new(),
            _policy: PhantomData,
        }
    }

    /// Register a free function or closure. Its return value is discarded.
    pub fn watch<F, R>(&mut self, slot: F)
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        P::connect(&mut self.slots, make_slot(slot));
    }

    /// Register `method` bound to `target`.
    pub fn watch_method<T, R>(&mut self, target: &Arc<T>, method: fn(&T, &A) -> R)
    where
        T: Send + Sync + 'static,
        R: 'static,
    {
        P::connect(&mut self.slots, make_method_slot(target, method));
    }

    /// Call every slot once, in list order.
    pub fn invoke(&self, args: &A) {
        for slot in &self.slots {
            slot(args);
        }
    }

    /// Remove all slots.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of registered slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slots are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Merge `other`'s slots as if registered after ours.
    pub fn copy_slots_from(&mut self, other: &Self) {
        P::merge(&mut self.slots, &other.slots);
    }

    pub(crate) fn connect_slot(&mut self, slot: Slot<A>) {
        P::connect(&mut self.slots, slot);
    }
}

impl<P: SignalResponse, A: ?Sized + 'static> Default for GlobalSignal<P, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: SignalResponse, A: ?Sized> Clone for GlobalSignal<P, A> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            _policy: PhantomData,
        }
    }
}

impl<P: SignalResponse, A: ?Sized> fmt::Debug for GlobalSignal<P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalSignal")
            .field("policy", &P::RESPONSE)
            .field("slots", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{Fifo, Lifo};
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<String>>, impl Fn(u8) -> Box<dyn Fn(&str) + Send + Sync>) {
        let out = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&out);
        let make = move |n: u8| -> Box<dyn Fn(&str) + Send + Sync> {
            let sink = Arc::clone(&sink);
            Box::new(move |text: &str| {
                sink.lock().push_str(&format!("{n}: {text}"));
            })
        };
        (out, make)
    }

    #[test]
    fn test_fifo_order() {
        let (out, make) = recorder();
        let mut s: GlobalSignal<Fifo, str> = GlobalSignal::new();
        s.watch(make(1));
        s.watch(make(2));
        s.watch(make(3));
        s.invoke("x;");
        assert_eq!(*out.lock(), "1: x;2: x;3: x;");
    }

    #[test]
    fn test_lifo_order() {
        let (out, make) = recorder();
        let mut s: GlobalSignal<Lifo, str> = GlobalSignal::new();
        s.watch(make(1));
        s.watch(make(2));
        s.watch(make(3));
        s.invoke("x;");
        assert_eq!(*out.lock(), "3: x;2: x;1: x;");
    }

    #[test]
    fn test_return_values_discarded() {
        let mut s: GlobalSignal<Fifo, u32> = GlobalSignal::new();
        s.watch(|n: &u32| n + 1);
        s.watch(|n: &u32| format!("{n}"));
        s.invoke(&7);
        assert_eq!(s.len(), 2);
    }

    struct Counter {
        hits: Mutex<u32>,
    }

    impl Counter {
        fn bump(&self, by: &u32) {
            *self.hits.lock() += by;
        }
    }

    #[test]
    fn test_method_slot() {
        let counter = Arc::new(Counter { hits: Mutex::new(0) });
        let mut s: GlobalSignal<Fifo, u32> = GlobalSignal::new();
        s.watch_method(&counter, Counter::bump);
        s.invoke(&2);
        s.invoke(&3);
        assert_eq!(*counter.hits.lock(), 5);
    }

    #[test]
    fn test_method_slot_skips_dropped_target() {
        let counter = Arc::new(Counter { hits: Mutex::new(0) });
        let mut s: GlobalSignal<Fifo, u32> = GlobalSignal::new();
        s.watch_method(&counter, Counter::bump);
        drop(counter);
        s.invoke(&1);
    }

    #[test]
    fn test_clear() {
        let mut s: GlobalSignal<Fifo> = GlobalSignal::new();
        s.watch(|_: &()| ());
        assert!(!s.is_empty());
        s.clear();
        assert!(s.is_empty());
        s.invoke(&());
    }

    #[test]
    fn test_copy_slots_from() {
        let (out, make) = recorder();
        let mut a: GlobalSignal<Lifo, str> = GlobalSignal::new();
        let mut b: GlobalSignal<Lifo, str> = GlobalSignal::new();
        a.watch(make(1));
        b.watch(make(2));
        b.watch(make(3));
        a.copy_slots_from(&b);
        a.invoke("");
        assert_eq!(*out.lock(), "3: 2: 1: ");
    }
}
