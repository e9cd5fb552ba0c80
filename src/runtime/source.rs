//! Event sources and the in-memory queue source.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::{Event, EventId};
use crate::core::AppResult;

/// Supplier of events, shared by every schedule.
///
/// Implementations synchronise internally; each event is handed to exactly
/// one schedule.
pub trait EventSource: Send + Sync {
    /// The next event, or `None` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Any failure reading the next event; the job stops.
    fn next_event(&self) -> AppResult<Option<Event>>;
}

/// Source handing out a fixed list of events in order.
#[derive(Debug, Default)]
pub struct QueueSource {
    events: Mutex<VecDeque<Event>>,
}

impl QueueSource {
    /// Source over `events`.
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            events: Mutex::new(events.into_iter().collect()),
        }
    }

    /// Source of `count` empty events numbered from 1 in run `run`, subrun 0.
    #[must_use]
    pub fn numbered(run: u32, count: u64) -> Self {
        Self::new((1..=count).map(|event| Event::new(EventId::new(run, 0, event))))
    }

    /// Events not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.events.lock().len()
    }
}

impl EventSource for QueueSource {
    fn next_event(&self) -> AppResult<Option<Event>> {
        Ok(self.events.lock().pop_front())
    }
}
