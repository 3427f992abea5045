//! Time-ordered event queue backing the simulator.

use std::collections::BTreeMap;

use crate::clock::VirtualTime;

/// Identifies one registration in an [`EventQueue`].
///
/// Ordering is by target time first and registration order second, so events
/// registered for the same instant fire first-in first-out.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EventId {
    time: VirtualTime,
    seq: u64,
}

impl EventId {
    /// Simulated time the event is due at.
    pub fn time(&self) -> VirtualTime {
        self.time
    }

    /// Position of the registration among all registrations of the queue.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// An event removed from the queue, ready to be dispatched.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScheduledEvent<T> {
    /// Registration identity, including the due time.
    pub id: EventId,
    /// Whatever the registrant attached.
    pub payload: T,
}

/// A queue of payloads keyed by the simulated time they become due.
#[derive(Debug)]
pub struct EventQueue<T> {
    events: BTreeMap<EventId, T>,
    next_seq: u64,
}

impl<T> EventQueue<T> {
    /// Creates a new, empty queue.
    pub fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Registers `payload` to become due at `time`.
    ///
    /// # Parameters
    /// - `time`: Simulated timestamp when the payload becomes due.
    /// - `payload`: Whatever the caller wants handed back at that time.
    pub fn schedule(&mut self, time: VirtualTime, payload: T) -> EventId {
        let id = EventId {
            time,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.events.insert(id, payload);
        id
    }

    /// Withdraws a registration, returning its payload if it was still queued.
    pub fn cancel(&mut self, id: EventId) -> Option<T> {
        self.events.remove(&id)
    }

    /// Returns `true` when at least one event is due at `now`.
    ///
    /// # Parameters
    /// - `now`: The simulated timestamp to compare against.
    pub fn has_ready(&self, now: VirtualTime) -> bool {
        self.next_time().is_some_and(|time| time <= now)
    }

    /// Removes the earliest event regardless of its due time.
    pub fn pop_next(&mut self) -> Option<ScheduledEvent<T>> {
        self.events
            .pop_first()
            .map(|(id, payload)| ScheduledEvent { id, payload })
    }

    /// Returns the due time of the next event, if any.
    pub fn next_time(&self) -> Option<VirtualTime> {
        self.events.first_key_value().map(|(id, _)| id.time)
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` when there are no queued events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
