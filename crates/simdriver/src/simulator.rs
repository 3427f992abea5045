//! Discrete-event simulator: a virtual clock plus the callbacks waiting on it.

use std::fmt;

use serde::Serialize;
use tracing::{debug, trace};

use crate::clock::{SimClock, VirtualTime};
use crate::scheduler::{EventId, EventQueue};

/// Error type a scheduled callback may fail with.
pub type EventError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Work registered with a [`SimulationClock`], run once its time is reached.
///
/// The callback receives the clock back so it can read the time and register
/// follow-up work.
pub type EventCallback = Box<dyn FnOnce(&mut dyn SimulationClock) -> Result<(), EventError>>;

/// Boxes a closure as an [`EventCallback`].
pub fn callback<F>(f: F) -> EventCallback
where
    F: FnOnce(&mut dyn SimulationClock) -> Result<(), EventError> + 'static,
{
    Box::new(f)
}

/// The scheduling surface a driver needs from a simulator.
pub trait SimulationClock {
    /// Current virtual time.
    fn now(&self) -> VirtualTime;

    /// Arranges for `callback` to run once virtual time reaches `time`.
    ///
    /// `label` is only used for diagnostics.
    fn schedule_at(
        &mut self,
        time: VirtualTime,
        label: &str,
        callback: EventCallback,
    ) -> Result<EventId, ScheduleError>;

    /// Withdraws a registration that has not fired yet. Returns `false` if the
    /// event already ran or was never registered here.
    fn cancel(&mut self, id: EventId) -> bool;
}

/// Errors raised while registering an event.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The requested time lies before the current virtual time.
    #[error("cannot schedule {label:?} at {requested}: simulated time is already {now}")]
    InPast {
        label: String,
        requested: VirtualTime,
        now: VirtualTime,
    },
}

/// Errors surfaced while dispatching events.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A scheduled callback returned an error. Nobody is waiting on the
    /// callback synchronously, so this is where its failure lands.
    #[error("event {label:?} at t={time} failed")]
    Callback {
        label: String,
        time: VirtualTime,
        #[source]
        source: EventError,
    },
}

/// Outcome of [`EventSimulator::run`] and [`EventSimulator::run_until`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct RunSummary {
    /// Events dispatched during the run.
    pub events: u64,
    /// Virtual time when the run returned.
    pub final_time: VirtualTime,
}

struct PendingEvent {
    label: String,
    callback: EventCallback,
}

impl fmt::Debug for PendingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEvent")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Single-threaded event simulator.
///
/// Time jumps straight to the next due event; equal-time events fire in the
/// order they were registered.
#[derive(Debug, Default)]
pub struct EventSimulator {
    clock: SimClock,
    queue: EventQueue<PendingEvent>,
    dispatched: u64,
}

impl EventSimulator {
    /// Creates a simulator whose clock starts at `start`.
    pub fn new(start: VirtualTime) -> Self {
        Self {
            clock: SimClock::new(start),
            queue: EventQueue::new(),
            dispatched: 0,
        }
    }

    /// Number of registrations still waiting.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Due time of the next registration, if any.
    pub fn next_time(&self) -> Option<VirtualTime> {
        self.queue.next_time()
    }

    /// Total events dispatched since construction.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Dispatches the next event, advancing the clock to its due time.
    ///
    /// Returns `Ok(None)` once the queue is empty.
    pub fn step(&mut self) -> Result<Option<EventId>, SimError> {
        let Some(event) = self.queue.pop_next() else {
            return Ok(None);
        };
        let time = event.id.time();
        self.clock.advance_to(time);
        self.dispatched += 1;

        let PendingEvent { label, callback } = event.payload;
        trace!(time, label = %label, "dispatching event");
        callback(self).map_err(|source| SimError::Callback {
            label,
            time,
            source,
        })?;
        Ok(Some(event.id))
    }

    /// Dispatches events until none remain.
    pub fn run(&mut self) -> Result<RunSummary, SimError> {
        let before = self.dispatched;
        while self.step()?.is_some() {}
        let summary = self.summary_since(before);
        debug!(events = summary.events, final_time = summary.final_time, "simulation drained");
        Ok(summary)
    }

    /// Dispatches every event due at or before `limit`, then moves the clock
    /// to `limit`. Later events stay queued.
    pub fn run_until(&mut self, limit: VirtualTime) -> Result<RunSummary, SimError> {
        let before = self.dispatched;
        while self.queue.has_ready(limit) {
            self.step()?;
        }
        self.clock.advance_to(limit);
        let summary = self.summary_since(before);
        debug!(
            events = summary.events,
            final_time = summary.final_time,
            pending = self.queue.len(),
            "simulation reached horizon"
        );
        Ok(summary)
    }

    fn summary_since(&self, before: u64) -> RunSummary {
        RunSummary {
            events: self.dispatched - before,
            final_time: self.clock.now(),
        }
    }
}

impl SimulationClock for EventSimulator {
    fn now(&self) -> VirtualTime {
        self.clock.now()
    }

    fn schedule_at(
        &mut self,
        time: VirtualTime,
        label: &str,
        callback: EventCallback,
    ) -> Result<EventId, ScheduleError> {
        let now = self.clock.now();
        if time < now {
            return Err(ScheduleError::InPast {
                label: label.to_string(),
                requested: time,
                now,
            });
        }
        let id = self.queue.schedule(
            time,
            PendingEvent {
                label: label.to_string(),
                callback,
            },
        );
        trace!(time, label, seq = id.seq(), "event scheduled");
        Ok(id)
    }

    fn cancel(&mut self, id: EventId) -> bool {
        self.queue.cancel(id).is_some()
    }
}
