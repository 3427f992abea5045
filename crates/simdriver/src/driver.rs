//! The insert driver: pulls commands one at a time and interleaves them with
//! the simulator's virtual time.
//!
//! The loop never blocks. A positive pause registers a resume callback with
//! the [`SimulationClock`] and returns; when the clock fires it, the same
//! `drive` step function picks up at the next pull. The callback only holds a
//! shared handle to the driver state, so there is never more than one loop
//! body in flight for a driver.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::clock::{Ticks, VirtualTime, deadline};
use crate::command::{Command, UnrecognizedCommand};
use crate::hooks::{DriverHooks, HookError, HookFlow, InsertEvent};
use crate::scheduler::EventId;
use crate::simulator::{self, ScheduleError, SimulationClock};
use crate::source::{CommandSource, SourceError};
use crate::storage::StorageTarget;

/// Label attached to resume registrations after a pause.
pub const PAUSE_LABEL: &str = "InserterSleep";
/// Label attached to resume registrations requested by an insertion hook.
pub const HOOK_WAIT_LABEL: &str = "InserterHookWait";

/// Lifecycle of a driver.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DriverState {
    /// Constructed, not started yet.
    Idle,
    /// The loop holds control.
    Running,
    /// A resume is registered with the clock and has not fired yet.
    Suspended { resume_at: VirtualTime },
    /// The source is exhausted.
    Terminated,
    /// A fatal error ended the driver.
    Failed,
    /// Stopped through [`InsertDriver::cancel`].
    Cancelled,
}

impl DriverState {
    /// `Terminated`, `Failed` and `Cancelled` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Failed | Self::Cancelled)
    }
}

/// Counters kept while driving.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct DriverStats {
    pub pulled: u64,
    pub applied: u64,
    pub pauses: u64,
    pub suspensions: u64,
    pub hook_calls: u64,
}

/// Errors that end a drive. None of them are recovered from.
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error(transparent)]
    UnrecognizedCommand(#[from] UnrecognizedCommand),
    #[error("command source failed")]
    Source(#[source] std::io::Error),
    #[error("storage insertion failed")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("on_insert hook failed")]
    Hook(#[source] HookError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("resume time overflows: {now} + {ticks}")]
    TimeOverflow { now: VirtualTime, ticks: Ticks },
    #[error("virtual time went backwards from {last} to {now}")]
    TimeRegressed { last: VirtualTime, now: VirtualTime },
    #[error("driver already started (state: {state:?})")]
    AlreadyStarted { state: DriverState },
    #[error("driver re-entered while its loop was running")]
    Reentered,
}

impl From<SourceError> for DriveError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unrecognized(bad) => Self::UnrecognizedCommand(bad),
            SourceError::Io(io) => Self::Source(io),
        }
    }
}

/// Where one pass of the loop left off.
enum Yield {
    Exhausted,
    Suspend {
        resume_at: VirtualTime,
        label: &'static str,
    },
}

struct DriverCore<Src, S: StorageTarget> {
    source: Src,
    storage: Rc<RefCell<S>>,
    hooks: DriverHooks<S>,
    state: DriverState,
    pending: Option<EventId>,
    last_seen: Option<VirtualTime>,
    stats: DriverStats,
}

impl<Src: CommandSource, S: StorageTarget> DriverCore<Src, S> {
    /// Pulls and applies commands until the source runs dry or the driver has
    /// to wait for virtual time to pass.
    fn run_loop(&mut self, clock: &mut dyn SimulationClock) -> Result<Yield, DriveError> {
        loop {
            let now = clock.now();
            if let Some(last) = self.last_seen {
                if now < last {
                    return Err(DriveError::TimeRegressed { last, now });
                }
            }
            self.last_seen = Some(now);

            let Some(command) = self.source.pull()? else {
                return Ok(Yield::Exhausted);
            };
            self.stats.pulled += 1;
            trace!(now, command = %command, "pulled command");

            match command {
                Command::Apply { payload } => {
                    if let Some(resume_at) = self.apply(clock, now, payload)? {
                        return Ok(Yield::Suspend {
                            resume_at,
                            label: HOOK_WAIT_LABEL,
                        });
                    }
                }
                Command::Pause { duration } => {
                    self.stats.pauses += 1;
                    if duration <= 0 {
                        continue;
                    }
                    let resume_at = deadline(now, duration).ok_or(
                        DriveError::TimeOverflow {
                            now,
                            ticks: duration,
                        },
                    )?;
                    return Ok(Yield::Suspend {
                        resume_at,
                        label: PAUSE_LABEL,
                    });
                }
            }
        }
    }

    /// Inserts one payload and runs the insertion hook. Returns the resume
    /// time when the hook asked the driver to wait.
    fn apply(
        &mut self,
        clock: &mut dyn SimulationClock,
        now: VirtualTime,
        payload: bytes::Bytes,
    ) -> Result<Option<VirtualTime>, DriveError> {
        let mut storage = self.storage.borrow_mut();
        let handle = storage
            .insert(payload)
            .map_err(|err| DriveError::Storage(Box::new(err)))?;
        self.stats.applied += 1;

        let event = InsertEvent {
            now,
            clock: &mut *clock,
            storage: &mut *storage,
            handle: &handle,
        };
        let Some(outcome) = self.hooks.notify_insert(event) else {
            return Ok(None);
        };
        self.stats.hook_calls += 1;

        match outcome.map_err(DriveError::Hook)? {
            HookFlow::Proceed => Ok(None),
            HookFlow::WaitFor(ticks) if ticks <= 0 => Ok(None),
            HookFlow::WaitFor(ticks) => {
                let now = clock.now();
                deadline(now, ticks)
                    .map(Some)
                    .ok_or(DriveError::TimeOverflow { now, ticks })
            }
        }
    }
}

/// Drives a [`CommandSource`] into a [`StorageTarget`] on simulated time.
///
/// The handle is cheap to clone; clones share the same driver state.
pub struct InsertDriver<Src, S: StorageTarget> {
    core: Rc<RefCell<DriverCore<Src, S>>>,
}

impl<Src, S: StorageTarget> Clone for InsertDriver<Src, S> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<Src, S> InsertDriver<Src, S>
where
    Src: CommandSource + 'static,
    S: StorageTarget + 'static,
{
    pub fn new(source: Src, storage: Rc<RefCell<S>>, hooks: DriverHooks<S>) -> Self {
        Self {
            core: Rc::new(RefCell::new(DriverCore {
                source,
                storage,
                hooks,
                state: DriverState::Idle,
                pending: None,
                last_seen: None,
                stats: DriverStats::default(),
            })),
        }
    }

    /// Current lifecycle state. Reads as `Running` only from inside a hook.
    pub fn state(&self) -> DriverState {
        self.core
            .try_borrow()
            .map_or(DriverState::Running, |core| core.state)
    }

    /// Counters so far, or `None` while the loop is running.
    pub fn stats(&self) -> Option<DriverStats> {
        self.core.try_borrow().ok().map(|core| core.stats)
    }

    /// Starts pulling commands.
    ///
    /// Returns once the loop has suspended on the clock or the source is
    /// exhausted. Failures after a resume surface through the clock's
    /// dispatch instead, since nothing is waiting here any more.
    pub fn start(&self, clock: &mut dyn SimulationClock) -> Result<DriverState, DriveError> {
        {
            let mut core = self
                .core
                .try_borrow_mut()
                .map_err(|_| DriveError::Reentered)?;
            if core.state != DriverState::Idle {
                return Err(DriveError::AlreadyStarted { state: core.state });
            }
            core.state = DriverState::Running;
            debug!(now = clock.now(), "driver started");
        }
        Self::drive(&self.core, clock)
    }

    /// Stops the driver. A pending resume is withdrawn from the clock and, if
    /// it fires anyway, it returns without pulling. Terminal states are left
    /// as they are.
    pub fn cancel(&self, clock: &mut dyn SimulationClock) -> Result<DriverState, DriveError> {
        let mut core = self
            .core
            .try_borrow_mut()
            .map_err(|_| DriveError::Reentered)?;
        let state = core.state;
        match state {
            DriverState::Idle => core.state = DriverState::Cancelled,
            DriverState::Suspended { resume_at } => {
                if let Some(id) = core.pending.take() {
                    let withdrawn = clock.cancel(id);
                    debug!(resume_at, withdrawn, "pending resume cancelled");
                }
                core.state = DriverState::Cancelled;
            }
            DriverState::Running => return Err(DriveError::Reentered),
            DriverState::Terminated | DriverState::Failed | DriverState::Cancelled => {}
        }
        Ok(core.state)
    }

    /// Re-entry point for the clock's resume callback.
    fn resume(
        core: &Rc<RefCell<DriverCore<Src, S>>>,
        clock: &mut dyn SimulationClock,
    ) -> Result<DriverState, DriveError> {
        {
            let mut guard = core.try_borrow_mut().map_err(|_| DriveError::Reentered)?;
            let state = guard.state;
            match state {
                DriverState::Suspended { resume_at } => {
                    trace!(now = clock.now(), resume_at, "driver resumed");
                    guard.pending = None;
                    guard.state = DriverState::Running;
                }
                other => {
                    debug!(state = ?other, "stale resume ignored");
                    return Ok(other);
                }
            }
        }
        Self::drive(core, clock)
    }

    /// One pass of the loop plus the bookkeeping for wherever it stopped.
    fn drive(
        core: &Rc<RefCell<DriverCore<Src, S>>>,
        clock: &mut dyn SimulationClock,
    ) -> Result<DriverState, DriveError> {
        let mut guard = core.try_borrow_mut().map_err(|_| DriveError::Reentered)?;
        let outcome = guard.run_loop(clock).and_then(|step| match step {
            Yield::Exhausted => Ok(DriverState::Terminated),
            Yield::Suspend { resume_at, label } => {
                let handle = Rc::clone(core);
                let id = clock.schedule_at(
                    resume_at,
                    label,
                    simulator::callback(move |clock| {
                        Self::resume(&handle, clock)?;
                        Ok(())
                    }),
                )?;
                guard.pending = Some(id);
                guard.stats.suspensions += 1;
                Ok(DriverState::Suspended { resume_at })
            }
        });

        match outcome {
            Ok(state) => {
                guard.state = state;
                if state == DriverState::Terminated {
                    debug!(now = clock.now(), stats = ?guard.stats, "command source exhausted");
                } else {
                    trace!(now = clock.now(), state = ?state, "driver suspended");
                }
                Ok(state)
            }
            Err(err) => {
                guard.state = DriverState::Failed;
                debug!(now = clock.now(), error = %err, "driver failed");
                Err(err)
            }
        }
    }
}
