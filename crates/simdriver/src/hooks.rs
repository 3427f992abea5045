//! Notification hooks invoked by the driver.

use std::fmt;

use crate::clock::{Ticks, VirtualTime};
use crate::simulator::SimulationClock;
use crate::storage::StorageTarget;

/// Error type a hook may fail with. It is propagated as-is.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What the driver does once a hook returns.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HookFlow {
    /// Pull the next command immediately.
    Proceed,
    /// Hold the driver for this many ticks of virtual time first.
    /// Non-positive values behave like [`HookFlow::Proceed`].
    WaitFor(Ticks),
}

/// Everything an `on_insert` hook gets to see.
pub struct InsertEvent<'a, S: StorageTarget> {
    /// Virtual time of the insertion.
    pub now: VirtualTime,
    pub clock: &'a mut dyn SimulationClock,
    pub storage: &'a mut S,
    pub handle: &'a S::Handle,
}

pub type InsertHook<S> =
    Box<dyn for<'a> FnMut(InsertEvent<'a, S>) -> Result<HookFlow, HookError>>;

/// The fixed set of optional hook slots.
pub struct DriverHooks<S: StorageTarget> {
    on_insert: Option<InsertHook<S>>,
}

impl<S: StorageTarget> DriverHooks<S> {
    /// A table with every slot empty.
    pub fn new() -> Self {
        Self { on_insert: None }
    }

    /// Installs the hook run after every successful insertion.
    pub fn on_insert<F>(mut self, hook: F) -> Self
    where
        F: for<'a> FnMut(InsertEvent<'a, S>) -> Result<HookFlow, HookError> + 'static,
    {
        self.on_insert = Some(Box::new(hook));
        self
    }

    /// Runs the insertion hook if one is installed.
    pub(crate) fn notify_insert(
        &mut self,
        event: InsertEvent<'_, S>,
    ) -> Option<Result<HookFlow, HookError>> {
        self.on_insert.as_mut().map(|hook| hook(event))
    }
}

impl<S: StorageTarget> Default for DriverHooks<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StorageTarget> fmt::Debug for DriverHooks<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHooks")
            .field("on_insert", &self.on_insert.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::simulator::EventSimulator;
    use crate::storage::PartLog;

    #[test]
    fn empty_table_never_notifies() {
        let mut hooks = DriverHooks::<PartLog>::new();
        let mut sim = EventSimulator::new(0);
        let mut log = PartLog::new();
        let handle = log.insert(Bytes::from_static(b"x")).unwrap();

        assert_eq!(format!("{hooks:?}"), "DriverHooks { on_insert: false }");
        let outcome = hooks.notify_insert(InsertEvent {
            now: 0,
            clock: &mut sim,
            storage: &mut log,
            handle: &handle,
        });
        assert!(outcome.is_none());
    }

    #[test]
    fn insert_hook_sees_handle_and_storage() {
        let mut hooks = DriverHooks::<PartLog>::new().on_insert(|event| {
            assert_eq!(event.storage.len(), 1);
            assert_eq!(event.now, event.clock.now());
            Ok(HookFlow::WaitFor(event.handle.len as Ticks))
        });
        let mut sim = EventSimulator::new(3);
        let mut log = PartLog::new();
        let handle = log.insert(Bytes::from_static(b"abcd")).unwrap();

        let outcome = hooks
            .notify_insert(InsertEvent {
                now: 3,
                clock: &mut sim,
                storage: &mut log,
                handle: &handle,
            })
            .unwrap()
            .unwrap();
        assert_eq!(outcome, HookFlow::WaitFor(4));
    }
}
