//! Virtual clock primitives shared by the simulator and the driver.

/// A point in simulated time. Only ever moves forward.
pub type VirtualTime = u64;

/// A signed span of simulated time. Non-positive spans never suspend anything.
pub type Ticks = i64;

/// A deterministic simulated clock that only advances when instructed.
///
/// The clock starts at a user-provided timestamp and jumps forward to the due
/// time of each dispatched event. No wall-clock time is consulted.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SimClock {
    current: VirtualTime,
}

impl SimClock {
    /// Creates a new clock starting at the given timestamp.
    ///
    /// # Parameters
    /// - `start`: The initial simulated timestamp.
    pub fn new(start: VirtualTime) -> Self {
        Self { current: start }
    }

    /// Returns the current simulated timestamp.
    pub fn now(&self) -> VirtualTime {
        self.current
    }

    /// Moves the clock forward to `target` if it is in the future.
    ///
    /// # Parameters
    /// - `target`: Desired timestamp. If earlier than the current time, the
    ///   clock remains unchanged to preserve monotonicity.
    pub fn advance_to(&mut self, target: VirtualTime) {
        if target > self.current {
            self.current = target;
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Computes `now + ticks` for a strictly positive `ticks`.
pub(crate) fn deadline(now: VirtualTime, ticks: Ticks) -> Option<VirtualTime> {
    let delta = VirtualTime::try_from(ticks).ok().filter(|delta| *delta > 0)?;
    now.checked_add(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_only_forward() {
        let mut clock = SimClock::new(10);
        clock.advance_to(5);
        assert_eq!(clock.now(), 10);

        clock.advance_to(12);
        assert_eq!(clock.now(), 12);
    }

    #[test]
    fn deadline_ignores_non_positive_spans() {
        assert_eq!(deadline(7, 0), None);
        assert_eq!(deadline(7, -3), None);
        assert_eq!(deadline(7, 5), Some(12));
    }

    #[test]
    fn deadline_reports_overflow() {
        assert_eq!(deadline(VirtualTime::MAX, 1), None);
        assert_eq!(deadline(1, Ticks::MAX), Some(1 + Ticks::MAX as u64));
    }
}
