//! Drives a lazy stream of apply/pause commands against a discrete-event
//! simulation clock and a storage target, one command at a time.

pub mod clock;
pub mod command;
pub mod driver;
pub mod hooks;
pub mod scheduler;
pub mod simulator;
pub mod source;
pub mod storage;

pub use clock::{SimClock, Ticks, VirtualTime};
pub use command::{Command, UnrecognizedCommand};
pub use driver::{DriveError, DriverState, DriverStats, InsertDriver};
pub use hooks::{DriverHooks, HookError, HookFlow, InsertEvent};
pub use scheduler::{EventId, EventQueue, ScheduledEvent};
pub use simulator::{
    EventCallback, EventError, EventSimulator, RunSummary, ScheduleError, SimError,
    SimulationClock,
};
pub use source::{
    CommandSource, IterSource, RawSource, ScriptSource, SourceError, open_script,
    parse_script_line,
};
pub use storage::{Part, PartId, PartLog, PartLogError, PartRef, StorageTarget};
