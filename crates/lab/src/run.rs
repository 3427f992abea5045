//! Wires a script, the event simulator and a part log together.

use std::cell::{Cell, RefCell};
use std::io::Cursor;
use std::rc::Rc;

use anyhow::Context;
use serde::Serialize;
use simdriver::{
    Command, CommandSource, DriverHooks, DriverState, DriverStats, EventSimulator, HookFlow,
    InsertDriver, PartId, PartLog, RunSummary, ScriptSource, SourceError, VirtualTime,
};
use tracing::info;

use crate::config::LabConfig;

/// One insertion as seen by the `on_insert` hook.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct InsertionRecord {
    pub time: VirtualTime,
    pub part: PartId,
    pub len: usize,
}

/// Everything a finished (or horizon-limited) run reports.
#[derive(Debug, Serialize)]
pub struct LabReport {
    pub driver: DriverState,
    pub stats: DriverStats,
    pub simulation: RunSummary,
    pub pending_events: usize,
    pub parts: usize,
    pub total_bytes: usize,
    pub insertions: Vec<InsertionRecord>,
}

/// Script source that publishes how many lines it has consumed.
struct TrackedScript {
    inner: ScriptSource<Cursor<String>>,
    line: Rc<Cell<usize>>,
}

impl CommandSource for TrackedScript {
    fn pull(&mut self) -> Result<Option<Command>, SourceError> {
        let pulled = self.inner.pull();
        self.line.set(self.inner.line_no());
        pulled
    }
}

/// Runs `script` to completion, or up to the configured horizon.
pub fn run_script(config: &LabConfig, script: &str) -> anyhow::Result<LabReport> {
    let storage = Rc::new(RefCell::new(match config.max_parts {
        Some(limit) => PartLog::with_limit(limit),
        None => PartLog::new(),
    }));

    let insertions = Rc::new(RefCell::new(Vec::new()));
    let hook_insertions = Rc::clone(&insertions);
    let settle = config.settle;
    let hooks = DriverHooks::<PartLog>::new().on_insert(move |event| {
        info!(
            time = event.now,
            part = event.handle.id.0,
            len = event.handle.len,
            "part inserted"
        );
        hook_insertions.borrow_mut().push(InsertionRecord {
            time: event.now,
            part: event.handle.id,
            len: event.handle.len,
        });
        Ok(HookFlow::WaitFor(settle))
    });

    let line = Rc::new(Cell::new(0));
    let source = TrackedScript {
        inner: ScriptSource::new(Cursor::new(script.to_owned())),
        line: Rc::clone(&line),
    };
    let driver = InsertDriver::new(source, Rc::clone(&storage), hooks);
    let mut sim = EventSimulator::new(config.start_time);

    let started = driver.start(&mut sim).with_context(|| {
        format!(
            "driver failed before its first pause (script line {})",
            line.get()
        )
    })?;
    info!(state = ?started, "driver started");

    let simulation = match config.until {
        Some(limit) => sim.run_until(limit),
        None => sim.run(),
    }
    .with_context(|| format!("simulation failed at script line {}", line.get()))?;

    let driver_state = driver.state();
    let stats = driver.stats().unwrap_or_default();
    let storage = storage.borrow();
    let insertions = insertions.borrow().clone();
    if !driver_state.is_terminal() {
        info!(pending = sim.pending(), "driver still waiting at the horizon");
    }
    info!(
        state = ?driver_state,
        applied = stats.applied,
        final_time = simulation.final_time,
        "run finished"
    );

    Ok(LabReport {
        driver: driver_state,
        stats,
        simulation,
        pending_events: sim.pending(),
        parts: storage.len(),
        total_bytes: storage.total_bytes(),
        insertions,
    })
}

/// Human-readable rendition of a report.
pub fn render_report(report: &LabReport) -> String {
    let mut out = format!(
        "driver: {:?}\nsimulated time: {}\nevents dispatched: {}\nparts: {} ({} bytes)\n",
        report.driver,
        report.simulation.final_time,
        report.simulation.events,
        report.parts,
        report.total_bytes,
    );
    if report.pending_events > 0 {
        out.push_str(&format!("pending events: {}\n", report.pending_events));
    }
    for record in &report.insertions {
        out.push_str(&format!(
            "[insert @{}] part {} ({} bytes)\n",
            record.time, record.part.0, record.len
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScriptInput;

    fn config() -> LabConfig {
        LabConfig {
            input: ScriptInput::Stdin,
            start_time: 0,
            until: None,
            max_parts: None,
            settle: 0,
            json: false,
        }
    }

    #[test]
    fn runs_script_to_exhaustion() {
        let report = run_script(&config(), "apply p1\npause 5\napply p22\n").unwrap();

        assert_eq!(report.driver, DriverState::Terminated);
        assert_eq!(report.simulation.final_time, 5);
        assert_eq!(report.parts, 2);
        assert_eq!(report.total_bytes, 5);
        assert_eq!(
            report.insertions,
            vec![
                InsertionRecord { time: 0, part: PartId(0), len: 2 },
                InsertionRecord { time: 5, part: PartId(1), len: 3 },
            ]
        );
    }

    #[test]
    fn horizon_leaves_driver_suspended() {
        let config = LabConfig {
            until: Some(3),
            ..config()
        };
        let report = run_script(&config, "apply a\npause 10\napply b\n").unwrap();

        assert_eq!(report.driver, DriverState::Suspended { resume_at: 10 });
        assert_eq!(report.simulation.final_time, 3);
        assert_eq!(report.pending_events, 1);
        assert_eq!(report.parts, 1);
    }

    #[test]
    fn settle_spaces_out_insertions() {
        let config = LabConfig {
            settle: 4,
            ..config()
        };
        let report = run_script(&config, "apply a\napply b\napply c\n").unwrap();

        let times: Vec<VirtualTime> = report.insertions.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![0, 4, 8]);
    }

    #[test]
    fn unknown_line_fails_with_context() {
        let err = run_script(&config(), "apply a\nmerge now\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "driver failed before its first pause (script line 2)"
        );
        assert!(format!("{err:#}").contains("unrecognized command: \"merge now\""));
    }

    #[test]
    fn late_failure_surfaces_from_simulation() {
        let err = run_script(&config(), "# warm up\npause 2\n\nexplode\n").unwrap_err();
        assert_eq!(err.to_string(), "simulation failed at script line 4");
    }

    #[test]
    fn bundled_script_runs_clean() {
        let script = include_str!("../scripts/steady-inserts.txt");
        let report = run_script(&config(), script).unwrap();

        assert_eq!(report.driver, DriverState::Terminated);
        assert_eq!(report.parts, 6);
        assert_eq!(report.simulation.final_time, 45);
        assert_eq!(report.stats.suspensions, 2);
    }

    #[test]
    fn report_renders_each_insertion() {
        let report = run_script(&config(), "apply abc\n").unwrap();
        let text = render_report(&report);
        assert!(text.contains("driver: Terminated"));
        assert!(text.contains("[insert @0] part 0 (3 bytes)"));
    }
}
