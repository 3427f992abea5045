//! Command sources: lazy, single-consumer producers of [`Command`]s.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::iter::Fuse;
use std::path::Path;

use crate::clock::Ticks;
use crate::command::{Command, UnrecognizedCommand, ticks_from_f64};

/// A pull-style producer of commands.
///
/// Once `pull` has returned `Ok(None)` every later call must return
/// `Ok(None)` as well.
pub trait CommandSource {
    /// Yields the next command, or `None` when the source is exhausted.
    fn pull(&mut self) -> Result<Option<Command>, SourceError>;
}

/// Errors produced while pulling from a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The pulled record is not a command.
    #[error(transparent)]
    Unrecognized(#[from] UnrecognizedCommand),
    /// The underlying reader failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Source backed by any iterator of already-typed commands.
#[derive(Debug, Clone)]
pub struct IterSource<I> {
    commands: Fuse<I>,
}

impl<I: Iterator<Item = Command>> IterSource<I> {
    pub fn new<T>(commands: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            commands: commands.into_iter().fuse(),
        }
    }
}

impl<I: Iterator<Item = Command>> CommandSource for IterSource<I> {
    fn pull(&mut self) -> Result<Option<Command>, SourceError> {
        Ok(self.commands.next())
    }
}

/// Source of untyped JSON records, decoded one at a time as they are pulled.
#[derive(Debug, Clone)]
pub struct RawSource<I> {
    records: Fuse<I>,
}

impl<I: Iterator<Item = serde_json::Value>> RawSource<I> {
    pub fn new<T>(records: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            records: records.into_iter().fuse(),
        }
    }
}

impl<I: Iterator<Item = serde_json::Value>> CommandSource for RawSource<I> {
    fn pull(&mut self) -> Result<Option<Command>, SourceError> {
        match self.records.next() {
            Some(value) => Ok(Some(Command::from_value(value)?)),
            None => Ok(None),
        }
    }
}

/// Line-oriented command script read lazily from a buffered reader.
///
/// Each non-blank line is either a JSON record (`{"type":"pause","duration":3}`)
/// or the short form `apply <payload>` / `pause <ticks>`. Lines starting with
/// `#` are comments.
#[derive(Debug)]
pub struct ScriptSource<R> {
    reader: R,
    line: String,
    line_no: usize,
    exhausted: bool,
}

impl<R: BufRead> ScriptSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_no: 0,
            exhausted: false,
        }
    }

    /// Number of lines consumed so far.
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

impl<R: BufRead> CommandSource for ScriptSource<R> {
    fn pull(&mut self) -> Result<Option<Command>, SourceError> {
        while !self.exhausted {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                self.exhausted = true;
                break;
            }
            self.line_no += 1;
            if let Some(command) = parse_script_line(&self.line)? {
                return Ok(Some(command));
            }
        }
        Ok(None)
    }
}

/// Opens a script file as a lazy command source.
pub fn open_script<P: AsRef<Path>>(path: P) -> io::Result<ScriptSource<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(ScriptSource::new(BufReader::new(file)))
}

/// Parses one script line. Blank lines and comments yield `Ok(None)`.
///
/// Lines that are neither valid JSON commands nor a known short form are
/// rejected with the trimmed line as the offending value.
pub fn parse_script_line(line: &str) -> Result<Option<Command>, UnrecognizedCommand> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let unrecognized = || UnrecognizedCommand {
        value: serde_json::Value::String(trimmed.to_string()),
    };

    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed).map_err(|_| unrecognized())?;
        return Command::from_value(value).map(Some);
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match verb.to_ascii_lowercase().as_str() {
        "apply" => Ok(Some(Command::apply(rest.to_string()))),
        "pause" => parse_ticks(rest)
            .map(|duration| Some(Command::pause(duration)))
            .ok_or_else(unrecognized),
        _ => Err(unrecognized()),
    }
}

/// Whole tick counts parse exactly; finite fractions round up.
fn parse_ticks(text: &str) -> Option<Ticks> {
    match text.parse::<Ticks>() {
        Ok(ticks) => Some(ticks),
        Err(_) => text.parse::<f64>().ok().and_then(ticks_from_f64),
    }
}
