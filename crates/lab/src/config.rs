//! Command-line configuration for the lab runner.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "inserter-lab",
    version,
    about = "Run an insert script against the simulated clock"
)]
pub struct Args {
    /// Command script to run; `-` reads standard input
    #[arg(short, long, default_value = "-")]
    pub script: String,

    /// Initial simulated timestamp
    #[arg(long, default_value_t = 0)]
    pub start_time: u64,

    /// Stop dispatching events after this simulated timestamp
    #[arg(long)]
    pub until: Option<u64>,

    /// Refuse insertions once this many parts are stored
    #[arg(long)]
    pub max_parts: Option<usize>,

    /// Ticks the driver waits after every insertion
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub settle: i64,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Where the command script comes from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ScriptInput {
    Stdin,
    File(PathBuf),
}

/// Validated lab settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LabConfig {
    pub input: ScriptInput,
    pub start_time: u64,
    pub until: Option<u64>,
    pub max_parts: Option<usize>,
    pub settle: i64,
    pub json: bool,
}

impl TryFrom<Args> for LabConfig {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> anyhow::Result<Self> {
        if args.settle < 0 {
            anyhow::bail!("settle must not be negative");
        }
        if let Some(until) = args.until {
            if until < args.start_time {
                anyhow::bail!(
                    "horizon {until} lies before the start time {}",
                    args.start_time
                );
            }
        }
        let input = match args.script.as_str() {
            "-" => ScriptInput::Stdin,
            path => ScriptInput::File(PathBuf::from(path)),
        };
        Ok(Self {
            input,
            start_time: args.start_time,
            until: args.until,
            max_parts: args.max_parts,
            settle: args.settle,
            json: args.json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> anyhow::Result<LabConfig> {
        let args = Args::try_parse_from(argv)?;
        LabConfig::try_from(args)
    }

    #[test]
    fn defaults_read_stdin_from_time_zero() {
        let config = parse(&["inserter-lab"]).unwrap();
        assert_eq!(config.input, ScriptInput::Stdin);
        assert_eq!(config.start_time, 0);
        assert_eq!(config.until, None);
        assert!(!config.json);
    }

    #[test]
    fn script_path_and_limits_are_parsed() {
        let config = parse(&[
            "inserter-lab",
            "--script",
            "inserts.txt",
            "--start-time",
            "5",
            "--until",
            "50",
            "--max-parts",
            "8",
            "--settle",
            "2",
            "--json",
        ])
        .unwrap();
        assert_eq!(config.input, ScriptInput::File(PathBuf::from("inserts.txt")));
        assert_eq!(config.until, Some(50));
        assert_eq!(config.max_parts, Some(8));
        assert_eq!(config.settle, 2);
        assert!(config.json);
    }

    #[test]
    fn rejects_negative_settle() {
        let err = parse(&["inserter-lab", "--settle", "-1"]).unwrap_err();
        assert_eq!(err.to_string(), "settle must not be negative");
    }

    #[test]
    fn rejects_horizon_before_start() {
        let err = parse(&["inserter-lab", "--start-time", "9", "--until", "3"]).unwrap_err();
        assert!(err.to_string().contains("before the start time"));
    }
}
