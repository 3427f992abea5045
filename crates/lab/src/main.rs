//! Lab runner for the simulated-time insert driver.
//!
//! Reads a command script (a file or standard input), drives it into an
//! in-memory part log on the event simulator and prints what happened.
//! Logging goes to stderr and is controlled through `RUST_LOG`.

mod config;
mod run;

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Args, LabConfig, ScriptInput};

async fn read_script(input: &ScriptInput) -> anyhow::Result<String> {
    match input {
        ScriptInput::Stdin => {
            let mut script = String::new();
            tokio::io::stdin()
                .read_to_string(&mut script)
                .await
                .context("failed to read script from stdin")?;
            Ok(script)
        }
        ScriptInput::File(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read script {}", path.display())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simdriver=info,inserter_lab=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = LabConfig::try_from(Args::parse())?;
    tracing::debug!(?config, "configuration loaded");

    let script = read_script(&config.input).await?;
    let report = run::run_script(&config, &script)?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", run::render_report(&report));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[tokio::test]
    async fn reads_script_from_file() {
        let mut temp = NamedTempFile::new().expect("temp file should create");
        writeln!(temp, "apply first").unwrap();

        let script = read_script(&ScriptInput::File(temp.path().to_path_buf()))
            .await
            .expect("script should read");
        assert_eq!(script, "apply first\n");
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let path = std::path::PathBuf::from("/nonexistent/inserts.txt");
        let err = read_script(&ScriptInput::File(path)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to read script /nonexistent/inserts.txt"
        );
    }
}
