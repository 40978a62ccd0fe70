//! tasklease - lease watchdog demo and diagnostics CLI
//!
//! Runs the supervision demo (monitored units renewing leases on a schedule,
//! a software timer, and the recovery coordinator) and attributes saved
//! watchdog reports offline.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod demo;
mod error;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tasklease_supervisor::DiagnosticAttributor;

use crate::demo::DemoConfig;
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "tasklease")]
#[command(about = "Lease watchdog supervisor - run the demo and attribute watchdog reports")]
#[command(version)]
#[command(long_about = "
tasklease supervises worker units that must renew a lease before it expires.
When a lease lapses the recovery coordinator works out which unit stalled and
plays that unit's recovery action.

`run` starts the demo; `attribute` parses a saved watchdog report.
Use --json flag for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervision demo
    Run {
        /// YAML demo file; the built-in two-unit demo when absent
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop after this many seconds instead of running forever
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Attribute a saved watchdog report to the stalled unit
    Attribute {
        /// Report file, one emitted fragment per line
        file: PathBuf,
    },

    /// Print the built-in demo configuration as YAML
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tasklease={log_level},tasklease_supervisor={log_level}").into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match execute_command(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }

            let exit_code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(exit_code)
        }
    }
}

fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run {
            config,
            duration_secs,
        } => {
            let config = match config {
                Some(path) => DemoConfig::load(path)?,
                None => DemoConfig::default(),
            };
            let metrics = demo::run(config, duration_secs.map(Duration::from_secs))?;
            output::print_metrics(&metrics, cli.json);
            Ok(())
        }
        Commands::Attribute { file } => {
            let text = std::fs::read_to_string(file).map_err(CliError::from)?;
            let result = DiagnosticAttributor::attribute_lines(text.lines());
            output::print_attribution(&result, cli.json);
            Ok(())
        }
        Commands::Config => {
            let text = serde_yaml::to_string(&DemoConfig::default()).map_err(CliError::from)?;
            print!("{text}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_run_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["tasklease", "run"])?;
        assert!(!cli.json);
        assert_eq!(cli.verbose, 0);
        assert!(matches!(
            cli.command,
            Commands::Run {
                config: None,
                duration_secs: None
            }
        ));
        Ok(())
    }

    #[test]
    fn parse_run_with_options() -> TestResult {
        let cli = Cli::try_parse_from([
            "tasklease",
            "run",
            "--config",
            "demo.yaml",
            "--duration-secs",
            "3",
            "-vv",
        ])?;
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                config,
                duration_secs,
            } => {
                assert_eq!(config, Some(PathBuf::from("demo.yaml")));
                assert_eq!(duration_secs, Some(3));
            }
            _ => return Err("expected run".into()),
        }
        Ok(())
    }

    #[test]
    fn parse_attribute_with_global_json() -> TestResult {
        let cli = Cli::try_parse_from(["tasklease", "attribute", "report.txt", "--json"])?;
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Attribute { ref file } if file == &PathBuf::from("report.txt")));
        Ok(())
    }

    #[test]
    fn attribute_requires_file() {
        assert!(Cli::try_parse_from(["tasklease", "attribute"]).is_err());
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["tasklease", "watch"]).is_err());
    }
}
